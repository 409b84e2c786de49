//! Pulse queue and the periodic drain step.
//!
//! Target changes only ever add minutes to the [`PulseQueue`]. The runtime
//! calls [`TickScheduler::poll`] once per pulse period; each call moves the
//! hands by at most one minute, and a call that finds a pulse still in flight
//! does nothing rather than stacking up behind it.

use core::fmt;

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::ConfigStore;
use crate::guard::OperationFlag;
use crate::link::{LinkSession, RelayOutput};
use crate::pins::PinMap;

/// Which of the two alternating output states the mechanism is in.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum RelayPhase {
    #[default]
    Off,
    On,
}

impl RelayPhase {
    #[must_use]
    pub const fn from_bool(on: bool) -> Self {
        if on { RelayPhase::On } else { RelayPhase::Off }
    }

    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, RelayPhase::On)
    }

    /// Phase produced by the next pulse.
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            RelayPhase::Off => RelayPhase::On,
            RelayPhase::On => RelayPhase::Off,
        }
    }
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_on() { "on" } else { "off" })
    }
}

/// Minutes still owed to the hardware.
#[derive(Debug, Default)]
pub struct PulseQueue {
    pending: AtomicU32,
}

impl PulseQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
        }
    }

    /// Adds `pulses` to the backlog, returning the new length.
    pub fn enqueue(&self, pulses: u32) -> u32 {
        self.pending.fetch_add(pulses, Ordering::AcqRel).saturating_add(pulses)
    }

    /// Removes one pulse, returning the remaining length. Never goes below zero.
    pub fn take_one(&self) -> u32 {
        let previous = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                Some(pending.saturating_sub(1))
            })
            .unwrap_or_else(|current| current);
        previous.saturating_sub(1)
    }

    pub fn len(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drain-side lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedulerState {
    Idle,
    Pulsing,
}

/// Why a pulse period did nothing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// The previous pulse has not finished persisting.
    Busy,
    Disconnected,
    /// Nothing queued.
    QueueEmpty,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::Busy => "pulse in flight",
            SkipReason::Disconnected => "relay link disconnected",
            SkipReason::QueueEmpty => "queue empty",
        })
    }
}

/// Result of one pulse period.
#[derive(Debug, Eq, PartialEq)]
pub enum TickOutcome<E> {
    Skipped(SkipReason),
    /// One pulse was issued and the new phase persisted.
    Pulsed { phase: RelayPhase, remaining: u32 },
    /// The pulse was issued but persisting the phase failed.
    PersistFailed {
        phase: RelayPhase,
        remaining: u32,
        error: E,
    },
}

impl<E> TickOutcome<E> {
    /// Returns `true` when relay commands went out this period.
    pub const fn pulsed(&self) -> bool {
        !matches!(self, TickOutcome::Skipped(_))
    }
}

/// Owner of the pulse queue and the relay phase.
#[derive(Debug)]
pub struct TickScheduler {
    queue: PulseQueue,
    phase: AtomicBool,
    pulsing: OperationFlag,
    /// Last link session that received the status announce (0 = none).
    announced: AtomicU32,
}

impl TickScheduler {
    #[must_use]
    pub const fn new(phase: RelayPhase) -> Self {
        Self {
            queue: PulseQueue::new(),
            phase: AtomicBool::new(phase.is_on()),
            pulsing: OperationFlag::new(),
            announced: AtomicU32::new(0),
        }
    }

    pub fn queue(&self) -> &PulseQueue {
        &self.queue
    }

    pub fn phase(&self) -> RelayPhase {
        RelayPhase::from_bool(self.phase.load(Ordering::Acquire))
    }

    pub fn state(&self) -> SchedulerState {
        if self.pulsing.is_active() {
            SchedulerState::Pulsing
        } else {
            SchedulerState::Idle
        }
    }

    /// Lights the status lamps once for every new link session.
    ///
    /// Returns the session that was announced, or `None` when the link is down
    /// or the current session has already been announced.
    pub async fn announce<L, S>(&self, pins: &PinMap, link: L, store: S) -> Option<LinkSession>
    where
        L: RelayOutput,
        S: ConfigStore,
    {
        let session = link.state().session()?;
        if self.announced.swap(session.0, Ordering::AcqRel) == session.0 {
            return None;
        }
        let use_real_time = store.use_real_time().await;
        for command in pins.announce_commands(use_real_time) {
            link.send(command);
        }
        Some(session)
    }

    /// Runs one pulse period.
    pub async fn poll<L, S>(&self, pins: &PinMap, link: L, store: S) -> TickOutcome<S::Error>
    where
        L: RelayOutput,
        S: ConfigStore,
    {
        let Some(_guard) = self.pulsing.try_begin() else {
            return TickOutcome::Skipped(SkipReason::Busy);
        };
        if !link.is_connected() {
            return TickOutcome::Skipped(SkipReason::Disconnected);
        }
        if self.queue.is_empty() {
            return TickOutcome::Skipped(SkipReason::QueueEmpty);
        }

        let phase = self.phase().flipped();
        self.phase.store(phase.is_on(), Ordering::Release);
        for command in pins.phase_commands(phase) {
            link.send(command);
        }
        let remaining = self.queue.take_one();

        match store.set_relay_phase(phase).await {
            Ok(()) => TickOutcome::Pulsed { phase, remaining },
            Err(error) => TickOutcome::PersistFailed {
                phase,
                remaining,
                error,
            },
        }
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new(RelayPhase::Off)
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::link::LinkState;
    use crate::pins::{PIN_MAP, PinCommand};
    use crate::testing::{MemoryStore, RecordingLink};

    #[test]
    fn queue_saturates_at_zero() {
        let queue = PulseQueue::new();
        assert_eq!(queue.take_one(), 0);
        assert_eq!(queue.enqueue(2), 2);
        assert_eq!(queue.take_one(), 1);
        assert_eq!(queue.take_one(), 0);
        assert_eq!(queue.take_one(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn pulse_flips_phase_and_persists() {
        let link = RecordingLink::connected();
        let store = MemoryStore::default();
        let scheduler = TickScheduler::new(RelayPhase::Off);
        scheduler.queue().enqueue(2);

        let outcome = block_on(scheduler.poll(&PIN_MAP, &link, &store));
        assert_eq!(
            outcome,
            TickOutcome::Pulsed {
                phase: RelayPhase::On,
                remaining: 1
            }
        );
        assert_eq!(scheduler.phase(), RelayPhase::On);
        assert_eq!(store.config().last_relay_state, RelayPhase::On);
        assert_eq!(
            link.sent().as_slice(),
            &[
                PinCommand::on(0),
                PinCommand::on(1),
                PinCommand::on(4),
                PinCommand::off(5),
            ]
        );

        let outcome = block_on(scheduler.poll(&PIN_MAP, &link, &store));
        assert!(outcome.pulsed());
        assert_eq!(scheduler.phase(), RelayPhase::Off);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn empty_queue_and_disconnected_link_are_skipped() {
        let link = RecordingLink::connected();
        let store = MemoryStore::default();
        let scheduler = TickScheduler::default();

        assert_eq!(
            block_on(scheduler.poll(&PIN_MAP, &link, &store)),
            TickOutcome::Skipped(SkipReason::QueueEmpty)
        );

        scheduler.queue().enqueue(1);
        link.set_state(LinkState::Disconnected);
        assert_eq!(
            block_on(scheduler.poll(&PIN_MAP, &link, &store)),
            TickOutcome::Skipped(SkipReason::Disconnected)
        );
        assert_eq!(scheduler.queue().len(), 1);
        assert_eq!(scheduler.phase(), RelayPhase::Off);
        assert!(link.sent().is_empty());
    }

    #[test]
    fn persist_failure_still_consumes_the_pulse() {
        let link = RecordingLink::connected();
        let store = MemoryStore::default();
        store.fail_writes(true);
        let scheduler = TickScheduler::default();
        scheduler.queue().enqueue(1);

        let outcome = block_on(scheduler.poll(&PIN_MAP, &link, &store));
        assert!(matches!(
            outcome,
            TickOutcome::PersistFailed {
                phase: RelayPhase::On,
                remaining: 0,
                ..
            }
        ));
        assert_eq!(store.config().last_relay_state, RelayPhase::Off);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn announce_once_per_session() {
        let link = RecordingLink::connected();
        let store = MemoryStore::default();
        let scheduler = TickScheduler::default();

        assert_eq!(
            block_on(scheduler.announce(&PIN_MAP, &link, &store)),
            Some(LinkSession(1))
        );
        assert_eq!(block_on(scheduler.announce(&PIN_MAP, &link, &store)), None);
        assert_eq!(
            link.sent().as_slice(),
            &PIN_MAP.announce_commands(true)
        );

        link.set_state(LinkState::Disconnected);
        assert_eq!(block_on(scheduler.announce(&PIN_MAP, &link, &store)), None);

        link.set_state(LinkState::Connected(LinkSession(2)));
        assert_eq!(
            block_on(scheduler.announce(&PIN_MAP, &link, &store)),
            Some(LinkSession(2))
        );
        assert_eq!(link.sent().len(), 4);
    }
}
