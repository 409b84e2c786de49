//! Target-time state machine.
//!
//! [`ClockController`] owns the logical position of the hands (the target) and
//! turns every request to move them into queued minute pulses. Requests come
//! from three producers: the control surface, the once-a-second real-time
//! sync, and the front-panel buttons reported by the relay link. All of them
//! funnel through [`ClockController::tick_to_time`], which admits one retarget
//! at a time and rejects the rest with [`RetargetError::Busy`].
//!
//! The controller never blocks on the hardware. It persists first, then
//! updates memory, so a failed write leaves both the target and the queue
//! exactly as they were.

use core::fmt;

use portable_atomic::{AtomicU8, AtomicU16, Ordering};

use crate::config::{ClockConfig, ConfigStore, PulseInterval};
use crate::guard::OperationFlag;
use crate::link::{LinkSession, PinEvent, RelayOutput};
use crate::pins::{ButtonAction, PinDispatch, PinEdge, PinId, PinMap, PinOutOfRange};
use crate::scheduler::{TickOutcome, TickScheduler};
use crate::time::ClockTime;

/// Counted shutdown-button presses that trigger the relay-off sequence.
pub const SHUTDOWN_PRESSES: u8 = 3;

/// Source of the current local time.
pub trait WallClock {
    /// Local time of day folded onto the clock face.
    fn now(&self) -> ClockTime;
}

impl<T> WallClock for &T
where
    T: WallClock + ?Sized,
{
    fn now(&self) -> ClockTime {
        (**self).now()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControllerState {
    Idle,
    Retargeting,
}

/// Successful retarget.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Retarget {
    /// The target already matched; nothing was queued or persisted.
    AlreadyThere,
    /// The target moved forward by `pulses` minutes.
    Queued { pulses: u16 },
}

/// Failed retarget. In-memory state is untouched in both cases.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RetargetError<E> {
    /// Another retarget is in flight.
    Busy,
    /// The new target could not be persisted.
    Persist(E),
}

impl<E: fmt::Display> fmt::Display for RetargetError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetargetError::Busy => f.write_str("busy"),
            RetargetError::Persist(error) => write!(f, "failed to persist target: {error}"),
        }
    }
}

/// What a button transition did.
#[derive(Debug, Eq, PartialEq)]
pub enum ButtonOutcome<E> {
    /// No action is bound to this `(pin, edge)`.
    Unbound(PinEvent),
    /// Manual stepping is disabled while real-time mode is active.
    IgnoredInRealTime(ButtonAction),
    Stepped {
        action: ButtonAction,
        target: ClockTime,
        result: Result<Retarget, RetargetError<E>>,
    },
    /// Real-time mode flipped to the carried value, or the write failed.
    ModeToggled(Result<bool, E>),
    /// Press counted; `presses` of [`SHUTDOWN_PRESSES`] so far.
    ShutdownCounted { presses: u8 },
    /// Pulses are still pending, so the press was not counted.
    ShutdownBlocked { pending: u32 },
    /// Final press: relay-off sequence ran. The OS shutdown may proceed only on `Ok`.
    ShutdownRequested(Result<(), E>),
}

/// Result of one scheduler period.
#[derive(Debug, Eq, PartialEq)]
pub struct TickReport<E> {
    /// Session that received the status announce this period.
    pub announced: Option<LinkSession>,
    pub outcome: TickOutcome<E>,
}

/// The clock's state machine, generic over the relay link and the store.
pub struct ClockController<L, S> {
    link: L,
    store: S,
    pins: PinMap,
    dispatch: PinDispatch,
    scheduler: TickScheduler,
    /// Target as minutes of the half day.
    target: AtomicU16,
    retargeting: OperationFlag,
    shutdown_presses: AtomicU8,
}

impl<L, S> ClockController<L, S>
where
    L: RelayOutput,
    S: ConfigStore,
{
    /// Builds a controller positioned at `config.last_time` in phase
    /// `config.last_relay_state` with an empty queue.
    pub fn new(link: L, store: S, pins: PinMap, config: &ClockConfig) -> Self {
        Self {
            link,
            store,
            dispatch: pins.dispatch(),
            pins,
            scheduler: TickScheduler::new(config.last_relay_state),
            target: AtomicU16::new(config.last_time.minutes_of_half_day()),
            retargeting: OperationFlag::new(),
            shutdown_presses: AtomicU8::new(0),
        }
    }

    /// Builds a controller from the store's committed snapshot.
    pub async fn restore(link: L, store: S, pins: PinMap) -> Self {
        let config = store.snapshot().await;
        Self::new(link, store, pins, &config)
    }

    pub fn current_target(&self) -> ClockTime {
        ClockTime::from_minutes_of_half_day(self.target.load(Ordering::Acquire))
    }

    pub fn state(&self) -> ControllerState {
        if self.retargeting.is_active() {
            ControllerState::Retargeting
        } else {
            ControllerState::Idle
        }
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pins(&self) -> &PinMap {
        &self.pins
    }

    pub fn shutdown_presses(&self) -> u8 {
        self.shutdown_presses.load(Ordering::Acquire)
    }

    /// Rebinds a button transition, returning the action it replaced.
    pub fn bind(
        &mut self,
        pin: PinId,
        edge: PinEdge,
        action: ButtonAction,
    ) -> Result<Option<ButtonAction>, PinOutOfRange> {
        self.dispatch.bind(pin, edge, action)
    }

    /// Moves the target forward to `target`, queueing one pulse per minute.
    ///
    /// The mode flag is not consulted here; callers that must respect
    /// real-time mode check it themselves.
    ///
    /// # Errors
    ///
    /// [`RetargetError::Busy`] while another retarget is running, or
    /// [`RetargetError::Persist`] when the new target cannot be stored.
    pub async fn tick_to_time(&self, target: ClockTime) -> Result<Retarget, RetargetError<S::Error>> {
        let _guard = self.retargeting.try_begin().ok_or(RetargetError::Busy)?;
        let current = self.current_target();
        if current == target {
            return Ok(Retarget::AlreadyThere);
        }

        let pulses = current.forward_delta_to(target);
        self.store
            .set_last_time(target)
            .await
            .map_err(RetargetError::Persist)?;
        self.scheduler.queue().enqueue(u32::from(pulses));
        self.set_target(target);
        Ok(Retarget::Queued { pulses })
    }

    /// Declares the hands to be at `time` without moving them.
    ///
    /// Pending pulses stay queued.
    ///
    /// # Errors
    ///
    /// Same as [`tick_to_time`](Self::tick_to_time).
    pub async fn override_time(&self, time: ClockTime) -> Result<(), RetargetError<S::Error>> {
        let _guard = self.retargeting.try_begin().ok_or(RetargetError::Busy)?;
        self.store
            .set_last_time(time)
            .await
            .map_err(RetargetError::Persist)?;
        self.set_target(time);
        Ok(())
    }

    /// Follows the wall clock when real-time mode is active.
    ///
    /// Returns `Ok(None)` in manual mode.
    pub async fn sync_real_time<C: WallClock>(
        &self,
        clock: C,
    ) -> Result<Option<Retarget>, RetargetError<S::Error>> {
        if !self.store.use_real_time().await {
            return Ok(None);
        }
        self.tick_to_time(clock.now()).await.map(Some)
    }

    /// Runs one scheduler period: status announce, then at most one pulse.
    pub async fn poll_tick(&self) -> TickReport<S::Error> {
        let announced = self
            .scheduler
            .announce(&self.pins, &self.link, &self.store)
            .await;
        let outcome = self
            .scheduler
            .poll(&self.pins, &self.link, &self.store)
            .await;
        TickReport { announced, outcome }
    }

    /// Applies the button action bound to `event`.
    pub async fn handle_pin_event(&self, event: PinEvent) -> ButtonOutcome<S::Error> {
        let Some(action) = self.dispatch.lookup(event.pin, event.edge) else {
            return ButtonOutcome::Unbound(event);
        };

        match action {
            ButtonAction::StepMinute | ButtonAction::StepHour => {
                if self.store.use_real_time().await {
                    return ButtonOutcome::IgnoredInRealTime(action);
                }
                let current = self.current_target();
                let target = if action == ButtonAction::StepMinute {
                    current.next_minute()
                } else {
                    current.next_hour()
                };
                ButtonOutcome::Stepped {
                    action,
                    target,
                    result: self.tick_to_time(target).await,
                }
            }
            ButtonAction::ToggleRealTime => {
                let enabled = !self.store.use_real_time().await;
                ButtonOutcome::ModeToggled(self.set_use_real_time(enabled).await.map(|()| enabled))
            }
            ButtonAction::Shutdown => self.press_shutdown().await,
        }
    }

    /// Persists the mode flag and mirrors it onto the mode lamp.
    pub async fn set_use_real_time(&self, enabled: bool) -> Result<(), S::Error> {
        self.store.set_use_real_time(enabled).await?;
        self.link.send(self.pins.mode_command(enabled));
        Ok(())
    }

    /// Persists a new pulse period. The runtime restarts its drain loop.
    pub async fn set_interval(&self, interval: PulseInterval) -> Result<(), S::Error> {
        self.store.set_interval(interval).await
    }

    /// Saves phase and target, then switches every released output off.
    ///
    /// # Errors
    ///
    /// Returns the first persistence failure; outputs are left untouched in
    /// that case.
    pub async fn shutdown_relays(&self) -> Result<(), S::Error> {
        self.store.set_relay_phase(self.scheduler.phase()).await?;
        self.store.set_last_time(self.current_target()).await?;
        for command in self.pins.release_commands() {
            self.link.send(command);
        }
        Ok(())
    }

    async fn press_shutdown(&self) -> ButtonOutcome<S::Error> {
        let pending = self.scheduler.queue().len();
        if pending > 0 {
            return ButtonOutcome::ShutdownBlocked { pending };
        }

        let presses = self.shutdown_presses.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        if presses < SHUTDOWN_PRESSES {
            return ButtonOutcome::ShutdownCounted { presses };
        }
        self.shutdown_presses.store(0, Ordering::Release);
        ButtonOutcome::ShutdownRequested(self.shutdown_relays().await)
    }

    fn set_target(&self, time: ClockTime) {
        self.target
            .store(time.minutes_of_half_day(), Ordering::Release);
    }
}

impl<L, S> fmt::Debug for ClockController<L, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockController")
            .field("target", &self.target.load(Ordering::Acquire))
            .field("retargeting", &self.retargeting.is_active())
            .field("scheduler", &self.scheduler)
            .field("shutdown_presses", &self.shutdown_presses.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
