//! Task wiring for the daemon.
//!
//! Everything that touches the controller runs inside one future on the
//! current thread: the link supervisor, the pulse drain, the real-time sync,
//! the button dispatcher and the control queue. Only the HTTP server is
//! spawned as a separate task, and it reaches the controller through the
//! control queue alone.

use std::fmt::Display;
use std::time::Duration;

use anyhow::Context as _;
use chrono::{Local, Timelike};
use clock_core::config::{ConfigStore, PulseInterval};
use clock_core::controller::{
    ButtonOutcome, ClockController, Retarget, RetargetError, SHUTDOWN_PRESSES, TickReport,
    WallClock,
};
use clock_core::link::RelayOutput;
use clock_core::pins::PIN_MAP;
use clock_core::scheduler::{SkipReason, TickOutcome};
use clock_core::time::ClockTime;
use embassy_futures::join::{join, join4};
use embassy_futures::select::{Either, select};
use tokio::net::TcpListener;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, trace, warn};

use crate::control::{self, ControlInbox, IntervalChanged};
use crate::http;
use crate::link::{EventReceiver, RelayLink};
use crate::settings::Settings;
use crate::shutdown::ShutdownHook;
use crate::store::JsonConfigStore;

/// Period of the wall-clock follower.
pub const REAL_TIME_PERIOD: Duration = Duration::from_secs(1);

/// Local time from the system clock.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> ClockTime {
        let now = Local::now();
        face_time(now.hour(), now.minute())
    }
}

/// Folds a 24-hour wall-clock reading onto the face.
pub fn face_time(hour: u32, minute: u32) -> ClockTime {
    let hour = u8::try_from(hour % 24).unwrap_or_default();
    let minute = u8::try_from(minute % 60).unwrap_or_default();
    ClockTime::new(hour, minute).unwrap_or_default()
}

/// Starts every daemon task and runs until the control surface fails.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let store = JsonConfigStore::open(&settings.config_path)
        .await
        .with_context(|| format!("loading {}", settings.config_path.display()))?;
    let hook = ShutdownHook::new(&settings.shutdown_command, settings.dry_run_shutdown)
        .context("invalid shutdown command")?;
    let link = RelayLink::new(settings.relay_url.as_str())
        .with_vocabulary(settings.status_vocabulary.vocabulary());
    let controller = ClockController::restore(&link, &store, PIN_MAP).await;
    let initial_interval = store.snapshot().await.interval;
    info!(
        relay = link.url(),
        vocabulary = ?settings.status_vocabulary,
        reconnect_ms = link.reconnect_delay().as_millis(),
        target = %controller.current_target(),
        phase = %controller.scheduler().phase(),
        "controller restored"
    );

    let listener = TcpListener::bind(settings.http_addr)
        .await
        .with_context(|| format!("binding control surface to {}", settings.http_addr))?;
    let (control, mut inbox) = control::channel();
    let router = http::router(control, settings.static_dir.as_deref());
    let server = tokio::spawn(http::serve(listener, router));

    let interval_changed = IntervalChanged::new();
    let core = join(
        link.run(),
        drive(
            &controller,
            link.events(),
            &mut inbox,
            &hook,
            &interval_changed,
            initial_interval,
        ),
    );

    match select(core, server).await {
        Either::First(_) => Ok(()),
        Either::Second(joined) => joined
            .context("control surface task panicked")?
            .with_context(|| format!("control surface on {}", settings.http_addr)),
    }
}

/// Runs the controller-side tasks against an already running relay link.
pub async fn drive<L, S>(
    controller: &ClockController<L, S>,
    events: EventReceiver<'_>,
    inbox: &mut ControlInbox,
    hook: &ShutdownHook,
    interval_changed: &IntervalChanged,
    initial_interval: PulseInterval,
) where
    L: RelayOutput,
    S: ConfigStore,
{
    join4(
        drain_pulses(controller, interval_changed, initial_interval),
        follow_wall_clock(controller, SystemClock),
        dispatch_buttons(controller, events, hook),
        control::serve(inbox, controller, interval_changed),
    )
    .await;
}

/// Issues at most one pulse per period. A new period restarts the timer.
pub async fn drain_pulses<L, S>(
    controller: &ClockController<L, S>,
    interval_changed: &IntervalChanged,
    mut period: PulseInterval,
) -> !
where
    L: RelayOutput,
    S: ConfigStore,
{
    loop {
        let mut ticker = interval(period.as_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(interval_ms = period.as_millis(), "pulse loop started");
        loop {
            match select(ticker.tick(), interval_changed.wait()).await {
                Either::First(_) => log_tick(controller.poll_tick().await),
                Either::Second(next) => {
                    period = next;
                    break;
                }
            }
        }
    }
}

fn log_tick<E: Display>(report: TickReport<E>) {
    if let Some(session) = report.announced {
        info!(session = session.0, "status lamps announced");
    }
    match report.outcome {
        TickOutcome::Skipped(SkipReason::QueueEmpty) => {}
        TickOutcome::Skipped(reason) => trace!(%reason, "pulse period skipped"),
        TickOutcome::Pulsed { phase, remaining } => info!(%phase, remaining, "tick processed"),
        TickOutcome::PersistFailed {
            phase,
            remaining,
            error,
        } => error!(%phase, remaining, %error, "tick processed but relay phase not saved"),
    }
}

/// Retargets to the wall clock once per [`REAL_TIME_PERIOD`] in real-time mode.
pub async fn follow_wall_clock<L, S, C>(controller: &ClockController<L, S>, clock: C) -> !
where
    L: RelayOutput,
    S: ConfigStore,
    C: WallClock,
{
    let mut ticker = interval(REAL_TIME_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match controller.sync_real_time(&clock).await {
            Ok(Some(Retarget::Queued { pulses })) => {
                info!(pulses, target = %controller.current_target(), "following wall clock");
            }
            Ok(_) => {}
            Err(RetargetError::Busy) => debug!("wall clock sync skipped: retarget in progress"),
            Err(RetargetError::Persist(error)) => {
                error!(%error, "wall clock sync failed to save target");
            }
        }
    }
}

/// Applies button transitions published by the relay link.
pub async fn dispatch_buttons<L, S>(
    controller: &ClockController<L, S>,
    events: EventReceiver<'_>,
    hook: &ShutdownHook,
) -> !
where
    L: RelayOutput,
    S: ConfigStore,
{
    loop {
        let event = events.receive().await;
        match controller.handle_pin_event(event).await {
            ButtonOutcome::Unbound(event) => {
                trace!(pin = event.pin, edge = ?event.edge, "no action bound");
            }
            ButtonOutcome::IgnoredInRealTime(action) => {
                info!(%action, "ignored while following the wall clock");
            }
            ButtonOutcome::Stepped {
                action,
                target,
                result,
            } => match result {
                Ok(retarget) => info!(%action, %target, ?retarget, "manual step"),
                Err(error) => warn!(%action, %target, %error, "manual step rejected"),
            },
            ButtonOutcome::ModeToggled(Ok(enabled)) => info!(use_real_time = enabled, "mode toggled"),
            ButtonOutcome::ModeToggled(Err(error)) => error!(%error, "failed to save mode"),
            ButtonOutcome::ShutdownCounted { presses } => {
                info!(presses, required = SHUTDOWN_PRESSES, "shutdown button pressed");
            }
            ButtonOutcome::ShutdownBlocked { pending } => {
                info!(pending, "shutdown button ignored while pulses are pending");
            }
            ButtonOutcome::ShutdownRequested(Ok(())) => {
                warn!("relays released, shutting down");
                if let Err(error) = hook.run().await {
                    error!(%error, "shutdown command failed");
                }
            }
            ButtonOutcome::ShutdownRequested(Err(error)) => {
                error!(%error, "relay-off sequence failed, shutdown withheld");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_folds_onto_the_face() {
        assert_eq!(face_time(0, 0), ClockTime::TWELVE);
        assert_eq!(face_time(12, 30), ClockTime::new(12, 30).unwrap());
        assert_eq!(face_time(13, 5), ClockTime::new(1, 5).unwrap());
        assert_eq!(face_time(23, 59), ClockTime::new(11, 59).unwrap());
    }
}
