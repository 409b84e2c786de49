//! Request queue between the HTTP surface and the controller.
//!
//! HTTP handlers run on the multi-purpose tokio side and never touch the
//! controller directly. They validate their query parameters, push a
//! [`ControlRequest`] through a [`ControlHandle`] and await the one-shot
//! reply. [`serve`] drains the queue next to the other controller tasks.

use clock_core::config::{ClockConfig, ConfigStore, PulseInterval};
use clock_core::controller::{ClockController, Retarget, RetargetError};
use clock_core::link::RelayOutput;
use clock_core::time::ClockTime;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Depth of the control request queue.
pub const CONTROL_QUEUE_DEPTH: usize = 8;

/// Raised when a new pulse period was persisted.
pub type IntervalChanged = Signal<NoopRawMutex, PulseInterval>;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ControlError {
    #[error("No {0} provided")]
    Missing(&'static str),
    #[error("Invalid time format. Use HH:MM in 12h format.")]
    InvalidTime,
    #[error("Invalid interval. Use a whole number of milliseconds, at least 50.")]
    InvalidInterval,
    #[error("Invalid useRealTime format. Use true or false.")]
    InvalidFlag,
    #[error("Cannot set time while using real time")]
    RealTimeActive,
    #[error("Server is currently busy, please try again later.")]
    Busy,
    #[error("Failed to save configuration: {0}")]
    Persist(String),
    #[error("Clock controller is not running")]
    Unavailable,
}

impl<E: std::fmt::Display> From<RetargetError<E>> for ControlError {
    fn from(error: RetargetError<E>) -> Self {
        match error {
            RetargetError::Busy => ControlError::Busy,
            RetargetError::Persist(error) => ControlError::Persist(error.to_string()),
        }
    }
}

/// Parses the `time` query parameter (strict 12-hour `H:MM` / `HH:MM`).
pub fn parse_time(raw: Option<&str>) -> Result<ClockTime, ControlError> {
    let raw = present(raw, "time")?;
    ClockTime::parse(raw).map_err(|_| ControlError::InvalidTime)
}

/// Parses the interval `time` query parameter, in milliseconds.
pub fn parse_interval(raw: Option<&str>) -> Result<PulseInterval, ControlError> {
    let raw = present(raw, "time")?;
    let millis = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| ControlError::InvalidInterval)?;
    PulseInterval::from_millis(millis).map_err(|_| ControlError::InvalidInterval)
}

/// Parses the `useRealTime` query parameter (`true` / `false`).
pub fn parse_flag(raw: Option<&str>) -> Result<bool, ControlError> {
    match present(raw, "useRealTime")? {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ControlError::InvalidFlag),
    }
}

fn present<'a>(raw: Option<&'a str>, name: &'static str) -> Result<&'a str, ControlError> {
    raw.filter(|value| !value.is_empty())
        .ok_or(ControlError::Missing(name))
}

/// Operation requested through the control surface.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlRequest {
    Poll,
    TickToTime(ClockTime),
    OverrideTime(ClockTime),
    SetInterval(PulseInterval),
    SetUseRealTime(bool),
    GetConfig,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlReply {
    Time(ClockTime),
    Retargeted(Retarget),
    Done,
    Config(ClockConfig),
}

#[derive(Debug)]
struct Envelope {
    request: ControlRequest,
    reply: oneshot::Sender<Result<ControlReply, ControlError>>,
}

/// Cloneable producer side of the control queue.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    requests: mpsc::Sender<Envelope>,
}

/// Consumer side of the control queue, drained by [`serve`].
#[derive(Debug)]
pub struct ControlInbox {
    requests: mpsc::Receiver<Envelope>,
}

/// Creates a connected handle/inbox pair.
pub fn channel() -> (ControlHandle, ControlInbox) {
    let (requests, inbox) = mpsc::channel(CONTROL_QUEUE_DEPTH);
    (ControlHandle { requests }, ControlInbox { requests: inbox })
}

impl ControlHandle {
    /// Submits `request` and waits for the controller's answer.
    pub async fn call(&self, request: ControlRequest) -> Result<ControlReply, ControlError> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(Envelope { request, reply })
            .await
            .map_err(|_| ControlError::Unavailable)?;
        answer.await.map_err(|_| ControlError::Unavailable)?
    }

    pub async fn current_time(&self) -> Result<ClockTime, ControlError> {
        match self.call(ControlRequest::Poll).await? {
            ControlReply::Time(time) => Ok(time),
            _ => Err(ControlError::Unavailable),
        }
    }

    pub async fn config(&self) -> Result<ClockConfig, ControlError> {
        match self.call(ControlRequest::GetConfig).await? {
            ControlReply::Config(config) => Ok(config),
            _ => Err(ControlError::Unavailable),
        }
    }
}

/// Answers control requests until every [`ControlHandle`] is dropped.
pub async fn serve<L, S>(
    inbox: &mut ControlInbox,
    controller: &ClockController<L, S>,
    interval_changed: &IntervalChanged,
) where
    L: RelayOutput,
    S: ConfigStore,
{
    while let Some(Envelope { request, reply }) = inbox.requests.recv().await {
        let result = handle(request, controller, interval_changed).await;
        if reply.send(result).is_err() {
            debug!(?request, "control caller went away before the reply");
        }
    }
    debug!("control queue closed");
}

async fn handle<L, S>(
    request: ControlRequest,
    controller: &ClockController<L, S>,
    interval_changed: &IntervalChanged,
) -> Result<ControlReply, ControlError>
where
    L: RelayOutput,
    S: ConfigStore,
{
    match request {
        ControlRequest::Poll => Ok(ControlReply::Time(controller.current_target())),
        ControlRequest::GetConfig => Ok(ControlReply::Config(controller.store().snapshot().await)),
        ControlRequest::TickToTime(target) => {
            if controller.store().use_real_time().await {
                return Err(ControlError::RealTimeActive);
            }
            let retarget = controller
                .tick_to_time(target)
                .await
                .inspect_err(|error| log_retarget_failure("tickToTime", error))?;
            info!(%target, ?retarget, queued = controller.scheduler().queue().len(), "tick to time");
            Ok(ControlReply::Retargeted(retarget))
        }
        ControlRequest::OverrideTime(time) => {
            controller
                .override_time(time)
                .await
                .inspect_err(|error| log_retarget_failure("overrideTime", error))?;
            info!(%time, "target overridden");
            Ok(ControlReply::Done)
        }
        ControlRequest::SetInterval(interval) => {
            controller
                .set_interval(interval)
                .await
                .map_err(|error| persist_failure("setIntervalTime", &error))?;
            info!(interval_ms = interval.as_millis(), "pulse interval changed");
            interval_changed.signal(interval);
            Ok(ControlReply::Done)
        }
        ControlRequest::SetUseRealTime(enabled) => {
            controller
                .set_use_real_time(enabled)
                .await
                .map_err(|error| persist_failure("setUseRealTime", &error))?;
            info!(use_real_time = enabled, "mode changed");
            Ok(ControlReply::Done)
        }
    }
}

fn log_retarget_failure<E: std::fmt::Display>(operation: &str, error: &RetargetError<E>) {
    match error {
        RetargetError::Busy => debug!(operation, "rejected: retarget in progress"),
        RetargetError::Persist(error) => error!(operation, %error, "failed to persist target"),
    }
}

fn persist_failure<E: std::fmt::Display>(operation: &str, error: &E) -> ControlError {
    error!(operation, %error, "failed to persist config");
    ControlError::Persist(error.to_string())
}
