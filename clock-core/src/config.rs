//! Persisted clock state and the store contract.
//!
//! The controller never touches disk itself. It is handed a [`ConfigStore`]
//! whose mutators resolve only after the new value is durable, so the
//! in-memory view and stable storage cannot drift apart. A failed write is
//! returned to the caller of the mutating operation.

use core::fmt;
use core::time::Duration;

use crate::scheduler::RelayPhase;
use crate::time::ClockTime;

/// Shortest accepted pulse period.
pub const MIN_PULSE_INTERVAL_MS: u32 = 50;
/// Pulse period used when nothing is configured.
pub const DEFAULT_PULSE_INTERVAL_MS: u32 = 1_000;

/// Period between pulse drains, never shorter than [`MIN_PULSE_INTERVAL_MS`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PulseInterval(u32);

impl PulseInterval {
    pub const DEFAULT: Self = Self(DEFAULT_PULSE_INTERVAL_MS);

    pub const fn from_millis(millis: u32) -> Result<Self, IntervalTooShort> {
        if millis < MIN_PULSE_INTERVAL_MS {
            Err(IntervalTooShort(millis))
        } else {
            Ok(Self(millis))
        }
    }

    #[must_use]
    pub const fn as_millis(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_millis(self.0 as u64)
    }
}

impl Default for PulseInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Rejected pulse period, in milliseconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IntervalTooShort(pub u32);

impl fmt::Display for IntervalTooShort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interval {}ms is below the {MIN_PULSE_INTERVAL_MS}ms minimum",
            self.0
        )
    }
}

/// Snapshot of everything that survives a restart.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ClockConfig {
    pub interval: PulseInterval,
    /// Last accepted target time.
    pub last_time: ClockTime,
    pub use_real_time: bool,
    /// Relay phase after the last issued pulse.
    pub last_relay_state: RelayPhase,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            interval: PulseInterval::DEFAULT,
            last_time: ClockTime::TWELVE,
            use_real_time: true,
            last_relay_state: RelayPhase::Off,
        }
    }
}

/// Durable home of the [`ClockConfig`].
///
/// Every setter completes its write before resolving; implementations update
/// their cached snapshot only after the write succeeded.
#[allow(async_fn_in_trait)]
pub trait ConfigStore {
    type Error: fmt::Debug + fmt::Display;

    /// Current committed snapshot.
    async fn snapshot(&self) -> ClockConfig;

    async fn set_last_time(&self, time: ClockTime) -> Result<(), Self::Error>;

    async fn set_relay_phase(&self, phase: RelayPhase) -> Result<(), Self::Error>;

    async fn set_use_real_time(&self, enabled: bool) -> Result<(), Self::Error>;

    async fn set_interval(&self, interval: PulseInterval) -> Result<(), Self::Error>;

    /// Convenience accessor for the mode flag.
    async fn use_real_time(&self) -> bool {
        self.snapshot().await.use_real_time
    }
}

impl<T> ConfigStore for &T
where
    T: ConfigStore + ?Sized,
{
    type Error = T::Error;

    async fn snapshot(&self) -> ClockConfig {
        (**self).snapshot().await
    }

    async fn set_last_time(&self, time: ClockTime) -> Result<(), Self::Error> {
        (**self).set_last_time(time).await
    }

    async fn set_relay_phase(&self, phase: RelayPhase) -> Result<(), Self::Error> {
        (**self).set_relay_phase(phase).await
    }

    async fn set_use_real_time(&self, enabled: bool) -> Result<(), Self::Error> {
        (**self).set_use_real_time(enabled).await
    }

    async fn set_interval(&self, interval: PulseInterval) -> Result<(), Self::Error> {
        (**self).set_interval(interval).await
    }
}
