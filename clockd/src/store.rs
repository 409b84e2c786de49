//! JSON file backing for [`ConfigStore`].
//!
//! The whole snapshot is rewritten, pretty-printed, on every change. The
//! in-memory copy is only replaced after the file write returned, and the lock
//! is held across the write so two setters cannot interleave their files.

use std::io;
use std::path::{Path, PathBuf};

use clock_core::config::{ClockConfig, ConfigStore, IntervalTooShort, PulseInterval};
use clock_core::scheduler::RelayPhase;
use clock_core::time::{ClockTime, TimeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid lastTime {value:?}: {reason}")]
    InvalidTime { value: String, reason: TimeError },
    #[error("invalid intervalTime: {0}")]
    InvalidInterval(IntervalTooShort),
}

/// On-disk shape of the snapshot. Missing keys fall back to the defaults.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredConfig {
    pub interval_time: u32,
    pub last_time: String,
    pub use_real_time: bool,
    pub last_relay_state: bool,
}

impl Default for StoredConfig {
    fn default() -> Self {
        Self::from(ClockConfig::default())
    }
}

impl From<ClockConfig> for StoredConfig {
    fn from(config: ClockConfig) -> Self {
        Self {
            interval_time: config.interval.as_millis(),
            last_time: config.last_time.to_hhmm().as_str().to_owned(),
            use_real_time: config.use_real_time,
            last_relay_state: config.last_relay_state.is_on(),
        }
    }
}

impl TryFrom<StoredConfig> for ClockConfig {
    type Error = StoreError;

    fn try_from(stored: StoredConfig) -> Result<Self, Self::Error> {
        let last_time = ClockTime::parse_normalized(&stored.last_time).map_err(|reason| {
            StoreError::InvalidTime {
                value: stored.last_time.clone(),
                reason,
            }
        })?;
        let interval =
            PulseInterval::from_millis(stored.interval_time).map_err(StoreError::InvalidInterval)?;
        Ok(Self {
            interval,
            last_time,
            use_real_time: stored.use_real_time,
            last_relay_state: RelayPhase::from_bool(stored.last_relay_state),
        })
    }
}

/// Config store persisted as a single JSON document.
#[derive(Debug)]
pub struct JsonConfigStore {
    path: PathBuf,
    state: Mutex<ClockConfig>,
}

impl JsonConfigStore {
    /// Loads `path`, creating it (and its parent directories) with defaults
    /// when it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let config = match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let stored: StoredConfig =
                    serde_json::from_str(&text).map_err(|source| StoreError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                ClockConfig::try_from(stored)?
            }
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, creating defaults");
                if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|source| StoreError::Write {
                            path: parent.to_path_buf(),
                            source,
                        })?;
                }
                let config = ClockConfig::default();
                write_config(&path, &config).await?;
                config
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        info!(
            path = %path.display(),
            interval_ms = config.interval.as_millis(),
            last_time = %config.last_time,
            use_real_time = config.use_real_time,
            relay_phase = %config.last_relay_state,
            "config loaded"
        );
        Ok(Self {
            path,
            state: Mutex::new(config),
        })
    }

    async fn update(&self, apply: impl FnOnce(&mut ClockConfig)) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut next = *state;
        apply(&mut next);
        write_config(&self.path, &next).await?;
        *state = next;
        Ok(())
    }
}

impl ConfigStore for JsonConfigStore {
    type Error = StoreError;

    async fn snapshot(&self) -> ClockConfig {
        *self.state.lock().await
    }

    async fn set_last_time(&self, time: ClockTime) -> Result<(), Self::Error> {
        self.update(|config| config.last_time = time).await
    }

    async fn set_relay_phase(&self, phase: RelayPhase) -> Result<(), Self::Error> {
        self.update(|config| config.last_relay_state = phase).await
    }

    async fn set_use_real_time(&self, enabled: bool) -> Result<(), Self::Error> {
        self.update(|config| config.use_real_time = enabled).await
    }

    async fn set_interval(&self, interval: PulseInterval) -> Result<(), Self::Error> {
        self.update(|config| config.interval = interval).await
    }
}

async fn write_config(path: &Path, config: &ClockConfig) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(&StoredConfig::from(*config))?;
    tokio::fs::write(path, text)
        .await
        .map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_shape_uses_camel_case_keys() {
        let json = serde_json::to_value(StoredConfig::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "intervalTime": 1000,
                "lastTime": "12:00",
                "useRealTime": true,
                "lastRelayState": false,
            })
        );
    }

    #[test]
    fn legacy_midnight_is_folded_onto_twelve() {
        let stored: StoredConfig = serde_json::from_str(
            r#"{"intervalTime": 500, "lastTime": "00:00", "useRealTime": false, "lastRelayState": true}"#,
        )
        .unwrap();
        let config = ClockConfig::try_from(stored).unwrap();
        assert_eq!(config.last_time, ClockTime::TWELVE);
        assert_eq!(config.interval.as_millis(), 500);
        assert_eq!(config.last_relay_state, RelayPhase::On);
        assert!(!config.use_real_time);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let stored: StoredConfig = serde_json::from_str(r#"{"lastTime": "3:15"}"#).unwrap();
        let config = ClockConfig::try_from(stored).unwrap();
        assert_eq!(config.last_time, ClockTime::new(3, 15).unwrap());
        assert_eq!(config.interval, PulseInterval::DEFAULT);
    }

    #[test]
    fn rejects_unusable_values() {
        let bad_time = StoredConfig {
            last_time: "25:00".into(),
            ..StoredConfig::default()
        };
        assert!(matches!(
            ClockConfig::try_from(bad_time),
            Err(StoreError::InvalidTime { .. })
        ));

        let bad_interval = StoredConfig {
            interval_time: 10,
            ..StoredConfig::default()
        };
        assert!(matches!(
            ClockConfig::try_from(bad_interval),
            Err(StoreError::InvalidInterval(IntervalTooShort(10)))
        ));
    }
}
