//! In-memory link and store doubles for unit tests.

use core::cell::{Cell, RefCell};
use core::fmt;

use heapless::Vec;

use crate::config::{ClockConfig, ConfigStore, PulseInterval};
use crate::link::{LinkSession, LinkState, RelayOutput};
use crate::pins::PinCommand;
use crate::scheduler::RelayPhase;
use crate::time::ClockTime;

pub const SENT_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct RecordingLink {
    state: Cell<LinkState>,
    sent: RefCell<Vec<PinCommand, SENT_CAPACITY>>,
}

impl RecordingLink {
    pub fn connected() -> Self {
        Self {
            state: Cell::new(LinkState::Connected(LinkSession(1))),
            sent: RefCell::new(Vec::new()),
        }
    }

    pub fn set_state(&self, state: LinkState) {
        self.state.set(state);
    }

    pub fn sent(&self) -> Vec<PinCommand, SENT_CAPACITY> {
        self.sent.borrow().clone()
    }
}

impl RelayOutput for RecordingLink {
    fn state(&self) -> LinkState {
        self.state.get()
    }

    fn send(&self, command: PinCommand) {
        if self.state.get().is_connected() {
            self.sent.borrow_mut().push(command).expect("recording capacity");
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WriteRejected;

impl fmt::Display for WriteRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("write rejected")
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    config: Cell<ClockConfig>,
    fail: Cell<bool>,
}

impl MemoryStore {
    pub fn with_config(config: ClockConfig) -> Self {
        Self {
            config: Cell::new(config),
            fail: Cell::new(false),
        }
    }

    pub fn config(&self) -> ClockConfig {
        self.config.get()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.set(fail);
    }

    fn update(&self, apply: impl FnOnce(&mut ClockConfig)) -> Result<(), WriteRejected> {
        if self.fail.get() {
            return Err(WriteRejected);
        }
        let mut config = self.config.get();
        apply(&mut config);
        self.config.set(config);
        Ok(())
    }
}

impl ConfigStore for MemoryStore {
    type Error = WriteRejected;

    async fn snapshot(&self) -> ClockConfig {
        self.config.get()
    }

    async fn set_last_time(&self, time: ClockTime) -> Result<(), Self::Error> {
        self.update(|config| config.last_time = time)
    }

    async fn set_relay_phase(&self, phase: RelayPhase) -> Result<(), Self::Error> {
        self.update(|config| config.last_relay_state = phase)
    }

    async fn set_use_real_time(&self, enabled: bool) -> Result<(), Self::Error> {
        self.update(|config| config.use_real_time = enabled)
    }

    async fn set_interval(&self, interval: PulseInterval) -> Result<(), Self::Error> {
        self.update(|config| config.interval = interval)
    }
}
