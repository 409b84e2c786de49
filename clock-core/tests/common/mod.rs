#![allow(dead_code)]

use core::cell::{Cell, RefCell};
use core::fmt;

use clock_core::config::{ClockConfig, ConfigStore, PulseInterval};
use clock_core::link::{LinkSession, LinkState, RelayOutput};
use clock_core::pins::PinCommand;
use clock_core::scheduler::RelayPhase;
use clock_core::time::ClockTime;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;

pub fn t(text: &str) -> ClockTime {
    ClockTime::parse(text).expect("valid test time")
}

/// Relay link double that records what it would have sent.
pub struct FakeLink {
    state: Cell<LinkState>,
    sent: RefCell<Vec<PinCommand>>,
}

impl FakeLink {
    pub fn connected() -> Self {
        let link = Self::disconnected();
        link.state.set(LinkState::Connected(LinkSession(1)));
        link
    }

    pub fn disconnected() -> Self {
        Self {
            state: Cell::new(LinkState::Disconnected),
            sent: RefCell::new(Vec::new()),
        }
    }

    pub fn set_state(&self, state: LinkState) {
        self.state.set(state);
    }

    pub fn take_sent(&self) -> Vec<PinCommand> {
        self.sent.take()
    }
}

impl RelayOutput for FakeLink {
    fn state(&self) -> LinkState {
        self.state.get()
    }

    fn send(&self, command: PinCommand) {
        if self.state.get().is_connected() {
            self.sent.borrow_mut().push(command);
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DiskFull;

impl fmt::Display for DiskFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("disk full")
    }
}

/// Store double whose writes can fail, or be held open until
/// [`release`](Self::release) is called.
pub struct TestStore {
    config: Cell<ClockConfig>,
    failing: Cell<bool>,
    gated: Cell<bool>,
    gate: Signal<NoopRawMutex, ()>,
}

impl TestStore {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config: Cell::new(config),
            failing: Cell::new(false),
            gated: Cell::new(false),
            gate: Signal::new(),
        }
    }

    pub fn config(&self) -> ClockConfig {
        self.config.get()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    /// Holds every following target or phase write until released.
    pub fn hold_writes(&self) {
        self.gated.set(true);
    }

    pub fn release(&self) {
        self.gated.set(false);
        self.gate.signal(());
    }

    async fn wait_for_gate(&self) {
        if self.gated.get() {
            self.gate.wait().await;
        }
    }

    fn commit(&self, apply: impl FnOnce(&mut ClockConfig)) -> Result<(), DiskFull> {
        if self.failing.get() {
            return Err(DiskFull);
        }
        let mut config = self.config.get();
        apply(&mut config);
        self.config.set(config);
        Ok(())
    }
}

impl ConfigStore for TestStore {
    type Error = DiskFull;

    async fn snapshot(&self) -> ClockConfig {
        self.config.get()
    }

    async fn set_last_time(&self, time: ClockTime) -> Result<(), Self::Error> {
        self.wait_for_gate().await;
        self.commit(|config| config.last_time = time)
    }

    async fn set_relay_phase(&self, phase: RelayPhase) -> Result<(), Self::Error> {
        self.wait_for_gate().await;
        self.commit(|config| config.last_relay_state = phase)
    }

    async fn set_use_real_time(&self, enabled: bool) -> Result<(), Self::Error> {
        self.commit(|config| config.use_real_time = enabled)
    }

    async fn set_interval(&self, interval: PulseInterval) -> Result<(), Self::Error> {
        self.commit(|config| config.interval = interval)
    }
}

pub fn manual(last_time: &str) -> ClockConfig {
    ClockConfig {
        last_time: t(last_time),
        use_real_time: false,
        ..ClockConfig::default()
    }
}
