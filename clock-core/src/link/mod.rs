//! Relay link contract shared by the daemon and tests.
//!
//! The physical link to the pin controller is unreliable: it drops, it comes
//! back, and commands issued while it is down are lost. The core therefore
//! treats every relay command as advisory and only ever asks the link two
//! things: what state it is in, and to send a command now. Connection
//! lifetimes are numbered ([`LinkSession`]) so observers can tell a reconnect
//! apart from an uninterrupted connection.

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::pins::{PinCommand, PinEdge, PinId};

pub mod status;

pub use status::{StatusError, StatusVocabulary, parse_status};

/// Fixed delay between a lost connection and the next connect attempt.
pub const RECONNECT_DELAY_MS: u64 = 1_000;

/// Sequence number of one successful connection (first connection is 1).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LinkSession(pub u32);

/// Connection state as seen by link consumers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkState {
    Disconnected,
    Connected(LinkSession),
}

impl LinkState {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, LinkState::Connected(_))
    }

    #[must_use]
    pub const fn session(self) -> Option<LinkSession> {
        match self {
            LinkState::Connected(session) => Some(session),
            LinkState::Disconnected => None,
        }
    }
}

/// Input transition reported by the pin controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PinEvent {
    pub pin: PinId,
    pub edge: PinEdge,
}

impl PinEvent {
    #[must_use]
    pub const fn new(pin: PinId, edge: PinEdge) -> Self {
        Self { pin, edge }
    }
}

/// Outbound half of the relay link.
pub trait RelayOutput {
    /// Current connection state.
    fn state(&self) -> LinkState;

    /// Fire-and-forget send. Dropped silently while disconnected.
    fn send(&self, command: PinCommand);

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    fn send_on(&self, pin: PinId) {
        self.send(PinCommand::on(pin));
    }

    fn send_off(&self, pin: PinId) {
        self.send(PinCommand::off(pin));
    }
}

impl<T> RelayOutput for &T
where
    T: RelayOutput + ?Sized,
{
    fn state(&self) -> LinkState {
        (**self).state()
    }

    fn send(&self, command: PinCommand) {
        (**self).send(command);
    }
}

/// Connection bookkeeping owned by a link supervisor.
///
/// The supervisor calls [`attach`](Self::attach) after every successful
/// handshake and [`detach`](Self::detach) when the connection is lost; readers
/// on any task observe the result through [`state`](Self::state).
#[derive(Debug, Default)]
pub struct SessionTracker {
    connected: AtomicBool,
    sessions: AtomicU32,
}

impl SessionTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            sessions: AtomicU32::new(0),
        }
    }

    /// Marks the link connected and opens a new session.
    pub fn attach(&self) -> LinkSession {
        let session = LinkSession(self.sessions.fetch_add(1, Ordering::AcqRel).wrapping_add(1));
        self.connected.store(true, Ordering::Release);
        session
    }

    /// Marks the link disconnected, returning the session that ended.
    pub fn detach(&self) -> Option<LinkSession> {
        self.connected
            .swap(false, Ordering::AcqRel)
            .then(|| LinkSession(self.sessions.load(Ordering::Acquire)))
    }

    pub fn state(&self) -> LinkState {
        if self.connected.load(Ordering::Acquire) {
            LinkState::Connected(LinkSession(self.sessions.load(Ordering::Acquire)))
        } else {
            LinkState::Disconnected
        }
    }
}
