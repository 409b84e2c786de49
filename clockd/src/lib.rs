//! Host daemon for the analog clock relay controller.
//!
//! Wraps the portable `clock-core` state machine with the pieces a Linux host
//! provides: a WebSocket link to the pin controller, a JSON config file, an
//! HTTP control surface, the system clock and an OS shutdown hook.

pub mod control;
pub mod http;
pub mod link;
pub mod runtime;
pub mod settings;
pub mod shutdown;
pub mod store;
