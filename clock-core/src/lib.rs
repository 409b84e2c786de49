#![no_std]

// Shared logic for the analog clock relay controller.
//
// This crate stays portable across the host daemon, the emulator and any future
// embedded target by avoiding the Rust standard library. Executors, sockets and
// storage are supplied by the crates that depend on it.

pub mod config;
pub mod controller;
pub mod guard;
pub mod link;
pub mod pins;
pub mod scheduler;
pub mod time;

#[cfg(test)]
mod testing;
