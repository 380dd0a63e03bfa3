//! Power meter firmware library.
//!
//! Exposes the pure-logic modules for integration testing and host-side
//! simulation.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod display;
pub mod energy;
pub mod error;
pub mod events;
pub mod fsm;
pub mod pins;
pub mod retry;

// Dual-target modules: real drivers on ESP-IDF, simulation elsewhere.
pub mod adapters;
pub mod drivers;
pub mod sensors;
