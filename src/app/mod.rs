//! Application core — pure domain logic, zero I/O.
//!
//! This module contains the business rules for the meter: FSM
//! orchestration, sample sealing and the admin read surface.  All
//! interaction with hardware and the network happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
