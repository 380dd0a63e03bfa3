//! Sensor subsystem.
//!
//! The meter has a single sensor: a photodiode on the utility meter's
//! pulse LED, counted by [`pulse::PulseAccumulator`].

pub mod pulse;
