//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the application service
//! against recording mock ports.  All tests run on the host (x86_64) with
//! no real hardware required.

mod cycle_tests;
mod degradation_tests;
mod mock_ports;
