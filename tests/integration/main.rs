//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host (x86_64) with no
//! real hardware required.

mod connectivity_tests;
mod load_panel_tests;
mod mock_ports;
mod netconfig_tests;
mod service_tests;
mod web_tests;
