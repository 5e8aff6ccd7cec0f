//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the recording mock hardware.  All tests run on the host with
//! no real hardware required.

mod acquisition_tests;
mod client_tests;
mod mock_hw;
mod storage_tests;
