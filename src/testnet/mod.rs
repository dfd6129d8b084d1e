//! Test fixtures
//!
//! Funded genesis blocks, easy consensus parameters and an in-memory
//! snapshot store, so unit tests can mine real blocks in milliseconds.

pub mod test_utils;

pub use test_utils::*;
