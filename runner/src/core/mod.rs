//! Deterministic, pure logic shared by the harness.
//!
//! Core modules must be free of I/O side effects. They operate on byte slices
//! and return deterministic outputs suitable for tests.

pub mod artifact;
pub mod device_id;
pub mod frame;
pub mod verdict;
