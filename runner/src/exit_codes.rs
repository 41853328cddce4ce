//! Stable exit codes for `jacs-run`.
//!
//! The native execution path exits with the VM binary's own code instead.

/// Every case passed, or the command completed.
pub const OK: i32 = 0;
/// `jacs-run test` finished but at least one case failed, timed out or errored.
pub const FAILED: i32 = 1;
/// An error escaped the command (bad config, unreadable file, deploy rejected).
pub const UNCAUGHT: i32 = 2;
