//! Test harness for compiled device programs.
//!
//! Programs are compiled (unless they already carry the bytecode signature),
//! verified, deployed into a fresh VM session and judged by the verdict packet
//! they emit, racing a timeout. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (artifact classification, frame
//!   layout, verdict recognition). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, filesystem, child processes).
//!
//! Orchestration modules ([`harness`], [`batch`], [`deploy`], [`empty`],
//! [`logparse`]) coordinate core logic with the [`compiler::Compiler`] and
//! [`session::VmFactory`] seams to implement CLI commands.

pub mod batch;
pub mod compiler;
pub mod core;
pub mod deploy;
pub mod empty;
pub mod error;
pub mod exit_codes;
pub mod harness;
pub mod io;
pub mod logging;
pub mod logparse;
pub mod session;
pub mod settle;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
