//! I/O adapters: config, artifacts, the compiler and VM processes.

pub mod artifact_store;
pub mod config;
pub mod host;
pub mod native;
pub mod process;
pub mod process_compiler;
pub mod process_vm;
