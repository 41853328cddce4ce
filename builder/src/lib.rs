//! Build steps for the compiler bundle.
//!
//! - **[`prelude`]**: embeds the template library into a generated TypeScript
//!   module, rewriting it only when its content changes.
//! - **[`pipeline`]**: prelude, bundle steps, then the type-check.
//! - **[`config`]**: `build.toml`.

pub mod config;
pub mod pipeline;
pub mod prelude;
