//! Platform-specific helpers.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here.

pub mod paths;

pub use paths::command_exists;
