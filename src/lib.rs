//! Library entrypoint for graal-native-lib.
//!
//! Provisioning (`provision`) and building (`artifact`) are deliberately
//! separate entry points; the `graal-native-lib` binary exposes them as
//! the `provision` and `build` subcommands.

pub mod archive;
pub mod artifact;
pub mod config;
pub mod error;
pub mod output;
pub mod platform;
pub mod process;
pub mod provision;
pub mod toolchain;

pub use error::{Result, ToolchainError};
