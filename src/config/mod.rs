//! Configuration management module
//!
//! Provides TOML-based configuration, loaded and validated in one pass.

mod config;

pub use config::*;
