//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/planloom/config.toml)
//! 3. Project config (.planloom/config.toml)
//! 4. Environment variables (PLANLOOM_*)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
