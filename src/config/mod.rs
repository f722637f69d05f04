//! Configuration management for the asset ledger.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - A TOML rules file for the classification sets (lowest priority)

mod rules;
mod settings;

pub use rules::{normalize_extension, FilterRules};
pub use settings::{Config, UnattendedPolicy};
