//! Core types, configuration, and error handling for GhostStack.
//!
//! This crate provides the shared foundation used by the other GhostStack crates:
//! - [`GhostError`] — unified error type using `thiserror`
//! - [`GhostConfig`] — configuration loaded from `.ghoststack/config.toml`
//! - Shared types: [`ChangedFile`], [`RiskLevel`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    config_path, state_dir, BrainConfig, EmbeddingConfig, GhostConfig, ReviewConfig, CONFIG_FILE,
    STATE_DIR,
};
pub use error::GhostError;
pub use types::{ChangedFile, OutputFormat, RiskLevel};
