//! # Application Paths
//!
//! Centralized definitions for where promptforge keeps its files.
//! Acts as the single source of truth for config, cache and data locations.

use std::path::PathBuf;

pub const APP_DIR: &str = "promptforge";
pub const CONFIG_FILE: &str = "config.json";
pub const TEMPLATES_DIR: &str = "templates";
pub const CHECKPOINTS_DIR: &str = "checkpoints";
pub const SESSION_LOG: &str = "session.log";

/// Returns the default configuration file path (e.g. `~/.config/promptforge/config.json`)
pub fn config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Returns the user-level template directory (e.g. `~/.config/promptforge/templates`)
pub fn templates_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(TEMPLATES_DIR)
}

/// Returns the cache directory used for provider model listings
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Returns the data directory used for logs and batch checkpoints
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Returns the checkpoint directory for resumable batch runs
pub fn checkpoint_dir() -> PathBuf {
    data_dir().join(CHECKPOINTS_DIR)
}
