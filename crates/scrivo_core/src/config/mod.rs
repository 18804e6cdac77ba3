//! Configuration management.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Missing keys fall back to defaults on load
//!
//! # Example
//!
//! ```no_run
//! use scrivo_core::config::ConfigManager;
//!
//! // Create manager and load (or create default) config
//! let mut config = ConfigManager::new(".config/settings.toml");
//! config.load_or_create().unwrap();
//!
//! // Read settings
//! println!("Work area: {}", config.settings().paths.work_dir);
//!
//! // Modify a setting and save
//! config.settings_mut().logging.compact = false;
//! config.save().unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    CleanupSettings, LoggingSettings, OrganizeSettings, PathSettings, RefineSettings, Settings,
    TranscribeSettings,
};
