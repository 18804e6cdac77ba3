//! Config manager for loading and saving settings.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Creates a commented default file on first run
//! - Missing keys fall back to defaults on load

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::settings::Settings;

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages application configuration.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Current settings loaded in memory.
    settings: Settings,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a mutable reference to the current settings.
    ///
    /// Note: Changes made here are only in memory until `save()` is called.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load config from file.
    ///
    /// Returns error if file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        Ok(())
    }

    /// Load config from file, creating with defaults if it doesn't exist.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            self.load()
        } else {
            self.settings = Settings::default();
            self.save()
        }
    }

    /// Ensure all configured directories exist.
    ///
    /// Creates the work, results, and logs directories if they don't exist.
    /// Should be called after `load_or_create()`.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let dirs = [
            &self.settings.paths.work_dir,
            &self.settings.paths.results_dir,
            &self.settings.paths.logs_dir,
        ];

        for dir in dirs {
            let path = PathBuf::from(dir);
            if !path.exists() {
                fs::create_dir_all(&path)?;
            }
        }

        Ok(())
    }

    /// Get the logs folder path.
    pub fn logs_dir(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.logs_dir)
    }

    /// Save the entire config atomically.
    ///
    /// Writes to a temp file first, then renames to ensure atomic write.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Generate config content with section comments.
    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();

        output.push_str("# Scrivo configuration\n");
        output.push_str("# This file is auto-generated on first run; edit freely.\n\n");

        let sections: [(&str, &str, String); 6] = [
            (
                "paths",
                "Work, results, and log directories",
                toml::to_string_pretty(&self.settings.paths)?,
            ),
            (
                "logging",
                "Job log verbosity and formatting",
                toml::to_string_pretty(&self.settings.logging)?,
            ),
            (
                "transcribe",
                "Transcription model and streaming-loop bounds",
                toml::to_string_pretty(&self.settings.transcribe)?,
            ),
            (
                "refine",
                "Refinement model and target language",
                toml::to_string_pretty(&self.settings.refine)?,
            ),
            (
                "organize",
                "Routing of finalized jobs",
                toml::to_string_pretty(&self.settings.organize)?,
            ),
            (
                "cleanup",
                "Retention policy for stale work-area jobs",
                toml::to_string_pretty(&self.settings.cleanup)?,
            ),
        ];

        for (name, comment, body) in sections {
            output.push_str(&format!("# {comment}\n[{name}]\n"));
            output.push_str(&body);
            output.push('\n');
        }

        Ok(output)
    }

    /// Write content to config file atomically.
    ///
    /// Writes to a temp file first, then renames.
    fn atomic_write(&self, content: &str) -> io::Result<()> {
        // Create parent directory if needed
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to temp file in same directory (for atomic rename)
        let temp_path = self.config_path.with_extension("toml.tmp");

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        // Atomic rename
        fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}
