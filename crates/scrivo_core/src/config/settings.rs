//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! A [`Settings`] snapshot converts into the immutable [`JobConfig`] that
//! every job carries from creation.

use serde::{Deserialize, Serialize};

use crate::logging::{LogConfig, LogLevel};
use crate::models::{ContextWindow, JobConfig, ModelChoice, RetryPolicy, RoutingStrategy, StageStatus};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Transcription model and loop bounds.
    #[serde(default)]
    pub transcribe: TranscribeSettings,

    /// Refinement model settings.
    #[serde(default)]
    pub refine: RefineSettings,

    /// Result routing settings.
    #[serde(default)]
    pub organize: OrganizeSettings,

    /// Retention policy for stale work-area jobs.
    #[serde(default)]
    pub cleanup: CleanupSettings,
}

/// Path configuration for the work area, results, and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Work area where active jobs live.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Results area finalized jobs are moved into.
    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    /// Folder for per-job log files.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
}

fn default_work_dir() -> String {
    "work".to_string()
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_logs_dir() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            results_dir: default_results_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level written to the job log: trace, debug, info, warn, error.
    #[serde(default = "default_level")]
    pub level: String,

    /// Use compact log format.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Number of stderr lines kept when an external command fails.
    #[serde(default = "default_error_tail")]
    pub error_tail: usize,

    /// Prefix log lines with timestamps.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_progress_step() -> u32 {
    20
}

fn default_error_tail() -> usize {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            compact: default_true(),
            progress_step: default_progress_step(),
            error_tail: default_error_tail(),
            show_timestamps: default_true(),
        }
    }
}

impl LoggingSettings {
    /// Build the logger configuration, falling back to info on an
    /// unrecognized level string.
    pub fn to_log_config(&self) -> LogConfig {
        let level = match self.level.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        };
        LogConfig {
            level,
            compact: self.compact,
            progress_step: self.progress_step,
            error_tail: self.error_tail,
            show_timestamps: self.show_timestamps,
        }
    }
}

/// Transcription model choice and streaming-loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeSettings {
    /// Provider name as registered with the provider registry.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier passed to the provider.
    #[serde(default = "default_transcribe_model")]
    pub model: String,

    /// Input context window of the model, in tokens.
    #[serde(default = "default_input_tokens")]
    pub input_tokens: u64,

    /// Output budget per request, in tokens.
    #[serde(default = "default_output_tokens")]
    pub output_tokens: u64,

    /// Maximum retries of a single turn on a rate-limit error.
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,

    /// Fixed delay between retries, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,

    /// Hard cap on turn count per transcription session.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Pacing delay between consecutive turns, in seconds.
    #[serde(default)]
    pub turn_pacing_seconds: u64,
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_transcribe_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_input_tokens() -> u64 {
    1_048_576
}

fn default_output_tokens() -> u64 {
    65_536
}

fn default_retry_max() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_max_turns() -> u32 {
    50
}

impl Default for TranscribeSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_transcribe_model(),
            input_tokens: default_input_tokens(),
            output_tokens: default_output_tokens(),
            retry_max: default_retry_max(),
            retry_delay_seconds: default_retry_delay(),
            max_turns: default_max_turns(),
            turn_pacing_seconds: 0,
        }
    }
}

/// Refinement model choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineSettings {
    /// Provider name as registered with the provider registry.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier passed to the provider.
    #[serde(default = "default_refine_model")]
    pub model: String,

    /// Input context window of the model, in tokens.
    #[serde(default = "default_input_tokens")]
    pub input_tokens: u64,

    /// Output budget per request, in tokens.
    #[serde(default = "default_output_tokens")]
    pub output_tokens: u64,

    /// Target language for the analysis, or "auto" to detect.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_refine_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_language() -> String {
    "auto".to_string()
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_refine_model(),
            input_tokens: default_input_tokens(),
            output_tokens: default_output_tokens(),
            language: default_language(),
        }
    }
}

/// Where finalized jobs land inside the results area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeSettings {
    /// Routing strategy: "timeline" (date folders) or "flat" (notes/).
    #[serde(default)]
    pub routing: RoutingStrategy,

    /// Keep media, transcripts, and artifacts after finalizing.
    #[serde(default)]
    pub keep_intermediates: bool,
}

impl Default for OrganizeSettings {
    fn default() -> Self {
        Self {
            routing: RoutingStrategy::Timeline,
            keep_intermediates: false,
        }
    }
}

/// Retention policy applied by the cleanup command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSettings {
    /// Jobs untouched for this many days are eligible for removal.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Only remove jobs where some stage carries this status.
    /// Empty means any job past retention.
    #[serde(default = "default_cleanup_status")]
    pub status: String,
}

fn default_retention_days() -> i64 {
    30
}

fn default_cleanup_status() -> String {
    "failed".to_string()
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            status: default_cleanup_status(),
        }
    }
}

impl CleanupSettings {
    /// Parse the configured status filter. Unknown or empty strings mean
    /// no filter.
    pub fn status_filter(&self) -> Option<StageStatus> {
        match self.status.to_lowercase().as_str() {
            "pending" => Some(StageStatus::Pending),
            "in_progress" => Some(StageStatus::InProgress),
            "completed" => Some(StageStatus::Completed),
            "failed" => Some(StageStatus::Failed),
            "skipped" => Some(StageStatus::Skipped),
            _ => None,
        }
    }
}

impl Settings {
    /// Snapshot the settings into the immutable per-job configuration.
    pub fn to_job_config(&self) -> JobConfig {
        JobConfig {
            language: self.refine.language.clone(),
            transcribe: ModelChoice {
                provider: self.transcribe.provider.clone(),
                model: self.transcribe.model.clone(),
                context_window: ContextWindow {
                    input_tokens: self.transcribe.input_tokens,
                    output_tokens: self.transcribe.output_tokens,
                },
            },
            refine: ModelChoice {
                provider: self.refine.provider.clone(),
                model: self.refine.model.clone(),
                context_window: ContextWindow {
                    input_tokens: self.refine.input_tokens,
                    output_tokens: self.refine.output_tokens,
                },
            },
            retry: RetryPolicy {
                retry_max: self.transcribe.retry_max,
                retry_delay_seconds: self.transcribe.retry_delay_seconds,
                max_turns: self.transcribe.max_turns,
                turn_pacing_seconds: self.transcribe.turn_pacing_seconds,
            },
            routing: self.organize.routing,
            debug: self.organize.keep_intermediates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.paths.work_dir, "work");
        assert_eq!(settings.transcribe.max_turns, 50);
        assert_eq!(settings.refine.language, "auto");
        assert_eq!(settings.cleanup.retention_days, 30);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            "[transcribe]\nmodel = \"custom-model\"\nmax_turns = 10\n",
        )
        .unwrap();
        assert_eq!(settings.transcribe.model, "custom-model");
        assert_eq!(settings.transcribe.max_turns, 10);
        assert_eq!(settings.transcribe.retry_max, 3);
        assert_eq!(settings.refine.model, "gemini-2.5-flash");
    }

    #[test]
    fn job_config_snapshot_carries_model_choices() {
        let mut settings = Settings::default();
        settings.refine.language = "de".to_string();
        settings.organize.routing = RoutingStrategy::Flat;

        let config = settings.to_job_config();
        assert_eq!(config.language, "de");
        assert_eq!(config.transcribe.provider, "gemini");
        assert_eq!(config.transcribe.context_window.input_tokens, 1_048_576);
        assert_eq!(config.routing, RoutingStrategy::Flat);
    }

    #[test]
    fn log_level_string_is_parsed() {
        let mut settings = LoggingSettings::default();
        settings.level = "DEBUG".to_string();
        assert_eq!(settings.to_log_config().level, LogLevel::Debug);

        settings.level = "bogus".to_string();
        assert_eq!(settings.to_log_config().level, LogLevel::Info);
    }

    #[test]
    fn cleanup_status_filter_parses_known_values() {
        let cleanup = CleanupSettings::default();
        assert_eq!(cleanup.status_filter(), Some(StageStatus::Failed));

        let any = CleanupSettings {
            status: String::new(),
            ..CleanupSettings::default()
        };
        assert_eq!(any.status_filter(), None);
    }
}
