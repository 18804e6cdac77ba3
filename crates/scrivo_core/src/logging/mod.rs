//! Logging infrastructure.
//!
//! Two layers:
//! - process-wide diagnostics through the `tracing` ecosystem
//! - an explicitly constructed per-job `JobLogger` (file + optional
//!   callback sink) that the orchestrator injects into every stage
//!
//! # Example
//!
//! ```no_run
//! use scrivo_core::logging::{JobLogger, LogConfig};
//!
//! let logger = JobLogger::new("26-0830-101500_talk", "./logs", LogConfig::default(), None).unwrap();
//! logger.phase("transcribe");
//! logger.info("Turn 1: parsed 12 segments");
//! logger.success("Stage completed");
//! ```

mod job_logger;
mod types;

pub use job_logger::{sanitize_filename, JobLogger};
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize a global tracing subscriber for application-wide logging.
///
/// Respects `RUST_LOG`, falling back to the provided default level.
/// Should be called once at application startup.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_str(default_level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

fn level_to_filter_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}
