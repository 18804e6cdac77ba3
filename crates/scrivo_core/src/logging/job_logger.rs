//! Per-job logger.
//!
//! Each job writes to its own log file and optionally mirrors lines to a
//! callback sink. In compact mode, progress lines are throttled to step
//! boundaries and verbose per-turn output goes to a tail buffer that is
//! replayed only when a stage fails.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-job logger with dual output (file + callback).
pub struct JobLogger {
    job_id: String,
    log_path: PathBuf,
    file_writer: Arc<Mutex<Option<BufWriter<File>>>>,
    callback: Arc<Mutex<Option<LogCallback>>>,
    config: LogConfig,
    /// Recent lines, shown after an error.
    tail_buffer: Arc<Mutex<VecDeque<String>>>,
    last_progress: Arc<Mutex<u32>>,
}

impl JobLogger {
    /// Create a new job logger writing to `log_dir/<job_id>.log`.
    pub fn new(
        job_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let job_id = job_id.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&job_id)));
        let file_writer = BufWriter::new(File::create(&log_path)?);

        Ok(Self {
            job_id,
            log_path,
            file_writer: Arc::new(Mutex::new(Some(file_writer))),
            callback: Arc::new(Mutex::new(callback)),
            config,
            tail_buffer: Arc::new(Mutex::new(VecDeque::with_capacity(100))),
            last_progress: Arc::new(Mutex::new(0)),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        let msg = MessagePrefix::Warning.format(message);
        self.log(LogLevel::Warn, &msg);
    }

    pub fn error(&self, message: &str) {
        let msg = MessagePrefix::Error.format(message);
        self.log(LogLevel::Error, &msg);
    }

    /// Log an external command being executed.
    pub fn command(&self, command: &str) {
        let msg = MessagePrefix::Command.format(command);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a stage/phase marker.
    pub fn phase(&self, phase_name: &str) {
        let msg = MessagePrefix::Phase.format(phase_name);
        self.log(LogLevel::Info, &msg);
    }

    pub fn section(&self, section_name: &str) {
        let msg = MessagePrefix::Section.format(section_name);
        self.log(LogLevel::Info, &msg);
    }

    pub fn success(&self, message: &str) {
        let msg = MessagePrefix::Success.format(message);
        self.log(LogLevel::Info, &msg);
    }

    /// Log progress update (filtered in compact mode).
    ///
    /// Returns true if the progress was logged, false if filtered.
    pub fn progress(&self, percent: u32) -> bool {
        if self.config.compact {
            let mut last = self.last_progress.lock();
            let step = self.config.progress_step;

            let current_step = (percent / step) * step;
            let last_step = (*last / step) * step;

            if current_step <= last_step && percent < 100 {
                return false;
            }
            *last = percent;
        }

        let msg = format!("Progress: {}%", percent);
        self.log(LogLevel::Info, &msg);
        true
    }

    /// Record a line into the tail buffer without emitting it.
    ///
    /// Used for verbose per-turn output that only matters when something
    /// goes wrong.
    pub fn tail_line(&self, line: &str) {
        let mut buffer = self.tail_buffer.lock();
        if buffer.len() >= self.config.error_tail {
            buffer.pop_front();
        }
        buffer.push_back(line.to_string());

        if !self.config.compact {
            drop(buffer);
            self.output(&self.format_message(line));
        }
    }

    /// Show the tail buffer (typically after an error).
    pub fn show_tail(&self, header: &str) {
        let buffer = self.tail_buffer.lock();
        if buffer.is_empty() {
            return;
        }

        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in buffer.iter() {
            self.output(&self.format_message(line));
        }
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }
        if let Some(ref callback) = *self.callback.lock() {
            callback(formatted);
        }
    }
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sanitize a string to be safe for use as a filename.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
