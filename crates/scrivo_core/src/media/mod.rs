//! Media probing and audio transcoding via external ffmpeg tools.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use crate::models::MediaMeta;

/// Errors from ffprobe/ffmpeg invocations.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to run {tool}: {message}")]
    Launch { tool: String, message: String },

    #[error("{tool} exited with code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    #[error("Unparseable {tool} output: {message}")]
    BadOutput { tool: String, message: String },
}

pub type MediaResult<T> = Result<T, MediaError>;

/// Probe a media file for duration, container format, bitrate, and size.
///
/// Uses `ffprobe -show_entries format=... -of json`.
pub fn probe(path: &Path) -> MediaResult<MediaMeta> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    tracing::debug!("Probing media: {}", path.display());

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration,format_name,bit_rate,size",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| MediaError::Launch {
            tool: "ffprobe".to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(MediaError::CommandFailed {
            tool: "ffprobe".to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            message: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let json: Value =
        serde_json::from_slice(&output.stdout).map_err(|e| MediaError::BadOutput {
            tool: "ffprobe".to_string(),
            message: e.to_string(),
        })?;

    parse_probe_json(&json)
}

/// Parse the `format` section of ffprobe JSON output.
fn parse_probe_json(json: &Value) -> MediaResult<MediaMeta> {
    let format = json.get("format").ok_or_else(|| MediaError::BadOutput {
        tool: "ffprobe".to_string(),
        message: "missing format section".to_string(),
    })?;

    // ffprobe emits numbers as strings in the format section.
    let duration_seconds = format
        .get("duration")
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok());

    let format_name = format
        .get("format_name")
        .and_then(|f| f.as_str())
        .map(|s| s.to_string());

    let bitrate = format
        .get("bit_rate")
        .and_then(|b| b.as_str())
        .and_then(|s| s.parse::<u64>().ok());

    let file_size_bytes = format
        .get("size")
        .and_then(|s| s.as_str())
        .and_then(|s| s.parse::<u64>().ok());

    Ok(MediaMeta {
        duration_seconds,
        format: format_name,
        bitrate,
        file_size_bytes,
        language: None,
    })
}

/// Extensions treated as video containers, which always get the audio
/// track extracted and re-encoded.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm"];

/// Whether the file needs transcoding before upload.
///
/// Video containers always do; audio files are passed through as-is.
pub fn needs_transcode(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            VIDEO_EXTENSIONS.iter().any(|v| *v == e)
        })
        .unwrap_or(false)
}

/// Transcode to mono 16 kHz Opus in an OGG container.
///
/// The fixed low-bitrate voip profile keeps upload sizes small without
/// hurting speech recognition quality.
pub fn transcode_to_ogg(input: &Path, output: &Path) -> MediaResult<()> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    tracing::debug!(
        "Transcoding {} -> {}",
        input.display(),
        output.display()
    );

    let result = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-i"])
        .arg(input)
        .args([
            "-vn",
            "-map_metadata",
            "-1",
            "-ac",
            "1",
            "-ar",
            "16000",
            "-c:a",
            "libopus",
            "-b:a",
            "24k",
            "-application",
            "voip",
        ])
        .arg(output)
        .output()
        .map_err(|e| MediaError::Launch {
            tool: "ffmpeg".to_string(),
            message: e.to_string(),
        })?;

    if !result.status.success() {
        return Err(MediaError::CommandFailed {
            tool: "ffmpeg".to_string(),
            exit_code: result.status.code().unwrap_or(-1),
            message: String::from_utf8_lossy(&result.stderr).to_string(),
        });
    }

    Ok(())
}
