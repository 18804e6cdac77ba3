//! Budget planner: maps token estimates and model limits to a chunking
//! strategy.
//!
//! This is the single place that decides whether transcription runs in one
//! request, as resumable logical chunks against a cached upload, or would
//! require physically splitting the audio. It is pure arithmetic with no
//! I/O, so every branch is unit-testable.

use serde::{Deserialize, Serialize};

/// Fraction of the input context window considered safe to fill.
pub const INPUT_SAFETY: f64 = 0.9;
/// Fraction of the output window considered safe to fill.
pub const OUTPUT_SAFETY: f64 = 0.9;
/// Conservative estimate of audio input tokens per second.
pub const INPUT_TOKENS_PER_SECOND: f64 = 10.0;
/// Conservative estimate of transcript output tokens per second of dense
/// speech.
pub const OUTPUT_TOKENS_PER_SECOND: f64 = 15.0;
/// Overlap between physical chunks, to avoid losing boundary speech.
pub const SPLIT_OVERLAP_SECONDS: u32 = 60;

/// Chunking method selected by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMethod {
    /// Source fits in one request/response pair.
    #[default]
    None,
    /// One cached upload, transcribed in logical time ranges.
    Caching,
    /// Source exceeds the input window and would need re-encoded chunk
    /// files. Deprecated: the planner still reports it, but downstream
    /// stages reject it.
    PhysicalSplit,
}

/// A logical time range transcribed against a single cached source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalChunk {
    pub id: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    /// `HH:MM:SS.mmm` forms for prompt text and logs.
    pub start_time: String,
    pub end_time: String,
}

/// Parameters for the deprecated physical-split method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitParams {
    pub chunk_duration_seconds: u32,
    pub overlap_seconds: u32,
    pub estimated_chunks: u32,
}

/// The planner's decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub needs_chunking: bool,
    /// Which comparison decided, for logs and the stage report.
    pub reason: String,
    pub method: ChunkMethod,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logical_chunks: Vec<LogicalChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitParams>,
}

/// Decide how to chunk a transcription request.
///
/// Checks the input window first (a source that cannot fit in context must
/// be physically split), then the output window (a transcript the model
/// cannot emit in one response is chunked logically against a cached
/// upload), and otherwise plans a single request.
pub fn plan_chunking(
    estimated_input_tokens: u64,
    input_limit: u64,
    output_limit: u64,
    duration_seconds: f64,
) -> ChunkPlan {
    let input_safe = input_limit as f64 * INPUT_SAFETY;

    if estimated_input_tokens as f64 > input_safe {
        let target_tokens = input_safe * 0.5;
        let chunk_duration = (target_tokens / INPUT_TOKENS_PER_SECOND) as u32;
        let estimated_chunks = (estimated_input_tokens as f64 / target_tokens).ceil() as u32;

        return ChunkPlan {
            needs_chunking: true,
            reason: format!(
                "input tokens {} exceed safe input limit {:.0}",
                estimated_input_tokens, input_safe
            ),
            method: ChunkMethod::PhysicalSplit,
            logical_chunks: Vec::new(),
            split: Some(SplitParams {
                chunk_duration_seconds: chunk_duration,
                overlap_seconds: SPLIT_OVERLAP_SECONDS,
                estimated_chunks,
            }),
        };
    }

    let estimated_output_tokens = duration_seconds * OUTPUT_TOKENS_PER_SECOND;
    let output_safe = output_limit as f64 * OUTPUT_SAFETY;

    if estimated_output_tokens > output_safe {
        let max_duration = output_safe / OUTPUT_TOKENS_PER_SECOND;
        // An absurdly small output window floors to zero; clamp so chunks
        // always advance.
        let chunk_duration = (max_duration * 0.9).floor().max(1.0);

        return ChunkPlan {
            needs_chunking: true,
            reason: format!(
                "estimated output {:.0} exceeds safe output limit {:.0}",
                estimated_output_tokens, output_safe
            ),
            method: ChunkMethod::Caching,
            logical_chunks: build_logical_chunks(duration_seconds, chunk_duration),
            split: None,
        };
    }

    ChunkPlan {
        needs_chunking: false,
        reason: format!(
            "fits within limits: input {}/{:.0}, output {:.0}/{:.0}",
            estimated_input_tokens, input_safe, estimated_output_tokens, output_safe
        ),
        method: ChunkMethod::None,
        logical_chunks: Vec::new(),
        split: None,
    }
}

/// Divide `duration_seconds` into chunks of `chunk_duration` seconds,
/// truncating the last chunk to the true duration. A sub-second tail is
/// absorbed into the previous chunk rather than emitted on its own.
fn build_logical_chunks(duration_seconds: f64, chunk_duration: f64) -> Vec<LogicalChunk> {
    let mut chunks = Vec::new();
    let mut current = 0.0;
    let mut index = 1;

    while current < duration_seconds {
        let start = current;
        let end = (start + chunk_duration).min(duration_seconds);

        chunks.push(LogicalChunk {
            id: format!("chunk_{:03}", index),
            start_seconds: start,
            end_seconds: end,
            start_time: format_timestamp(start),
            end_time: format_timestamp(end),
        });

        current = end;
        index += 1;

        if current >= duration_seconds - 1.0 {
            break;
        }
    }

    chunks
}

/// Format seconds as `HH:MM:SS.mmm`.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0);
    let hours = (total / 3600.0) as u64;
    let minutes = ((total % 3600.0) / 60.0) as u64;
    let secs = total % 60.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, secs)
}
