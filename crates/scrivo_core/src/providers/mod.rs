//! Provider capability interface.
//!
//! The core is agnostic to which vendor backs transcription and
//! refinement. Concrete wire clients live outside this crate and plug in
//! through these traits and the static `ProviderRegistry`.

mod registry;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{MediaMeta, Segment, TokenStats};
use crate::planner::ChunkPlan;

pub use registry::{ProviderRegistry, RefinerCtor, TranscriberCtor};

/// Errors surfaced by providers, split into retryable and fatal classes.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Rate-limit or quota exhaustion. The only retryable class.
    #[error("provider resource exhausted: {0}")]
    RateLimited(String),

    /// Authentication or authorization failure.
    #[error("provider authentication failed: {0}")]
    Auth(String),

    /// The request itself was rejected (bad model name, invalid input).
    #[error("provider rejected request: {0}")]
    InvalidRequest(String),

    /// Network or transport-level failure.
    #[error("provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Only rate-limit conditions are worth retrying the same turn.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

/// Result of the ingest stage, handed to providers.
///
/// Also persisted as the ingest stage report, so later stages and resumed
/// runs can reload it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestArtifact {
    /// Path to the media file to transcribe (original or transcoded),
    /// relative to the job directory.
    pub media_path: PathBuf,
    pub media: MediaMeta,
    pub plan: ChunkPlan,
    /// Provider-side cache handle, when the provider uploaded the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,
}

/// One model response within the streaming transcription loop.
#[derive(Debug, Clone, Default)]
pub struct TurnResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Metered charge for this turn in USD; zero when the provider does
    /// not report one.
    pub cost_usd: f64,
}

/// A stateful multi-turn conversation with a generative model.
///
/// The transport owns conversation history; the engine only sends prompts
/// and reads responses.
pub trait TurnTransport {
    fn send_turn(&mut self, prompt: &str) -> Result<TurnResponse, ProviderError>;
}

/// Capability: transcribe media through a turn-based session.
pub trait TranscriptionProvider {
    fn name(&self) -> &str;

    /// Open a conversation with the model over the ingested media.
    fn begin_session(
        &self,
        artifact: &IngestArtifact,
    ) -> Result<Box<dyn TurnTransport>, ProviderError>;
}

/// Input to refinement: either a transcript, or the media itself in
/// direct-analysis mode (when transcription was skipped).
#[derive(Debug, Clone, Copy)]
pub enum RefineInput<'a> {
    Segments(&'a [Segment]),
    Media(&'a IngestArtifact),
}

/// Structured result of a refinement call.
#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    pub value: serde_json::Value,
    pub tokens: TokenStats,
    /// Metered charge for the call in USD; zero when the provider does
    /// not report one.
    pub cost_usd: f64,
}

/// Capability: turn a transcript (or media) into structured analysis.
pub trait RefinementProvider {
    fn name(&self) -> &str;

    fn refine(
        &self,
        input: RefineInput<'_>,
        language: Option<&str>,
        custom_schema: Option<&serde_json::Value>,
    ) -> Result<RefinementOutcome, ProviderError>;
}
