//! The multi-turn transcription loop.
//!
//! Drives a `TurnTransport` until the model signals completion, a loop is
//! detected, or the safety bound trips. Accumulated segments are
//! checkpointed to disk after every turn so a crash never loses more than
//! the in-flight turn.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::logging::JobLogger;
use crate::models::{JobConfig, Segment, TokenStats};
use crate::providers::{ProviderError, TurnTransport};

use super::parser::{parse_turn, TurnParse};
use super::prompts::{initial_prompt, CONTINUE_PROMPT, RESUME_PROMPT};

/// Tunable parameters for one transcription session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target language, or "auto".
    pub language: String,
    /// Hard cap on turns; exceeding it is a fatal abort.
    pub max_turns: u32,
    /// Retries of the same turn on a rate-limit error.
    pub retry_max: u32,
    /// Delay between rate-limit retries.
    pub retry_delay: Duration,
    /// Pacing delay between consecutive turns.
    pub turn_delay: Duration,
    /// Media length, when probed; drives percentage progress reporting.
    pub media_duration: Option<f64>,
}

impl EngineConfig {
    pub fn from_job_config(config: &JobConfig) -> Self {
        Self {
            language: config.language.clone(),
            max_turns: config.retry.max_turns,
            retry_max: config.retry.retry_max,
            retry_delay: Duration::from_secs(config.retry.retry_delay_seconds),
            turn_delay: Duration::from_secs(config.retry.turn_pacing_seconds),
            media_duration: None,
        }
    }

    pub fn with_media_duration(mut self, duration: Option<f64>) -> Self {
        self.media_duration = duration;
        self
    }
}

/// Why a session ended. All of these are successful completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model emitted the end sentinel.
    EndToken,
    /// A turn produced no segments and no sentinel.
    EmptyTurn,
    /// The model restarted from the beginning; the regressive turn was
    /// discarded.
    LoopDetected,
}

/// Accumulated result of a completed session.
#[derive(Debug)]
pub struct EngineOutcome {
    pub segments: Vec<Segment>,
    pub tokens: TokenStats,
    /// Summed metered charges across all turns, in USD.
    pub cost_usd: f64,
    /// Merged metadata from all turns (speakers, language).
    pub analysis: serde_json::Map<String, Value>,
    pub stop: StopReason,
    pub turns: u32,
}

/// Fatal session failures.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The model never terminated within the turn cap.
    #[error("transcription exceeded the safety bound of {turns} turns without completing")]
    SafetyBound { turns: u32 },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("failed to write checkpoint: {0}")]
    Checkpoint(#[from] io::Error),
}

/// Streaming transcription engine over a single turn transport.
pub struct ScribeEngine<'a> {
    transport: &'a mut dyn TurnTransport,
    config: EngineConfig,
    checkpoint_path: PathBuf,
    logger: &'a JobLogger,
}

impl<'a> ScribeEngine<'a> {
    pub fn new(
        transport: &'a mut dyn TurnTransport,
        config: EngineConfig,
        checkpoint_path: impl Into<PathBuf>,
        logger: &'a JobLogger,
    ) -> Self {
        Self {
            transport,
            config,
            checkpoint_path: checkpoint_path.into(),
            logger,
        }
    }

    /// Run the session to completion.
    pub fn run(mut self) -> Result<EngineOutcome, EngineError> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut tokens = TokenStats::default();
        let mut cost_usd = 0.0;
        let mut analysis = serde_json::Map::new();
        let mut prompt = initial_prompt(&self.config.language);
        let mut turn = 0u32;

        loop {
            if turn >= self.config.max_turns {
                self.logger.error(&format!(
                    "Aborting: {} turns without an end token",
                    self.config.max_turns
                ));
                return Err(EngineError::SafetyBound {
                    turns: self.config.max_turns,
                });
            }
            turn += 1;

            if turn > 1 && !self.config.turn_delay.is_zero() {
                thread::sleep(self.config.turn_delay);
            }

            let response = self.send_with_retry(&prompt)?;
            tokens.add(TokenStats {
                input: response.input_tokens,
                output: response.output_tokens,
            });
            cost_usd += response.cost_usd;
            self.logger.debug(&format!(
                "Turn {} usage: {} in / {} out tokens",
                turn, response.input_tokens, response.output_tokens
            ));
            self.logger.tail_line(&format!("turn {} raw: {:.200}", turn, response.text));

            let parsed = parse_turn(&response.text);
            for (key, value) in parsed.metadata.iter() {
                analysis.insert(key.clone(), value.clone());
            }
            if let Some(language) = parsed.metadata.get("language").and_then(Value::as_str) {
                self.logger.info(&format!("Detected language: {}", language));
            }

            let regression =
                !parsed.end_token && !parsed.truncated && is_regression(&parsed, &segments);
            let new_count = parsed.segments.len();

            if !regression {
                segments.extend(parsed.segments);
            }
            self.write_checkpoint(&segments)?;

            if let (Some(duration), Some(last)) = (self.config.media_duration, segments.last()) {
                if duration > 0.0 {
                    let percent = ((last.end_time / duration) * 100.0).min(100.0) as u32;
                    self.logger.progress(percent);
                }
            }

            self.logger.info(&format!(
                "Turn {}: parsed {} segments (total {}). Truncated: {}, End token: {}",
                turn, new_count, segments.len(), parsed.truncated, parsed.end_token
            ));

            if parsed.end_token {
                return Ok(self.finish(segments, tokens, cost_usd, analysis, StopReason::EndToken, turn));
            }
            if parsed.truncated {
                prompt = RESUME_PROMPT.to_string();
                continue;
            }
            if regression {
                self.logger.warn(&format!(
                    "Turn {} restarted from the beginning; discarding it and stopping",
                    turn
                ));
                return Ok(self.finish(
                    segments,
                    tokens,
                    cost_usd,
                    analysis,
                    StopReason::LoopDetected,
                    turn,
                ));
            }
            if new_count == 0 {
                return Ok(self.finish(segments, tokens, cost_usd, analysis, StopReason::EmptyTurn, turn));
            }
            prompt = CONTINUE_PROMPT.to_string();
        }
    }

    fn finish(
        &self,
        segments: Vec<Segment>,
        tokens: TokenStats,
        cost_usd: f64,
        analysis: serde_json::Map<String, Value>,
        stop: StopReason,
        turns: u32,
    ) -> EngineOutcome {
        self.logger.info(&format!(
            "Session finished after {} turns: {} segments ({:?})",
            turns,
            segments.len(),
            stop
        ));
        EngineOutcome {
            segments,
            tokens,
            cost_usd,
            analysis,
            stop,
            turns,
        }
    }

    /// Send one turn, retrying only on rate-limit errors.
    fn send_with_retry(
        &mut self,
        prompt: &str,
    ) -> Result<crate::providers::TurnResponse, ProviderError> {
        let mut attempt = 0u32;
        loop {
            match self.transport.send_turn(prompt) {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.config.retry_max => {
                    attempt += 1;
                    self.logger.warn(&format!(
                        "Resource exhausted. Retrying in {:?} (attempt {}/{})",
                        self.config.retry_delay, attempt, self.config.retry_max
                    ));
                    if !self.config.retry_delay.is_zero() {
                        thread::sleep(self.config.retry_delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn write_checkpoint(&self, segments: &[Segment]) -> io::Result<()> {
        if let Some(parent) = self.checkpoint_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(segments)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.checkpoint_path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.checkpoint_path)
    }
}

/// The model has looped back to the start when this turn's first segment
/// begins before half of the last accumulated end time.
fn is_regression(parsed: &TurnParse, accumulated: &[Segment]) -> bool {
    match (parsed.segments.first(), accumulated.last()) {
        (Some(first), Some(last)) => first.start_time < last.end_time * 0.5,
        _ => false,
    }
}

/// Load checkpointed segments, if a checkpoint exists.
pub fn load_checkpoint(path: &Path) -> io::Result<Option<Vec<Segment>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let segments = serde_json::from_str(&content)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(segments))
}
