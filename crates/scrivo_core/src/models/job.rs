//! The persisted job entity and its supporting records.
//!
//! A `Job` is the single source of truth for one unit of work. The
//! `JobStore` owns persistence; stage logic mutates an in-memory `Job`
//! and hands it back for saving.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{RoutingStrategy, StageName, StageStatus};

/// State of one stage within a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageState {
    pub status: StageStatus,
    /// When the stage last changed status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry in the job's ordered error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub stage: StageName,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Token counters, split by direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStats {
    pub input: u64,
    pub output: u64,
}

impl TokenStats {
    pub fn add(&mut self, other: TokenStats) {
        self.input += other.input;
        self.output += other.output;
    }
}

/// A per-step entry in the processing log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub stage: StageName,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
    #[serde(default)]
    pub cost_usd: f64,
}

/// Aggregate processing statistics for a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    #[serde(default)]
    pub total_tokens: TokenStats,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub total_time_seconds: f64,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

/// Probed metadata about the source media.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    /// Language detected during transcription (or forced via config).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Token limits of a model's context window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContextWindow {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Provider and model choice for one generative stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelChoice {
    pub provider: String,
    pub model: String,
    pub context_window: ContextWindow,
}

/// Retry and safety bounds for the streaming transcription loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retries of a single turn on a rate-limit error.
    pub retry_max: u32,
    /// Fixed delay between retries, in seconds.
    pub retry_delay_seconds: u64,
    /// Hard cap on turn count per transcription session.
    pub max_turns: u32,
    /// Pacing delay between consecutive turns, in seconds.
    pub turn_pacing_seconds: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_max: 3,
            retry_delay_seconds: 5,
            max_turns: 50,
            turn_pacing_seconds: 0,
        }
    }
}

/// Immutable configuration snapshot taken when a job is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Target language, or "auto" to detect.
    pub language: String,
    pub transcribe: ModelChoice,
    pub refine: ModelChoice,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub routing: RoutingStrategy,
    /// Debug jobs keep all intermediate files on finalize.
    #[serde(default)]
    pub debug: bool,
}

/// A persisted job: stage map, error log, stats, and output references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    /// File name of the submitted source (not a path).
    pub original_file: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub config: JobConfig,
    pub current_stage: StageName,
    pub stages: BTreeMap<StageName, StageState>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    /// References to generated artifacts, keyed by role.
    #[serde(default)]
    pub outputs: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub media: MediaMeta,
    #[serde(default)]
    pub stats: ProcessingStats,
}

impl Job {
    /// Create a fresh job with every stage pending.
    pub fn new(job_id: impl Into<String>, original_file: impl Into<String>, config: JobConfig) -> Self {
        let now = Utc::now();
        let stages = StageName::ORDER
            .iter()
            .map(|s| (*s, StageState::default()))
            .collect();
        Self {
            job_id: job_id.into(),
            original_file: original_file.into(),
            created_at: now,
            updated_at: now,
            config,
            current_stage: StageName::Ingest,
            stages,
            errors: Vec::new(),
            outputs: BTreeMap::new(),
            media: MediaMeta::default(),
            stats: ProcessingStats::default(),
        }
    }

    /// State of one stage; a missing entry reads as pending.
    pub fn stage(&self, name: StageName) -> StageState {
        self.stages.get(&name).cloned().unwrap_or_default()
    }

    /// Transition a stage, stamping the time and recording any error into
    /// both the stage state and the job error log.
    pub fn set_stage_status(&mut self, name: StageName, status: StageStatus, error: Option<String>) {
        let now = Utc::now();
        let state = self.stages.entry(name).or_default();
        state.status = status;
        state.timestamp = Some(now);
        if let Some(message) = error {
            state.error = Some(message.clone());
            self.errors.push(ErrorEntry {
                stage: name,
                message,
                timestamp: now,
            });
        }
        if status == StageStatus::InProgress {
            self.current_stage = name;
        }
    }

    /// First stage in pipeline order whose status is `Failed`, if any.
    pub fn first_failed_stage(&self) -> Option<StageName> {
        StageName::ORDER
            .iter()
            .copied()
            .find(|s| self.stage(*s).status == StageStatus::Failed)
    }

    /// Whether every prerequisite of `stage` is completed.
    pub fn is_ready_for(&self, stage: StageName) -> bool {
        stage
            .prerequisites()
            .iter()
            .all(|s| self.stage(*s).status == StageStatus::Completed)
    }

    /// Whether every stage has reached a terminal status.
    pub fn all_stages_terminal(&self) -> bool {
        StageName::ORDER
            .iter()
            .all(|s| self.stage(*s).status.is_terminal())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> JobConfig {
    JobConfig {
        language: "auto".to_string(),
        transcribe: ModelChoice {
            provider: "scripted".to_string(),
            model: "test-model".to_string(),
            context_window: ContextWindow {
                input_tokens: 1_048_576,
                output_tokens: 8_192,
            },
        },
        refine: ModelChoice {
            provider: "scripted".to_string(),
            model: "test-model".to_string(),
            context_window: ContextWindow {
                input_tokens: 1_048_576,
                output_tokens: 8_192,
            },
        },
        retry: RetryPolicy {
            retry_delay_seconds: 0,
            turn_pacing_seconds: 0,
            ..RetryPolicy::default()
        },
        routing: RoutingStrategy::Timeline,
        debug: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_has_all_stages_pending() {
        let job = Job::new("j1", "talk.mp3", test_config());
        assert_eq!(job.stages.len(), StageName::ORDER.len());
        for stage in StageName::ORDER {
            assert_eq!(job.stage(stage).status, StageStatus::Pending);
        }
        assert_eq!(job.current_stage, StageName::Ingest);
    }

    #[test]
    fn failed_transition_records_error_log() {
        let mut job = Job::new("j1", "talk.mp3", test_config());
        job.set_stage_status(
            StageName::Transcribe,
            StageStatus::Failed,
            Some("provider exploded".to_string()),
        );

        assert_eq!(job.stage(StageName::Transcribe).status, StageStatus::Failed);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].stage, StageName::Transcribe);
        assert!(job.errors[0].message.contains("exploded"));
        assert_eq!(job.first_failed_stage(), Some(StageName::Transcribe));
    }

    #[test]
    fn readiness_requires_completed_prerequisites() {
        let mut job = Job::new("j1", "talk.mp3", test_config());
        assert!(job.is_ready_for(StageName::Ingest));
        assert!(!job.is_ready_for(StageName::Refine));

        job.set_stage_status(StageName::Ingest, StageStatus::Completed, None);
        assert!(job.is_ready_for(StageName::Transcribe));
        // A skipped transcribe does not count as completed for readiness.
        job.set_stage_status(StageName::Transcribe, StageStatus::Skipped, None);
        assert!(!job.is_ready_for(StageName::Refine));
    }

    #[test]
    fn job_document_round_trips() {
        let mut job = Job::new("j1", "talk.mp3", test_config());
        job.outputs
            .insert("raw_transcript".to_string(), PathBuf::from("transcripts/segments.json"));
        job.stats.total_tokens.add(TokenStats { input: 10, output: 20 });

        let json = serde_json::to_string_pretty(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, "j1");
        assert_eq!(back.stages.len(), 5);
        assert_eq!(back.stats.total_tokens.output, 20);
        assert!(back.outputs.contains_key("raw_transcript"));
    }
}
