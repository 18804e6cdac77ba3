//! Transcribe: stream the media through a provider session.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::{json, Value};

use crate::engine::{EngineConfig, ScribeEngine, StopReason};
use crate::models::{Job, StageName, StepRecord};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::{Stage, StageContext};
use crate::planner::ChunkMethod;
use crate::providers::IngestArtifact;

pub struct TranscribeStage;

impl TranscribeStage {
    fn load_artifact(ctx: &StageContext, job: &Job) -> StageResult<IngestArtifact> {
        let value = ctx
            .store
            .read_stage_report(&job.job_id, StageName::Ingest)
            .map_err(|e| StageError::other(e.to_string()))?
            .ok_or_else(|| {
                StageError::precondition_failed("ingest report not found; run ingest first")
            })?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Stage for TranscribeStage {
    fn name(&self) -> StageName {
        StageName::Transcribe
    }

    fn execute(&self, ctx: &StageContext, job: &mut Job) -> StageResult<Value> {
        let artifact = Self::load_artifact(ctx, job)?;

        // Physical splitting never produces chunk files anymore; sources
        // this large have to be cut down before submission.
        if artifact.plan.method == ChunkMethod::PhysicalSplit {
            return Err(StageError::invalid_input(format!(
                "source exceeds the input context window ({}); split the file and submit the parts as separate jobs",
                artifact.plan.reason
            )));
        }

        let provider_name = &job.config.transcribe.provider;
        let provider = ctx.registry.create_transcriber(provider_name, &job.config)?;
        ctx.logger
            .info(&format!("Transcribing via provider '{}'", provider.name()));

        let mut transport = provider.begin_session(&artifact)?;
        let outcome = ScribeEngine::new(
            &mut *transport,
            EngineConfig::from_job_config(&job.config)
                .with_media_duration(artifact.media.duration_seconds),
            ctx.dirs.partial_segments(),
            ctx.logger,
        )
        .run()?;

        if outcome.segments.is_empty() {
            return Err(StageError::other("transcription produced no segments"));
        }
        if outcome.stop == StopReason::LoopDetected {
            ctx.logger.warn(
                "Model restarted from the beginning; transcript kept up to the loop point",
            );
        }

        // The engine only rejects whole-turn restarts, so a turn can still
        // deliver its lines out of order.
        let mut segments = outcome.segments;
        if !crate::models::is_ordered(&segments) {
            ctx.logger
                .warn("Segments arrived out of order; sorting by start time");
            segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        }

        let segments_file = ctx.dirs.segments();
        let content = serde_json::to_string_pretty(&segments)?;
        fs::write(&segments_file, content)
            .map_err(|e| StageError::io_error("writing transcript", e))?;

        if let Some(language) = outcome.analysis.get("language").and_then(|v| v.as_str()) {
            job.media.language = Some(language.to_string());
        }

        job.stats.total_tokens.add(outcome.tokens);
        job.stats.total_cost_usd += outcome.cost_usd;
        job.stats.request_count += u64::from(outcome.turns);
        job.stats.steps.push(StepRecord {
            stage: StageName::Transcribe,
            provider: provider.name().to_string(),
            timestamp: Utc::now(),
            detail: format!("{} segments in {} turns", segments.len(), outcome.turns),
            cost_usd: outcome.cost_usd,
        });
        job.outputs.insert(
            "raw_transcript".to_string(),
            PathBuf::from("transcripts/segments.json"),
        );

        let stop = match outcome.stop {
            StopReason::EndToken => "end_token",
            StopReason::EmptyTurn => "empty_turn",
            StopReason::LoopDetected => "loop_detected",
        };
        Ok(json!({
            "provider": provider.name(),
            "model": job.config.transcribe.model,
            "segments_count": segments.len(),
            "turns": outcome.turns,
            "stop_reason": stop,
            "tokens": outcome.tokens,
            "cost_usd": outcome.cost_usd,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{JobLogger, LogConfig};
    use crate::models::{test_config, Segment, StageStatus, TokenStats};
    use crate::orchestrator::executor::StageExecutor;
    use crate::planner::plan_chunking;
    use crate::providers::{
        ProviderError, ProviderRegistry, TranscriptionProvider, TurnResponse, TurnTransport,
    };
    use std::fs;
    use tempfile::tempdir;

    struct OneShotTransport {
        sent: u32,
    }

    impl TurnTransport for OneShotTransport {
        fn send_turn(&mut self, _prompt: &str) -> Result<TurnResponse, ProviderError> {
            self.sent += 1;
            Ok(TurnResponse {
                text: concat!(
                    "{\"speakers\": 1, \"language\": \"en\"}\n",
                    "[0.0, 5.0, \"Speaker A\", \"hello there\"]\n",
                    "[5.0, 9.5, \"Speaker A\", \"and goodbye\"]\n",
                    "\"[END]\""
                )
                .to_string(),
                input_tokens: 100,
                output_tokens: 40,
                cost_usd: 0.02,
            })
        }
    }

    struct OneShotProvider;

    impl TranscriptionProvider for OneShotProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn begin_session(
            &self,
            _artifact: &IngestArtifact,
        ) -> Result<Box<dyn TurnTransport>, ProviderError> {
            Ok(Box::new(OneShotTransport { sent: 0 }))
        }
    }

    /// Emits a single turn whose lines are not in start-time order.
    struct JumbledTransport;

    impl TurnTransport for JumbledTransport {
        fn send_turn(&mut self, _prompt: &str) -> Result<TurnResponse, ProviderError> {
            Ok(TurnResponse {
                text: concat!(
                    "[5.0, 9.0, \"Speaker A\", \"second\"]\n",
                    "[0.0, 4.0, \"Speaker A\", \"first\"]\n",
                    "\"[END]\""
                )
                .to_string(),
                ..TurnResponse::default()
            })
        }
    }

    struct JumbledProvider;

    impl TranscriptionProvider for JumbledProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn begin_session(
            &self,
            _artifact: &IngestArtifact,
        ) -> Result<Box<dyn TurnTransport>, ProviderError> {
            Ok(Box::new(JumbledTransport))
        }
    }

    fn scripted_registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register_transcriber("scripted", |_config| Ok(Box::new(OneShotProvider)));
        registry
    }

    fn prepared_job(dir: &std::path::Path, plan_duration: f64) -> (crate::store::JobStore, String) {
        let store = crate::store::JobStore::open(dir.join("work"), dir.join("results")).unwrap();
        let source = dir.join("talk.mp3");
        fs::write(&source, b"media").unwrap();
        let mut job = store.create_job(&source, test_config()).unwrap();

        // Seed the ingest report by hand; ingest itself needs ffprobe.
        let artifact = IngestArtifact {
            media_path: PathBuf::from("media/original.mp3"),
            media: Default::default(),
            plan: plan_chunking(
                (plan_duration * 10.0) as u64,
                1_048_576,
                8_192,
                plan_duration,
            ),
            cache_name: None,
        };
        store
            .write_stage_report(
                &job.job_id,
                StageName::Ingest,
                &serde_json::to_value(&artifact).unwrap(),
            )
            .unwrap();
        job.set_stage_status(StageName::Ingest, StageStatus::Completed, None);
        store.save(&mut job).unwrap();
        let id = job.job_id.clone();
        (store, id)
    }

    #[test]
    fn transcribes_and_persists_segments() {
        let dir = tempdir().unwrap();
        let (store, job_id) = prepared_job(dir.path(), 300.0);
        let registry = scripted_registry();
        let logger = JobLogger::new(&job_id, dir.path(), LogConfig::default(), None).unwrap();
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        let report = StageExecutor::run(&TranscribeStage, &ctx, &job_id).unwrap();
        assert_eq!(report["segments_count"], 2);
        assert_eq!(report["stop_reason"], "end_token");

        let segments: Vec<Segment> =
            serde_json::from_str(&fs::read_to_string(ctx.dirs.segments()).unwrap()).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].speaker_id, "Speaker A");

        let job = store.load(&job_id).unwrap();
        assert_eq!(job.media.language.as_deref(), Some("en"));
        assert_eq!(
            job.stats.total_tokens,
            TokenStats {
                input: 100,
                output: 40
            }
        );
        assert_eq!(
            job.stage(StageName::Transcribe).status,
            StageStatus::Completed
        );
        assert!((job.stats.total_cost_usd - 0.02).abs() < 1e-9);
        assert!((job.stats.steps[0].cost_usd - 0.02).abs() < 1e-9);
    }

    #[test]
    fn out_of_order_segments_are_sorted_before_writing() {
        let dir = tempdir().unwrap();
        let (store, job_id) = prepared_job(dir.path(), 300.0);
        let mut registry = ProviderRegistry::new();
        registry.register_transcriber("scripted", |_config| Ok(Box::new(JumbledProvider)));
        let logger = JobLogger::new(&job_id, dir.path(), LogConfig::default(), None).unwrap();
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        StageExecutor::run(&TranscribeStage, &ctx, &job_id).unwrap();

        let segments: Vec<Segment> =
            serde_json::from_str(&fs::read_to_string(ctx.dirs.segments()).unwrap()).unwrap();
        assert!(crate::models::is_ordered(&segments));
        assert_eq!(segments[0].text, "first");
        assert_eq!(segments[1].text, "second");
    }

    #[test]
    fn physical_split_plans_are_rejected() {
        let dir = tempdir().unwrap();
        // Long enough that the input estimate blows the window.
        let (store, job_id) = prepared_job(dir.path(), 200_000.0);
        let registry = scripted_registry();
        let logger = JobLogger::new(&job_id, dir.path(), LogConfig::default(), None).unwrap();
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        let err = StageExecutor::run(&TranscribeStage, &ctx, &job_id).unwrap_err();
        assert!(err.to_string().contains("input context window"));

        let job = store.load(&job_id).unwrap();
        assert_eq!(job.stage(StageName::Transcribe).status, StageStatus::Failed);
    }

    #[test]
    fn unknown_provider_is_a_stage_failure() {
        let dir = tempdir().unwrap();
        let (store, job_id) = prepared_job(dir.path(), 300.0);
        let registry = ProviderRegistry::new();
        let logger = JobLogger::new(&job_id, dir.path(), LogConfig::default(), None).unwrap();
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        let err = StageExecutor::run(&TranscribeStage, &ctx, &job_id).unwrap_err();
        assert!(err.to_string().contains("unknown transcription provider"));
    }
}
