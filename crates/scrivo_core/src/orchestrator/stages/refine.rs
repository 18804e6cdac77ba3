//! Refine: turn the raw transcript (or the media itself) into analysis.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::{json, Value};

use crate::models::{Job, Segment, StageName, StageStatus, StepRecord};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::{Stage, StageContext};
use crate::providers::{IngestArtifact, RefineInput};

pub struct RefineStage;

impl Stage for RefineStage {
    fn name(&self) -> StageName {
        StageName::Refine
    }

    /// Ingest must be completed; transcribe may be completed or skipped
    /// (skipped means direct-analysis mode).
    fn validate_input(&self, _ctx: &StageContext, job: &Job) -> StageResult<()> {
        if job.stage(StageName::Ingest).status != StageStatus::Completed {
            return Err(StageError::precondition_failed(
                "refine requires ingest to be completed",
            ));
        }
        if !job.stage(StageName::Transcribe).status.is_terminal() {
            return Err(StageError::precondition_failed(
                "refine requires transcribe to be completed or skipped",
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &StageContext, job: &mut Job) -> StageResult<Value> {
        let provider_name = &job.config.refine.provider;
        let refiner = ctx.registry.create_refiner(provider_name, &job.config)?;

        let language = if job.config.language == "auto" {
            job.media.language.clone()
        } else {
            Some(job.config.language.clone())
        };

        let segments_file = ctx.dirs.segments();
        let (outcome, mode) = if segments_file.exists() {
            let content = fs::read_to_string(&segments_file)
                .map_err(|e| StageError::io_error("reading transcript", e))?;
            let segments: Vec<Segment> = serde_json::from_str(&content)?;
            ctx.logger.info(&format!(
                "Refining transcript of {} segments via '{}'",
                segments.len(),
                refiner.name()
            ));
            let outcome =
                refiner.refine(RefineInput::Segments(&segments), language.as_deref(), None)?;
            (outcome, "transcript")
        } else {
            // Direct analysis over the media reference.
            let value = ctx
                .store
                .read_stage_report(&job.job_id, StageName::Ingest)
                .map_err(|e| StageError::other(e.to_string()))?
                .ok_or_else(|| {
                    StageError::precondition_failed("ingest report not found; run ingest first")
                })?;
            let artifact: IngestArtifact = serde_json::from_value(value)?;
            ctx.logger.info(&format!(
                "No transcript present, refining media directly via '{}'",
                refiner.name()
            ));
            let outcome =
                refiner.refine(RefineInput::Media(&artifact), language.as_deref(), None)?;
            (outcome, "direct")
        };

        let analysis_file = ctx.dirs.analysis();
        let content = serde_json::to_string_pretty(&outcome.value)?;
        fs::write(&analysis_file, content)
            .map_err(|e| StageError::io_error("writing analysis", e))?;

        if job.media.language.is_none() {
            if let Some(detected) = outcome.value.get("language").and_then(|v| v.as_str()) {
                job.media.language = Some(detected.to_string());
            }
        }

        job.stats.total_tokens.add(outcome.tokens);
        job.stats.total_cost_usd += outcome.cost_usd;
        job.stats.request_count += 1;
        job.stats.steps.push(StepRecord {
            stage: StageName::Refine,
            provider: refiner.name().to_string(),
            timestamp: Utc::now(),
            detail: format!("refined from {mode}"),
            cost_usd: outcome.cost_usd,
        });
        job.outputs.insert(
            "analysis".to_string(),
            PathBuf::from("transcripts/analysis.json"),
        );

        Ok(json!({
            "provider": refiner.name(),
            "model": job.config.refine.model,
            "mode": mode,
            "tokens": outcome.tokens,
            "cost_usd": outcome.cost_usd,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{JobLogger, LogConfig};
    use crate::models::{test_config, TokenStats};
    use crate::orchestrator::executor::StageExecutor;
    use crate::planner::plan_chunking;
    use crate::providers::{
        ProviderError, ProviderRegistry, RefinementOutcome, RefinementProvider,
    };
    use tempfile::tempdir;

    struct CannedRefiner;

    impl RefinementProvider for CannedRefiner {
        fn name(&self) -> &str {
            "scripted"
        }

        fn refine(
            &self,
            input: RefineInput<'_>,
            language: Option<&str>,
            _custom_schema: Option<&Value>,
        ) -> Result<RefinementOutcome, ProviderError> {
            let mode = match input {
                RefineInput::Segments(_) => "transcript",
                RefineInput::Media(_) => "direct",
            };
            Ok(RefinementOutcome {
                value: json!({
                    "summary": "A short talk.",
                    "keywords": ["talk"],
                    "language": language.unwrap_or("en"),
                    "refined_from": mode,
                }),
                tokens: TokenStats {
                    input: 500,
                    output: 120,
                },
                cost_usd: 0.015,
            })
        }
    }

    fn setup(
        dir: &std::path::Path,
        with_transcript: bool,
    ) -> (crate::store::JobStore, ProviderRegistry, String) {
        let store = crate::store::JobStore::open(dir.join("work"), dir.join("results")).unwrap();
        let source = dir.join("talk.mp3");
        fs::write(&source, b"media").unwrap();
        let mut job = store.create_job(&source, test_config()).unwrap();

        let artifact = IngestArtifact {
            media_path: PathBuf::from("media/original.mp3"),
            media: Default::default(),
            plan: plan_chunking(3000, 1_048_576, 8_192, 300.0),
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

        if with_transcript {
            let segments = vec![Segment::new(0.0, 5.0, "Speaker A", "hello")];
            let dirs = store.job_dirs(&job.job_id);
            fs::write(
                dirs.segments(),
                serde_json::to_string_pretty(&segments).unwrap(),
            )
            .unwrap();
            job.set_stage_status(StageName::Transcribe, StageStatus::Completed, None);
        } else {
            job.set_stage_status(StageName::Transcribe, StageStatus::Skipped, None);
        }
        store.save(&mut job).unwrap();

        let mut registry = ProviderRegistry::new();
        registry.register_refiner("scripted", |_config| Ok(Box::new(CannedRefiner)));
        let id = job.job_id.clone();
        (store, registry, id)
    }

    #[test]
    fn refines_transcript_and_writes_analysis() {
        let dir = tempdir().unwrap();
        let (store, registry, job_id) = setup(dir.path(), true);
        let logger = JobLogger::new(&job_id, dir.path(), LogConfig::default(), None).unwrap();
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        let report = StageExecutor::run(&RefineStage, &ctx, &job_id).unwrap();
        assert_eq!(report["mode"], "transcript");

        let analysis: Value =
            serde_json::from_str(&fs::read_to_string(ctx.dirs.analysis()).unwrap()).unwrap();
        assert_eq!(analysis["refined_from"], "transcript");

        let job = store.load(&job_id).unwrap();
        assert_eq!(job.stats.total_tokens.input, 500);
        assert!((job.stats.total_cost_usd - 0.015).abs() < 1e-9);
        assert!((job.stats.steps[0].cost_usd - 0.015).abs() < 1e-9);
        assert_eq!(job.media.language.as_deref(), Some("en"));
    }

    #[test]
    fn skipped_transcribe_triggers_direct_analysis() {
        let dir = tempdir().unwrap();
        let (store, registry, job_id) = setup(dir.path(), false);
        let logger = JobLogger::new(&job_id, dir.path(), LogConfig::default(), None).unwrap();
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        let report = StageExecutor::run(&RefineStage, &ctx, &job_id).unwrap();
        assert_eq!(report["mode"], "direct");

        let analysis: Value =
            serde_json::from_str(&fs::read_to_string(ctx.dirs.analysis()).unwrap()).unwrap();
        assert_eq!(analysis["refined_from"], "direct");
    }

    #[test]
    fn failed_transcribe_blocks_refine() {
        let dir = tempdir().unwrap();
        let (store, registry, job_id) = setup(dir.path(), true);
        let mut job = store.load(&job_id).unwrap();
        job.set_stage_status(StageName::Transcribe, StageStatus::Failed, Some("x".into()));
        store.save(&mut job).unwrap();

        let logger = JobLogger::new(&job_id, dir.path(), LogConfig::default(), None).unwrap();
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        let err = StageExecutor::run(&RefineStage, &ctx, &job_id).unwrap_err();
        assert!(err.to_string().contains("completed or skipped"));
    }
}
