//! Runs one stage against a job with full status bookkeeping.

use serde_json::Value;

use super::errors::{PipelineError, PipelineResult};
use super::stage::{Stage, StageContext};
use crate::models::{Job, StageStatus};

/// Drives a single stage through its lifecycle.
///
/// Every transition is persisted before the next step runs, so a crash
/// mid-stage leaves the job visibly in progress rather than silently
/// pending.
pub struct StageExecutor;

impl StageExecutor {
    /// Execute `stage` for the given job.
    ///
    /// Marks the stage in progress, validates input, executes, writes the
    /// stage report, and marks completed. Any failure is recorded into the
    /// job document before the error propagates.
    pub fn run(stage: &dyn Stage, ctx: &StageContext, job_id: &str) -> PipelineResult<Value> {
        let name = stage.name();
        let mut job = ctx
            .store
            .load(job_id)
            .map_err(|e| PipelineError::store(job_id, e))?;

        ctx.logger.phase(name.as_str());
        job.set_stage_status(name, StageStatus::InProgress, None);
        ctx.store
            .save(&mut job)
            .map_err(|e| PipelineError::store(job_id, e))?;

        if let Err(e) = stage.validate_input(ctx, &job) {
            return Self::fail(ctx, job, stage, e);
        }

        match stage.execute(ctx, &mut job) {
            Ok(report) => {
                ctx.store
                    .write_stage_report(job_id, name, &report)
                    .map_err(|e| PipelineError::store(job_id, e))?;
                job.set_stage_status(name, StageStatus::Completed, None);
                ctx.store
                    .save(&mut job)
                    .map_err(|e| PipelineError::store(job_id, e))?;
                ctx.logger.success(&format!("{name} completed"));
                Ok(report)
            }
            Err(e) => Self::fail(ctx, job, stage, e),
        }
    }

    fn fail(
        ctx: &StageContext,
        mut job: Job,
        stage: &dyn Stage,
        error: super::errors::StageError,
    ) -> PipelineResult<Value> {
        let name = stage.name();
        ctx.logger.error(&format!("{name} failed: {error}"));
        // Replay the buffered per-turn lines so the log shows what led up
        // to the failure.
        ctx.logger.show_tail(name.as_str());
        job.set_stage_status(name, StageStatus::Failed, Some(error.to_string()));
        if let Err(save_err) = ctx.store.save(&mut job) {
            tracing::warn!(job_id = %job.job_id, "Could not persist failure state: {save_err}");
        }
        Err(PipelineError::stage_failed(&job.job_id, name, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{JobLogger, LogConfig};
    use crate::models::{test_config, StageName};
    use crate::orchestrator::errors::{StageError, StageResult};
    use crate::providers::ProviderRegistry;
    use crate::store::JobStore;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    struct ScriptedStage {
        name: StageName,
        fail_with: Option<&'static str>,
    }

    impl Stage for ScriptedStage {
        fn name(&self) -> StageName {
            self.name
        }

        fn validate_input(&self, _ctx: &StageContext, _job: &Job) -> StageResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &StageContext, job: &mut Job) -> StageResult<Value> {
            if let Some(message) = self.fail_with {
                return Err(StageError::other(message));
            }
            job.stats.request_count += 1;
            Ok(json!({"ran": self.name.as_str()}))
        }
    }

    fn setup(dir: &std::path::Path) -> (JobStore, ProviderRegistry, JobLogger, String) {
        let store = JobStore::open(dir.join("work"), dir.join("results")).unwrap();
        let source = dir.join("talk.mp3");
        fs::write(&source, b"media").unwrap();
        let job = store.create_job(&source, test_config()).unwrap();
        let registry = ProviderRegistry::new();
        let logger = JobLogger::new(&job.job_id, dir, LogConfig::default(), None).unwrap();
        (store, registry, logger, job.job_id)
    }

    #[test]
    fn successful_stage_transitions_and_writes_report() {
        let dir = tempdir().unwrap();
        let (store, registry, logger, job_id) = setup(dir.path());
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        let stage = ScriptedStage {
            name: StageName::Ingest,
            fail_with: None,
        };
        let report = StageExecutor::run(&stage, &ctx, &job_id).unwrap();
        assert_eq!(report["ran"], "ingest");

        let job = store.load(&job_id).unwrap();
        assert_eq!(
            job.stage(StageName::Ingest).status,
            StageStatus::Completed
        );
        // Executed mutations were persisted.
        assert_eq!(job.stats.request_count, 1);

        let stored = store
            .read_stage_report(&job_id, StageName::Ingest)
            .unwrap()
            .unwrap();
        assert_eq!(stored, report);
    }

    #[test]
    fn failing_stage_records_error_and_propagates() {
        let dir = tempdir().unwrap();
        let (store, registry, logger, job_id) = setup(dir.path());
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        let stage = ScriptedStage {
            name: StageName::Ingest,
            fail_with: Some("decoder exploded"),
        };
        let err = StageExecutor::run(&stage, &ctx, &job_id).unwrap_err();
        assert!(err.to_string().contains("decoder exploded"));

        let job = store.load(&job_id).unwrap();
        assert_eq!(job.stage(StageName::Ingest).status, StageStatus::Failed);
        assert_eq!(job.errors.len(), 1);
        assert!(job.errors[0].message.contains("decoder exploded"));
        assert!(store
            .read_stage_report(&job_id, StageName::Ingest)
            .unwrap()
            .is_none());
    }

    #[test]
    fn failure_replays_buffered_tail_lines() {
        let dir = tempdir().unwrap();
        let (store, registry, logger, job_id) = setup(dir.path());
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        struct ChattyFailure;
        impl Stage for ChattyFailure {
            fn name(&self) -> StageName {
                StageName::Ingest
            }
            fn validate_input(&self, _ctx: &StageContext, _job: &Job) -> StageResult<()> {
                Ok(())
            }
            fn execute(&self, ctx: &StageContext, _job: &mut Job) -> StageResult<Value> {
                ctx.logger.tail_line("turn 1 raw: garbled output");
                Err(StageError::other("bad response"))
            }
        }

        StageExecutor::run(&ChattyFailure, &ctx, &job_id).unwrap_err();
        logger.flush();

        // Default config is compact, so the tail line only reaches the log
        // through the failure-path replay.
        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("[ingest/tail]"));
        assert!(content.contains("turn 1 raw: garbled output"));
    }

    #[test]
    fn prerequisite_violation_fails_the_stage() {
        let dir = tempdir().unwrap();
        let (store, registry, logger, job_id) = setup(dir.path());
        let ctx = StageContext {
            store: &store,
            dirs: store.job_dirs(&job_id),
            registry: &registry,
            logger: &logger,
        };

        struct DefaultValidation;
        impl Stage for DefaultValidation {
            fn name(&self) -> StageName {
                StageName::Refine
            }
            fn execute(&self, _ctx: &StageContext, _job: &mut Job) -> StageResult<Value> {
                Ok(Value::Null)
            }
        }

        let err = StageExecutor::run(&DefaultValidation, &ctx, &job_id).unwrap_err();
        assert!(err.to_string().contains("requires"));

        let job = store.load(&job_id).unwrap();
        assert_eq!(job.stage(StageName::Refine).status, StageStatus::Failed);
    }
}
