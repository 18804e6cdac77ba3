//! Pipeline orchestration: executes stages in order with resume support.

pub mod errors;
pub mod executor;
pub mod stage;
pub mod stages;

use std::path::PathBuf;
use std::time::Instant;

use serde_json::Value;

use crate::logging::JobLogger;
use crate::models::{StageName, StageStatus};
use crate::providers::ProviderRegistry;
use crate::store::JobStore;

pub use errors::{PipelineError, PipelineResult, StageError, StageResult};
pub use executor::StageExecutor;
pub use stage::{Stage, StageContext};

/// Options for a full pipeline run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Skip all stages before this one (leave them untouched).
    pub start_at: Option<StageName>,
    /// End the run after this stage; the job is left unfinalized.
    pub stop_after: Option<StageName>,
    /// Mark transcribe skipped and let refine analyze the media directly.
    pub skip_transcription: bool,
}

/// How a full run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every stage reached a terminal status and the job was moved into
    /// the results area.
    Finalized(PathBuf),
    /// The run stopped at the requested stage; the job stays in the work
    /// area.
    Stopped(StageName),
}

/// Runs jobs through the stage sequence.
pub struct Orchestrator<'a> {
    store: &'a JobStore,
    registry: &'a ProviderRegistry,
    stages: Vec<Box<dyn Stage>>,
}

impl<'a> Orchestrator<'a> {
    /// Orchestrator over the standard five-stage pipeline.
    pub fn new(store: &'a JobStore, registry: &'a ProviderRegistry) -> Self {
        Self::with_stages(
            store,
            registry,
            vec![
                Box::new(stages::IngestStage),
                Box::new(stages::TranscribeStage),
                Box::new(stages::RefineStage),
                Box::new(stages::GenerateStage),
                Box::new(stages::OrganizeStage),
            ],
        )
    }

    /// Orchestrator over a custom stage list. The list must be sorted in
    /// pipeline order.
    pub fn with_stages(
        store: &'a JobStore,
        registry: &'a ProviderRegistry,
        stages: Vec<Box<dyn Stage>>,
    ) -> Self {
        Self {
            store,
            registry,
            stages,
        }
    }

    fn context<'b>(&'b self, job_id: &str, logger: &'b JobLogger) -> StageContext<'b> {
        StageContext {
            store: self.store,
            dirs: self.store.job_dirs(job_id),
            registry: self.registry,
            logger,
        }
    }

    /// Run a single stage by name.
    pub fn run_stage(
        &self,
        name: StageName,
        job_id: &str,
        logger: &JobLogger,
    ) -> PipelineResult<Value> {
        let stage = self
            .stages
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| {
                PipelineError::setup_failed(job_id, format!("no stage registered for '{name}'"))
            })?;
        let ctx = self.context(job_id, logger);
        StageExecutor::run(stage.as_ref(), &ctx, job_id)
    }

    /// Run the pipeline end to end.
    ///
    /// Before each stage the job is re-read from disk, so external
    /// mutations (or a previous partial run) are honored: stages already
    /// completed or skipped are passed over without error, failed or
    /// pending stages run. On full success the job is finalized into the
    /// results area.
    pub fn run_all(
        &self,
        job_id: &str,
        options: RunOptions,
        logger: &JobLogger,
    ) -> PipelineResult<RunOutcome> {
        let started = Instant::now();

        for stage in &self.stages {
            let name = stage.name();
            if let Some(start) = options.start_at {
                if name.order_index() < start.order_index() {
                    continue;
                }
            }

            let job = self
                .store
                .load(job_id)
                .map_err(|e| PipelineError::store(job_id, e))?;
            let status = job.stage(name).status;

            if status.is_terminal() {
                logger.info(&format!("{name} already {status}, skipping"));
            } else if name == StageName::Transcribe && options.skip_transcription {
                let mut job = job;
                logger.info("Transcription skipped on request, using direct analysis");
                job.set_stage_status(StageName::Transcribe, StageStatus::Skipped, None);
                self.store
                    .save(&mut job)
                    .map_err(|e| PipelineError::store(job_id, e))?;
            } else {
                let ctx = self.context(job_id, logger);
                StageExecutor::run(stage.as_ref(), &ctx, job_id)?;
            }

            if options.stop_after == Some(name) {
                logger.info(&format!("Stopping after {name} as requested"));
                return Ok(RunOutcome::Stopped(name));
            }
        }

        let mut job = self
            .store
            .load(job_id)
            .map_err(|e| PipelineError::store(job_id, e))?;
        job.stats.total_time_seconds += started.elapsed().as_secs_f64();
        self.store
            .save(&mut job)
            .map_err(|e| PipelineError::store(job_id, e))?;

        logger.phase("Finalize");
        let dest = self
            .store
            .finalize_job(job_id)
            .map_err(|e| PipelineError::store(job_id, e))?;
        logger.success(&format!("Job finalized to {}", dest.display()));
        Ok(RunOutcome::Finalized(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{JobLogger, LogConfig};
    use crate::models::{test_config, Job};
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct CountingStage {
        name: StageName,
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Stage for CountingStage {
        fn name(&self) -> StageName {
            self.name
        }

        fn validate_input(&self, _ctx: &StageContext, _job: &Job) -> StageResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &StageContext, _job: &mut Job) -> StageResult<Value> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StageError::other("scripted failure"));
            }
            Ok(json!({"ran": self.name.as_str()}))
        }
    }

    struct Fixture {
        store: JobStore,
        registry: ProviderRegistry,
        job_id: String,
        counters: Vec<Arc<AtomicUsize>>,
    }

    fn fixture(dir: &std::path::Path) -> Fixture {
        let store = JobStore::open(dir.join("work"), dir.join("results")).unwrap();
        let source = dir.join("talk.mp3");
        fs::write(&source, b"media").unwrap();
        let job = store.create_job(&source, test_config()).unwrap();
        Fixture {
            store,
            registry: ProviderRegistry::new(),
            job_id: job.job_id,
            counters: (0..5).map(|_| Arc::new(AtomicUsize::new(0))).collect(),
        }
    }

    fn scripted_stages(counters: &[Arc<AtomicUsize>], fail_at: Option<StageName>) -> Vec<Box<dyn Stage>> {
        StageName::ORDER
            .iter()
            .zip(counters)
            .map(|(name, runs)| {
                Box::new(CountingStage {
                    name: *name,
                    runs: Arc::clone(runs),
                    fail: fail_at == Some(*name),
                }) as Box<dyn Stage>
            })
            .collect()
    }

    fn logger(dir: &std::path::Path, job_id: &str) -> JobLogger {
        JobLogger::new(job_id, dir, LogConfig::default(), None).unwrap()
    }

    #[test]
    fn full_run_executes_all_stages_and_finalizes() {
        let dir = tempdir().unwrap();
        let f = fixture(dir.path());
        let orch = Orchestrator::with_stages(
            &f.store,
            &f.registry,
            scripted_stages(&f.counters, None),
        );
        let log = logger(dir.path(), &f.job_id);

        let outcome = orch
            .run_all(&f.job_id, RunOptions::default(), &log)
            .unwrap();
        let RunOutcome::Finalized(dest) = outcome else {
            panic!("expected finalized outcome");
        };
        assert!(dest.exists());
        for counter in &f.counters {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }

        let job = f.store.load(&f.job_id).unwrap();
        assert!(job.all_stages_terminal());
        assert!(job.stats.total_time_seconds >= 0.0);
    }

    #[test]
    fn resume_skips_completed_stages() {
        let dir = tempdir().unwrap();
        let f = fixture(dir.path());
        let mut job = f.store.load(&f.job_id).unwrap();
        job.set_stage_status(StageName::Ingest, StageStatus::Completed, None);
        job.set_stage_status(StageName::Transcribe, StageStatus::Completed, None);
        f.store.save(&mut job).unwrap();

        let orch = Orchestrator::with_stages(
            &f.store,
            &f.registry,
            scripted_stages(&f.counters, None),
        );
        let log = logger(dir.path(), &f.job_id);
        orch.run_all(&f.job_id, RunOptions::default(), &log)
            .unwrap();

        assert_eq!(f.counters[0].load(Ordering::SeqCst), 0);
        assert_eq!(f.counters[1].load(Ordering::SeqCst), 0);
        assert_eq!(f.counters[2].load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_after_leaves_job_unfinalized() {
        let dir = tempdir().unwrap();
        let f = fixture(dir.path());
        let orch = Orchestrator::with_stages(
            &f.store,
            &f.registry,
            scripted_stages(&f.counters, None),
        );
        let log = logger(dir.path(), &f.job_id);

        let outcome = orch
            .run_all(
                &f.job_id,
                RunOptions {
                    stop_after: Some(StageName::Transcribe),
                    ..RunOptions::default()
                },
                &log,
            )
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StageName::Transcribe)));

        assert_eq!(f.counters[1].load(Ordering::SeqCst), 1);
        assert_eq!(f.counters[2].load(Ordering::SeqCst), 0);
        // Still in the work area.
        assert!(f.store.job_dirs(&f.job_id).job_file().exists());
        assert!(f.store.load(&f.job_id).is_ok());
    }

    #[test]
    fn skip_transcription_marks_stage_skipped() {
        let dir = tempdir().unwrap();
        let f = fixture(dir.path());
        let orch = Orchestrator::with_stages(
            &f.store,
            &f.registry,
            scripted_stages(&f.counters, None),
        );
        let log = logger(dir.path(), &f.job_id);

        orch.run_all(
            &f.job_id,
            RunOptions {
                skip_transcription: true,
                ..RunOptions::default()
            },
            &log,
        )
        .unwrap();

        // Transcribe never executed, everything else did.
        assert_eq!(f.counters[1].load(Ordering::SeqCst), 0);
        assert_eq!(f.counters[2].load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_halts_the_run() {
        let dir = tempdir().unwrap();
        let f = fixture(dir.path());
        let orch = Orchestrator::with_stages(
            &f.store,
            &f.registry,
            scripted_stages(&f.counters, Some(StageName::Refine)),
        );
        let log = logger(dir.path(), &f.job_id);

        let err = orch
            .run_all(&f.job_id, RunOptions::default(), &log)
            .unwrap_err();
        assert!(err.to_string().contains("refine"));

        assert_eq!(f.counters[3].load(Ordering::SeqCst), 0);
        let job = f.store.load(&f.job_id).unwrap();
        assert_eq!(job.stage(StageName::Refine).status, StageStatus::Failed);
        assert_eq!(job.first_failed_stage(), Some(StageName::Refine));
    }

    #[test]
    fn failed_job_resumes_after_retry() {
        let dir = tempdir().unwrap();
        let f = fixture(dir.path());
        {
            let orch = Orchestrator::with_stages(
                &f.store,
                &f.registry,
                scripted_stages(&f.counters, Some(StageName::Refine)),
            );
            let log = logger(dir.path(), &f.job_id);
            orch.run_all(&f.job_id, RunOptions::default(), &log)
                .unwrap_err();
        }

        f.store.retry_job(&f.job_id, None).unwrap();

        let orch = Orchestrator::with_stages(
            &f.store,
            &f.registry,
            scripted_stages(&f.counters, None),
        );
        let log = logger(dir.path(), &f.job_id);
        let outcome = orch
            .run_all(&f.job_id, RunOptions::default(), &log)
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Finalized(_)));

        // Ingest and transcribe ran once, refine ran twice (fail + retry).
        assert_eq!(f.counters[0].load(Ordering::SeqCst), 1);
        assert_eq!(f.counters[1].load(Ordering::SeqCst), 1);
        assert_eq!(f.counters[2].load(Ordering::SeqCst), 2);
    }

    #[test]
    fn start_at_leaves_earlier_stages_untouched() {
        let dir = tempdir().unwrap();
        let f = fixture(dir.path());
        let orch = Orchestrator::with_stages(
            &f.store,
            &f.registry,
            scripted_stages(&f.counters, None),
        );
        let log = logger(dir.path(), &f.job_id);

        orch.run_all(
            &f.job_id,
            RunOptions {
                start_at: Some(StageName::Refine),
                stop_after: Some(StageName::Organize),
                ..RunOptions::default()
            },
            &log,
        )
        .unwrap();

        assert_eq!(f.counters[0].load(Ordering::SeqCst), 0);
        assert_eq!(f.counters[1].load(Ordering::SeqCst), 0);
        assert_eq!(f.counters[2].load(Ordering::SeqCst), 1);
        assert_eq!(f.counters[4].load(Ordering::SeqCst), 1);

        let job = f.store.load(&f.job_id).unwrap();
        assert_eq!(job.stage(StageName::Ingest).status, StageStatus::Pending);
    }
}
