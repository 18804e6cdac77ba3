//! Stage trait and execution context.

use serde_json::Value;

use super::errors::{StageError, StageResult};
use crate::logging::JobLogger;
use crate::models::{Job, StageName, StageStatus};
use crate::providers::ProviderRegistry;
use crate::store::{JobDirs, JobStore};

/// Everything a stage needs, injected by the orchestrator.
pub struct StageContext<'a> {
    pub store: &'a JobStore,
    pub dirs: JobDirs,
    pub registry: &'a ProviderRegistry,
    pub logger: &'a JobLogger,
}

/// One unit of pipeline work.
///
/// The executor calls `validate_input` before `execute`; mutations to the
/// job are persisted by the executor, and the returned report lands in
/// `stages/<stage>.json`.
pub trait Stage {
    fn name(&self) -> StageName;

    /// Check preconditions before execution.
    ///
    /// The default requires every prerequisite stage to be completed.
    /// Stages that accept a skipped prerequisite override this.
    fn validate_input(&self, _ctx: &StageContext, job: &Job) -> StageResult<()> {
        for prereq in self.name().prerequisites() {
            if job.stage(*prereq).status != StageStatus::Completed {
                return Err(StageError::precondition_failed(format!(
                    "stage '{}' requires '{}' to be completed (currently {})",
                    self.name(),
                    prereq,
                    job.stage(*prereq).status
                )));
            }
        }
        Ok(())
    }

    /// Perform the stage's work and return its report.
    fn execute(&self, ctx: &StageContext, job: &mut Job) -> StageResult<Value>;
}
