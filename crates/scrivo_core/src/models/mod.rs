//! Data entities: jobs, stage states, and transcript segments.

mod enums;
mod job;
mod segment;

pub use enums::{RoutingStrategy, StageName, StageStatus};
pub use job::{
    ContextWindow, ErrorEntry, Job, JobConfig, MediaMeta, ModelChoice, ProcessingStats,
    RetryPolicy, StageState, StepRecord, TokenStats,
};
pub use segment::{is_ordered, Segment};

#[cfg(test)]
pub(crate) use job::test_config;
