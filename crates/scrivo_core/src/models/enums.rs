//! Core enumerations used across the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Ingest,
    Transcribe,
    Refine,
    Generate,
    Organize,
}

impl StageName {
    /// All stages in declared pipeline order.
    pub const ORDER: [StageName; 5] = [
        StageName::Ingest,
        StageName::Transcribe,
        StageName::Refine,
        StageName::Generate,
        StageName::Organize,
    ];

    /// Position of this stage in pipeline order.
    pub fn order_index(&self) -> usize {
        Self::ORDER
            .iter()
            .position(|s| s == self)
            .expect("stage is in ORDER")
    }

    /// Stages that must be completed before this one may start.
    pub fn prerequisites(&self) -> &'static [StageName] {
        &Self::ORDER[..self.order_index()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Ingest => "ingest",
            StageName::Transcribe => "transcribe",
            StageName::Refine => "refine",
            StageName::Generate => "generate",
            StageName::Organize => "organize",
        }
    }

    /// Parse a stage name from its lowercase string form.
    pub fn parse(s: &str) -> Option<StageName> {
        Self::ORDER.iter().copied().find(|st| st.as_str() == s)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single stage within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    /// A terminal status requires no further work on the stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Skipped)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// How finalized job results are routed under the results root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStrategy {
    /// Date-based layout: `YYYY/MM/DD/<job_id>`.
    #[default]
    Timeline,
    /// Flat layout under a single `notes/` folder.
    Flat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_stable() {
        assert_eq!(StageName::Ingest.order_index(), 0);
        assert_eq!(StageName::Organize.order_index(), 4);
        assert_eq!(
            StageName::Refine.prerequisites(),
            &[StageName::Ingest, StageName::Transcribe]
        );
    }

    #[test]
    fn stage_name_round_trips_through_serde() {
        let json = serde_json::to_string(&StageName::Transcribe).unwrap();
        assert_eq!(json, "\"transcribe\"");
        let back: StageName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StageName::Transcribe);
    }

    #[test]
    fn stage_name_parses_from_str() {
        assert_eq!(StageName::parse("generate"), Some(StageName::Generate));
        assert_eq!(StageName::parse("bogus"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
        assert!(!StageStatus::Failed.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
    }
}
