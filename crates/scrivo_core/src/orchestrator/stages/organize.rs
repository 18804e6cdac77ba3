//! Organize: categorize the content and record the routing destination.
//!
//! The actual move into the results tree happens at finalize; this stage
//! extracts the categorization from the analysis and decides where the
//! job will land.

use std::fs;

use chrono::Utc;
use serde_json::{json, Value};

use crate::models::{Job, RoutingStrategy, StageName, StageStatus, StepRecord};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::{Stage, StageContext};

pub struct OrganizeStage;

impl Stage for OrganizeStage {
    fn name(&self) -> StageName {
        StageName::Organize
    }

    fn validate_input(&self, _ctx: &StageContext, job: &Job) -> StageResult<()> {
        if job.stage(StageName::Generate).status != StageStatus::Completed {
            return Err(StageError::precondition_failed(
                "organize requires generate to be completed",
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &StageContext, job: &mut Job) -> StageResult<Value> {
        let analysis_file = ctx.dirs.analysis();
        let analysis: Value = if analysis_file.exists() {
            let content = fs::read_to_string(&analysis_file)
                .map_err(|e| StageError::io_error("reading analysis", e))?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                ctx.logger
                    .warn(&format!("Unreadable analysis, organizing without it: {e}"));
                json!({})
            })
        } else {
            ctx.logger.warn("Analysis file missing, organizing without it");
            json!({})
        };

        let categories = json!({
            "categories": analysis.get("categories").cloned().unwrap_or(json!([])),
            "keywords": analysis.get("keywords").cloned().unwrap_or(json!([])),
            "content_type": analysis.get("content_type").cloned().unwrap_or(json!("unknown")),
            "sentiment": analysis.get("sentiment").cloned().unwrap_or(json!("unknown")),
            "participants_count": analysis
                .get("participants")
                .and_then(|p| p.as_array())
                .map(|p| p.len())
                .unwrap_or(0),
        });

        let (strategy, destination) = match job.config.routing {
            RoutingStrategy::Timeline => (
                "timeline",
                format!("{}/{}", job.created_at.format("%Y/%m/%d"), job.job_id),
            ),
            RoutingStrategy::Flat => ("flat", format!("notes/{}", job.job_id)),
        };
        ctx.logger
            .info(&format!("Will file results under {destination}"));

        job.stats.steps.push(StepRecord {
            stage: StageName::Organize,
            provider: "local".to_string(),
            timestamp: Utc::now(),
            detail: format!("routed via {strategy}"),
            cost_usd: 0.0,
        });

        Ok(json!({
            "categories": categories,
            "routing": strategy,
            "destination": destination,
        }))
    }
}
