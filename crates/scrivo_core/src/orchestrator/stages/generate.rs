//! Generate: render notes markdown from the refined analysis.

use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};

use crate::models::{Job, StageName, StageStatus};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::{Stage, StageContext};

pub struct GenerateStage;

impl Stage for GenerateStage {
    fn name(&self) -> StageName {
        StageName::Generate
    }

    fn validate_input(&self, _ctx: &StageContext, job: &Job) -> StageResult<()> {
        if job.stage(StageName::Refine).status != StageStatus::Completed {
            return Err(StageError::precondition_failed(
                "generate requires refine to be completed",
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &StageContext, job: &mut Job) -> StageResult<Value> {
        let analysis_file = ctx.dirs.analysis();
        if !analysis_file.exists() {
            return Err(StageError::file_not_found(
                analysis_file.display().to_string(),
            ));
        }
        let content = fs::read_to_string(&analysis_file)
            .map_err(|e| StageError::io_error("reading analysis", e))?;
        let analysis: Value = serde_json::from_str(&content)?;

        let markdown = render_notes(&analysis, job);
        let output = ctx.dirs.artifacts().join("notes.md");
        fs::write(&output, markdown).map_err(|e| StageError::io_error("writing notes", e))?;
        ctx.logger
            .info(&format!("Wrote notes to {}", output.display()));

        job.outputs
            .insert("notes".to_string(), PathBuf::from("artifacts/notes.md"));

        Ok(json!({
            "artifacts": ["artifacts/notes.md"],
        }))
    }
}

/// Render the notes document from an analysis object.
///
/// Sections appear only when the analysis carries them; a completely
/// empty analysis still yields a titled document.
fn render_notes(analysis: &Value, job: &Job) -> String {
    let mut out = String::new();

    let title = analysis
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or(&job.original_file);
    out.push_str(&format!("# {title}\n\n"));

    out.push_str("## Metadata\n\n");
    out.push_str(&format!(
        "- **Date**: {}\n",
        job.created_at.format("%Y-%m-%d")
    ));
    if let Some(language) = analysis
        .get("language")
        .and_then(|v| v.as_str())
        .or(job.media.language.as_deref())
    {
        out.push_str(&format!("- **Language**: {language}\n"));
    }
    for (key, label) in [("content_type", "Type"), ("sentiment", "Sentiment")] {
        if let Some(value) = analysis.get(key).and_then(|v| v.as_str()) {
            out.push_str(&format!("- **{label}**: {value}\n"));
        }
    }
    out.push('\n');

    if let Some(participants) = string_list(analysis, "participants") {
        out.push_str("## Participants\n\n");
        for p in participants {
            out.push_str(&format!("- {p}\n"));
        }
        out.push('\n');
    }

    if let Some(summary) = analysis.get("summary").and_then(|v| v.as_str()) {
        out.push_str("## Summary\n\n");
        out.push_str(summary);
        out.push_str("\n\n");
    }

    if let Some(keywords) = string_list(analysis, "keywords") {
        out.push_str("## Keywords\n\n");
        out.push_str(&keywords.join(", "));
        out.push_str("\n\n");
    }

    if let Some(transcript) = analysis.get("clean_transcript").and_then(|v| v.as_str()) {
        out.push_str("## Transcript\n\n");
        out.push_str(transcript);
        out.push('\n');
    }

    out
}

fn string_list<'a>(analysis: &'a Value, key: &str) -> Option<Vec<&'a str>> {
    let items: Vec<&str> = analysis
        .get(key)?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
