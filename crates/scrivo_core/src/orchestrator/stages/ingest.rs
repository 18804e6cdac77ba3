//! Ingest: probe the source, transcode if needed, plan chunking.

use std::path::PathBuf;

use serde_json::Value;

use crate::media;
use crate::models::{Job, StageName};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::{Stage, StageContext};
use crate::planner::{plan_chunking, INPUT_TOKENS_PER_SECOND};
use crate::providers::IngestArtifact;
use crate::store::layout::MEDIA_DIR;

pub struct IngestStage;

impl Stage for IngestStage {
    fn name(&self) -> StageName {
        StageName::Ingest
    }

    fn execute(&self, ctx: &StageContext, job: &mut Job) -> StageResult<Value> {
        let original = ctx
            .dirs
            .original_media()
            .map_err(|e| StageError::io_error("locating original media", e))?
            .ok_or_else(|| {
                StageError::file_not_found(format!("{}/original.*", ctx.dirs.media().display()))
            })?;

        ctx.logger.section("Analyzing media");
        let meta = media::probe(&original)?;
        let duration = meta.duration_seconds.unwrap_or(0.0);
        ctx.logger.info(&format!(
            "Duration {:.1}s, format {}, {} bytes",
            duration,
            meta.format.as_deref().unwrap_or("unknown"),
            meta.file_size_bytes.unwrap_or(0)
        ));
        job.media = meta.clone();

        let window = job.config.transcribe.context_window;
        let estimated_input = (duration * INPUT_TOKENS_PER_SECOND) as u64;
        let plan = plan_chunking(
            estimated_input,
            window.input_tokens,
            window.output_tokens,
            duration,
        );
        ctx.logger.info(&format!("Chunking: {}", plan.reason));

        let media_path = if media::needs_transcode(&original) {
            ctx.logger.section("Transcoding audio");
            let output = ctx.dirs.media().join("compressed.ogg");
            ctx.logger
                .command(&format!("ffmpeg -i {} -> compressed.ogg", original.display()));
            media::transcode_to_ogg(&original, &output)?;
            PathBuf::from(MEDIA_DIR).join("compressed.ogg")
        } else {
            let name = original
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_default();
            PathBuf::from(MEDIA_DIR).join(name)
        };

        let artifact = IngestArtifact {
            media_path,
            media: meta,
            plan,
            cache_name: None,
        };
        Ok(serde_json::to_value(&artifact)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ChunkMethod;

    // Probe and transcode need external tools; those paths are covered in
    // the media module. Here we check the report shape round-trips.
    #[test]
    fn ingest_report_parses_back_to_artifact() {
        let artifact = IngestArtifact {
            media_path: PathBuf::from("media/compressed.ogg"),
            media: Default::default(),
            plan: plan_chunking(3000, 1_048_576, 8_192, 300.0),
            cache_name: None,
        };

        let value = serde_json::to_value(&artifact).unwrap();
        let back: IngestArtifact = serde_json::from_value(value).unwrap();
        assert_eq!(back.media_path, PathBuf::from("media/compressed.ogg"));
        assert_eq!(back.plan.method, ChunkMethod::None);
    }
}
