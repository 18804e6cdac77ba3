//! On-disk layout of a single job directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::StageName;

/// Subdirectory holding the copied source media.
pub const MEDIA_DIR: &str = "media";
/// Subdirectory holding transcripts and checkpoints.
pub const TRANSCRIPTS_DIR: &str = "transcripts";
/// Subdirectory holding generated note artifacts.
pub const ARTIFACTS_DIR: &str = "artifacts";
/// Subdirectory holding per-stage result reports.
pub const STAGES_DIR: &str = "stages";
/// The job document file name.
pub const JOB_FILE: &str = "job.json";

/// Resolved paths inside one job directory.
#[derive(Debug, Clone)]
pub struct JobDirs {
    root: PathBuf,
}

impl JobDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn media(&self) -> PathBuf {
        self.root.join(MEDIA_DIR)
    }

    pub fn transcripts(&self) -> PathBuf {
        self.root.join(TRANSCRIPTS_DIR)
    }

    pub fn artifacts(&self) -> PathBuf {
        self.root.join(ARTIFACTS_DIR)
    }

    pub fn stages(&self) -> PathBuf {
        self.root.join(STAGES_DIR)
    }

    pub fn job_file(&self) -> PathBuf {
        self.root.join(JOB_FILE)
    }

    /// Per-stage result report, `stages/<stage>.json`.
    pub fn stage_file(&self, stage: StageName) -> PathBuf {
        self.stages().join(format!("{}.json", stage.as_str()))
    }

    /// Streaming engine checkpoint of accumulated segments.
    pub fn partial_segments(&self) -> PathBuf {
        self.transcripts().join("partial_segments.json")
    }

    /// Final ordered transcript.
    pub fn segments(&self) -> PathBuf {
        self.transcripts().join("segments.json")
    }

    /// Refined analysis document.
    pub fn analysis(&self) -> PathBuf {
        self.transcripts().join("analysis.json")
    }

    /// Create every subdirectory this layout expects.
    pub fn create_all(&self) -> io::Result<()> {
        fs::create_dir_all(self.media())?;
        fs::create_dir_all(self.transcripts())?;
        fs::create_dir_all(self.artifacts())?;
        fs::create_dir_all(self.stages())?;
        Ok(())
    }

    /// Locate the copied source file, `media/original.<ext>`.
    pub fn original_media(&self) -> io::Result<Option<PathBuf>> {
        let media = self.media();
        if !media.exists() {
            return Ok(None);
        }
        for entry in fs::read_dir(&media)? {
            let path = entry?.path();
            let is_original = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s == "original")
                .unwrap_or(false);
            if is_original {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

/// Replace characters unsafe for directory names.
pub fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
