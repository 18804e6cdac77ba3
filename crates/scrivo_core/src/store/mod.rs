//! Persistent job store: creation, state transitions, retry, finalize.
//!
//! The store owns two areas: `work_dir` for active jobs and
//! `results_dir` for finalized ones. Every mutation of the job document
//! goes through an atomic temp-file-and-rename write so a crash never
//! leaves a half-written `job.json`.

pub mod layout;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::models::{Job, JobConfig, RoutingStrategy, StageName, StageState, StageStatus};

pub use layout::{sanitize_id, JobDirs};

/// Source file extensions the store accepts.
const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "mp4", "mov", "mkv", "webm"];

/// Errors from job store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid source file: {0}")]
    InvalidSource(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("No failed stages in job {0}")]
    NoFailedStage(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse job document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A job plus where it lives on disk.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job: Job,
    pub location: PathBuf,
    pub finalized: bool,
}

/// Filesystem-backed job store.
pub struct JobStore {
    work_dir: PathBuf,
    results_dir: PathBuf,
}

impl JobStore {
    /// Open the store, creating the work and results areas if missing.
    pub fn open(work_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self {
            work_dir: work_dir.into(),
            results_dir: results_dir.into(),
        };
        fs::create_dir_all(&store.work_dir)?;
        fs::create_dir_all(&store.results_dir)?;
        Ok(store)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Resolve a job id (or an absolute job directory path) to its layout.
    pub fn job_dirs(&self, id_or_path: &str) -> JobDirs {
        let as_path = Path::new(id_or_path);
        if as_path.is_absolute() && as_path.exists() {
            return JobDirs::new(as_path);
        }
        JobDirs::new(self.work_dir.join(id_or_path))
    }

    /// Create a new job from a source file.
    ///
    /// Validates the source up front, builds the job directory layout,
    /// copies the source to `media/original.<ext>`, and persists the job
    /// document with every stage pending.
    pub fn create_job(&self, source: &Path, config: JobConfig) -> StoreResult<Job> {
        let extension = validate_source(source)?;

        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled");
        let job_id = self.allocate_job_id(stem);

        let dirs = self.job_dirs(&job_id);
        dirs.create_all()?;
        fs::copy(source, dirs.media().join(format!("original.{extension}")))?;

        let original_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(stem)
            .to_string();
        let mut job = Job::new(job_id, original_name, config);
        self.save(&mut job)?;

        tracing::info!(job_id = %job.job_id, "Created job");
        Ok(job)
    }

    /// Pick a fresh job id, suffixing on collision.
    fn allocate_job_id(&self, stem: &str) -> String {
        let base = sanitize_id(&format!("{}_{}", Utc::now().format("%y-%m%d-%H%M%S"), stem));
        if !self.work_dir.join(&base).exists() {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !self.work_dir.join(&candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Persist the job document atomically, bumping `updated_at`.
    pub fn save(&self, job: &mut Job) -> StoreResult<()> {
        job.updated_at = Utc::now();
        let path = self.job_dirs(&job.job_id).job_file();
        atomic_write_json(&path, job)?;
        Ok(())
    }

    /// Load a job by id or absolute job directory path.
    pub fn load(&self, id_or_path: &str) -> StoreResult<Job> {
        let path = self.job_dirs(id_or_path).job_file();
        if !path.exists() {
            return Err(StoreError::NotFound(id_or_path.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Remove a job directory entirely.
    pub fn delete(&self, job_id: &str) -> StoreResult<()> {
        let dirs = self.job_dirs(job_id);
        if !dirs.job_file().exists() {
            return Err(StoreError::NotFound(job_id.to_string()));
        }
        fs::remove_dir_all(dirs.root())?;
        Ok(())
    }

    /// List jobs, newest first.
    ///
    /// Active jobs come from the work area; with `include_history`, the
    /// results area is scanned recursively for finalized job documents.
    pub fn list_jobs(&self, include_history: bool) -> StoreResult<Vec<JobSummary>> {
        let mut jobs = Vec::new();

        for entry in fs::read_dir(&self.work_dir)? {
            let dir = entry?.path();
            if !dir.is_dir() {
                continue;
            }
            match self.load_from_dir(&dir) {
                Ok(Some(job)) => jobs.push(JobSummary {
                    job,
                    location: dir,
                    finalized: false,
                }),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping unreadable job at {}: {e}", dir.display()),
            }
        }

        if include_history {
            let mut found = Vec::new();
            collect_job_files(&self.results_dir, &mut found)?;
            for job_file in found {
                let dir = job_file.parent().map(Path::to_path_buf).unwrap_or_default();
                match self.load_from_dir(&dir) {
                    Ok(Some(job)) => jobs.push(JobSummary {
                        job,
                        location: dir,
                        finalized: true,
                    }),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("Skipping unreadable result at {}: {e}", dir.display())
                    }
                }
            }
        }

        jobs.sort_by(|a, b| b.job.created_at.cmp(&a.job.created_at));
        Ok(jobs)
    }

    fn load_from_dir(&self, dir: &Path) -> StoreResult<Option<Job>> {
        let job_file = JobDirs::new(dir).job_file();
        if !job_file.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&job_file)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Active jobs whose prerequisites for `stage` are all completed.
    pub fn get_ready_jobs(&self, stage: StageName) -> StoreResult<Vec<JobSummary>> {
        let jobs = self.list_jobs(false)?;
        Ok(jobs
            .into_iter()
            .filter(|s| s.job.is_ready_for(stage))
            .collect())
    }

    /// Reset a job to rerun from a stage.
    ///
    /// With no explicit stage, restarts from the first failed one. The
    /// chosen stage and everything after it go back to pending; the error
    /// log is cleared. Returns the stage the job will resume from.
    pub fn retry_job(&self, job_id: &str, from_stage: Option<StageName>) -> StoreResult<StageName> {
        let mut job = self.load(job_id)?;

        let from = match from_stage {
            Some(stage) => stage,
            None => job
                .first_failed_stage()
                .ok_or_else(|| StoreError::NoFailedStage(job_id.to_string()))?,
        };

        for stage in &StageName::ORDER[from.order_index()..] {
            job.stages.insert(*stage, StageState::default());
        }
        job.current_stage = from;
        job.errors.clear();
        self.save(&mut job)?;

        tracing::info!(job_id, stage = %from, "Reset job for retry");
        Ok(from)
    }

    /// Move a finished job into the results area.
    ///
    /// The destination follows the job's routing strategy: `timeline`
    /// nests under `YYYY/MM/DD/<id>`, `flat` under `notes/<id>`. The copy
    /// excludes `stages/`; afterwards the working copy is pruned of heavy
    /// directories unless the job is in debug mode.
    pub fn finalize_job(&self, job_id: &str) -> StoreResult<PathBuf> {
        let job = self.load(job_id)?;
        let dirs = self.job_dirs(job_id);

        let dest = match job.config.routing {
            RoutingStrategy::Timeline => {
                let date_path = job.created_at.format("%Y/%m/%d").to_string();
                self.results_dir.join(date_path).join(&job.job_id)
            }
            RoutingStrategy::Flat => self.results_dir.join("notes").join(&job.job_id),
        };

        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_dir_excluding(dirs.root(), &dest, &[layout::STAGES_DIR])?;

        if !job.config.debug {
            for heavy in [dirs.media(), dirs.transcripts(), dirs.artifacts()] {
                if heavy.exists() {
                    fs::remove_dir_all(&heavy)?;
                }
            }
            tracing::info!(job_id, "Pruned working copy");
        } else {
            tracing::info!(job_id, "Debug job, keeping full working copy");
        }

        Ok(dest)
    }

    /// Delete active jobs not updated within the retention window.
    ///
    /// With a status filter, only jobs where some stage carries that
    /// status are removed. Returns the number of jobs deleted.
    pub fn cleanup_old_jobs(
        &self,
        retention_days: i64,
        status_filter: Option<StageStatus>,
    ) -> StoreResult<usize> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let mut removed = 0;

        for summary in self.list_jobs(false)? {
            if summary.job.updated_at > cutoff {
                continue;
            }
            if let Some(status) = status_filter {
                let matches = summary.job.stages.values().any(|s| s.status == status);
                if !matches {
                    continue;
                }
            }
            fs::remove_dir_all(&summary.location)?;
            removed += 1;
            tracing::info!(job_id = %summary.job.job_id, "Cleaned up old job");
        }

        Ok(removed)
    }

    /// Write a stage's result report to `stages/<stage>.json`.
    pub fn write_stage_report(
        &self,
        job_id: &str,
        stage: StageName,
        report: &serde_json::Value,
    ) -> StoreResult<()> {
        let path = self.job_dirs(job_id).stage_file(stage);
        atomic_write_json(&path, report)?;
        Ok(())
    }

    /// Read back a stage's result report, if it has run.
    pub fn read_stage_report(
        &self,
        job_id: &str,
        stage: StageName,
    ) -> StoreResult<Option<serde_json::Value>> {
        let path = self.job_dirs(job_id).stage_file(stage);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// Check a source file is present, non-empty, and of a supported type.
/// Returns the lowercased extension.
fn validate_source(source: &Path) -> StoreResult<String> {
    if !source.is_file() {
        return Err(StoreError::InvalidSource(format!(
            "{} does not exist or is not a file",
            source.display()
        )));
    }
    let size = fs::metadata(source)?.len();
    if size == 0 {
        return Err(StoreError::InvalidSource(format!(
            "{} is empty",
            source.display()
        )));
    }
    let extension = source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(StoreError::InvalidSource(format!(
            "unsupported file type '.{extension}' (supported: {})",
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }
    Ok(extension)
}

/// Serialize to a temp file in the target directory, then rename.
fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Recursive copy, skipping the named top-level entries.
fn copy_dir_excluding(src: &Path, dst: &Path, exclude_top: &[&str]) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude_top.iter().any(|e| name.to_string_lossy() == *e) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        if from.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Recursively collect `job.json` paths under a root.
fn collect_job_files(root: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    if !root.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_job_files(&path, out)?;
        } else if path.file_name().map(|n| n == layout::JOB_FILE).unwrap_or(false) {
            out.push(path);
        }
    }
    Ok(())
}
