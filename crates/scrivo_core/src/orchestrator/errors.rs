//! Error types for the stage pipeline.
//!
//! Errors carry context that chains through layers:
//! Job → Stage → Operation → Detail

use std::io;

use thiserror::Error;

use crate::engine::EngineError;
use crate::media::MediaError;
use crate::models::StageName;
use crate::providers::ProviderError;
use crate::store::StoreError;

/// Top-level pipeline error with job context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage failed during execution.
    #[error("Job '{job_id}' failed at stage '{stage}': {source}")]
    StageFailed {
        job_id: String,
        stage: StageName,
        #[source]
        source: StageError,
    },

    /// The job store refused an operation.
    #[error("Job '{job_id}' store operation failed: {source}")]
    Store {
        job_id: String,
        #[source]
        source: StoreError,
    },

    /// Failed to set up the run itself.
    #[error("Job '{job_id}' setup failed: {message}")]
    SetupFailed { job_id: String, message: String },
}

impl PipelineError {
    pub fn stage_failed(job_id: impl Into<String>, stage: StageName, source: StageError) -> Self {
        Self::StageFailed {
            job_id: job_id.into(),
            stage,
            source,
        }
    }

    pub fn store(job_id: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            job_id: job_id.into(),
            source,
        }
    }

    pub fn setup_failed(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            job_id: job_id.into(),
            message: message.into(),
        }
    }
}

/// Error from a single stage with operation context.
#[derive(Error, Debug)]
pub enum StageError {
    /// Input validation failed.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// A prerequisite stage has not completed.
    #[error("Precondition not met: {0}")]
    PreconditionFailed(String),

    /// A required file was not found.
    #[error("Required file not found: {path}")]
    FileNotFound { path: String },

    /// The provider reported an error.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// An external command failed.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// Parsing error (JSON documents, probe output).
    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// The transcription loop hit its turn cap without completing.
    #[error("Transcription exceeded the safety bound of {turns} turns")]
    SafetyBoundExceeded { turns: u32 },

    /// Generic stage error with message.
    #[error("{0}")]
    Other(String),
}

impl StageError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn io_error(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn parse_error(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<MediaError> for StageError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::FileNotFound(path) => StageError::FileNotFound {
                path: path.display().to_string(),
            },
            MediaError::Launch { tool, message } => StageError::CommandFailed {
                tool,
                exit_code: -1,
                message,
            },
            MediaError::CommandFailed {
                tool,
                exit_code,
                message,
            } => StageError::CommandFailed {
                tool,
                exit_code,
                message,
            },
            MediaError::BadOutput { tool, message } => StageError::Parse {
                what: format!("{tool} output"),
                message,
            },
        }
    }
}

impl From<EngineError> for StageError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::SafetyBound { turns } => StageError::SafetyBoundExceeded { turns },
            EngineError::Provider(p) => StageError::Provider(p),
            EngineError::Checkpoint(source) => StageError::Io {
                operation: "checkpoint write".to_string(),
                source,
            },
        }
    }
}

impl From<serde_json::Error> for StageError {
    fn from(e: serde_json::Error) -> Self {
        StageError::Parse {
            what: "JSON document".to_string(),
            message: e.to_string(),
        }
    }
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
