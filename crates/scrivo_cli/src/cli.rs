//! Command-line interface for scrivo
//!
//! Provides argument parsing using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use scrivo_core::models::StageName;

/// Turn recorded media into organized notes
#[derive(Parser, Debug)]
#[command(name = "scrivo", version, about = "Turn recorded media into organized notes")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a job from a media file and run the full pipeline
    Run {
        /// Media file to process (mp3, wav, ogg, m4a, mp4, mov, mkv, webm)
        file: PathBuf,

        /// Skip transcription and analyze the media directly
        #[arg(long)]
        skip_transcription: bool,

        /// First stage to run (earlier stages are left untouched)
        #[arg(long, value_name = "STAGE", value_parser = parse_stage)]
        start_at: Option<StageName>,

        /// Stop after this stage without finalizing
        #[arg(long, value_name = "STAGE", value_parser = parse_stage)]
        stop_after: Option<StageName>,
    },

    /// Analyze the media and plan the transcription (first stage)
    Ingest(StageArgs),

    /// Run the streaming transcription loop
    Transcribe(StageArgs),

    /// Refine the transcript into a structured analysis
    Refine(StageArgs),

    /// Render the notes document from the analysis
    Generate(StageArgs),

    /// Categorize the job and preview its destination
    Organize(StageArgs),

    /// Inspect and manage jobs
    Jobs {
        /// Action to perform
        #[command(subcommand)]
        action: JobsAction,
    },
}

/// Arguments shared by the per-stage commands.
#[derive(Args, Debug)]
pub struct StageArgs {
    /// Job id, or a path to a job directory
    pub job_id: String,
}

/// Job management commands
#[derive(Subcommand, Debug)]
pub enum JobsAction {
    /// List jobs in the work area
    List {
        /// Include finalized jobs from the results area
        #[arg(long)]
        all: bool,
    },

    /// Show the full state of a job
    Show {
        /// Job id, or a path to a job directory
        job_id: String,
    },

    /// Reset a failed job so it can run again
    Retry {
        /// Job id
        job_id: String,

        /// Reset from this stage instead of the first failed one
        #[arg(long, value_name = "STAGE", value_parser = parse_stage)]
        from_stage: Option<StageName>,
    },

    /// Remove stale jobs from the work area
    Cleanup {
        /// Override the configured retention window, in days
        #[arg(long, value_name = "DAYS")]
        days: Option<i64>,

        /// Override the configured status filter (e.g. failed); "any"
        /// removes every job past retention
        #[arg(long, value_name = "STATUS")]
        status: Option<String>,
    },

    /// Move a finished job into the results area
    Finalize {
        /// Job id
        job_id: String,
    },

    /// Delete a job from the work area
    Delete {
        /// Job id
        job_id: String,
    },
}

/// Parse a stage name argument.
fn parse_stage(s: &str) -> Result<StageName, String> {
    StageName::parse(s).ok_or_else(|| {
        format!("unknown stage '{s}' (expected ingest, transcribe, refine, generate, or organize)")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_flags() {
        let cli = Cli::try_parse_from([
            "scrivo",
            "run",
            "talk.mp3",
            "--skip-transcription",
            "--stop-after",
            "refine",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                skip_transcription,
                stop_after,
                ..
            } => {
                assert!(skip_transcription);
                assert_eq!(stop_after, Some(StageName::Refine));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_stage() {
        let err = Cli::try_parse_from(["scrivo", "run", "talk.mp3", "--start-at", "polish"])
            .unwrap_err();
        assert!(err.to_string().contains("unknown stage"));
    }
}
