use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use scrivo_core::config::ConfigManager;
use scrivo_core::logging::{init_tracing, JobLogger};
use scrivo_core::models::{StageName, StageStatus};
use scrivo_core::orchestrator::{Orchestrator, RunOptions, RunOutcome};
use scrivo_core::providers::ProviderRegistry;
use scrivo_core::store::JobStore;

mod cli;

use cli::{Cli, Commands, JobsAction, StageArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(".config/scrivo.toml"));
    let mut config = ConfigManager::new(&config_path);
    config
        .load_or_create()
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    config.ensure_dirs_exist()?;

    let settings = config.settings().clone();
    init_tracing(settings.logging.to_log_config().level);

    let store = JobStore::open(&settings.paths.work_dir, &settings.paths.results_dir)?;
    // Vendor transports register themselves here; without any, the
    // transcribe and refine stages report an unknown provider.
    let registry = ProviderRegistry::new();
    let orchestrator = Orchestrator::new(&store, &registry);

    match cli.command {
        Commands::Run {
            file,
            skip_transcription,
            start_at,
            stop_after,
        } => {
            let job = store
                .create_job(&file, settings.to_job_config())
                .with_context(|| format!("creating job from {}", file.display()))?;
            println!("Created job {}", job.job_id);

            let logger = job_logger(&settings, &config, &job.job_id)?;
            let options = RunOptions {
                start_at,
                stop_after,
                skip_transcription,
            };
            match orchestrator.run_all(&job.job_id, options, &logger)? {
                RunOutcome::Finalized(dest) => {
                    println!("Finalized to {}", dest.display());
                }
                RunOutcome::Stopped(stage) => {
                    println!("Stopped after {stage}; job {} left in work area", job.job_id);
                }
            }
        }

        Commands::Ingest(args) => run_stage(&orchestrator, &settings, &config, StageName::Ingest, &args)?,
        Commands::Transcribe(args) => {
            run_stage(&orchestrator, &settings, &config, StageName::Transcribe, &args)?
        }
        Commands::Refine(args) => run_stage(&orchestrator, &settings, &config, StageName::Refine, &args)?,
        Commands::Generate(args) => {
            run_stage(&orchestrator, &settings, &config, StageName::Generate, &args)?
        }
        Commands::Organize(args) => {
            run_stage(&orchestrator, &settings, &config, StageName::Organize, &args)?
        }

        Commands::Jobs { action } => handle_jobs_command(&store, &settings, action)?,
    }

    Ok(())
}

/// Build the per-job file logger under the configured logs directory.
fn job_logger(
    settings: &scrivo_core::config::Settings,
    config: &ConfigManager,
    job_id: &str,
) -> Result<JobLogger> {
    JobLogger::new(
        job_id,
        config.logs_dir(),
        settings.logging.to_log_config(),
        None,
    )
    .with_context(|| format!("opening job log for {job_id}"))
}

/// Run a single stage and print its report.
fn run_stage(
    orchestrator: &Orchestrator,
    settings: &scrivo_core::config::Settings,
    config: &ConfigManager,
    stage: StageName,
    args: &StageArgs,
) -> Result<()> {
    let logger = job_logger(settings, config, &args.job_id)?;
    let report = orchestrator.run_stage(stage, &args.job_id, &logger)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Handle job management commands.
fn handle_jobs_command(
    store: &JobStore,
    settings: &scrivo_core::config::Settings,
    action: JobsAction,
) -> Result<()> {
    match action {
        JobsAction::List { all } => {
            let jobs = store.list_jobs(all)?;
            if jobs.is_empty() {
                println!("No jobs found");
                return Ok(());
            }
            for summary in jobs {
                let state = if summary.finalized {
                    "finalized".to_string()
                } else {
                    match summary.job.first_failed_stage() {
                        Some(stage) => format!("failed at {stage}"),
                        None => format!("at {}", summary.job.current_stage),
                    }
                };
                println!(
                    "{}  {}  {} ({})",
                    summary.job.created_at.format("%Y-%m-%d %H:%M"),
                    summary.job.job_id,
                    state,
                    summary.job.original_file,
                );
            }
        }

        JobsAction::Show { job_id } => {
            let job = store.load(&job_id)?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }

        JobsAction::Retry {
            job_id,
            from_stage,
        } => {
            let stage = store.retry_job(&job_id, from_stage)?;
            println!("Job {job_id} reset; next run starts at {stage}");
        }

        JobsAction::Cleanup { days, status } => {
            let retention = days.unwrap_or(settings.cleanup.retention_days);
            let filter = match status {
                Some(s) if s.eq_ignore_ascii_case("any") => None,
                Some(s) => Some(parse_status(&s)?),
                None => settings.cleanup.status_filter(),
            };
            let removed = store.cleanup_old_jobs(retention, filter)?;
            println!("Removed {removed} job(s) older than {retention} day(s)");
        }

        JobsAction::Finalize { job_id } => {
            let dest = store.finalize_job(&job_id)?;
            println!("Finalized to {}", dest.display());
        }

        JobsAction::Delete { job_id } => {
            store.delete(&job_id)?;
            println!("Deleted job {job_id}");
        }
    }
    Ok(())
}

fn parse_status(s: &str) -> Result<StageStatus> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(StageStatus::Pending),
        "in_progress" => Ok(StageStatus::InProgress),
        "completed" => Ok(StageStatus::Completed),
        "failed" => Ok(StageStatus::Failed),
        "skipped" => Ok(StageStatus::Skipped),
        other => anyhow::bail!("unknown status '{other}'"),
    }
}
