use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info, warn};

use studyhub::config::{load_config, Config};
use studyhub::db::resource_repo::{self, ResourceRow};
use studyhub::db::Database;
use studyhub::jobs::{JobReaper, Orchestrator, SubmitOutcome, SubmitRequest};
use studyhub::rag::RagIndexer;
use studyhub::telemetry::{self, LogFormat};
use studyhub::StudyHubError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON config file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `database.path` from the config.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue an analysis job for a resource
    Submit {
        #[arg(long)]
        resource: String,
        /// Local path or http(s) URL. Defaults to the resource's own file.
        #[arg(long)]
        file: Option<String>,
        #[arg(long = "type")]
        file_type: Option<String>,
        /// Record the upload without analysing it
        #[arg(long)]
        no_analysis: bool,
        /// Print the finished job instead of the submission receipt
        #[arg(long)]
        wait: bool,
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
    /// Print a job as JSON
    Status { job_id: String },
    /// Fail stale jobs and purge old finished ones
    Sweep,
    /// Search stored excerpts
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Manage resources
    Resource {
        #[command(subcommand)]
        command: ResourceCommands,
    },
}

#[derive(Subcommand)]
enum ResourceCommands {
    /// Register a resource so it can be analysed
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        /// Local path or http(s) URL
        #[arg(long)]
        file: String,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        uploader: Option<String>,
        #[arg(long = "type")]
        file_type: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init_tracing(cli.log_format, "info") {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, StudyHubError> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let db_path = cli
        .database
        .clone()
        .or_else(|| config.database.resolved_path())
        .ok_or_else(|| StudyHubError::Config(studyhub::ConfigError::Validation {
            message: "No database path configured and no home directory found".to_string(),
        }))?;
    let db = Database::open(&db_path)?;

    let orchestrator = Orchestrator::from_config(db.clone(), &config);
    let reaper = JobReaper::from_config(orchestrator.store().clone(), &config.jobs);

    if !matches!(cli.command, Commands::Sweep) {
        if let Err(e) = reaper.sweep() {
            warn!("Startup sweep failed: {}", e);
        }
    }

    match cli.command {
        Commands::Submit {
            resource,
            file,
            file_type,
            no_analysis,
            wait,
            timeout_secs,
        } => {
            let outcome = orchestrator.submit(SubmitRequest {
                resource_id: resource,
                file_path: file,
                file_type,
                enable_analysis: !no_analysis,
            })?;

            let job_id = match &outcome {
                SubmitOutcome::AnalysisDisabled => {
                    print_json(&json!({ "status": "ANALYSIS_DISABLED" }));
                    return Ok(ExitCode::SUCCESS);
                }
                SubmitOutcome::Accepted { job_id, status, progress } => {
                    if !wait {
                        print_json(&json!({ "jobId": job_id, "status": status, "progress": progress }));
                    }
                    job_id.clone()
                }
                SubmitOutcome::AlreadyRunning { job_id, status, progress } => {
                    info!("Resource already has job {} in flight", job_id);
                    if !wait {
                        print_json(&json!({
                            "jobId": job_id,
                            "status": status,
                            "progress": progress,
                            "alreadyRunning": true,
                        }));
                    }
                    job_id.clone()
                }
            };

            // The job runs inside this process, so it has to finish before exit.
            let job = orchestrator
                .wait_for_terminal(&job_id, POLL_INTERVAL, Duration::from_secs(timeout_secs))
                .await?;
            if wait {
                if let Some(view) = orchestrator.get_status(&job.id)? {
                    print_json(&view);
                }
            }
            Ok(if job.status == studyhub::JobStatus::Completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Status { job_id } => match orchestrator.get_status(&job_id)? {
            Some(view) => {
                print_json(&view);
                Ok(ExitCode::SUCCESS)
            }
            None => {
                error!("Job '{}' not found", job_id);
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::Sweep => {
            let report = reaper.sweep()?;
            print_json(&json!({
                "failed": report.failed,
                "skipped": report.skipped,
                "purged": report.purged,
            }));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Search { query, limit } => {
            let indexer = RagIndexer::new(db, config.pipeline.rag_excerpt_chars);
            print_json(&indexer.search(&query, limit)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resource {
            command:
                ResourceCommands::Add {
                    id,
                    title,
                    file,
                    course,
                    uploader,
                    file_type,
                },
        } => {
            let mut row = ResourceRow::new(id, title);
            if file.starts_with("http://") || file.starts_with("https://") {
                row.file_url = Some(file);
            } else {
                row.file_path = Some(file);
            }
            row.course_title = course;
            row.uploader = uploader;
            row.file_type = file_type;
            resource_repo::insert(&db, &row)?;
            info!("Registered resource {}", row.id);
            print_json(&json!({ "id": row.id, "title": row.title }));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => error!("Failed to encode output: {}", e),
    }
}
