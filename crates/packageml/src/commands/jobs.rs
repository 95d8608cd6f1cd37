//! Job commands - create, run, cancel and inspect training jobs.

use anyhow::Result;
use clap::Subcommand;
use orchestrator::{NewJob, Services};
use tabular_structs::{ColumnOverrides, JobStatus};
use tracing::{info, warn};
use uuid::Uuid;

use super::{print_json, POLL_INTERVAL};

#[derive(Subcommand)]
pub enum JobCommand {
    /// Create a training job for a model and dataset
    Create {
        #[arg(short, long)]
        model: Uuid,

        #[arg(short, long)]
        dataset: Uuid,

        #[arg(short, long, default_value = "Training job")]
        name: String,

        /// Target column overriding the model's
        #[arg(long)]
        target: Option<String>,

        /// Feature columns overriding the model's
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<String>>,

        /// Start the job right away and wait for it
        #[arg(short, long)]
        start: bool,
    },

    /// Start a pending job and wait for it
    Start { id: Uuid },

    /// Cancel a running job
    Cancel { id: Uuid },

    /// List jobs
    List,

    /// Show a job
    Show { id: Uuid },

    /// Delete a job in any state
    Delete { id: Uuid },
}

/// Runs a job command.
///
/// # Errors
///
/// Returns an error if the service rejects the request.
pub async fn run(services: &Services, owner: Uuid, command: JobCommand) -> Result<()> {
    let jobs = &services.jobs;

    match command {
        JobCommand::Create {
            model,
            dataset,
            name,
            target,
            features,
            start,
        } => {
            let request = NewJob {
                name,
                model_id: model,
                dataset_id: dataset,
                overrides: ColumnOverrides {
                    target_column: target,
                    feature_columns: features,
                },
            };
            let job = jobs.create(owner, request, start).await?;
            info!(job_id = %job.id, status = %job.status, "Job created");

            if start {
                wait_and_report(services, job.id, owner).await?;
            } else {
                print_json(&job)?;
            }
        }
        JobCommand::Start { id } => {
            jobs.start(id, owner).await?;
            info!(job_id = %id, "Job started");
            wait_and_report(services, id, owner).await?;
        }
        JobCommand::Cancel { id } => {
            let job = jobs.cancel(id, owner).await?;
            info!(job_id = %id, "Job cancelled");
            print_json(&job)?;
        }
        JobCommand::List => {
            print_json(&jobs.list(owner).await?)?;
        }
        JobCommand::Show { id } => {
            print_json(&jobs.get(id, owner).await?)?;
        }
        JobCommand::Delete { id } => {
            jobs.delete(id, owner).await?;
            info!(job_id = %id, "Job deleted");
        }
    }

    Ok(())
}

/// Waits for a job this process started and prints its final state.
///
/// # Errors
///
/// Returns an error if the job cannot be read while waiting.
pub async fn wait_and_report(services: &Services, id: Uuid, owner: Uuid) -> Result<()> {
    let job = services
        .jobs
        .wait_for_terminal(id, owner, POLL_INTERVAL)
        .await?;

    match job.status {
        JobStatus::Completed => info!(job_id = %id, "Job completed"),
        _ => warn!(
            job_id = %id,
            error = job.error_message.as_deref().unwrap_or_default(),
            "Job failed"
        ),
    }

    print_json(&job)
}
