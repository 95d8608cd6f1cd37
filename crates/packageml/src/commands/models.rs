//! Model commands - configure, inspect and train models.

use anyhow::Result;
use clap::Subcommand;
use orchestrator::Services;
use serde_json::{Map, Value};
use tabular_structs::{CreateModel, ModelFamily, ModelUpdate, TaskType};
use tracing::info;
use uuid::Uuid;

use super::{jobs::wait_and_report, parse_param, print_json};

#[derive(Subcommand)]
pub enum ModelCommand {
    /// Configure a model over a dataset
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(long)]
        dataset: Uuid,

        /// One of logistic_regression, linear_regression, neural_network, kmeans, pca
        #[arg(short, long)]
        family: ModelFamily,

        /// One of classification, regression, clustering, dimensionality_reduction
        #[arg(short, long)]
        task: TaskType,

        /// Target column, required for classification and regression
        #[arg(long)]
        target: Option<String>,

        /// Feature columns (defaults to every column except the target)
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<String>>,

        /// Hyperparameter as key=value; may be repeated
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Change a model's configuration
    Update {
        id: Uuid,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long, conflicts_with = "clear_target")]
        target: Option<String>,

        /// Remove the target column
        #[arg(long)]
        clear_target: bool,

        #[arg(long, value_delimiter = ',', conflicts_with = "clear_features")]
        features: Option<Vec<String>>,

        /// Go back to using every column except the target
        #[arg(long)]
        clear_features: bool,

        /// Replaces all hyperparameters; may be repeated
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },

    /// List models
    List,

    /// Show a model with its latest metrics
    Show { id: Uuid },

    /// Delete a model; jobs referencing it are kept
    Delete { id: Uuid },

    /// Train a model on its dataset and wait for the result
    Train { id: Uuid },
}

/// Runs a model command.
///
/// # Errors
///
/// Returns an error if the service rejects the request or the training job
/// cannot be followed.
pub async fn run(services: &Services, owner: Uuid, command: ModelCommand) -> Result<()> {
    let models = &services.models;

    match command {
        ModelCommand::Create {
            name,
            dataset,
            family,
            task,
            target,
            features,
            params,
            description,
        } => {
            let model = models
                .create(CreateModel {
                    owner_id: owner,
                    name,
                    description,
                    family,
                    task_type: task,
                    hyperparameters: params.into_iter().collect(),
                    target_column: target,
                    feature_columns: features,
                    dataset_id: dataset,
                })
                .await?;
            info!(model_id = %model.id, "Model created");
            print_json(&model)?;
        }
        ModelCommand::Update {
            id,
            name,
            description,
            target,
            clear_target,
            features,
            clear_features,
            params,
        } => {
            let update = ModelUpdate {
                name,
                description,
                hyperparameters: (!params.is_empty())
                    .then(|| params.into_iter().collect::<Map<String, Value>>()),
                target_column: if clear_target { Some(None) } else { target.map(Some) },
                feature_columns: if clear_features {
                    Some(None)
                } else {
                    features.map(Some)
                },
            };
            let model = models.update(id, owner, update).await?;
            info!(model_id = %model.id, "Model updated");
            print_json(&model)?;
        }
        ModelCommand::List => {
            print_json(&models.list(owner).await?)?;
        }
        ModelCommand::Show { id } => {
            print_json(&models.get(id, owner).await?)?;
        }
        ModelCommand::Delete { id } => {
            models.delete(id, owner).await?;
            info!(model_id = %id, "Model deleted");
        }
        ModelCommand::Train { id } => {
            let job = services.jobs.train_now(id, owner).await?;
            info!(job_id = %job.id, model_id = %id, "Training started");
            wait_and_report(services, job.id, owner).await?;
        }
    }

    Ok(())
}
