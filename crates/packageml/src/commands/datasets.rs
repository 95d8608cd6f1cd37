//! Dataset commands - ingest, inspect and delete datasets.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use orchestrator::{Services, UploadOptions};
use serde::Serialize;
use tabular_structs::{ColumnSchema, DatasetMetadata, DatasetSummary, FileType, Row};
use tracing::info;
use uuid::Uuid;

use super::print_json;

#[derive(Subcommand)]
pub enum DatasetCommand {
    /// Register a JSON array of row objects as a dataset
    Create {
        /// Path to a JSON file holding an array of objects
        #[arg(short, long)]
        file: PathBuf,

        /// Dataset name
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Comma separated tags
        #[arg(short, long)]
        tags: Option<String>,
    },

    /// Upload a CSV, JSON or Excel file; columns are normalized to one kind each
    Upload {
        /// Path to the `.csv` or `.json` file
        #[arg(short, long)]
        file: PathBuf,

        /// Dataset name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// The CSV file has no header record; columns become Column1..N
        #[arg(long)]
        no_header: bool,
    },

    /// Generate a sample dataset ("Customer Data", "Sales Data" or "Product Catalog")
    Randomize {
        #[arg(short, long)]
        kind: String,

        /// Number of rows to generate (1 to 2000)
        #[arg(short, long, default_value = "100")]
        rows: usize,
    },

    /// List datasets
    List,

    /// Show a dataset with its schema and first rows
    Show {
        id: Uuid,

        /// Number of rows to include
        #[arg(short, long, default_value = "5")]
        sample: usize,
    },

    /// Delete a dataset; models and jobs referencing it are kept
    Delete { id: Uuid },
}

#[derive(Serialize)]
struct DatasetView<'a> {
    #[serde(flatten)]
    summary: DatasetSummary,
    schema: &'a [ColumnSchema],
    sample: &'a [Row],
}

/// Runs a dataset command.
///
/// # Errors
///
/// Returns an error if the input cannot be read or the service rejects it.
pub async fn run(services: &Services, owner: Uuid, command: DatasetCommand) -> Result<()> {
    let datasets = &services.datasets;

    match command {
        DatasetCommand::Create {
            file,
            name,
            description,
            tags,
        } => {
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let rows: Vec<Row> = serde_json::from_slice(&content)
                .with_context(|| format!("{} is not a JSON array of objects", file.display()))?;

            let metadata = DatasetMetadata {
                description,
                filename: file_name(&file),
                file_type: FileType::Json,
                tags,
            };
            let dataset = datasets.create(owner, rows, &name, metadata).await?;
            info!(dataset_id = %dataset.id, rows = dataset.rows, "Dataset created");
            print_json(&dataset.summary())?;
        }
        DatasetCommand::Upload {
            file,
            name,
            description,
            no_header,
        } => {
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file_name(&file).context("upload path has no file name")?;
            let name = name.unwrap_or_else(|| filename.clone());

            let options = UploadOptions {
                description,
                has_header: !no_header,
            };
            let dataset = datasets
                .upload(owner, &content, &filename, &name, options)
                .await?;
            info!(dataset_id = %dataset.id, rows = dataset.rows, "Dataset uploaded");
            print_json(&dataset.summary())?;
        }
        DatasetCommand::Randomize { kind, rows } => {
            let dataset = datasets.randomize(owner, &kind, rows).await?;
            info!(dataset_id = %dataset.id, rows = dataset.rows, "Dataset generated");
            print_json(&dataset.summary())?;
        }
        DatasetCommand::List => {
            print_json(&datasets.list(owner).await?)?;
        }
        DatasetCommand::Show { id, sample } => {
            let dataset = datasets.get(id, owner).await?;
            let view = DatasetView {
                summary: dataset.summary(),
                schema: &dataset.schema,
                sample: dataset.sample(sample),
            };
            print_json(&view)?;
        }
        DatasetCommand::Delete { id } => {
            datasets.delete(id, owner).await?;
            info!(dataset_id = %id, "Dataset deleted");
        }
    }

    Ok(())
}

fn file_name(path: &std::path::Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}
