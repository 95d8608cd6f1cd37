//! Runs one scheduled job through its training checkpoints.

use std::sync::Arc;

use chrono::Utc;
use database::Store;
use feature_extractor::{extract_training_data, ExtractionError};
use ml_model::{TrainingBackend, TrainingError, TrainingRequest};
use tabular_structs::{Dataset, Job, JobStatus, JobTransition, Metrics, Model, ServiceError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cancel::CancellationToken;

/// Progress after the dataset rows are loaded.
pub const PROGRESS_DATA_LOADED: i16 = 20;
/// Progress after feature and target columns are resolved.
pub const PROGRESS_COLUMNS_RESOLVED: i16 = 30;
/// Progress after the feature matrix is built.
pub const PROGRESS_FEATURES_READY: i16 = 40;
/// Progress when the backend starts fitting.
pub const PROGRESS_TRAINING: i16 = 60;
/// Progress after the backend returns.
pub const PROGRESS_TRAINED: i16 = 90;

/// A job handed to the supervisor, bound to one job id.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job_id: Uuid,
    pub owner_id: Uuid,
    pub token: CancellationToken,
}

/// Why an execution stopped before completing.
#[derive(Debug)]
enum Halt {
    /// Cancelled, deleted or otherwise no longer `IN_PROGRESS`; nothing to write.
    Stopped,
    /// Checkpoint failure to be recorded on the job.
    Failed(String),
}

impl From<ServiceError> for Halt {
    fn from(error: ServiceError) -> Self {
        Self::Failed(error.to_string())
    }
}

impl From<TrainingError> for Halt {
    fn from(error: TrainingError) -> Self {
        Self::Failed(error.to_string())
    }
}

impl From<ExtractionError> for Halt {
    fn from(error: ExtractionError) -> Self {
        Self::Failed(error.to_string())
    }
}

impl From<sqlx::Error> for Halt {
    fn from(error: sqlx::Error) -> Self {
        Self::Failed(ServiceError::from(error).to_string())
    }
}

/// Feature and target columns chosen for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub features: Vec<String>,
    pub target: Option<String>,
}

/// Picks the run's columns: job overrides first, then the model's
/// configuration, then every schema column. The target is never a feature.
#[must_use]
pub fn resolve_columns(job: &Job, model: &Model, dataset: &Dataset) -> ResolvedColumns {
    let target = job
        .target_column
        .clone()
        .or_else(|| model.target_column.clone())
        .filter(|column| !column.is_empty());

    let features = job
        .feature_columns
        .clone()
        .or_else(|| model.feature_columns.clone())
        .unwrap_or_else(|| dataset.column_names().map(str::to_string).collect());

    let features = features
        .into_iter()
        .filter(|column| Some(column) != target.as_ref())
        .collect();

    ResolvedColumns { features, target }
}

/// Drives scheduled jobs from `IN_PROGRESS` to a terminal status.
pub struct TrainingExecutor {
    store: Arc<dyn Store>,
    backend: Arc<dyn TrainingBackend>,
}

impl TrainingExecutor {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, backend: Arc<dyn TrainingBackend>) -> Self {
        Self { store, backend }
    }

    /// Executes a job. Never fails: every error ends as a `FAILED` job.
    pub async fn execute(&self, job: &ScheduledJob) {
        match self.run(job).await {
            Ok(()) => {}
            Err(Halt::Stopped) => {
                info!(job_id = %job.job_id, "Job stopped before completion");
            }
            Err(Halt::Failed(message)) => {
                warn!(job_id = %job.job_id, %message, "Job failed");
                self.fail(job, message).await;
            }
        }
    }

    /// Best-effort `IN_PROGRESS → FAILED` write; a failure here is only logged.
    pub async fn fail(&self, job: &ScheduledJob, message: String) {
        let transition = JobTransition::Fail {
            message,
            at: Utc::now(),
        };

        match self
            .store
            .transition_job(job.job_id, job.owner_id, JobStatus::InProgress, &transition)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => debug!(job_id = %job.job_id, "Job no longer running, failure not recorded"),
            Err(e) => error!(job_id = %job.job_id, "Failed to record job failure: {e}"),
        }
    }

    async fn run(&self, scheduled: &ScheduledJob) -> Result<(), Halt> {
        let (job_id, owner) = (scheduled.job_id, scheduled.owner_id);

        let job = self.store.get_job(job_id, owner).await?.ok_or(Halt::Stopped)?;
        if job.status != JobStatus::InProgress {
            return Err(Halt::Stopped);
        }

        info!(%job_id, model_id = %job.model_id, dataset_id = %job.dataset_id, "Executing job");

        let dataset = self
            .store
            .get_dataset(job.dataset_id, owner)
            .await?
            .ok_or(ServiceError::NotFound("dataset"))?;
        self.checkpoint(scheduled, PROGRESS_DATA_LOADED).await?;

        let model = self
            .store
            .get_model(job.model_id, owner)
            .await?
            .ok_or(ServiceError::NotFound("model"))?;
        let columns = resolve_columns(&job, &model, &dataset);
        self.checkpoint(scheduled, PROGRESS_COLUMNS_RESOLVED).await?;

        if model.task_type.is_supervised() && columns.target.is_none() {
            return Err(TrainingError::MissingTarget.into());
        }

        let hyperparameters = model.typed_hyperparameters()?;
        let data = extract_training_data(
            &dataset.data,
            &columns.features,
            columns.target.as_deref(),
            model.task_type,
        )?;
        self.checkpoint(scheduled, PROGRESS_FEATURES_READY).await?;

        let request = TrainingRequest {
            features: data.features,
            target: data.target,
            task: model.task_type,
            family: model.family,
            hyperparameters,
        };

        self.checkpoint(scheduled, PROGRESS_TRAINING).await?;
        let backend = Arc::clone(&self.backend);
        let outcome = tokio::task::spawn_blocking(move || backend.train(request))
            .await
            .map_err(|e| Halt::Failed(format!("training backend panicked: {e}")))??;
        self.checkpoint(scheduled, PROGRESS_TRAINED).await?;

        debug!(%job_id, handle = ?outcome.handle, "Backend returned");

        let transition = JobTransition::Complete {
            results: outcome.metrics.clone(),
            at: Utc::now(),
        };
        self.store
            .transition_job(job_id, owner, JobStatus::InProgress, &transition)
            .await?
            .ok_or(Halt::Stopped)?;

        self.store
            .record_training(
                model.id,
                owner,
                &outcome.metrics,
                training_accuracy(&outcome.metrics),
            )
            .await?;

        info!(%job_id, model_id = %model.id, "Job completed");
        Ok(())
    }

    /// Stops if the job was cancelled, otherwise persists `progress`.
    async fn checkpoint(&self, job: &ScheduledJob, progress: i16) -> Result<(), Halt> {
        if job.token.is_cancelled() {
            return Err(Halt::Stopped);
        }

        let running = self
            .store
            .set_job_progress(job.job_id, job.owner_id, progress)
            .await?;
        if !running {
            return Err(Halt::Stopped);
        }

        debug!(job_id = %job.job_id, progress, "Checkpoint reached");
        Ok(())
    }
}

/// Accuracy metric recorded on the model, if the run reported one.
fn training_accuracy(metrics: &Metrics) -> Option<f64> {
    metrics.get("accuracy").and_then(serde_json::Value::as_f64)
}
