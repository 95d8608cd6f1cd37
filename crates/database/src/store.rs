use async_trait::async_trait;
use tabular_structs::{
    CreateDataset, CreateJob, CreateModel, Dataset, DatasetSummary, Job, JobStatus, JobTransition,
    Metrics, Model, ModelUpdate,
};
use uuid::Uuid;

/// Atomic record operations, scoped by owner on every read, update and delete.
///
/// A record owned by someone else behaves exactly like a missing one.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persists a dataset together with its schema and derived counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_dataset(&self, input: CreateDataset) -> Result<Dataset, sqlx::Error>;

    async fn get_dataset(&self, id: Uuid, owner: Uuid) -> Result<Option<Dataset>, sqlx::Error>;

    /// Lists the owner's datasets, newest first, without row data.
    async fn list_datasets(&self, owner: Uuid) -> Result<Vec<DatasetSummary>, sqlx::Error>;

    /// Deletes a dataset only. Returns false if nothing matched.
    async fn delete_dataset(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error>;

    async fn insert_model(&self, input: CreateModel) -> Result<Model, sqlx::Error>;

    async fn get_model(&self, id: Uuid, owner: Uuid) -> Result<Option<Model>, sqlx::Error>;

    async fn list_models(&self, owner: Uuid) -> Result<Vec<Model>, sqlx::Error>;

    /// Applies a patch and refreshes `updated_at`.
    async fn update_model(
        &self,
        id: Uuid,
        owner: Uuid,
        update: &ModelUpdate,
    ) -> Result<Option<Model>, sqlx::Error>;

    async fn delete_model(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error>;

    /// Marks a model trained with the metrics of its latest run.
    async fn record_training(
        &self,
        id: Uuid,
        owner: Uuid,
        metrics: &Metrics,
        training_accuracy: Option<f64>,
    ) -> Result<(), sqlx::Error>;

    /// Persists a job in `PENDING` with progress 0 and bumps its dataset's
    /// `used_in_jobs` counter in the same write.
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails; neither is applied then.
    async fn insert_job(&self, input: CreateJob) -> Result<Job, sqlx::Error>;

    async fn get_job(&self, id: Uuid, owner: Uuid) -> Result<Option<Job>, sqlx::Error>;

    async fn list_jobs(&self, owner: Uuid) -> Result<Vec<Job>, sqlx::Error>;

    async fn delete_job(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error>;

    /// Applies `transition` only if the job is currently in `expected`.
    ///
    /// Returns the updated job, or `None` if the job is missing or its status
    /// differs.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn transition_job(
        &self,
        id: Uuid,
        owner: Uuid,
        expected: JobStatus,
        transition: &JobTransition,
    ) -> Result<Option<Job>, sqlx::Error>;

    /// Writes progress while the job is `IN_PROGRESS`, never lowering it.
    ///
    /// Returns false if the job is no longer running.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn set_job_progress(&self, id: Uuid, owner: Uuid, progress: i16)
        -> Result<bool, sqlx::Error>;
}
