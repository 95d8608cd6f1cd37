//! Job lifecycle: create, start, cancel, inspect and delete training jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use database::Store;
use tabular_structs::{
    ColumnOverrides, CreateJob, Job, JobStatus, JobTransition, ServiceError, CANCELLED_MESSAGE,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancellationTokens;
use crate::executor::ScheduledJob;
use crate::registry::{validate_features, validate_target};
use crate::supervisor::Supervisor;

/// Request to create a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub model_id: Uuid,
    pub dataset_id: Uuid,
    pub overrides: ColumnOverrides,
}

/// Owns job records and moves them through
/// `PENDING → IN_PROGRESS → {COMPLETED, FAILED}`.
///
/// Every transition is a compare-and-set on the stored status, so racing
/// callers can never both win.
#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn Store>,
    supervisor: Supervisor,
    tokens: Arc<CancellationTokens>,
}

impl JobOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        supervisor: Supervisor,
        tokens: Arc<CancellationTokens>,
    ) -> Self {
        Self {
            store,
            supervisor,
            tokens,
        }
    }

    /// Creates a `PENDING` job and, if `auto_start` is set, schedules it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the model or dataset does not
    /// resolve for the caller, or a validation error if an override column
    /// is not in the dataset.
    pub async fn create(
        &self,
        owner: Uuid,
        request: NewJob,
        auto_start: bool,
    ) -> Result<Job, ServiceError> {
        self.store
            .get_model(request.model_id, owner)
            .await?
            .ok_or(ServiceError::NotFound("model"))?;
        let dataset = self
            .store
            .get_dataset(request.dataset_id, owner)
            .await?
            .ok_or(ServiceError::NotFound("dataset"))?;

        let overrides = ColumnOverrides {
            target_column: request.overrides.target_column.filter(|c| !c.is_empty()),
            feature_columns: request.overrides.feature_columns,
        };
        validate_target(&dataset.schema, overrides.target_column.as_deref())?;
        validate_features(&dataset.schema, overrides.feature_columns.as_deref())?;

        let job = self
            .store
            .insert_job(CreateJob {
                owner_id: owner,
                name: request.name,
                model_id: request.model_id,
                dataset_id: request.dataset_id,
                overrides,
            })
            .await?;

        info!(job_id = %job.id, model_id = %job.model_id, dataset_id = %job.dataset_id, "Created job");

        if auto_start {
            return self.start(job.id, owner).await;
        }
        Ok(job)
    }

    /// Moves a `PENDING` job to `IN_PROGRESS` and schedules its execution.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::State`] if the job is not `PENDING`, or
    /// [`ServiceError::NotFound`] if the caller owns no such job.
    pub async fn start(&self, id: Uuid, owner: Uuid) -> Result<Job, ServiceError> {
        let transition = JobTransition::Start { at: Utc::now() };
        let Some(job) = self
            .store
            .transition_job(id, owner, JobStatus::Pending, &transition)
            .await?
        else {
            return Err(self.rejected(id, owner, "start", JobStatus::Pending).await);
        };

        let token = self.tokens.issue(id);
        let scheduled = ScheduledJob {
            job_id: id,
            owner_id: owner,
            token,
        };

        if let Err(e) = self.supervisor.submit(scheduled) {
            self.tokens.release(id);
            let transition = JobTransition::Fail {
                message: e.to_string(),
                at: Utc::now(),
            };
            if let Err(write) = self
                .store
                .transition_job(id, owner, JobStatus::InProgress, &transition)
                .await
            {
                warn!(job_id = %id, "Failed to record scheduling failure: {write}");
            }
            return Err(e);
        }

        info!(job_id = %id, "Started job");
        Ok(job)
    }

    /// Fails an `IN_PROGRESS` job with "cancelled by user" and signals its
    /// executor to stop at the next checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::State`] if the job is not `IN_PROGRESS`, or
    /// [`ServiceError::NotFound`] if the caller owns no such job.
    pub async fn cancel(&self, id: Uuid, owner: Uuid) -> Result<Job, ServiceError> {
        let transition = JobTransition::Fail {
            message: CANCELLED_MESSAGE.to_string(),
            at: Utc::now(),
        };
        let Some(job) = self
            .store
            .transition_job(id, owner, JobStatus::InProgress, &transition)
            .await?
        else {
            return Err(self.rejected(id, owner, "cancel", JobStatus::InProgress).await);
        };

        if !self.tokens.cancel(id) {
            debug!(job_id = %id, "No running executor to signal");
        }

        info!(job_id = %id, "Cancelled job");
        Ok(job)
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the caller owns no such job.
    pub async fn get(&self, id: Uuid, owner: Uuid) -> Result<Job, ServiceError> {
        self.store
            .get_job(id, owner)
            .await?
            .ok_or(ServiceError::NotFound("job"))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list(&self, owner: Uuid) -> Result<Vec<Job>, ServiceError> {
        Ok(self.store.list_jobs(owner).await?)
    }

    /// Deletes a job in any status; a running executor is told to stop.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the caller owns no such job.
    pub async fn delete(&self, id: Uuid, owner: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete_job(id, owner).await? {
            return Err(ServiceError::NotFound("job"));
        }

        self.tokens.cancel(id);
        info!(job_id = %id, "Deleted job");
        Ok(())
    }

    /// Creates and starts a job for a model against its own dataset.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the caller owns no such model.
    pub async fn train_now(&self, model_id: Uuid, owner: Uuid) -> Result<Job, ServiceError> {
        let model = self
            .store
            .get_model(model_id, owner)
            .await?
            .ok_or(ServiceError::NotFound("model"))?;

        let request = NewJob {
            name: format!("Training {}", model.name),
            model_id,
            dataset_id: model.dataset_id,
            overrides: ColumnOverrides::default(),
        };
        self.create(owner, request, true).await
    }

    /// Polls the job until it reaches a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the job disappears while waiting.
    pub async fn wait_for_terminal(
        &self,
        id: Uuid,
        owner: Uuid,
        poll: Duration,
    ) -> Result<Job, ServiceError> {
        let mut last_progress = None;
        loop {
            let job = self.get(id, owner).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }

            if last_progress != Some(job.progress) {
                info!(job_id = %id, status = %job.status, progress = job.progress, "Waiting for job");
                last_progress = Some(job.progress);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Explains why a compare-and-set on the job's status did not apply.
    async fn rejected(
        &self,
        id: Uuid,
        owner: Uuid,
        operation: &'static str,
        expected: JobStatus,
    ) -> ServiceError {
        match self.store.get_job(id, owner).await {
            Ok(Some(job)) => ServiceError::State {
                job_id: id,
                operation,
                expected,
                actual: job.status,
            },
            Ok(None) => ServiceError::NotFound("job"),
            Err(e) => ServiceError::from(e),
        }
    }
}
