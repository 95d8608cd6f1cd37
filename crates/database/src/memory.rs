//! In-process implementation of [`Store`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tabular_structs::{
    CreateDataset, CreateJob, CreateModel, Dataset, DatasetSummary, Job, JobStatus, JobTransition,
    Metrics, Model, ModelUpdate,
};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::Store;

#[derive(Debug, Default)]
struct State {
    datasets: HashMap<Uuid, Dataset>,
    models: HashMap<Uuid, Model>,
    jobs: HashMap<Uuid, Job>,
    /// Every progress value written per job, in write order.
    progress: HashMap<Uuid, Vec<i16>>,
}

/// Store that keeps all records in memory behind a single lock.
///
/// Each operation holds the lock for its whole duration, which makes every
/// operation atomic, compare-and-set transitions included.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress values observed for a job, starting with its initial 0.
    pub async fn progress_history(&self, job_id: Uuid) -> Vec<i16> {
        self.state
            .lock()
            .await
            .progress
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn newest_first<T>(mut records: Vec<T>, created_at: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    records.sort_by_key(|record| std::cmp::Reverse(created_at(record)));
    records
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_dataset(&self, input: CreateDataset) -> Result<Dataset, sqlx::Error> {
        let dataset = Dataset {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            rows: input.row_count(),
            columns: input.column_count(),
            name: input.name,
            description: input.description,
            filename: input.filename,
            file_type: input.file_type,
            tags: input.tags,
            data: input.data,
            schema: input.schema,
            size: input.size,
            missing_values: input.missing_values,
            used_in_jobs: 0,
            created_at: Utc::now(),
        };

        self.state
            .lock()
            .await
            .datasets
            .insert(dataset.id, dataset.clone());
        Ok(dataset)
    }

    async fn get_dataset(&self, id: Uuid, owner: Uuid) -> Result<Option<Dataset>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .datasets
            .get(&id)
            .filter(|dataset| dataset.owner_id == owner)
            .cloned())
    }

    async fn list_datasets(&self, owner: Uuid) -> Result<Vec<DatasetSummary>, sqlx::Error> {
        let state = self.state.lock().await;
        let summaries = state
            .datasets
            .values()
            .filter(|dataset| dataset.owner_id == owner)
            .map(Dataset::summary)
            .collect();
        Ok(newest_first(summaries, |summary| summary.created_at))
    }

    async fn delete_dataset(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().await;
        if !state.datasets.get(&id).is_some_and(|d| d.owner_id == owner) {
            return Ok(false);
        }

        state.datasets.remove(&id);
        Ok(true)
    }

    async fn insert_model(&self, input: CreateModel) -> Result<Model, sqlx::Error> {
        let now = Utc::now();
        let model = Model {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            name: input.name,
            description: input.description,
            family: input.family,
            task_type: input.task_type,
            hyperparameters: input.hyperparameters,
            target_column: input.target_column,
            feature_columns: input.feature_columns,
            dataset_id: input.dataset_id,
            is_trained: false,
            metrics: Metrics::new(),
            training_accuracy: None,
            created_at: now,
            updated_at: now,
        };

        self.state
            .lock()
            .await
            .models
            .insert(model.id, model.clone());
        Ok(model)
    }

    async fn get_model(&self, id: Uuid, owner: Uuid) -> Result<Option<Model>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .models
            .get(&id)
            .filter(|model| model.owner_id == owner)
            .cloned())
    }

    async fn list_models(&self, owner: Uuid) -> Result<Vec<Model>, sqlx::Error> {
        let state = self.state.lock().await;
        let models = state
            .models
            .values()
            .filter(|model| model.owner_id == owner)
            .cloned()
            .collect();
        Ok(newest_first(models, |model| model.created_at))
    }

    async fn update_model(
        &self,
        id: Uuid,
        owner: Uuid,
        update: &ModelUpdate,
    ) -> Result<Option<Model>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let Some(model) = state.models.get_mut(&id).filter(|m| m.owner_id == owner) else {
            return Ok(None);
        };

        update.apply(model);
        model.updated_at = Utc::now();
        Ok(Some(model.clone()))
    }

    async fn delete_model(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().await;
        if !state.models.get(&id).is_some_and(|m| m.owner_id == owner) {
            return Ok(false);
        }

        state.models.remove(&id);
        Ok(true)
    }

    async fn record_training(
        &self,
        id: Uuid,
        owner: Uuid,
        metrics: &Metrics,
        training_accuracy: Option<f64>,
    ) -> Result<(), sqlx::Error> {
        let mut state = self.state.lock().await;
        if let Some(model) = state.models.get_mut(&id).filter(|m| m.owner_id == owner) {
            model.is_trained = true;
            model.metrics = metrics.clone();
            model.training_accuracy = training_accuracy;
            model.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_job(&self, input: CreateJob) -> Result<Job, sqlx::Error> {
        let job = Job {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            name: input.name,
            status: JobStatus::Pending,
            progress: 0,
            error_message: None,
            results: None,
            model_id: input.model_id,
            dataset_id: input.dataset_id,
            target_column: input.overrides.target_column,
            feature_columns: input.overrides.feature_columns,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        let mut state = self.state.lock().await;
        if let Some(dataset) = state
            .datasets
            .get_mut(&job.dataset_id)
            .filter(|dataset| dataset.owner_id == job.owner_id)
        {
            dataset.used_in_jobs += 1;
        }
        state.progress.insert(job.id, vec![0]);
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid, owner: Uuid) -> Result<Option<Job>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .get(&id)
            .filter(|job| job.owner_id == owner)
            .cloned())
    }

    async fn list_jobs(&self, owner: Uuid) -> Result<Vec<Job>, sqlx::Error> {
        let state = self.state.lock().await;
        let jobs = state
            .jobs
            .values()
            .filter(|job| job.owner_id == owner)
            .cloned()
            .collect();
        Ok(newest_first(jobs, |job| job.created_at))
    }

    async fn delete_job(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().await;
        if !state.jobs.get(&id).is_some_and(|job| job.owner_id == owner) {
            return Ok(false);
        }

        state.jobs.remove(&id);
        Ok(true)
    }

    async fn transition_job(
        &self,
        id: Uuid,
        owner: Uuid,
        expected: JobStatus,
        transition: &JobTransition,
    ) -> Result<Option<Job>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let Some(job) = state
            .jobs
            .get_mut(&id)
            .filter(|job| job.owner_id == owner && job.status == expected)
        else {
            debug!(job_id = %id, %expected, target = %transition.target(), "Job transition rejected");
            return Ok(None);
        };

        transition.apply(job);
        let job = job.clone();

        if matches!(transition, JobTransition::Complete { .. }) {
            state.progress.entry(id).or_default().push(job.progress);
        }
        Ok(Some(job))
    }

    async fn set_job_progress(
        &self,
        id: Uuid,
        owner: Uuid,
        progress: i16,
    ) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().await;
        let Some(job) = state
            .jobs
            .get_mut(&id)
            .filter(|job| job.owner_id == owner && job.status == JobStatus::InProgress)
        else {
            return Ok(false);
        };

        job.progress = job.progress.max(progress);
        let written = job.progress;
        state.progress.entry(id).or_default().push(written);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use tabular_structs::{ColumnOverrides, FileType, ModelFamily, TaskType, CANCELLED_MESSAGE};

    use super::*;

    fn dataset_input(owner: Uuid) -> CreateDataset {
        CreateDataset {
            owner_id: owner,
            name: "numbers".to_string(),
            description: String::new(),
            filename: "numbers.csv".to_string(),
            file_type: FileType::Csv,
            tags: String::new(),
            data: vec![serde_json::Map::new()],
            schema: vec![],
            size: 4,
            missing_values: 0,
        }
    }

    async fn seed_job(store: &MemoryStore, owner: Uuid) -> Job {
        let dataset = store
            .insert_dataset(dataset_input(owner))
            .await
            .expect("insert dataset");
        let model = store
            .insert_model(CreateModel {
                owner_id: owner,
                name: "clusters".to_string(),
                description: String::new(),
                family: ModelFamily::KMeans,
                task_type: TaskType::Clustering,
                hyperparameters: serde_json::Map::new(),
                target_column: None,
                feature_columns: None,
                dataset_id: dataset.id,
            })
            .await
            .expect("insert model");
        store
            .insert_job(CreateJob {
                owner_id: owner,
                name: "run".to_string(),
                model_id: model.id,
                dataset_id: dataset.id,
                overrides: ColumnOverrides::default(),
            })
            .await
            .expect("insert job")
    }

    #[tokio::test]
    async fn test_records_are_owner_scoped() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let dataset = store
            .insert_dataset(dataset_input(owner))
            .await
            .expect("insert dataset");

        assert_eq!(dataset.rows, 1);
        assert!(store.get_dataset(dataset.id, owner).await.expect("get").is_some());
        assert!(store.get_dataset(dataset.id, Uuid::new_v4()).await.expect("get").is_none());
        assert!(!store.delete_dataset(dataset.id, Uuid::new_v4()).await.expect("delete"));
        assert!(store.delete_dataset(dataset.id, owner).await.expect("delete"));
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let job = seed_job(&store, owner).await;

        let start = JobTransition::Start { at: Utc::now() };
        let started = store
            .transition_job(job.id, owner, JobStatus::Pending, &start)
            .await
            .expect("transition");
        assert_eq!(started.map(|j| j.status), Some(JobStatus::InProgress));

        let again = store
            .transition_job(job.id, owner, JobStatus::Pending, &start)
            .await
            .expect("transition");
        assert!(again.is_none(), "second start must not apply");

        let cancel = JobTransition::Fail {
            message: CANCELLED_MESSAGE.to_string(),
            at: Utc::now(),
        };
        store
            .transition_job(job.id, owner, JobStatus::InProgress, &cancel)
            .await
            .expect("transition");

        let complete = JobTransition::Complete {
            results: Metrics::new(),
            at: Utc::now(),
        };
        let late = store
            .transition_job(job.id, owner, JobStatus::InProgress, &complete)
            .await
            .expect("transition");
        assert!(late.is_none(), "completion must not overwrite a cancellation");

        let stored = store.get_job(job.id, owner).await.expect("get").expect("job exists");
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some(CANCELLED_MESSAGE));
    }

    #[tokio::test]
    async fn test_progress_only_while_running_and_never_decreases() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let job = seed_job(&store, owner).await;

        assert!(!store.set_job_progress(job.id, owner, 20).await.expect("progress"));

        store
            .transition_job(job.id, owner, JobStatus::Pending, &JobTransition::Start { at: Utc::now() })
            .await
            .expect("transition");

        assert!(store.set_job_progress(job.id, owner, 40).await.expect("progress"));
        assert!(store.set_job_progress(job.id, owner, 30).await.expect("progress"));

        let stored = store.get_job(job.id, owner).await.expect("get").expect("job exists");
        assert_eq!(stored.progress, 40);
        assert_eq!(store.progress_history(job.id).await, vec![0, 40, 40]);
    }

    #[tokio::test]
    async fn test_deletes_leave_referencing_records() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let job = seed_job(&store, owner).await;

        assert!(store.delete_model(job.model_id, owner).await.expect("delete"));
        assert!(store.get_job(job.id, owner).await.expect("get").is_some());

        let other = seed_job(&store, owner).await;
        assert!(store.delete_dataset(other.dataset_id, owner).await.expect("delete"));
        assert!(store.get_model(other.model_id, owner).await.expect("get").is_some());
        assert!(store.get_job(other.id, owner).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_inserting_a_job_counts_dataset_usage() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let job = seed_job(&store, owner).await;

        let dataset = store
            .get_dataset(job.dataset_id, owner)
            .await
            .expect("get")
            .expect("dataset exists");
        assert_eq!(dataset.used_in_jobs, 1);
        assert_eq!(store.progress_history(job.id).await, vec![0]);
    }
}
