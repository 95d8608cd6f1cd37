#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use database::{MemoryStore, Store};
use ml_model::{TrainedModel, TrainingBackend, TrainingError, TrainingOutcome, TrainingRequest};
use orchestrator::Services;
use serde_json::{json, Value};
use tabular_structs::{
    CreateDataset, CreateJob, CreateModel, Dataset, DatasetMetadata, DatasetSummary, Job,
    JobStatus, JobTransition, Metrics, Model, ModelFamily, ModelUpdate, Row, TaskType,
};
use uuid::Uuid;

pub const POLL: Duration = Duration::from_millis(5);

/// Returns fixed metrics and counts how often it was called.
#[derive(Debug, Default)]
pub struct FixedBackend {
    pub metrics: Metrics,
    pub calls: AtomicUsize,
}

impl FixedBackend {
    pub fn new(metrics: Value) -> Self {
        Self {
            metrics: object(metrics),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrainingBackend for FixedBackend {
    fn train(&self, _request: TrainingRequest) -> Result<TrainingOutcome, TrainingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TrainingOutcome {
            handle: TrainedModel::Network {
                parameters: 0,
                classes: None,
            },
            metrics: self.metrics.clone(),
        })
    }
}

/// Always fails with the given description.
#[derive(Debug)]
pub struct FailingBackend(pub &'static str);

impl TrainingBackend for FailingBackend {
    fn train(&self, _request: TrainingRequest) -> Result<TrainingOutcome, TrainingError> {
        Err(TrainingError::InvalidInput(self.0.to_string()))
    }
}

/// Panics inside the training call.
#[derive(Debug)]
pub struct PanickingBackend;

impl TrainingBackend for PanickingBackend {
    fn train(&self, _request: TrainingRequest) -> Result<TrainingOutcome, TrainingError> {
        panic!("backend exploded");
    }
}

/// Blocks inside the training call until released.
pub struct BlockingBackend {
    release: Mutex<mpsc::Receiver<()>>,
    pub finished: AtomicUsize,
}

impl BlockingBackend {
    pub fn new() -> (Self, mpsc::Sender<()>) {
        let (sender, receiver) = mpsc::channel();
        let backend = Self {
            release: Mutex::new(receiver),
            finished: AtomicUsize::new(0),
        };
        (backend, sender)
    }
}

impl TrainingBackend for BlockingBackend {
    fn train(&self, _request: TrainingRequest) -> Result<TrainingOutcome, TrainingError> {
        let released = self
            .release
            .lock()
            .expect("release lock")
            .recv_timeout(Duration::from_secs(10));
        self.finished.fetch_add(1, Ordering::SeqCst);
        released.map_err(|_| TrainingError::InvalidInput("never released".to_string()))?;

        let mut metrics = Metrics::new();
        metrics.insert("accuracy".to_string(), json!(1.0));
        Ok(TrainingOutcome {
            handle: TrainedModel::Network {
                parameters: 0,
                classes: None,
            },
            metrics,
        })
    }
}

/// Sleeps in every call and records how many calls overlapped at most.
#[derive(Debug, Default)]
pub struct PeakBackend {
    running: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl TrainingBackend for PeakBackend {
    fn train(&self, _request: TrainingRequest) -> Result<TrainingOutcome, TrainingError> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        Ok(TrainingOutcome {
            handle: TrainedModel::Network {
                parameters: 0,
                classes: None,
            },
            metrics: Metrics::new(),
        })
    }
}

/// Wraps a [`MemoryStore`] and fails chosen job writes with a pool timeout.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    /// Fail every progress write.
    pub fail_progress: bool,
    /// Fail every transition out of `IN_PROGRESS`.
    pub fail_running_transitions: bool,
    pub failed_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_progress: false,
            fail_running_transitions: false,
            failed_writes: AtomicUsize::new(0),
        }
    }

    fn refuse<T>(&self) -> Result<T, sqlx::Error> {
        self.failed_writes.fetch_add(1, Ordering::SeqCst);
        Err(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_dataset(&self, input: CreateDataset) -> Result<Dataset, sqlx::Error> {
        self.inner.insert_dataset(input).await
    }

    async fn get_dataset(&self, id: Uuid, owner: Uuid) -> Result<Option<Dataset>, sqlx::Error> {
        self.inner.get_dataset(id, owner).await
    }

    async fn list_datasets(&self, owner: Uuid) -> Result<Vec<DatasetSummary>, sqlx::Error> {
        self.inner.list_datasets(owner).await
    }

    async fn delete_dataset(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error> {
        self.inner.delete_dataset(id, owner).await
    }

    async fn insert_model(&self, input: CreateModel) -> Result<Model, sqlx::Error> {
        self.inner.insert_model(input).await
    }

    async fn get_model(&self, id: Uuid, owner: Uuid) -> Result<Option<Model>, sqlx::Error> {
        self.inner.get_model(id, owner).await
    }

    async fn list_models(&self, owner: Uuid) -> Result<Vec<Model>, sqlx::Error> {
        self.inner.list_models(owner).await
    }

    async fn update_model(
        &self,
        id: Uuid,
        owner: Uuid,
        update: &ModelUpdate,
    ) -> Result<Option<Model>, sqlx::Error> {
        self.inner.update_model(id, owner, update).await
    }

    async fn delete_model(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error> {
        self.inner.delete_model(id, owner).await
    }

    async fn record_training(
        &self,
        id: Uuid,
        owner: Uuid,
        metrics: &Metrics,
        training_accuracy: Option<f64>,
    ) -> Result<(), sqlx::Error> {
        self.inner
            .record_training(id, owner, metrics, training_accuracy)
            .await
    }

    async fn insert_job(&self, input: CreateJob) -> Result<Job, sqlx::Error> {
        self.inner.insert_job(input).await
    }

    async fn get_job(&self, id: Uuid, owner: Uuid) -> Result<Option<Job>, sqlx::Error> {
        self.inner.get_job(id, owner).await
    }

    async fn list_jobs(&self, owner: Uuid) -> Result<Vec<Job>, sqlx::Error> {
        self.inner.list_jobs(owner).await
    }

    async fn delete_job(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error> {
        self.inner.delete_job(id, owner).await
    }

    async fn transition_job(
        &self,
        id: Uuid,
        owner: Uuid,
        expected: JobStatus,
        transition: &JobTransition,
    ) -> Result<Option<Job>, sqlx::Error> {
        if self.fail_running_transitions && expected == JobStatus::InProgress {
            return self.refuse();
        }
        self.inner.transition_job(id, owner, expected, transition).await
    }

    async fn set_job_progress(
        &self,
        id: Uuid,
        owner: Uuid,
        progress: i16,
    ) -> Result<bool, sqlx::Error> {
        if self.fail_progress {
            return self.refuse();
        }
        self.inner.set_job_progress(id, owner, progress).await
    }
}

pub fn services(store: &Arc<MemoryStore>, backend: Arc<dyn TrainingBackend>) -> Services {
    Services::new(store.clone(), backend, 2)
}

pub fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn rows(value: Value) -> Vec<Row> {
    match value {
        Value::Array(items) => items.into_iter().map(object).collect(),
        other => panic!("expected an array, got {other}"),
    }
}

/// The three-row dataset with an integer column `a` and a string column `b`.
pub fn sample_rows() -> Vec<Row> {
    rows(json!([
        {"a": 1, "b": "x"},
        {"a": 2, "b": "y"},
        {"a": null, "b": "z"},
    ]))
}

pub async fn sample_dataset(services: &Services, owner: Uuid) -> Uuid {
    services
        .datasets
        .create(owner, sample_rows(), "sample", DatasetMetadata::default())
        .await
        .expect("dataset")
        .id
}

pub fn classifier(owner: Uuid, dataset_id: Uuid) -> CreateModel {
    CreateModel {
        owner_id: owner,
        name: "classifier".to_string(),
        description: String::new(),
        family: ModelFamily::LogisticRegression,
        task_type: TaskType::Classification,
        hyperparameters: serde_json::Map::new(),
        target_column: Some("b".to_string()),
        feature_columns: None,
        dataset_id,
    }
}

/// Waits for the job to finish, failing the test after a few seconds.
pub async fn finished(services: &Services, job_id: Uuid, owner: Uuid) -> tabular_structs::Job {
    tokio::time::timeout(
        Duration::from_secs(10),
        services.jobs.wait_for_terminal(job_id, owner, POLL),
    )
    .await
    .expect("job did not finish in time")
    .expect("job lookup")
}

/// Polls until `check` holds, failing the test after a few seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        while !check().await {
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
