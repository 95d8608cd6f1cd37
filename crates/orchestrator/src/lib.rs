//! Registries, job lifecycle and background execution for PackageML.
//!
//! [`Services::new`] wires everything to one [`Store`] and one
//! [`TrainingBackend`]. It must be called inside a tokio runtime, which
//! hosts the job supervisor.

mod cancel;
mod executor;
mod jobs;
mod registry;
mod supervisor;

use std::sync::Arc;

use database::Store;
use ml_model::TrainingBackend;

pub use cancel::{CancellationToken, CancellationTokens};
pub use executor::{
    resolve_columns, ResolvedColumns, ScheduledJob, TrainingExecutor, PROGRESS_COLUMNS_RESOLVED,
    PROGRESS_DATA_LOADED, PROGRESS_FEATURES_READY, PROGRESS_TRAINED, PROGRESS_TRAINING,
};
pub use jobs::{JobOrchestrator, NewJob};
pub use registry::{DatasetRegistry, ModelRegistry, UploadOptions};
pub use supervisor::Supervisor;

/// The dataset, model and job services sharing one store.
#[derive(Clone)]
pub struct Services {
    pub datasets: DatasetRegistry,
    pub models: ModelRegistry,
    pub jobs: JobOrchestrator,
}

impl Services {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn TrainingBackend>,
        max_concurrent_jobs: usize,
    ) -> Self {
        let tokens = Arc::new(CancellationTokens::new());
        let executor = Arc::new(TrainingExecutor::new(Arc::clone(&store), backend));
        let supervisor = Supervisor::spawn(executor, Arc::clone(&tokens), max_concurrent_jobs);

        Self {
            datasets: DatasetRegistry::new(Arc::clone(&store)),
            models: ModelRegistry::new(Arc::clone(&store)),
            jobs: JobOrchestrator::new(store, supervisor, tokens),
        }
    }
}
