//! Bounded worker pool that runs scheduled jobs in isolation.

use std::sync::Arc;

use tabular_structs::ServiceError;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

use crate::cancel::CancellationTokens;
use crate::executor::{ScheduledJob, TrainingExecutor};

/// Hands scheduled jobs to at most `max_concurrent_jobs` concurrent tasks.
///
/// Submissions queue without bound; each job runs in its own task so a
/// panic in one execution never reaches the others.
#[derive(Debug, Clone)]
pub struct Supervisor {
    sender: mpsc::UnboundedSender<ScheduledJob>,
}

impl Supervisor {
    /// Starts the dispatch loop on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        executor: Arc<TrainingExecutor>,
        tokens: Arc<CancellationTokens>,
        max_concurrent_jobs: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(max_concurrent_jobs.max(1)));

        info!(max_concurrent_jobs, "Starting job supervisor");
        tokio::spawn(dispatch(receiver, executor, tokens, semaphore));

        Self { sender }
    }

    /// Queues a job for execution.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::SchedulerStopped`] if the dispatch loop is gone.
    pub fn submit(&self, job: ScheduledJob) -> Result<(), ServiceError> {
        self.sender
            .send(job)
            .map_err(|_| ServiceError::SchedulerStopped)
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<ScheduledJob>,
    executor: Arc<TrainingExecutor>,
    tokens: Arc<CancellationTokens>,
    semaphore: Arc<Semaphore>,
) {
    while let Some(job) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };

        let executor = Arc::clone(&executor);
        let tokens = Arc::clone(&tokens);

        tokio::spawn(async move {
            let job_id = job.job_id;
            debug!(%job_id, "Job picked up");

            let run = tokio::spawn({
                let executor = Arc::clone(&executor);
                let job = job.clone();
                async move { executor.execute(&job).await }
            });

            if let Err(e) = run.await {
                error!(%job_id, "Job execution aborted: {e}");
                executor
                    .fail(&job, format!("job execution aborted: {e}"))
                    .await;
            }

            tokens.release(job_id);
            drop(permit);
        });
    }

    debug!("Job supervisor stopped");
}
