//! Cooperative cancellation of running jobs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

/// Flag shared between a job's executor and whoever may cancel it.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Tokens of the jobs currently scheduled or running.
#[derive(Debug, Default)]
pub struct CancellationTokens {
    tokens: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl CancellationTokens {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a fresh token for `job_id`.
    pub fn issue(&self, job_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.lock().insert(job_id, token.clone());
        token
    }

    /// Trips the job's token. Returns false if the job has none.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        self.lock().get(&job_id).map(CancellationToken::cancel).is_some()
    }

    /// Forgets the job's token once its execution has ended.
    pub fn release(&self, job_id: Uuid) {
        self.lock().remove(&job_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        // The map stays consistent even if a holder panicked.
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
