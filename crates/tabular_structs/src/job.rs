use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Metrics;

/// Message recorded on a job cancelled through the API.
pub const CANCELLED_MESSAGE: &str = "cancelled by user";

/// Lifecycle status of a training job, matching the `PostgreSQL` type.
///
/// `Pending → InProgress → {Completed, Failed}`; the last two are terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal statuses never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Job-level column choices that take precedence over the model's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOverrides {
    pub target_column: Option<String>,
    pub feature_columns: Option<Vec<String>>,
}

/// One training attempt of a model against a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub progress: i16,
    pub error_message: Option<String>,
    pub results: Option<Metrics>,
    pub model_id: Uuid,
    pub dataset_id: Uuid,
    pub target_column: Option<String>,
    pub feature_columns: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Job-level column overrides.
    #[must_use]
    pub fn overrides(&self) -> ColumnOverrides {
        ColumnOverrides {
            target_column: self.target_column.clone(),
            feature_columns: self.feature_columns.clone(),
        }
    }
}

/// Input for creating a new job record.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub owner_id: Uuid,
    pub name: String,
    pub model_id: Uuid,
    pub dataset_id: Uuid,
    pub overrides: ColumnOverrides,
}

/// Status change applied through a compare-and-set on the job row.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    /// `Pending → InProgress`.
    Start { at: DateTime<Utc> },
    /// `InProgress → Completed` with progress 100.
    Complete { results: Metrics, at: DateTime<Utc> },
    /// `* → Failed` with a message.
    Fail { message: String, at: DateTime<Utc> },
}

impl JobTransition {
    /// Status written by this transition.
    #[must_use]
    pub const fn target(&self) -> JobStatus {
        match self {
            Self::Start { .. } => JobStatus::InProgress,
            Self::Complete { .. } => JobStatus::Completed,
            Self::Fail { .. } => JobStatus::Failed,
        }
    }

    /// Applies the transition to an in-memory job.
    pub fn apply(&self, job: &mut Job) {
        job.status = self.target();
        match self {
            Self::Start { at } => {
                job.started_at = Some(*at);
            }
            Self::Complete { results, at } => {
                job.progress = 100;
                job.results = Some(results.clone());
                job.completed_at = Some(*at);
            }
            Self::Fail { message, at } => {
                job.error_message = Some(message.clone());
                job.completed_at = Some(*at);
            }
        }
    }
}
