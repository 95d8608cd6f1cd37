//! `PostgreSQL` implementation of [`Store`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use tabular_structs::{
    ColumnSchema, CreateDataset, CreateJob, CreateModel, Dataset, DatasetSummary, FileType, Job,
    JobStatus, JobTransition, Metrics, Model, ModelFamily, ModelUpdate, Row, TaskType,
};
use tracing::debug;
use uuid::Uuid;

use crate::Store;

const DATASET_COLUMNS: &str = "id, owner_id, name, description, filename, file_type, tags, \
     data, schema, rows, columns, size, missing_values, used_in_jobs, created_at";

const DATASET_SUMMARY_COLUMNS: &str = "id, name, description, filename, file_type, tags, rows, \
     columns, size, missing_values, used_in_jobs, created_at";

const MODEL_COLUMNS: &str = "id, owner_id, name, description, family, task_type, hyperparameters, \
     target_column, feature_columns, dataset_id, is_trained, metrics, training_accuracy, \
     created_at, updated_at";

const JOB_COLUMNS: &str = "id, owner_id, name, status, progress, error_message, results, \
     model_id, dataset_id, target_column, feature_columns, created_at, started_at, completed_at";

/// Store backed by a pooled `PostgreSQL` connection.
///
/// JSON documents are bound as text and cast to `json` so key order survives
/// the round trip.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Serializes a value for a `$n::text::json` parameter.
fn json_text<T: Serialize + ?Sized>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

#[derive(sqlx::FromRow)]
struct DatasetRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    description: String,
    filename: String,
    file_type: FileType,
    tags: String,
    data: Json<Vec<Row>>,
    schema: Json<Vec<ColumnSchema>>,
    rows: i32,
    columns: i32,
    size: i64,
    missing_values: i32,
    used_in_jobs: i32,
    created_at: DateTime<Utc>,
}

impl From<DatasetRow> for Dataset {
    fn from(row: DatasetRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            filename: row.filename,
            file_type: row.file_type,
            tags: row.tags,
            data: row.data.0,
            schema: row.schema.0,
            rows: row.rows,
            columns: row.columns,
            size: row.size,
            missing_values: row.missing_values,
            used_in_jobs: row.used_in_jobs,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ModelRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    description: String,
    family: ModelFamily,
    task_type: TaskType,
    hyperparameters: Json<serde_json::Map<String, serde_json::Value>>,
    target_column: Option<String>,
    feature_columns: Option<Vec<String>>,
    dataset_id: Uuid,
    is_trained: bool,
    metrics: Json<Metrics>,
    training_accuracy: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ModelRow> for Model {
    fn from(row: ModelRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            family: row.family,
            task_type: row.task_type,
            hyperparameters: row.hyperparameters.0,
            target_column: row.target_column,
            feature_columns: row.feature_columns,
            dataset_id: row.dataset_id,
            is_trained: row.is_trained,
            metrics: row.metrics.0,
            training_accuracy: row.training_accuracy,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    status: JobStatus,
    progress: i16,
    error_message: Option<String>,
    results: Option<Json<Metrics>>,
    model_id: Uuid,
    dataset_id: Uuid,
    target_column: Option<String>,
    feature_columns: Option<Vec<String>>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            status: row.status,
            progress: row.progress,
            error_message: row.error_message,
            results: row.results.map(|results| results.0),
            model_id: row.model_id,
            dataset_id: row.dataset_id,
            target_column: row.target_column,
            feature_columns: row.feature_columns,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_dataset(&self, input: CreateDataset) -> Result<Dataset, sqlx::Error> {
        let query = format!(
            "INSERT INTO datasets (id, owner_id, name, description, filename, file_type, tags, \
                 data, schema, rows, columns, size, missing_values) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8::text::json, $9::text::json, $10, $11, $12, $13) \
             RETURNING {DATASET_COLUMNS}"
        );

        let row: DatasetRow = sqlx::query_as(&query)
            .bind(Uuid::new_v4())
            .bind(input.owner_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.filename)
            .bind(input.file_type)
            .bind(&input.tags)
            .bind(json_text(&input.data)?)
            .bind(json_text(&input.schema)?)
            .bind(input.row_count())
            .bind(input.column_count())
            .bind(input.size)
            .bind(input.missing_values)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn get_dataset(&self, id: Uuid, owner: Uuid) -> Result<Option<Dataset>, sqlx::Error> {
        let query = format!("SELECT {DATASET_COLUMNS} FROM datasets WHERE id = $1 AND owner_id = $2");

        let row: Option<DatasetRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Dataset::from))
    }

    async fn list_datasets(&self, owner: Uuid) -> Result<Vec<DatasetSummary>, sqlx::Error> {
        let query = format!(
            "SELECT {DATASET_SUMMARY_COLUMNS} FROM datasets WHERE owner_id = $1 \
             ORDER BY created_at DESC"
        );

        sqlx::query_as(&query).bind(owner).fetch_all(&self.pool).await
    }

    async fn delete_dataset(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM datasets WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_model(&self, input: CreateModel) -> Result<Model, sqlx::Error> {
        let query = format!(
            "INSERT INTO models (id, owner_id, name, description, family, task_type, \
                 hyperparameters, target_column, feature_columns, dataset_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7::text::json, $8, $9, $10) \
             RETURNING {MODEL_COLUMNS}"
        );

        let row: ModelRow = sqlx::query_as(&query)
            .bind(Uuid::new_v4())
            .bind(input.owner_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.family)
            .bind(input.task_type)
            .bind(json_text(&input.hyperparameters)?)
            .bind(&input.target_column)
            .bind(&input.feature_columns)
            .bind(input.dataset_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn get_model(&self, id: Uuid, owner: Uuid) -> Result<Option<Model>, sqlx::Error> {
        let query = format!("SELECT {MODEL_COLUMNS} FROM models WHERE id = $1 AND owner_id = $2");

        let row: Option<ModelRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Model::from))
    }

    async fn list_models(&self, owner: Uuid) -> Result<Vec<Model>, sqlx::Error> {
        let query = format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE owner_id = $1 ORDER BY created_at DESC"
        );

        let rows: Vec<ModelRow> = sqlx::query_as(&query).bind(owner).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Model::from).collect())
    }

    async fn update_model(
        &self,
        id: Uuid,
        owner: Uuid,
        update: &ModelUpdate,
    ) -> Result<Option<Model>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE id = $1 AND owner_id = $2 FOR UPDATE"
        );
        let current: Option<ModelRow> = sqlx::query_as(&select)
            .bind(id)
            .bind(owner)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(current) = current else {
            return Ok(None);
        };

        let mut model = Model::from(current);
        update.apply(&mut model);

        let query = format!(
            "UPDATE models SET name = $3, description = $4, hyperparameters = $5::text::json, \
                 target_column = $6, feature_columns = $7, updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2 \
             RETURNING {MODEL_COLUMNS}"
        );
        let row: ModelRow = sqlx::query_as(&query)
            .bind(id)
            .bind(owner)
            .bind(&model.name)
            .bind(&model.description)
            .bind(json_text(&model.hyperparameters)?)
            .bind(&model.target_column)
            .bind(&model.feature_columns)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(row.into()))
    }

    async fn delete_model(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM models WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_training(
        &self,
        id: Uuid,
        owner: Uuid,
        metrics: &Metrics,
        training_accuracy: Option<f64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE models SET is_trained = TRUE, metrics = $3::text::json, \
                 training_accuracy = $4, updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner)
        .bind(json_text(metrics)?)
        .bind(training_accuracy)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_job(&self, input: CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, owner_id, name, model_id, dataset_id, target_column, \
                 feature_columns) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {JOB_COLUMNS}"
        );

        let mut tx = self.pool.begin().await?;

        let row: JobRow = sqlx::query_as(&query)
            .bind(Uuid::new_v4())
            .bind(input.owner_id)
            .bind(&input.name)
            .bind(input.model_id)
            .bind(input.dataset_id)
            .bind(&input.overrides.target_column)
            .bind(&input.overrides.feature_columns)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE datasets SET used_in_jobs = used_in_jobs + 1 WHERE id = $1 AND owner_id = $2",
        )
        .bind(input.dataset_id)
        .bind(input.owner_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(job_id = %row.id, dataset_id = %input.dataset_id, "Inserted job");
        Ok(row.into())
    }

    async fn get_job(&self, id: Uuid, owner: Uuid) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND owner_id = $2");

        let row: Option<JobRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Job::from))
    }

    async fn list_jobs(&self, owner: Uuid) -> Result<Vec<Job>, sqlx::Error> {
        let query =
            format!("SELECT {JOB_COLUMNS} FROM jobs WHERE owner_id = $1 ORDER BY created_at DESC");

        let rows: Vec<JobRow> = sqlx::query_as(&query).bind(owner).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn delete_job(&self, id: Uuid, owner: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn transition_job(
        &self,
        id: Uuid,
        owner: Uuid,
        expected: JobStatus,
        transition: &JobTransition,
    ) -> Result<Option<Job>, sqlx::Error> {
        let guard = "WHERE id = $1 AND owner_id = $2 AND status = $3";

        let row: Option<JobRow> = match transition {
            JobTransition::Start { at } => {
                let query = format!(
                    "UPDATE jobs SET status = $4, started_at = $5 {guard} RETURNING {JOB_COLUMNS}"
                );
                sqlx::query_as(&query)
                    .bind(id)
                    .bind(owner)
                    .bind(expected)
                    .bind(transition.target())
                    .bind(at)
                    .fetch_optional(&self.pool)
                    .await?
            }
            JobTransition::Complete { results, at } => {
                let query = format!(
                    "UPDATE jobs SET status = $4, progress = 100, results = $5::text::json, \
                         completed_at = $6 {guard} RETURNING {JOB_COLUMNS}"
                );
                sqlx::query_as(&query)
                    .bind(id)
                    .bind(owner)
                    .bind(expected)
                    .bind(transition.target())
                    .bind(json_text(results)?)
                    .bind(at)
                    .fetch_optional(&self.pool)
                    .await?
            }
            JobTransition::Fail { message, at } => {
                let query = format!(
                    "UPDATE jobs SET status = $4, error_message = $5, completed_at = $6 {guard} \
                     RETURNING {JOB_COLUMNS}"
                );
                sqlx::query_as(&query)
                    .bind(id)
                    .bind(owner)
                    .bind(expected)
                    .bind(transition.target())
                    .bind(message)
                    .bind(at)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        if row.is_none() {
            debug!(job_id = %id, %expected, target = %transition.target(), "Job transition rejected");
        }
        Ok(row.map(Job::from))
    }

    async fn set_job_progress(
        &self,
        id: Uuid,
        owner: Uuid,
        progress: i16,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET progress = GREATEST(progress, $3) \
             WHERE id = $1 AND owner_id = $2 AND status = $4",
        )
        .bind(id)
        .bind(owner)
        .bind(progress)
        .bind(JobStatus::InProgress)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
