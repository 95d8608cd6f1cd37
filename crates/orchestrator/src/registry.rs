//! Dataset and model registries.

use std::sync::Arc;

use database::Store;
use schema_inference::{
    generate, infer_schema, parse_upload, DatasetKind, IngestLimits, IngestMode, InferredSchema,
};
use tabular_structs::{
    schema_contains, ColumnSchema, CreateDataset, CreateModel, Dataset, DatasetMetadata,
    DatasetSummary, FileType, Hyperparameters, Model, ModelUpdate, Row, ServiceError,
};
use tracing::info;
use uuid::Uuid;

/// Options for an uploaded file.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub description: Option<String>,
    /// Whether the first CSV record names the columns.
    pub has_header: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            description: None,
            has_header: true,
        }
    }
}

/// Creates, reads and deletes datasets.
#[derive(Clone)]
pub struct DatasetRegistry {
    store: Arc<dyn Store>,
}

impl DatasetRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Registers rows supplied directly.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the rows are empty or exceed the
    /// ingestion limits, or a persistence error if the write fails.
    pub async fn create(
        &self,
        owner: Uuid,
        rows: Vec<Row>,
        name: &str,
        metadata: DatasetMetadata,
    ) -> Result<Dataset, ServiceError> {
        let inferred = infer_schema(&rows, IngestLimits::direct(), IngestMode::Structured)?;

        let input = new_dataset(owner, name, rows, inferred);
        let input = CreateDataset {
            description: metadata.description.unwrap_or_default(),
            filename: metadata.filename.unwrap_or_else(|| name.to_string()),
            file_type: metadata.file_type,
            tags: metadata.tags.unwrap_or_default(),
            ..input
        };

        self.insert(input).await
    }

    /// Registers the contents of an uploaded CSV, JSON or Excel file.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the file cannot be parsed or exceeds
    /// the ingestion limits.
    pub async fn upload(
        &self,
        owner: Uuid,
        content: &[u8],
        filename: &str,
        name: &str,
        options: UploadOptions,
    ) -> Result<Dataset, ServiceError> {
        let parsed = parse_upload(content, filename, options.has_header)?;
        let inferred = infer_schema(&parsed.rows, IngestLimits::direct(), IngestMode::Text)?;

        let input = CreateDataset {
            description: options.description.unwrap_or_default(),
            filename: parsed.filename,
            file_type: parsed.file_type,
            ..new_dataset(owner, name, parsed.rows, inferred)
        };

        self.insert(input).await
    }

    /// Generates and registers a sample dataset of `kind`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown kind or a row count outside
    /// the synthetic limit.
    pub async fn randomize(
        &self,
        owner: Uuid,
        kind: &str,
        rows: usize,
    ) -> Result<Dataset, ServiceError> {
        let kind = DatasetKind::parse(kind)?;
        let generated = generate(kind, rows, &mut rand::thread_rng())?;

        let input = CreateDataset {
            owner_id: owner,
            name: generated.name,
            description: generated.description,
            filename: generated.filename,
            file_type: generated.file_type,
            tags: generated.tags,
            data: generated.rows,
            schema: generated.schema,
            size: i64::try_from(generated.size).unwrap_or(i64::MAX),
            missing_values: 0,
        };

        self.insert(input).await
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the caller owns no such dataset.
    pub async fn get(&self, id: Uuid, owner: Uuid) -> Result<Dataset, ServiceError> {
        self.store
            .get_dataset(id, owner)
            .await?
            .ok_or(ServiceError::NotFound("dataset"))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list(&self, owner: Uuid) -> Result<Vec<DatasetSummary>, ServiceError> {
        Ok(self.store.list_datasets(owner).await?)
    }

    /// Deletes a dataset. Models and jobs that reference it are left as they are.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the caller owns no such dataset.
    pub async fn delete(&self, id: Uuid, owner: Uuid) -> Result<(), ServiceError> {
        if self.store.delete_dataset(id, owner).await? {
            info!(dataset_id = %id, "Deleted dataset");
            Ok(())
        } else {
            Err(ServiceError::NotFound("dataset"))
        }
    }

    async fn insert(&self, input: CreateDataset) -> Result<Dataset, ServiceError> {
        let dataset = self.store.insert_dataset(input).await?;
        info!(
            dataset_id = %dataset.id,
            rows = dataset.rows,
            columns = dataset.columns,
            missing = dataset.missing_values,
            "Registered dataset"
        );
        Ok(dataset)
    }
}

fn new_dataset(owner: Uuid, name: &str, rows: Vec<Row>, inferred: InferredSchema) -> CreateDataset {
    CreateDataset {
        owner_id: owner,
        name: name.to_string(),
        description: String::new(),
        filename: name.to_string(),
        file_type: FileType::Csv,
        tags: String::new(),
        data: rows,
        schema: inferred.columns,
        size: i64::try_from(inferred.size).unwrap_or(i64::MAX),
        missing_values: i32::try_from(inferred.missing_values).unwrap_or(i32::MAX),
    }
}

/// Checks that a target column, when given, exists in the schema.
pub(crate) fn validate_target(
    schema: &[ColumnSchema],
    target: Option<&str>,
) -> Result<(), ServiceError> {
    match target {
        Some(column) if !schema_contains(schema, column) => Err(ServiceError::validation(
            format!("target column `{column}` is not in the dataset"),
        )),
        _ => Ok(()),
    }
}

/// Checks that every feature column exists in the schema.
pub(crate) fn validate_features(
    schema: &[ColumnSchema],
    features: Option<&[String]>,
) -> Result<(), ServiceError> {
    let missing = features
        .unwrap_or_default()
        .iter()
        .find(|column| !schema_contains(schema, column));

    match missing {
        Some(column) => Err(ServiceError::validation(format!(
            "feature column `{column}` is not in the dataset"
        ))),
        None => Ok(()),
    }
}

/// Creates, updates, reads and deletes model configurations.
#[derive(Clone)]
pub struct ModelRegistry {
    store: Arc<dyn Store>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Registers a model after validating it against its dataset.
    ///
    /// Recognized hyperparameters are stored with their defaults filled in.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the dataset does not resolve for
    /// the caller, or a validation error if the family, columns or
    /// hyperparameters are invalid.
    pub async fn create(&self, input: CreateModel) -> Result<Model, ServiceError> {
        if !input.family.supports(input.task_type) {
            return Err(ServiceError::validation(format!(
                "model family {} does not support task type {}",
                input.family, input.task_type
            )));
        }

        let hyperparameters = Hyperparameters::parse(input.family, &input.hyperparameters)?;

        let dataset = self
            .store
            .get_dataset(input.dataset_id, input.owner_id)
            .await?
            .ok_or(ServiceError::NotFound("dataset"))?;

        let target = input.target_column.as_deref().filter(|c| !c.is_empty());
        if input.task_type.is_supervised() && target.is_none() {
            return Err(ServiceError::validation(format!(
                "target column is required for {} models",
                input.task_type
            )));
        }
        validate_target(&dataset.schema, target)?;
        validate_features(&dataset.schema, input.feature_columns.as_deref())?;

        let model = self
            .store
            .insert_model(CreateModel {
                hyperparameters: hyperparameters.to_map(),
                ..input
            })
            .await?;

        info!(model_id = %model.id, family = %model.family, task = %model.task_type, "Registered model");
        Ok(model)
    }

    /// Applies a patch, re-validating every changed field.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the caller owns no such model, or
    /// a validation error if a changed field is invalid.
    pub async fn update(
        &self,
        id: Uuid,
        owner: Uuid,
        mut update: ModelUpdate,
    ) -> Result<Model, ServiceError> {
        let current = self.get(id, owner).await?;
        if update.is_empty() {
            return Ok(current);
        }

        if update.target_column.is_some() || update.feature_columns.is_some() {
            let dataset = self
                .store
                .get_dataset(current.dataset_id, owner)
                .await?
                .ok_or(ServiceError::NotFound("dataset"))?;

            let mut candidate = current.clone();
            update.apply(&mut candidate);

            let target = candidate.target_column.as_deref().filter(|c| !c.is_empty());
            if update.target_column.is_some() {
                if candidate.task_type.is_supervised() && target.is_none() {
                    return Err(ServiceError::validation(
                        "target column cannot be removed from a supervised model",
                    ));
                }
                validate_target(&dataset.schema, target)?;
            }
            if update.feature_columns.is_some() {
                validate_features(&dataset.schema, candidate.feature_columns.as_deref())?;
            }
        }

        if let Some(raw) = &update.hyperparameters {
            update.hyperparameters = Some(Hyperparameters::parse(current.family, raw)?.to_map());
        }

        let model = self
            .store
            .update_model(id, owner, &update)
            .await?
            .ok_or(ServiceError::NotFound("model"))?;

        info!(model_id = %id, "Updated model");
        Ok(model)
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the caller owns no such model.
    pub async fn get(&self, id: Uuid, owner: Uuid) -> Result<Model, ServiceError> {
        self.store
            .get_model(id, owner)
            .await?
            .ok_or(ServiceError::NotFound("model"))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list(&self, owner: Uuid) -> Result<Vec<Model>, ServiceError> {
        Ok(self.store.list_models(owner).await?)
    }

    /// Deletes a model. Jobs that reference it are left as they are.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the caller owns no such model.
    pub async fn delete(&self, id: Uuid, owner: Uuid) -> Result<(), ServiceError> {
        if self.store.delete_model(id, owner).await? {
            info!(model_id = %id, "Deleted model");
            Ok(())
        } else {
            Err(ServiceError::NotFound("model"))
        }
    }
}
