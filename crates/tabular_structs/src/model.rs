use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Hyperparameters, Metrics, ServiceError};

/// Learning task a model performs, matching the `PostgreSQL` type.
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
    strum::EnumIter,
)]
#[sqlx(type_name = "task_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskType {
    Classification,
    Regression,
    Clustering,
    DimensionalityReduction,
}

impl TaskType {
    /// Supervised tasks need a target column.
    #[must_use]
    pub const fn is_supervised(self) -> bool {
        matches!(self, Self::Classification | Self::Regression)
    }
}

/// Algorithm family of a model, matching the `PostgreSQL` type.
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
    strum::EnumIter,
)]
#[sqlx(type_name = "model_family", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelFamily {
    LogisticRegression,
    LinearRegression,
    NeuralNetwork,
    #[sqlx(rename = "kmeans")]
    #[serde(rename = "kmeans")]
    #[strum(serialize = "kmeans")]
    KMeans,
    Pca,
}

impl ModelFamily {
    /// Returns true if this family can be trained for `task`.
    #[must_use]
    pub const fn supports(self, task: TaskType) -> bool {
        match self {
            Self::LogisticRegression => matches!(task, TaskType::Classification),
            Self::LinearRegression => matches!(task, TaskType::Regression),
            Self::NeuralNetwork => task.is_supervised(),
            Self::KMeans => matches!(task, TaskType::Clustering),
            Self::Pca => matches!(task, TaskType::DimensionalityReduction),
        }
    }
}

/// A model configuration over a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub family: ModelFamily,
    pub task_type: TaskType,
    pub hyperparameters: serde_json::Map<String, serde_json::Value>,
    pub target_column: Option<String>,
    pub feature_columns: Option<Vec<String>>,
    pub dataset_id: Uuid,
    pub is_trained: bool,
    pub metrics: Metrics,
    pub training_accuracy: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Parses the stored hyperparameter mapping into its typed form.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the stored mapping no longer parses.
    pub fn typed_hyperparameters(&self) -> Result<Hyperparameters, ServiceError> {
        Hyperparameters::parse(self.family, &self.hyperparameters)
    }
}

/// Input for creating a new model record.
#[derive(Debug, Clone)]
pub struct CreateModel {
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub family: ModelFamily,
    pub task_type: TaskType,
    pub hyperparameters: serde_json::Map<String, serde_json::Value>,
    pub target_column: Option<String>,
    pub feature_columns: Option<Vec<String>>,
    pub dataset_id: Uuid,
}

/// Partial update of a model; `None` leaves a field unchanged.
///
/// The nested options on target and features distinguish "leave as is"
/// (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct ModelUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub hyperparameters: Option<serde_json::Map<String, serde_json::Value>>,
    pub target_column: Option<Option<String>>,
    pub feature_columns: Option<Option<Vec<String>>>,
}

impl ModelUpdate {
    /// Returns true if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.hyperparameters.is_none()
            && self.target_column.is_none()
            && self.feature_columns.is_none()
    }

    /// Applies the patch to an in-memory model.
    pub fn apply(&self, model: &mut Model) {
        if let Some(name) = &self.name {
            model.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            model.description.clone_from(description);
        }
        if let Some(hyperparameters) = &self.hyperparameters {
            model.hyperparameters.clone_from(hyperparameters);
        }
        if let Some(target_column) = &self.target_column {
            model.target_column.clone_from(target_column);
        }
        if let Some(feature_columns) = &self.feature_columns {
            model.feature_columns.clone_from(feature_columns);
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_family_task_compatibility() {
        assert!(ModelFamily::LogisticRegression.supports(TaskType::Classification));
        assert!(!ModelFamily::LogisticRegression.supports(TaskType::Regression));
        assert!(ModelFamily::NeuralNetwork.supports(TaskType::Regression));
        assert!(!ModelFamily::NeuralNetwork.supports(TaskType::Clustering));
        assert!(ModelFamily::KMeans.supports(TaskType::Clustering));
        assert!(ModelFamily::Pca.supports(TaskType::DimensionalityReduction));
    }

    #[test]
    fn test_every_task_has_a_family() {
        for task in TaskType::iter() {
            assert!(
                ModelFamily::iter().any(|family| family.supports(task)),
                "no family for {task}"
            );
        }
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(
            "dimensionality_reduction".parse::<TaskType>().ok(),
            Some(TaskType::DimensionalityReduction)
        );
        assert_eq!("kmeans".parse::<ModelFamily>().ok(), Some(ModelFamily::KMeans));
        assert_eq!(ModelFamily::KMeans.to_string(), "kmeans");
        assert_eq!(
            serde_json::to_value(ModelFamily::LogisticRegression).ok(),
            Some(serde_json::json!("logistic_regression"))
        );
    }
}
