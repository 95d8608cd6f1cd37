//! Feature extractor crate for PackageML training runs.
//!
//! This crate transforms dataset rows into dense feature matrices and target
//! vectors that a training backend can consume.

use serde_json::Value;
use tabular_structs::{Row, TaskType};
use thiserror::Error;

/// Errors raised while turning rows into training data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("dataset has no rows")]
    EmptyDataset,

    #[error("no feature columns selected")]
    NoFeatureColumns,

    #[error("target column `{0}` has no values")]
    EmptyTarget(String),

    #[error("target column `{column}` must be numeric for regression, found `{value}`")]
    NonNumericTarget { column: String, value: String },
}

/// Dense row-major feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    /// Column names, one per matrix column.
    pub columns: Vec<String>,
    /// Row-major values, `rows * columns.len()` long.
    pub values: Vec<f32>,
    pub rows: usize,
}

impl FeatureMatrix {
    /// Number of feature columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Values of row `index`.
    pub fn row(&self, index: usize) -> &[f32] {
        let width = self.width();
        &self.values[index * width..(index + 1) * width]
    }

    /// Copies the given rows into a new matrix.
    pub fn select(&self, indices: &[usize]) -> Self {
        let values = indices
            .iter()
            .flat_map(|&index| self.row(index).iter().copied())
            .collect();

        Self {
            columns: self.columns.clone(),
            values,
            rows: indices.len(),
        }
    }
}

/// Supervised training target.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetVector {
    /// Class indices into `classes`, encoded by first appearance.
    Labels {
        classes: Vec<String>,
        indices: Vec<usize>,
    },
    /// Continuous regression values.
    Values(Vec<f32>),
}

impl TargetVector {
    pub fn len(&self) -> usize {
        match self {
            Self::Labels { indices, .. } => indices.len(),
            Self::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the given rows into a new target.
    pub fn select(&self, rows: &[usize]) -> Self {
        match self {
            Self::Labels { classes, indices } => Self::Labels {
                classes: classes.clone(),
                indices: rows.iter().map(|&row| indices[row]).collect(),
            },
            Self::Values(values) => Self::Values(rows.iter().map(|&row| values[row]).collect()),
        }
    }
}

/// Features and optional target extracted from the same rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    pub features: FeatureMatrix,
    pub target: Option<TargetVector>,
}

/// Extracts training data for `task`.
///
/// For supervised tasks, rows whose target is missing are dropped before
/// features are built.
///
/// # Errors
///
/// Returns an error if no rows or feature columns are available, or if the
/// target cannot be encoded for the task.
pub fn extract_training_data(
    rows: &[Row],
    feature_columns: &[String],
    target_column: Option<&str>,
    task: TaskType,
) -> Result<TrainingData, ExtractionError> {
    if rows.is_empty() {
        return Err(ExtractionError::EmptyDataset);
    }
    if feature_columns.is_empty() {
        return Err(ExtractionError::NoFeatureColumns);
    }

    let target_column = target_column.filter(|_| task.is_supervised());

    let kept: Vec<&Row> = match target_column {
        Some(column) => rows
            .iter()
            .filter(|row| !is_missing(row.get(column)))
            .collect(),
        None => rows.iter().collect(),
    };

    let target = match target_column {
        Some(column) => {
            if kept.is_empty() {
                return Err(ExtractionError::EmptyTarget(column.to_string()));
            }
            Some(extract_target(&kept, column, task)?)
        }
        None => None,
    };

    Ok(TrainingData {
        features: extract_features(&kept, feature_columns),
        target,
    })
}

/// Builds the feature matrix for `columns`.
///
/// Numbers are used as-is, booleans as 0/1 and strings are label-encoded
/// by first appearance. Missing cells take the mean of the column's present
/// values, or 0 when the column has none.
pub fn extract_features(rows: &[&Row], columns: &[String]) -> FeatureMatrix {
    let width = columns.len();
    let mut values = vec![0.0f32; rows.len() * width];

    for (col, name) in columns.iter().enumerate() {
        let mut labels: Vec<String> = Vec::new();
        let encoded: Vec<Option<f32>> = rows
            .iter()
            .map(|row| encode_cell(row.get(name), &mut labels))
            .collect();

        let present: Vec<f32> = encoded.iter().flatten().copied().collect();
        let fill = if present.is_empty() {
            0.0
        } else {
            present.iter().sum::<f32>() / present.len() as f32
        };

        for (row, cell) in encoded.into_iter().enumerate() {
            values[row * width + col] = cell.unwrap_or(fill);
        }
    }

    FeatureMatrix {
        columns: columns.to_vec(),
        values,
        rows: rows.len(),
    }
}

fn extract_target(
    rows: &[&Row],
    column: &str,
    task: TaskType,
) -> Result<TargetVector, ExtractionError> {
    let cells = rows.iter().filter_map(|row| row.get(column));

    if task == TaskType::Regression {
        let values = cells
            .map(|value| {
                numeric(value).ok_or_else(|| ExtractionError::NonNumericTarget {
                    column: column.to_string(),
                    value: label_text(value),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(TargetVector::Values(values));
    }

    let mut classes: Vec<String> = Vec::new();
    let indices = cells
        .map(|value| label_index(&mut classes, label_text(value)))
        .collect();

    Ok(TargetVector::Labels { classes, indices })
}

fn is_missing(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
        || matches!(value, Some(Value::String(text)) if text.is_empty())
}

fn numeric(value: &Value) -> Option<f32> {
    match value {
        Value::Number(number) => number.as_f64().map(|n| n as f32),
        Value::Bool(flag) => Some(f32::from(u8::from(*flag))),
        Value::String(text) => text.trim().parse::<f32>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn label_index(labels: &mut Vec<String>, label: String) -> usize {
    if let Some(index) = labels.iter().position(|known| *known == label) {
        return index;
    }
    labels.push(label);
    labels.len() - 1
}

fn encode_cell(value: Option<&Value>, labels: &mut Vec<String>) -> Option<f32> {
    let value = value.filter(|value| !is_missing(Some(value)))?;
    match value {
        Value::Number(_) | Value::Bool(_) => numeric(value),
        other => Some(label_index(labels, label_text(other)) as f32),
    }
}
