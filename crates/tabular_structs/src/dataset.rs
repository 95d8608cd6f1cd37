use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ColumnSchema, Row};

/// Source format of a dataset, matching the `PostgreSQL` type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
)]
#[sqlx(type_name = "file_type", rename_all = "snake_case")]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum FileType {
    #[default]
    Csv,
    Json,
}

/// A registered dataset with its rows and derived schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub filename: String,
    pub file_type: FileType,
    pub tags: String,
    pub data: Vec<Row>,
    pub schema: Vec<ColumnSchema>,
    pub rows: i32,
    pub columns: i32,
    pub size: i64,
    pub missing_values: i32,
    pub used_in_jobs: i32,
    pub created_at: DateTime<Utc>,
}

impl Dataset {
    /// Names of all schema columns, in schema order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.schema.iter().map(|column| column.name.as_str())
    }

    /// Returns the first `limit` rows for previews.
    #[must_use]
    pub fn sample(&self, limit: usize) -> &[Row] {
        &self.data[..self.data.len().min(limit)]
    }

    /// Listing view without the row data.
    #[must_use]
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            filename: self.filename.clone(),
            file_type: self.file_type,
            tags: self.tags.clone(),
            rows: self.rows,
            columns: self.columns,
            size: self.size,
            missing_values: self.missing_values,
            used_in_jobs: self.used_in_jobs,
            created_at: self.created_at,
        }
    }
}

/// Dataset metadata without rows or schema, used for listings.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DatasetSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub filename: String,
    pub file_type: FileType,
    pub tags: String,
    pub rows: i32,
    pub columns: i32,
    pub size: i64,
    pub missing_values: i32,
    pub used_in_jobs: i32,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new dataset record.
#[derive(Debug, Clone)]
pub struct CreateDataset {
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub filename: String,
    pub file_type: FileType,
    pub tags: String,
    pub data: Vec<Row>,
    pub schema: Vec<ColumnSchema>,
    pub size: i64,
    pub missing_values: i32,
}

impl CreateDataset {
    /// Number of rows as stored.
    #[must_use]
    pub fn row_count(&self) -> i32 {
        i32::try_from(self.data.len()).unwrap_or(i32::MAX)
    }

    /// Number of schema columns as stored.
    #[must_use]
    pub fn column_count(&self) -> i32 {
        i32::try_from(self.schema.len()).unwrap_or(i32::MAX)
    }
}

/// Caller-supplied descriptive fields for a new dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetMetadata {
    pub description: Option<String>,
    pub filename: Option<String>,
    pub file_type: FileType,
    pub tags: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_parsing() {
        assert_eq!("csv".parse::<FileType>().ok(), Some(FileType::Csv));
        assert_eq!("JSON".parse::<FileType>().ok(), Some(FileType::Json));
        assert_eq!(FileType::Csv.to_string(), "CSV");
        assert!("xlsx".parse::<FileType>().is_err());
    }
}
