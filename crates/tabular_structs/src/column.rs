use serde::{Deserialize, Serialize};

/// Inferred type of a dataset column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    #[default]
    String,
}

impl ColumnType {
    /// Whether values of this type can feed a regression target directly.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Boolean)
    }
}

/// Schema entry describing one column of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name as it appears in the first row
    pub name: String,

    /// Inferred column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Number of rows where the column is absent or empty
    pub missing: usize,

    /// Text form of a representative value
    pub example: Option<String>,
}

impl ColumnSchema {
    /// Creates an entry with no observations yet.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::default(),
            missing: 0,
            example: None,
        }
    }
}

/// Returns true if `column` names an entry of `schema`.
#[must_use]
pub fn schema_contains(schema: &[ColumnSchema], column: &str) -> bool {
    schema.iter().any(|entry| entry.name == column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_serializes_lowercase() {
        let json = serde_json::to_string(&ColumnType::Integer).expect("serialize");
        assert_eq!(json, "\"integer\"");
        assert_eq!("float".parse::<ColumnType>().ok(), Some(ColumnType::Float));
        assert_eq!(ColumnType::Boolean.to_string(), "boolean");
    }

    #[test]
    fn test_column_schema_uses_type_key() {
        let entry = ColumnSchema {
            name: "age".to_string(),
            column_type: ColumnType::Integer,
            missing: 2,
            example: Some("41".to_string()),
        };

        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["type"], "integer");
        assert_eq!(value["missing"], 2);
        assert!(schema_contains(&[entry], "age"));
    }
}
