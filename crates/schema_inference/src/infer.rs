//! Column schema inference over row data.
//!
//! Type and example follow a last-value-wins policy: every non-missing value
//! overwrites the column's recorded type and example, so the final schema
//! reflects the last non-missing value of each column rather than the first
//! value or a majority vote.

use std::io;

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::Formatter;
use tabular_structs::{ColumnSchema, ColumnType, Row, ServiceError};

/// Maximum number of columns accepted at ingestion.
pub const MAX_COLUMNS: usize = 20;

/// Maximum number of rows for direct and uploaded datasets.
pub const MAX_ROWS: usize = 5000;

/// Maximum number of rows for generated datasets.
pub const MAX_SYNTHETIC_ROWS: usize = 2000;

/// Size limits enforced before a schema is inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestLimits {
    pub max_columns: usize,
    pub max_rows: usize,
}

impl IngestLimits {
    /// Limits for rows supplied directly or through an upload.
    #[must_use]
    pub const fn direct() -> Self {
        Self {
            max_columns: MAX_COLUMNS,
            max_rows: MAX_ROWS,
        }
    }

    /// Limits for generated datasets.
    #[must_use]
    pub const fn synthetic() -> Self {
        Self {
            max_columns: MAX_COLUMNS,
            max_rows: MAX_SYNTHETIC_ROWS,
        }
    }

    /// Rejects empty input, too many first-row keys or too many rows.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the violated limit.
    pub fn check(&self, rows: &[Row]) -> Result<(), ServiceError> {
        let Some(first) = rows.first() else {
            return Err(ServiceError::validation("Dataset is empty"));
        };

        if first.len() > self.max_columns {
            return Err(ServiceError::validation(format!(
                "Dataset exceeds column limit. Maximum {} columns allowed.",
                self.max_columns
            )));
        }

        if rows.len() > self.max_rows {
            return Err(ServiceError::validation(format!(
                "Dataset exceeds row limit. Maximum {} rows allowed.",
                self.max_rows
            )));
        }

        Ok(())
    }
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self::direct()
    }
}

/// How values were ingested, which decides what counts as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Typed JSON values: absent keys and nulls are missing.
    #[default]
    Structured,
    /// Values parsed from text files: empty strings are missing as well.
    Text,
}

impl IngestMode {
    fn is_missing(self, value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => self == Self::Text && text.is_empty(),
            Some(_) => false,
        }
    }
}

/// Result of schema inference over a batch of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredSchema {
    /// One entry per first-row key, in first-row order
    pub columns: Vec<ColumnSchema>,
    /// Sum of the per-column missing counts
    pub missing_values: usize,
    /// Byte length of the serialized rows
    pub size: usize,
}

/// Infers the column schema of `rows` after enforcing `limits`.
///
/// # Errors
///
/// Returns a validation error if the rows are empty or exceed the limits.
pub fn infer_schema(
    rows: &[Row],
    limits: IngestLimits,
    mode: IngestMode,
) -> Result<InferredSchema, ServiceError> {
    limits.check(rows)?;

    let first = rows.first().map(|row| row.keys()).into_iter().flatten();
    let mut columns: Vec<ColumnSchema> = first.map(ColumnSchema::empty).collect();

    for column in &mut columns {
        for row in rows {
            let value = row.get(&column.name);
            if mode.is_missing(value) {
                column.missing += 1;
                continue;
            }

            if let Some(value) = value {
                column.column_type = classify(value);
                column.example = Some(text_form(value));
            }
        }
    }

    let missing_values = columns.iter().map(|column| column.missing).sum();

    Ok(InferredSchema {
        columns,
        missing_values,
        size: serialized_size(rows),
    })
}

/// Classifies a single value, testing boolean before integer before float.
#[must_use]
pub fn classify(value: &Value) -> ColumnType {
    match value {
        Value::Bool(_) => ColumnType::Boolean,
        Value::Number(number) if number.is_i64() || number.is_u64() => ColumnType::Integer,
        Value::Number(_) => ColumnType::Float,
        Value::Null | Value::String(_) | Value::Array(_) | Value::Object(_) => ColumnType::String,
    }
}

/// Text form of a value as shown in schema examples.
///
/// Booleans render as `True`/`False`, strings verbatim, nested values as
/// compact JSON.
#[must_use]
pub fn text_form(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Byte length of `rows` serialized with `", "` / `": "` separators and
/// ASCII-escaped strings.
#[must_use]
pub fn serialized_size<T: Serialize + ?Sized>(rows: &T) -> usize {
    let mut counter = ByteCounter(0);
    let mut serializer = serde_json::Serializer::with_formatter(&mut counter, SpacedFormatter);

    // Writing into a counter cannot fail and Value maps always have string keys.
    if rows.serialize(&mut serializer).is_err() {
        tracing::warn!("row serialization failed while measuring dataset size");
    }

    counter.0
}

/// `io::Write` sink that only counts bytes.
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// JSON formatter with spaced separators and `\uXXXX` escapes for non-ASCII.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rows(value: Value) -> Vec<Row> {
        serde_json::from_value(value).expect("rows should deserialize")
    }

    #[test]
    fn test_last_non_missing_value_wins() {
        let data = rows(json!([
            {"a": 1, "b": "x"},
            {"a": 2, "b": "y"},
            {"a": null, "b": "z"},
        ]));

        let schema = infer_schema(&data, IngestLimits::direct(), IngestMode::Structured)
            .expect("inference should succeed");

        assert_eq!(schema.columns.len(), 2);

        let a = &schema.columns[0];
        assert_eq!(a.name, "a");
        assert_eq!(a.column_type, ColumnType::Integer);
        assert_eq!(a.missing, 1);
        assert_eq!(a.example.as_deref(), Some("2"));

        let b = &schema.columns[1];
        assert_eq!(b.name, "b");
        assert_eq!(b.column_type, ColumnType::String);
        assert_eq!(b.missing, 0);
        assert_eq!(b.example.as_deref(), Some("z"));

        assert_eq!(schema.missing_values, 1);
    }

    #[test]
    fn test_type_follows_last_value_not_majority() {
        let data = rows(json!([{"v": 1}, {"v": 2}, {"v": 2.5}, {"w": 0}]));
        let schema = infer_schema(&data, IngestLimits::direct(), IngestMode::Structured)
            .expect("inference should succeed");

        let v = &schema.columns[0];
        assert_eq!(v.column_type, ColumnType::Float);
        assert_eq!(v.example.as_deref(), Some("2.5"));
        assert_eq!(v.missing, 1, "absent key counts as missing");
        assert_eq!(schema.columns.len(), 1, "only first-row keys become columns");
    }

    #[test]
    fn test_boolean_is_not_an_integer() {
        assert_eq!(classify(&json!(true)), ColumnType::Boolean);
        assert_eq!(classify(&json!(1)), ColumnType::Integer);
        assert_eq!(classify(&json!(1.0)), ColumnType::Float);
        assert_eq!(classify(&json!("1")), ColumnType::String);
        assert_eq!(text_form(&json!(false)), "False");
        assert_eq!(text_form(&json!(2.0)), "2.0");
    }

    #[test]
    fn test_all_missing_column_keeps_defaults() {
        let data = rows(json!([{"a": null}, {"a": null}]));
        let schema = infer_schema(&data, IngestLimits::direct(), IngestMode::Structured)
            .expect("inference should succeed");

        assert_eq!(schema.columns[0].column_type, ColumnType::String);
        assert_eq!(schema.columns[0].missing, 2);
        assert_eq!(schema.columns[0].example, None);
    }

    #[test]
    fn test_text_mode_treats_empty_string_as_missing() {
        let data = rows(json!([{"name": "ada"}, {"name": ""}]));

        let structured = infer_schema(&data, IngestLimits::direct(), IngestMode::Structured)
            .expect("inference should succeed");
        assert_eq!(structured.columns[0].missing, 0);
        assert_eq!(structured.columns[0].example.as_deref(), Some(""));

        let text = infer_schema(&data, IngestLimits::direct(), IngestMode::Text)
            .expect("inference should succeed");
        assert_eq!(text.columns[0].missing, 1);
        assert_eq!(text.columns[0].example.as_deref(), Some("ada"));
    }

    #[test]
    fn test_column_limit() {
        let wide: Row = (0..21).map(|i| (format!("c{i}"), json!(i))).collect();
        let err = infer_schema(&[wide], IngestLimits::direct(), IngestMode::Structured)
            .expect_err("21 columns should be rejected");
        assert!(matches!(err, ServiceError::Validation(message) if message.contains("column limit")));

        let exact: Row = (0..20).map(|i| (format!("c{i}"), json!(i))).collect();
        assert!(infer_schema(&[exact], IngestLimits::direct(), IngestMode::Structured).is_ok());
    }

    #[test]
    fn test_row_limit() {
        let row = rows(json!([{"a": 1}])).remove(0);

        let too_many = vec![row.clone(); MAX_ROWS + 1];
        let err = infer_schema(&too_many, IngestLimits::direct(), IngestMode::Structured)
            .expect_err("5001 rows should be rejected");
        assert!(matches!(err, ServiceError::Validation(message) if message.contains("row limit")));

        let synthetic = vec![row; MAX_SYNTHETIC_ROWS + 1];
        assert!(IngestLimits::synthetic().check(&synthetic).is_err());
        assert!(IngestLimits::direct().check(&synthetic).is_ok());
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let err = infer_schema(&[], IngestLimits::direct(), IngestMode::Structured)
            .expect_err("empty input should be rejected");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_serialized_size_uses_spaced_separators() {
        let data = rows(json!([{"a": 1, "b": "x"}]));
        // [{"a": 1, "b": "x"}]
        assert_eq!(serialized_size(&data), 20);

        let accented = rows(json!([{"n": "é"}]));
        // [{"n": "é"}]
        assert_eq!(serialized_size(&accented), 17);
    }
}
