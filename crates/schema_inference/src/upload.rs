//! Parsing and normalization of uploaded CSV, JSON and Excel files.

use std::io::Cursor;

use calamine::{Data, Reader};
use serde_json::{Map, Value};
use tabular_structs::{FileType, Row, ServiceError};

use crate::text_form;

/// Rows recovered from an uploaded file, ready for schema inference.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUpload {
    pub rows: Vec<Row>,
    /// Original stem with a `.csv` extension, whatever the upload was
    pub filename: String,
    /// Always [`FileType::Csv`]; uploads are stored as tabular text
    pub file_type: FileType,
}

/// A column gathered from the file before its values are normalized.
struct RawColumn {
    name: String,
    cells: Vec<Value>,
}

/// Parses an uploaded file and normalizes every column to a single kind.
///
/// # Errors
///
/// Returns a validation error if the extension is unsupported or the
/// content cannot be parsed.
pub fn parse_upload(
    content: &[u8],
    filename: &str,
    has_header: bool,
) -> Result<ParsedUpload, ServiceError> {
    let extension = filename.rsplit('.').next().unwrap_or_default().to_lowercase();

    let (columns, row_count) = match extension.as_str() {
        "csv" => read_csv(content, has_header),
        "json" => read_json(content),
        "xlsx" | "xls" => read_excel(content, has_header),
        _ => {
            return Err(ServiceError::validation(
                "Unsupported file type. Please upload CSV, JSON, or Excel files.",
            ))
        }
    }
    .map_err(|e| ServiceError::validation(format!("Error parsing file: {e}")))?;

    let columns: Vec<(String, Vec<Value>)> = columns
        .into_iter()
        .map(|column| {
            let values = normalize_column(column.cells);
            (column.name, values)
        })
        .collect();

    let rows = (0..row_count)
        .map(|index| {
            columns
                .iter()
                .map(|(name, values)| (name.clone(), values[index].clone()))
                .collect::<Row>()
        })
        .collect::<Vec<_>>();

    let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);

    tracing::debug!(filename, rows = rows.len(), columns = columns.len(), "Parsed upload");

    Ok(ParsedUpload {
        rows,
        filename: format!("{stem}.csv"),
        file_type: FileType::Csv,
    })
}

fn read_csv(content: &[u8], has_header: bool) -> Result<(Vec<RawColumn>, usize), String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .from_reader(content);

    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    let names: Vec<String> = if has_header {
        let headers = reader.headers().map_err(|e| e.to_string())?;
        dedupe_names(headers.iter().map(str::to_string))
    } else {
        let width = records.first().map_or(0, csv::StringRecord::len);
        (1..=width).map(|i| format!("Column{i}")).collect()
    };

    let mut columns: Vec<RawColumn> = names
        .into_iter()
        .map(|name| RawColumn {
            name,
            cells: Vec::with_capacity(records.len()),
        })
        .collect();

    for record in &records {
        for (index, column) in columns.iter_mut().enumerate() {
            let cell = match record.get(index) {
                Some(text) if !text.is_empty() => Value::String(text.to_string()),
                _ => Value::Null,
            };
            column.cells.push(cell);
        }
    }

    Ok((columns, records.len()))
}

fn read_json(content: &[u8]) -> Result<(Vec<RawColumn>, usize), String> {
    let parsed: Value = serde_json::from_slice(content).map_err(|e| e.to_string())?;

    let objects: Vec<Map<String, Value>> = match parsed {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(object) => Ok(object),
                other => Err(format!("expected an object per row, found {other}")),
            })
            .collect::<Result<_, _>>()?,
        Value::Object(object) => vec![object],
        other => return Err(format!("expected an array of objects, found {other}")),
    };

    // Columns are the union of keys in order of first appearance.
    let mut names: Vec<String> = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let cells = objects
                .iter()
                .map(|object| object.get(&name).cloned().unwrap_or(Value::Null))
                .collect();
            RawColumn { name, cells }
        })
        .collect();

    Ok((columns, objects.len()))
}

/// Reads the first worksheet of an `.xlsx` or `.xls` workbook.
fn read_excel(content: &[u8], has_header: bool) -> Result<(Vec<RawColumn>, usize), String> {
    let mut workbook =
        calamine::open_workbook_auto_from_rs(Cursor::new(content)).map_err(|e| e.to_string())?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no worksheets".to_string())?
        .map_err(|e| e.to_string())?;

    Ok(sheet_columns(range.rows(), has_header))
}

/// Splits worksheet rows into columns, taking names from the first row
/// when `has_header` is set.
fn sheet_columns<'a>(
    mut rows: impl Iterator<Item = &'a [Data]>,
    has_header: bool,
) -> (Vec<RawColumn>, usize) {
    let header: Option<Vec<String>> = if has_header {
        rows.next()
            .map(|cells| cells.iter().map(ToString::to_string).collect())
    } else {
        None
    };
    let body: Vec<&[Data]> = rows.collect();

    let width = body
        .iter()
        .map(|cells| cells.len())
        .chain(header.as_ref().map(Vec::len))
        .max()
        .unwrap_or(0);

    let names: Vec<String> = match header {
        Some(header) => dedupe_names((0..width).map(|index| {
            match header.get(index).map(|name| name.trim()) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => format!("Column{}", index + 1),
            }
        })),
        None => (1..=width).map(|i| format!("Column{i}")).collect(),
    };

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(index, name)| RawColumn {
            name,
            cells: body
                .iter()
                .map(|cells| cells.get(index).map_or(Value::Null, cell_value))
                .collect(),
        })
        .collect();

    (columns, body.len())
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(n) => Value::from(*n),
        Data::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Data::Bool(flag) => Value::Bool(*flag),
        Data::String(text) if text.is_empty() => Value::Null,
        Data::String(text) => Value::String(text.clone()),
        other => Value::String(other.to_string()),
    }
}

/// Suffixes repeated header names with `.1`, `.2`, ...
fn dedupe_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{name}.{suffix}");
            suffix += 1;
        }
        seen.push(candidate);
    }
    seen
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.as_str() {
            "True" | "true" | "TRUE" => Some(true),
            "False" | "false" | "FALSE" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Converts a column to integers, floats or text.
///
/// Numeric columns become integers when every present value is whole
/// (missing as 0) and floats otherwise (missing as 0.0); boolean columns
/// count as numeric. Everything else becomes text with missing as "".
fn normalize_column(cells: Vec<Value>) -> Vec<Value> {
    let present: Vec<&Value> = cells.iter().filter(|cell| !cell.is_null()).collect();

    if present.is_empty() {
        return cells.iter().map(|_| Value::String(String::new())).collect();
    }

    let numbers: Option<Vec<f64>> = present.iter().map(|cell| as_number(cell)).collect();
    let numbers = numbers.or_else(|| {
        present
            .iter()
            .map(|cell| as_flag(cell).map(|flag| f64::from(u8::from(flag))))
            .collect()
    });

    if numbers.is_some() {
        let numeric = |cell: &Value| {
            as_number(cell).or_else(|| as_flag(cell).map(|flag| f64::from(u8::from(flag))))
        };
        let whole = present
            .iter()
            .filter_map(|cell| numeric(cell))
            .all(|n| n.fract() == 0.0);

        return cells
            .iter()
            .map(|cell| {
                let n = numeric(cell).unwrap_or(0.0);
                if whole {
                    Value::from(n as i64)
                } else {
                    Value::from(n)
                }
            })
            .collect();
    }

    cells
        .into_iter()
        .map(|cell| match cell {
            Value::Null => Value::String(String::new()),
            Value::String(text) => Value::String(text),
            other => Value::String(text_form(&other)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_csv_with_header_normalizes_columns() {
        let content = b"id,price,name,flag\n1,2.5,ada,true\n2,,,false\n3,4,bob,true\n";
        let parsed = parse_upload(content, "shop.data.CSV", true).expect("csv should parse");

        assert_eq!(parsed.filename, "shop.data.csv");
        assert_eq!(parsed.file_type, FileType::Csv);
        assert_eq!(parsed.rows.len(), 3);

        let second = &parsed.rows[1];
        assert_eq!(second["id"], json!(2));
        assert_eq!(second["price"], json!(0.0));
        assert_eq!(second["name"], json!(""));
        assert_eq!(second["flag"], json!(0));

        assert_eq!(parsed.rows[2]["price"], json!(4.0));
        let keys: Vec<&String> = parsed.rows[0].keys().collect();
        assert_eq!(keys, ["id", "price", "name", "flag"]);
    }

    #[test]
    fn test_csv_without_header_names_columns() {
        let parsed = parse_upload(b"a,1\nb,2\n", "raw.csv", false).expect("csv should parse");

        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0]["Column1"], json!("a"));
        assert_eq!(parsed.rows[1]["Column2"], json!(2));
    }

    #[test]
    fn test_whole_floats_become_integers() {
        let parsed = parse_upload(b"v\n1.0\n2\n", "v.csv", true).expect("csv should parse");
        assert_eq!(parsed.rows[0]["v"], json!(1));
        assert_eq!(parsed.rows[1]["v"], json!(2));
    }

    #[test]
    fn test_json_array_uses_union_of_keys() {
        let content = br#"[{"a": 1, "b": "x"}, {"a": 2.5, "c": true}]"#;
        let parsed = parse_upload(content, "rows.json", true).expect("json should parse");

        assert_eq!(parsed.filename, "rows.csv");
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0]["a"], json!(1.0));
        assert_eq!(parsed.rows[1]["b"], json!(""));
        assert_eq!(parsed.rows[0]["c"], json!(0), "booleans count as numeric");
        assert_eq!(parsed.rows[1]["c"], json!(1));
    }

    #[test]
    fn test_json_single_object_is_one_row() {
        let parsed = parse_upload(br#"{"k": 7}"#, "one.json", true).expect("json should parse");
        assert_eq!(parsed.rows, vec![json!({"k": 7}).as_object().cloned().unwrap_or_default()]);
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let err = parse_upload(b"", "notes.txt", true).expect_err("txt is not supported");
        assert!(matches!(err, ServiceError::Validation(message) if message.contains("Unsupported")));
    }

    #[test]
    fn test_sheet_with_header_normalizes_columns() {
        let sheet = vec![
            vec![
                Data::String("id".into()),
                Data::String("score".into()),
                Data::String("name".into()),
            ],
            vec![Data::Float(1.0), Data::Float(0.5), Data::String("ada".into())],
            vec![Data::Int(2), Data::Empty, Data::Empty],
        ];

        let (columns, count) = sheet_columns(sheet.iter().map(Vec::as_slice), true);
        assert_eq!(count, 2);

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "score", "name"]);
        assert_eq!(normalize_column(columns[0].cells.clone()), [json!(1), json!(2)]);
        assert_eq!(normalize_column(columns[1].cells.clone()), [json!(0.5), json!(0.0)]);
        assert_eq!(normalize_column(columns[2].cells.clone()), [json!("ada"), json!("")]);
    }

    #[test]
    fn test_sheet_without_header_names_columns() {
        let sheet = vec![
            vec![Data::Bool(true), Data::String("x".into())],
            vec![Data::Bool(false)],
        ];

        let (columns, count) = sheet_columns(sheet.iter().map(Vec::as_slice), false);
        assert_eq!(count, 2);
        assert_eq!(columns[0].name, "Column1");
        assert_eq!(columns[1].name, "Column2");
        assert_eq!(columns[1].cells, [json!("x"), Value::Null]);
        assert_eq!(normalize_column(columns[0].cells.clone()), [json!(1), json!(0)]);
    }

    #[test]
    fn test_sheet_blank_and_repeated_headers() {
        let sheet = vec![
            vec![Data::String("a".into()), Data::Empty, Data::String("a".into())],
            vec![Data::Int(1), Data::Int(2), Data::Int(3)],
        ];

        let (columns, _) = sheet_columns(sheet.iter().map(Vec::as_slice), true);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "Column2", "a.1"]);
    }

    #[test]
    fn test_unreadable_workbook_is_rejected() {
        for filename in ["sheet.xlsx", "legacy.XLS"] {
            let err = parse_upload(b"not a workbook", filename, true).expect_err("bad workbook");
            assert!(
                matches!(&err, ServiceError::Validation(message) if message.starts_with("Error parsing file")),
                "{err}"
            );
        }
    }

    #[test]
    fn test_malformed_content_is_rejected() {
        let err = parse_upload(b"[1, 2", "broken.json", true).expect_err("json is malformed");
        assert!(matches!(err, ServiceError::Validation(message) if message.starts_with("Error parsing file")));

        let err = parse_upload(b"a,b\n1,2,3\n", "ragged.csv", true).expect_err("ragged csv");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_duplicate_headers_are_suffixed() {
        let parsed = parse_upload(b"a,a,a\n1,2,3\n", "dup.csv", true).expect("csv should parse");
        let keys: Vec<&String> = parsed.rows[0].keys().collect();
        assert_eq!(keys, ["a", "a.1", "a.2"]);
    }
}
