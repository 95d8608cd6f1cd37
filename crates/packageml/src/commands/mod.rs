//! CLI command implementations.

pub mod datasets;
pub mod jobs;
pub mod models;

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

pub use datasets::DatasetCommand;
pub use jobs::JobCommand;
pub use models::ModelCommand;

/// Interval between job status polls while waiting for a run.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Prints a record as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parses a `key=value` hyperparameter. The value is read as JSON when it
/// parses, otherwise kept as a string.
pub fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in `{raw}`"));
    }

    let value = value.trim();
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("epochs=10"), Ok(("epochs".to_string(), json!(10))));
        assert_eq!(
            parse_param("learning_rate = 0.01"),
            Ok(("learning_rate".to_string(), json!(0.01)))
        );
        assert_eq!(
            parse_param("solver=adam"),
            Ok(("solver".to_string(), json!("adam")))
        );
        assert!(parse_param("epochs").is_err());
        assert!(parse_param("=3").is_err());
    }
}
