//! Common structs for datasets, models and training jobs shared across crates.

mod column;
mod dataset;
mod error;
mod hyperparameters;
mod job;
mod model;

pub use column::*;
pub use dataset::*;
pub use error::*;
pub use hyperparameters::*;
pub use job::*;
pub use model::*;

/// One row of tabular data: column name to JSON value, in insertion order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Open metrics mapping reported by a training run.
pub type Metrics = serde_json::Map<String, serde_json::Value>;
