//! Schema inference for tabular datasets.
//!
//! This crate turns semi-structured rows (uploaded files, JSON payloads or
//! generated samples) into a validated column schema with per-column types,
//! missing counts and example values.

mod infer;
mod synthetic;
mod upload;

pub use infer::*;
pub use synthetic::*;
pub use upload::*;
