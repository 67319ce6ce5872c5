use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::data::Value;
use crate::types::{FieldName, PathString, SourceId};

/// Error type for ingestion, pairing, aggregation and configuration failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source path or config file does not exist.
    #[error("record source '{source_id}' not found at {path}")]
    MissingSource {
        /// Source that could not be opened.
        source_id: SourceId,
        /// Path that was looked up.
        path: PathString,
    },
    /// A line has the wrong field count or an unparsable number.
    #[error("malformed record in '{source_id}' at line {line}: {details}")]
    MalformedRecord {
        /// Source holding the bad line.
        source_id: SourceId,
        /// One-based line number in the source.
        line: usize,
        /// What failed to parse.
        details: String,
    },
    /// A forward/backward half record has no valid partner.
    #[error("unpaired half-search record in '{source_id}' at position {position}: {details}")]
    UnpairedHalfRecord {
        /// Source holding the half record.
        source_id: SourceId,
        /// Zero-based record position after parsing.
        position: usize,
        /// Which half is missing or mismatched.
        details: String,
    },
    /// A numeric operation met a label.
    #[error("field '{field}' holds non-numeric value '{value}'")]
    NonNumeric {
        /// Field read as a number.
        field: FieldName,
        /// Label found instead.
        value: String,
    },
    /// The experiment configuration cannot be run.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Delimited-text reader or writer failure.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// JSON parse or render failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Non-fatal normalization gap: no usable baseline exists for an outer key.
///
/// Rows sharing `outer_key` receive a missing normalized value.
#[derive(Clone, Debug, Error, PartialEq, Serialize)]
#[error(
    "no baseline for '{field}' where {baseline_key} = {baseline_value} (outer key {outer_key:?}): {reason}"
)]
pub struct BaselineUndefinedError {
    /// Normalized column left missing.
    pub column: String,
    /// Field whose mean is normalized.
    pub field: FieldName,
    /// Grouping key that marks baseline groups.
    pub baseline_key: FieldName,
    /// Value of `baseline_key` in baseline groups.
    pub baseline_value: Value,
    /// Outer-key values of the affected rows.
    pub outer_key: Vec<Value>,
    /// Why the baseline is unusable.
    pub reason: String,
}
