#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Per-group accumulation and statistics.
pub mod aggregate;
/// Experiment configuration types.
pub mod config;
/// Centralized constants used across sources, pairing, and summaries.
pub mod constants;
/// Record, value, and group key types.
pub mod data;
/// Reusable example runners shared by downstream crates.
pub mod example_apps;
/// Built-in experiment configurations.
pub mod experiments;
/// Minimum-support filtering.
pub mod filter;
/// Aggregate metrics helpers.
pub mod metrics;
/// Baseline normalization.
pub mod normalize;
/// Forward/backward half-record pairing.
pub mod pairing;
/// End-to-end aggregation pipeline.
pub mod pipeline;
/// Record source traits and built-in sources.
pub mod source;
/// Summary table and its CSV/JSON renderings.
pub mod summary;
/// Value corrections and derived columns.
pub mod transform;
/// Input transports used by sources (filesystem today).
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use aggregate::{GroupAggregator, GroupSummary};
pub use config::{
    ExperimentConfig, InputFormat, NormalizationSpec, PairingConfig, RecordSchema, RowOrder,
    StatisticKind, StatisticSpec, SuccessValue,
};
pub use data::{GroupKey, RawRecord, Value};
pub use errors::{BaselineUndefinedError, PipelineError};
pub use filter::SupportFilter;
pub use normalize::Normalizer;
pub use pairing::{PairReconciler, PairingStats};
pub use pipeline::SummaryPipeline;
pub use source::{InMemorySource, RecordSource};
pub use summary::{SummaryRow, SummaryTable};
pub use transform::{CorrectionTable, Derivation};
pub use types::{ColumnName, ExperimentName, FieldName, Label, PathString, SourceId};
