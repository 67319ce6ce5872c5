/// Constants used when parsing raw cells.
pub mod data {
    /// Cell texts treated as an absent value, compared ignoring ASCII case
    /// (empty cells are always absent).
    pub const MISSING_TOKENS: &[&str] = &["None", "null", "NaN", "NA"];
}

/// Constants used by record sources.
pub mod source {
    /// Field delimiter used by the experiment drivers.
    pub const DEFAULT_DELIMITER: u8 = b',';
    /// File extensions picked up by directory discovery when none are given.
    pub const DEFAULT_EXTENSIONS: &[&str] = &["out", "csv", "jsonl", "json"];
    /// Extensions read as JSON lines when the format is inferred from a path.
    pub const JSON_LINES_EXTENSIONS: &[&str] = &["jsonl", "json"];
}

/// Constants used by forward/backward pairing.
pub mod pairing {
    /// Default name of the field holding the search algorithm tag.
    pub const ALGORITHM_FIELD: &str = "algorithm";
    /// Default name of the field holding the search direction.
    pub const DIRECTION_FIELD: &str = "direction";
    /// Algorithm tag of bidirectional half-search records.
    pub const BIDIRECTIONAL_LABEL: &str = "bidirectional";
    /// Direction tag of the first half of a bidirectional run.
    pub const FORWARD_LABEL: &str = "forward";
    /// Direction tag of the second half of a bidirectional run.
    pub const BACKWARD_LABEL: &str = "backward";
    /// Algorithm tag written onto synthesized total records.
    pub const TOTAL_LABEL: &str = "bidirectional-total";
}

/// Constants used by aggregation, filtering and emission.
pub mod summary {
    /// Minimum number of records a group needs to survive the support filter.
    pub const DEFAULT_MIN_SUPPORT: u64 = 10;
    /// Name of the per-group record count column.
    pub const COUNT_COLUMN: &str = "count";
    /// Suffix of default normalization column names.
    pub const NORMALIZED_SUFFIX: &str = "normalized";
}
