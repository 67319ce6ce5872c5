/// Delimited (comma-separated) sources, with or without a header row.
pub mod delimited;
/// JSON-lines sources.
pub mod json_lines;
