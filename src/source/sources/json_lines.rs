use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::data::{FieldName, RawRecord, Value};
use crate::errors::PipelineError;
use crate::source::{RecordSource, SourceTags, apply_tags};
use crate::types::SourceId;

/// Configuration for a JSON-lines source.
#[derive(Clone, Debug)]
pub struct JsonLinesSourceConfig {
    /// Stable source identifier used in errors and logs.
    pub source_id: SourceId,
    /// File to read.
    pub path: PathBuf,
    /// Constant fields stamped on every record.
    pub tags: SourceTags,
}

impl JsonLinesSourceConfig {
    /// Create a config for `path`.
    pub fn new(source_id: impl Into<SourceId>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
            tags: Vec::new(),
        }
    }

    /// Stamp `field = value` on every record.
    pub fn with_tag(mut self, field: impl Into<FieldName>, value: impl Into<Value>) -> Self {
        self.tags.push((field.into(), value.into()));
        self
    }

    /// Replace all tags.
    pub fn with_tags(mut self, tags: SourceTags) -> Self {
        self.tags = tags;
        self
    }
}

/// Source reading one JSON object per line.
///
/// Scalars map onto record values (booleans become 1/0, null becomes
/// `Missing`); nested arrays and objects are not scalar and are skipped.
pub struct JsonLinesSource {
    config: JsonLinesSourceConfig,
}

impl JsonLinesSource {
    /// Create a JSON-lines source from configuration.
    pub fn new(config: JsonLinesSourceConfig) -> Self {
        Self { config }
    }

    /// Parse JSON lines from `reader`.
    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<Vec<RawRecord>, PipelineError> {
        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|err| match err.kind() {
                io::ErrorKind::InvalidData => self.malformed(line_no, err.to_string()),
                _ => PipelineError::from(err),
            })?;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            let parsed: JsonValue =
                serde_json::from_str(text).map_err(|err| self.malformed(line_no, err.to_string()))?;
            let JsonValue::Object(object) = parsed else {
                return Err(self.malformed(line_no, "expected a JSON object".to_string()));
            };
            let mut record = RawRecord::new();
            for (field, value) in object {
                match scalar_value(&value) {
                    Some(value) => record = record.with(field, value),
                    None => trace!(
                        source_id = %self.config.source_id,
                        line = line_no,
                        field = %field,
                        "skipping non-scalar field"
                    ),
                }
            }
            records.push(apply_tags(&self.config.tags, record));
        }
        debug!(
            source_id = %self.config.source_id,
            records = records.len(),
            "parsed json-lines source"
        );
        Ok(records)
    }

    fn malformed(&self, line: usize, details: String) -> PipelineError {
        PipelineError::MalformedRecord {
            source_id: self.config.source_id.clone(),
            line,
            details,
        }
    }
}

fn scalar_value(value: &JsonValue) -> Option<Value> {
    match value {
        JsonValue::Null => Some(Value::Missing),
        JsonValue::Bool(flag) => Some(Value::Number(if *flag { 1.0 } else { 0.0 })),
        JsonValue::Number(number) => number.as_f64().map(Value::Number),
        JsonValue::String(text) => Some(Value::Label(text.clone())),
        JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

impl RecordSource for JsonLinesSource {
    fn id(&self) -> &str {
        &self.config.source_id
    }

    fn read_records(&self) -> Result<Vec<RawRecord>, PipelineError> {
        if !self.config.path.is_file() {
            return Err(PipelineError::MissingSource {
                source_id: self.config.source_id.clone(),
                path: self.config.path.display().to_string(),
            });
        }
        let file = File::open(&self.config.path)?;
        self.parse_reader(BufReader::new(file))
    }
}
