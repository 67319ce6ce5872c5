use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::config::{FieldKind, RecordSchema};
use crate::constants::source::DEFAULT_DELIMITER;
use crate::data::{FieldName, RawRecord, Value};
use crate::errors::PipelineError;
use crate::source::{RecordSource, SourceTags, apply_tags};
use crate::types::SourceId;

/// Column layout of a delimited file.
#[derive(Clone, Debug, PartialEq)]
pub enum DelimitedLayout {
    /// First non-blank line names the columns; cell types are inferred.
    Headed,
    /// Every line follows `schema`; numbers must parse.
    Headerless(RecordSchema),
}

/// Configuration for a delimited file source.
#[derive(Clone, Debug)]
pub struct DelimitedSourceConfig {
    /// Stable source identifier used in errors and logs.
    pub source_id: SourceId,
    /// File to read.
    pub path: PathBuf,
    /// Header row or declared schema.
    pub layout: DelimitedLayout,
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Constant fields stamped on every record.
    pub tags: SourceTags,
}

impl DelimitedSourceConfig {
    /// Config for a file whose first line is a header row.
    pub fn headed(source_id: impl Into<SourceId>, path: impl Into<PathBuf>) -> Self {
        Self::with_layout(source_id, path, DelimitedLayout::Headed)
    }

    /// Config for a header-less file with a fixed field order.
    pub fn headerless(
        source_id: impl Into<SourceId>,
        path: impl Into<PathBuf>,
        schema: RecordSchema,
    ) -> Self {
        Self::with_layout(source_id, path, DelimitedLayout::Headerless(schema))
    }

    fn with_layout(
        source_id: impl Into<SourceId>,
        path: impl Into<PathBuf>,
        layout: DelimitedLayout,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
            layout,
            delimiter: DEFAULT_DELIMITER,
            tags: Vec::new(),
        }
    }

    /// Override the field delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
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

/// Delimited text source (one record per line).
pub struct DelimitedSource {
    config: DelimitedSourceConfig,
}

impl DelimitedSource {
    /// Create a delimited source from configuration.
    pub fn new(config: DelimitedSourceConfig) -> Self {
        Self { config }
    }

    /// Parse delimited text from `reader` with this source's settings.
    ///
    /// Blank lines are skipped. Any line with the wrong number of fields, or a
    /// declared number field that does not parse, aborts the whole read.
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<Vec<RawRecord>, PipelineError> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .delimiter(self.config.delimiter)
            .from_reader(reader);

        let mut header: Option<Vec<FieldName>> = None;
        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row.map_err(|err| self.undecodable(err))?;
            if is_blank(&row) {
                continue;
            }
            let line = row.position().map(|pos| pos.line() as usize).unwrap_or(0);
            let record = match &self.config.layout {
                DelimitedLayout::Headerless(schema) => self.parse_schema_row(schema, &row, line)?,
                DelimitedLayout::Headed => match &header {
                    None => {
                        header = Some(row.iter().map(|name| name.to_string()).collect());
                        continue;
                    }
                    Some(names) => self.parse_headed_row(names, &row, line)?,
                },
            };
            records.push(apply_tags(&self.config.tags, record));
        }
        debug!(
            source_id = %self.config.source_id,
            records = records.len(),
            "parsed delimited source"
        );
        Ok(records)
    }

    fn parse_schema_row(
        &self,
        schema: &RecordSchema,
        row: &StringRecord,
        line: usize,
    ) -> Result<RawRecord, PipelineError> {
        self.check_width(schema.len(), row, line)?;
        let mut record = RawRecord::new();
        for (spec, cell) in schema.fields().iter().zip(row.iter()) {
            let value = match spec.kind {
                FieldKind::Number => {
                    Value::parse_number(cell).ok_or_else(|| self.malformed(
                        line,
                        format!("field '{}' expects a number, found '{cell}'", spec.name),
                    ))?
                }
                FieldKind::Label if cell.is_empty() => Value::Missing,
                FieldKind::Label => Value::Label(cell.to_string()),
            };
            record = record.with(spec.name.clone(), value);
        }
        Ok(record)
    }

    fn parse_headed_row(
        &self,
        names: &[FieldName],
        row: &StringRecord,
        line: usize,
    ) -> Result<RawRecord, PipelineError> {
        self.check_width(names.len(), row, line)?;
        Ok(RawRecord::from_fields(
            names
                .iter()
                .zip(row.iter())
                .map(|(name, cell)| (name.clone(), Value::infer(cell))),
        ))
    }

    fn check_width(
        &self,
        expected: usize,
        row: &StringRecord,
        line: usize,
    ) -> Result<(), PipelineError> {
        if row.len() != expected {
            return Err(self.malformed(
                line,
                format!("expected {expected} fields, found {}", row.len()),
            ));
        }
        Ok(())
    }

    fn malformed(&self, line: usize, details: String) -> PipelineError {
        PipelineError::MalformedRecord {
            source_id: self.config.source_id.clone(),
            line,
            details,
        }
    }

    /// Rows that cannot be decoded are malformed records; other reader
    /// failures stay I/O or CSV errors.
    fn undecodable(&self, err: csv::Error) -> PipelineError {
        let line = err
            .position()
            .map(|pos| pos.line() as usize)
            .unwrap_or(0);
        match err.kind() {
            csv::ErrorKind::Utf8 { err: utf8, .. } => {
                self.malformed(line, format!("invalid UTF-8: {utf8}"))
            }
            _ => PipelineError::from(err),
        }
    }
}

/// A whitespace-only line; rows of empty cells are still records.
fn is_blank(row: &StringRecord) -> bool {
    row.len() == 1 && row[0].is_empty()
}

impl RecordSource for DelimitedSource {
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
        self.parse_reader(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn search_space_schema() -> RecordSchema {
        RecordSchema::new()
            .number("nodes_visited")
            .number("nodes_queued")
            .number("edges_traversed")
            .label("algorithm")
            .label("direction")
    }

    #[test]
    fn headerless_lines_follow_schema_types() {
        let source = DelimitedSource::new(DelimitedSourceConfig::headerless(
            "sptree",
            "unused",
            search_space_schema(),
        ));
        let records = source
            .parse_reader("3,4,5,bidijkstra,forward\n\n6,7,8,dijkstra,total\n".as_bytes())
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value("edges_traversed"), &Value::from(5));
        assert_eq!(records[0].value("direction"), &Value::from("forward"));
        assert_eq!(records[1].value("algorithm"), &Value::from("dijkstra"));
    }

    #[test]
    fn wrong_field_count_reports_line() {
        let source = DelimitedSource::new(DelimitedSourceConfig::headerless(
            "sptree",
            "unused",
            search_space_schema(),
        ));
        let err = source
            .parse_reader("3,4,5,bidijkstra,forward\n6,7,dijkstra,total\n".as_bytes())
            .unwrap_err();
        match err {
            PipelineError::MalformedRecord {
                source_id, line, ..
            } => {
                assert_eq!(source_id, "sptree");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unparsable_number_is_malformed() {
        let source = DelimitedSource::new(DelimitedSourceConfig::headerless(
            "hops",
            "unused",
            RecordSchema::new().number("hops"),
        ));
        let err = source.parse_reader("3\nmany\n".as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn headed_rows_infer_types_and_apply_tags() {
        let source = DelimitedSource::new(
            DelimitedSourceConfig::headed("gnp", "unused").with_tag("gen", "gnp"),
        );
        let records = source
            .parse_reader("round,rate,initial,degree\n1,0.5,m,10\n2,,z,20\n".as_bytes())
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value("rate"), &Value::Number(0.5));
        assert_eq!(records[0].value("initial"), &Value::from("m"));
        assert_eq!(records[1].value("rate"), &Value::Missing);
        assert_eq!(records[1].value("gen"), &Value::from("gnp"));
    }

    #[test]
    fn headed_row_width_must_match_header() {
        let source = DelimitedSource::new(DelimitedSourceConfig::headed("gnp", "unused"));
        let err = source
            .parse_reader("round,rate\n1,0.5,extra\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn rows_of_empty_cells_are_records_not_blank_lines() {
        let source = DelimitedSource::new(DelimitedSourceConfig::headerless(
            "sptree",
            "unused",
            RecordSchema::new().number("a").number("b").number("c"),
        ));
        let records = source
            .parse_reader("1,2,3\n,,\n  \n4,5,6\n".as_bytes())
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].value("a"), &Value::Missing);
        assert_eq!(records[1].value("c"), &Value::Missing);

        let err = source
            .parse_reader("1,2,3\n,,,,,\n4,5,6\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn invalid_utf8_is_malformed_with_line() {
        let source = DelimitedSource::new(DelimitedSourceConfig::headed("gnp", "unused"));
        let err = source.parse_reader(&b"a,b\n1,\xff\xfe\n"[..]).unwrap_err();
        match err {
            PipelineError::MalformedRecord {
                source_id, line, ..
            } => {
                assert_eq!(source_id, "gnp");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_missing_source() {
        let temp = tempdir().unwrap();
        let source = DelimitedSource::new(DelimitedSourceConfig::headed(
            "absent",
            temp.path().join("absent.out"),
        ));
        assert!(matches!(
            source.read_records(),
            Err(PipelineError::MissingSource { .. })
        ));
    }

    #[test]
    fn reads_from_disk_with_custom_delimiter() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("insertions.out");
        std::fs::write(&path, "12;acc;bd\n40;rej;d\n").unwrap();
        let schema = RecordSchema::new()
            .number("insertions")
            .label("acc")
            .label("algo");
        let source = DelimitedSource::new(
            DelimitedSourceConfig::headerless("insertions", &path, schema).with_delimiter(b';'),
        );
        let records = source.read_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].value("insertions"), &Value::from(40));
    }
}
