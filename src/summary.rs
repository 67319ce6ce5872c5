//! Final tidy table handed to the rendering layer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::aggregate::GroupSummary;
use crate::config::{ExperimentConfig, NormalizationSpec, StatisticSpec};
use crate::data::{Value, format_number};
use crate::errors::{BaselineUndefinedError, PipelineError};
use crate::types::{ColumnName, ExperimentName};

/// One emitted row: key values, record count, then statistic cells.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryRow {
    /// Grouping-key values in configured order.
    pub key: Vec<Value>,
    /// Records backing the row.
    pub count: u64,
    /// Statistic and normalization cells (`None` = missing).
    pub values: Vec<Option<f64>>,
}

/// Ordered summary rows with their column names and run diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryTable {
    experiment: ExperimentName,
    columns: Vec<ColumnName>,
    key_width: usize,
    rows: Vec<SummaryRow>,
    records: u64,
    dropped_groups: usize,
    diagnostics: Vec<BaselineUndefinedError>,
}

impl SummaryTable {
    /// Project filtered group summaries into the configured column layout.
    ///
    /// `records` is the number of records aggregated (after pairing), kept
    /// for reporting.
    pub fn from_groups(
        config: &ExperimentConfig,
        groups: Vec<GroupSummary>,
        records: u64,
        dropped_groups: usize,
        diagnostics: Vec<BaselineUndefinedError>,
    ) -> Self {
        let value_columns: Vec<ColumnName> = config
            .statistics
            .iter()
            .map(StatisticSpec::column_name)
            .chain(config.normalizations.iter().map(NormalizationSpec::column_name))
            .collect();
        let rows = groups
            .into_iter()
            .map(|group| SummaryRow {
                values: value_columns
                    .iter()
                    .map(|column| group.get(column))
                    .collect(),
                count: group.count,
                key: group.key.0,
            })
            .collect();
        Self {
            experiment: config.name.clone(),
            columns: config.output_columns(),
            key_width: config.group_by.len(),
            rows,
            records,
            dropped_groups,
            diagnostics,
        }
    }

    /// Experiment the table summarizes.
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Column names: keys, `count`, statistics, normalizations.
    pub fn columns(&self) -> &[ColumnName] {
        &self.columns
    }

    /// Rows in emission order.
    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when every group was filtered out (or none existed).
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Records aggregated before support filtering.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Groups removed by the support filter.
    pub fn dropped_groups(&self) -> usize {
        self.dropped_groups
    }

    /// Normalization gaps reported during the run.
    pub fn diagnostics(&self) -> &[BaselineUndefinedError] {
        &self.diagnostics
    }

    /// Position of `column`, if present.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    /// Cell of `row` under `column`; `None` when either is out of range.
    pub fn cell(&self, row: usize, column: &str) -> Option<Value> {
        let row = self.rows.get(row)?;
        let idx = self.column_index(column)?;
        Some(self.cell_at(row, idx))
    }

    /// Every cell of `column`, top to bottom.
    pub fn column(&self, column: &str) -> Option<Vec<Value>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|row| self.cell_at(row, idx)).collect())
    }

    fn cell_at(&self, row: &SummaryRow, idx: usize) -> Value {
        if idx < self.key_width {
            row.key[idx].clone()
        } else if idx == self.key_width {
            Value::from(row.count)
        } else {
            row.values[idx - self.key_width - 1].into()
        }
    }

    /// Write the table as CSV with a header row.
    ///
    /// Missing cells are empty; integral numbers have no fractional part.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), PipelineError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.columns)?;
        for row in &self.rows {
            let mut cells: Vec<String> = row.key.iter().map(ToString::to_string).collect();
            cells.push(row.count.to_string());
            cells.extend(
                row.values
                    .iter()
                    .map(|value| value.map(format_number).unwrap_or_default()),
            );
            csv.write_record(&cells)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write the table as CSV to `path`.
    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        self.write_csv(BufWriter::new(File::create(path)?))?;
        debug!(
            experiment = %self.experiment,
            path = %path.display(),
            rows = self.rows.len(),
            "wrote summary csv"
        );
        Ok(())
    }

    /// Serialize the table as pretty JSON with one object per row.
    pub fn to_json_string(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(&self.json_view())?)
    }

    /// Write the JSON rendering to `writer`.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), PipelineError> {
        serde_json::to_writer_pretty(writer, &self.json_view())?;
        Ok(())
    }

    fn json_view(&self) -> JsonTable<'_> {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| (column.as_str(), self.cell_at(row, idx)))
                    .collect()
            })
            .collect();
        JsonTable {
            experiment: &self.experiment,
            columns: &self.columns,
            rows,
            records: self.records,
            dropped_groups: self.dropped_groups,
            diagnostics: &self.diagnostics,
        }
    }
}

#[derive(Serialize)]
struct JsonTable<'a> {
    experiment: &'a str,
    columns: &'a [ColumnName],
    rows: Vec<IndexMap<&'a str, Value>>,
    records: u64,
    dropped_groups: usize,
    diagnostics: &'a [BaselineUndefinedError],
}
