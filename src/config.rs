use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::pairing::{
    ALGORITHM_FIELD, BACKWARD_LABEL, BIDIRECTIONAL_LABEL, DIRECTION_FIELD, FORWARD_LABEL,
    TOTAL_LABEL,
};
use crate::constants::summary::{COUNT_COLUMN, DEFAULT_MIN_SUPPORT, NORMALIZED_SUFFIX};
use crate::data::Value;
use crate::errors::PipelineError;
use crate::transform::{CorrectionTable, Derivation};
use crate::types::{ColumnName, ExperimentName, FieldName, Label};

/// Declared type of a field in a headerless delimited source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Parsed as a number; empty cells and missing tokens become `Missing`.
    Number,
    /// Kept verbatim as a label.
    Label,
}

/// One column of a headerless delimited source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name assigned to the column.
    pub name: FieldName,
    /// Whether the column must parse as a number.
    pub kind: FieldKind,
}

/// Fixed field order of a headerless delimited source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSchema {
    fields: Vec<FieldSpec>,
}

impl RecordSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a numeric field.
    pub fn number(mut self, name: impl Into<FieldName>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::Number,
        });
        self
    }

    /// Append a label field.
    pub fn label(mut self, name: impl Into<FieldName>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::Label,
        });
        self
    }

    /// Fields in column order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Number of columns every line must have.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` when no columns are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Layout of the raw files an experiment produces.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum InputFormat {
    /// Delimited file whose first row names the columns.
    #[default]
    Headed,
    /// Delimited lines with a fixed, declared field order.
    Headerless {
        /// Declared fields, in line order.
        schema: RecordSchema,
    },
    /// One JSON object per line.
    JsonLines,
}

/// Aggregate statistic computed per group for one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticKind {
    /// Arithmetic mean over present values.
    Mean,
    /// Median over present values.
    Median,
    /// Share of the group's records whose field holds the success value.
    FractionPresent,
}

impl StatisticKind {
    fn suffix(self) -> &'static str {
        match self {
            StatisticKind::Mean => "mean",
            StatisticKind::Median => "median",
            StatisticKind::FractionPresent => "fraction_present",
        }
    }
}

/// Which values count as a success for `fraction_present`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessValue {
    /// Any non-missing value (a run completed, a value was recorded).
    #[default]
    AnyPresent,
    /// Exactly this value (for example the label `acc`).
    Equals(Value),
}

impl SuccessValue {
    /// Returns `true` when `value` counts as a success.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            SuccessValue::AnyPresent => value.is_present(),
            SuccessValue::Equals(expected) => value == expected,
        }
    }
}

/// One requested statistic column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatisticSpec {
    /// Record field the statistic reads.
    pub field: FieldName,
    /// Statistic computed over the field.
    pub kind: StatisticKind,
    /// Success predicate for `fraction_present`.
    #[serde(default)]
    pub success: SuccessValue,
    /// Output column name; defaults to `<field>_<kind>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<ColumnName>,
}

impl StatisticSpec {
    fn new(field: impl Into<FieldName>, kind: StatisticKind) -> Self {
        Self {
            field: field.into(),
            kind,
            success: SuccessValue::AnyPresent,
            column: None,
        }
    }

    /// Mean of `field`.
    pub fn mean(field: impl Into<FieldName>) -> Self {
        Self::new(field, StatisticKind::Mean)
    }

    /// Median of `field`.
    pub fn median(field: impl Into<FieldName>) -> Self {
        Self::new(field, StatisticKind::Median)
    }

    /// Fraction of records where `field` is present.
    pub fn fraction_present(field: impl Into<FieldName>) -> Self {
        Self::new(field, StatisticKind::FractionPresent)
    }

    /// Fraction of records where `field` equals `success`.
    pub fn fraction_equal(field: impl Into<FieldName>, success: impl Into<Value>) -> Self {
        let mut spec = Self::new(field, StatisticKind::FractionPresent);
        spec.success = SuccessValue::Equals(success.into());
        spec
    }

    /// Override the output column name.
    pub fn with_column(mut self, column: impl Into<ColumnName>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Resolved output column name.
    pub fn column_name(&self) -> ColumnName {
        self.column
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.field, self.kind.suffix()))
    }
}

/// How forward/backward half-search records are recognized and merged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Field holding the algorithm tag.
    #[serde(default = "default_algorithm_field")]
    pub algorithm_field: FieldName,
    /// Field holding the direction tag.
    #[serde(default = "default_direction_field")]
    pub direction_field: FieldName,
    /// Algorithm tag of half-search records.
    #[serde(default = "default_bidirectional_label")]
    pub bidirectional_label: Label,
    /// Direction tag of the first half.
    #[serde(default = "default_forward_label")]
    pub forward_label: Label,
    /// Direction tag of the second half.
    #[serde(default = "default_backward_label")]
    pub backward_label: Label,
    /// Algorithm tag written onto synthesized totals.
    #[serde(default = "default_total_label")]
    pub total_label: Label,
    /// Measured fields summed into the total record.
    pub summed_fields: Vec<FieldName>,
    /// Also emit the forward and backward halves next to the total.
    #[serde(default)]
    pub retain_halves: bool,
}

fn default_algorithm_field() -> FieldName {
    ALGORITHM_FIELD.to_string()
}

fn default_direction_field() -> FieldName {
    DIRECTION_FIELD.to_string()
}

fn default_bidirectional_label() -> Label {
    BIDIRECTIONAL_LABEL.to_string()
}

fn default_forward_label() -> Label {
    FORWARD_LABEL.to_string()
}

fn default_backward_label() -> Label {
    BACKWARD_LABEL.to_string()
}

fn default_total_label() -> Label {
    TOTAL_LABEL.to_string()
}

impl PairingConfig {
    /// Pairing over the default field names and labels, summing `summed_fields`.
    pub fn new<I, F>(summed_fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldName>,
    {
        Self {
            algorithm_field: default_algorithm_field(),
            direction_field: default_direction_field(),
            bidirectional_label: default_bidirectional_label(),
            forward_label: default_forward_label(),
            backward_label: default_backward_label(),
            total_label: default_total_label(),
            summed_fields: summed_fields.into_iter().map(Into::into).collect(),
            retain_halves: false,
        }
    }

    /// Override the algorithm and direction field names.
    pub fn with_fields(
        mut self,
        algorithm_field: impl Into<FieldName>,
        direction_field: impl Into<FieldName>,
    ) -> Self {
        self.algorithm_field = algorithm_field.into();
        self.direction_field = direction_field.into();
        self
    }

    /// Override the algorithm tags for half records and synthesized totals.
    pub fn with_algorithm_labels(
        mut self,
        bidirectional_label: impl Into<Label>,
        total_label: impl Into<Label>,
    ) -> Self {
        self.bidirectional_label = bidirectional_label.into();
        self.total_label = total_label.into();
        self
    }

    /// Override the direction tags.
    pub fn with_direction_labels(
        mut self,
        forward_label: impl Into<Label>,
        backward_label: impl Into<Label>,
    ) -> Self {
        self.forward_label = forward_label.into();
        self.backward_label = backward_label.into();
        self
    }

    /// Keep the half records in the output stream.
    pub fn with_retained_halves(mut self, retain_halves: bool) -> Self {
        self.retain_halves = retain_halves;
        self
    }
}

/// Ratio column relating a row's mean to a baseline mean.
///
/// The baseline for an outer key is the pooled mean of `field` over the
/// groups sharing that outer key whose `baseline_key` equals `baseline_value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSpec {
    /// Field whose group mean is normalized.
    pub field: FieldName,
    /// Grouping keys that select the baseline.
    pub outer_keys: Vec<FieldName>,
    /// Grouping key that marks baseline groups.
    pub baseline_key: FieldName,
    /// Value of `baseline_key` in baseline groups (`steps = 0`).
    pub baseline_value: Value,
    /// Output column name; defaults to `<field>_normalized`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<ColumnName>,
}

impl NormalizationSpec {
    /// Normalize `field` by its mean where `baseline_key == baseline_value`.
    pub fn new<I, F>(
        field: impl Into<FieldName>,
        outer_keys: I,
        baseline_key: impl Into<FieldName>,
        baseline_value: impl Into<Value>,
    ) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldName>,
    {
        Self {
            field: field.into(),
            outer_keys: outer_keys.into_iter().map(Into::into).collect(),
            baseline_key: baseline_key.into(),
            baseline_value: baseline_value.into(),
            column: None,
        }
    }

    /// Override the output column name.
    pub fn with_column(mut self, column: impl Into<ColumnName>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Resolved output column name.
    pub fn column_name(&self) -> ColumnName {
        self.column
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.field, NORMALIZED_SUFFIX))
    }
}

/// Final row order of the summary table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Order in which group keys were first seen.
    #[default]
    Encounter,
    /// Ascending group-key order.
    Sorted,
}

/// Declarative description of one experiment's aggregation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Experiment name used in logs and emitted tables.
    pub name: ExperimentName,
    /// Layout of the input files.
    #[serde(default)]
    pub input: InputFormat,
    /// Grouping keys, in output order.
    pub group_by: Vec<FieldName>,
    /// Statistic columns, in output order.
    #[serde(default)]
    pub statistics: Vec<StatisticSpec>,
    /// Half-record pairing, for bidirectional searches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing: Option<PairingConfig>,
    /// Baseline ratio columns, after the statistics.
    #[serde(default)]
    pub normalizations: Vec<NormalizationSpec>,
    /// Groups with fewer records are dropped.
    #[serde(default = "default_min_support")]
    pub min_support: u64,
    /// Value fixes applied right after parsing.
    #[serde(default)]
    pub corrections: CorrectionTable,
    /// Computed columns, applied after corrections.
    #[serde(default)]
    pub derived: Vec<Derivation>,
    /// Order of the emitted rows.
    #[serde(default)]
    pub row_order: RowOrder,
}

fn default_min_support() -> u64 {
    DEFAULT_MIN_SUPPORT
}

impl ExperimentConfig {
    /// Create a config grouping by `group_by` with no statistics yet.
    pub fn new<I, F>(name: impl Into<ExperimentName>, group_by: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldName>,
    {
        Self {
            name: name.into(),
            input: InputFormat::default(),
            group_by: group_by.into_iter().map(Into::into).collect(),
            statistics: Vec::new(),
            pairing: None,
            normalizations: Vec::new(),
            min_support: DEFAULT_MIN_SUPPORT,
            corrections: CorrectionTable::default(),
            derived: Vec::new(),
            row_order: RowOrder::default(),
        }
    }

    /// Load a config from a JSON file.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::MissingSource {
                source_id: "config".to_string(),
                path: path.display().to_string(),
            });
        }
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a config from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the raw input layout.
    pub fn with_input(mut self, input: InputFormat) -> Self {
        self.input = input;
        self
    }

    /// Request another statistic column.
    pub fn with_statistic(mut self, statistic: StatisticSpec) -> Self {
        self.statistics.push(statistic);
        self
    }

    /// Enable forward/backward pairing.
    pub fn with_pairing(mut self, pairing: PairingConfig) -> Self {
        self.pairing = Some(pairing);
        self
    }

    /// Add a normalization column.
    pub fn with_normalization(mut self, normalization: NormalizationSpec) -> Self {
        self.normalizations.push(normalization);
        self
    }

    /// Override the minimum support threshold.
    pub fn with_min_support(mut self, min_support: u64) -> Self {
        self.min_support = min_support;
        self
    }

    /// Set the value correction table.
    pub fn with_corrections(mut self, corrections: CorrectionTable) -> Self {
        self.corrections = corrections;
        self
    }

    /// Add a derived column.
    pub fn with_derivation(mut self, derivation: Derivation) -> Self {
        self.derived.push(derivation);
        self
    }

    /// Set the final row order.
    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    /// Output columns: grouping keys, `count`, statistics, normalizations.
    pub fn output_columns(&self) -> Vec<ColumnName> {
        let mut columns = self.group_by.clone();
        columns.push(COUNT_COLUMN.to_string());
        columns.extend(self.statistics.iter().map(StatisticSpec::column_name));
        columns.extend(self.normalizations.iter().map(NormalizationSpec::column_name));
        columns
    }

    /// Fields the aggregator must keep numeric totals for.
    pub(crate) fn tracked_fields(&self) -> Vec<FieldName> {
        let mut fields: Vec<FieldName> = Vec::new();
        let numeric = self
            .statistics
            .iter()
            .filter(|spec| spec.kind != StatisticKind::FractionPresent)
            .map(|spec| &spec.field)
            .chain(self.normalizations.iter().map(|spec| &spec.field));
        for field in numeric {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields
    }

    /// Reject configurations the pipeline cannot run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |message: String| Err(PipelineError::Configuration(message));

        if self.group_by.is_empty() {
            return fail(format!("experiment '{}' has no grouping keys", self.name));
        }
        let mut columns = HashSet::new();
        for column in self.output_columns() {
            if !columns.insert(column.clone()) {
                return fail(format!(
                    "experiment '{}' emits column '{column}' more than once",
                    self.name
                ));
            }
        }
        if let InputFormat::Headerless { schema } = &self.input {
            if schema.is_empty() {
                return fail(format!(
                    "experiment '{}' declares a headerless input without fields",
                    self.name
                ));
            }
        }
        if let Some(pairing) = &self.pairing {
            if pairing.summed_fields.is_empty() {
                return fail(format!(
                    "experiment '{}' pairs half records without summed fields",
                    self.name
                ));
            }
            if pairing.forward_label == pairing.backward_label {
                return fail(format!(
                    "experiment '{}' uses '{}' for both directions",
                    self.name, pairing.forward_label
                ));
            }
        }
        for spec in &self.normalizations {
            for key in spec.outer_keys.iter().chain(std::iter::once(&spec.baseline_key)) {
                if !self.group_by.contains(key) {
                    return fail(format!(
                        "normalization '{}' uses '{key}', which is not a grouping key",
                        spec.column_name()
                    ));
                }
            }
            if spec.outer_keys.contains(&spec.baseline_key) {
                return fail(format!(
                    "normalization '{}' uses '{}' as both outer and baseline key",
                    spec.column_name(),
                    spec.baseline_key
                ));
            }
        }
        Ok(())
    }
}
