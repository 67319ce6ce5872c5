//! Baseline ratio columns.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::warn;

use crate::aggregate::{FieldTotals, GroupSummary};
use crate::config::{ExperimentConfig, NormalizationSpec};
use crate::data::GroupKey;
use crate::errors::{BaselineUndefinedError, PipelineError};

/// A `NormalizationSpec` with its key fields resolved to key positions.
#[derive(Clone, Debug)]
struct ResolvedSpec {
    spec: NormalizationSpec,
    column: String,
    outer_positions: Vec<usize>,
    baseline_position: usize,
}

/// Appends normalized columns to aggregated rows.
///
/// Baselines pool the totals of every baseline group sharing an outer key, so
/// a baseline spread over several groups weighs each record equally.
#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    specs: Vec<ResolvedSpec>,
}

impl Normalizer {
    /// Resolve the normalizations of `config` against its grouping keys.
    pub fn new(config: &ExperimentConfig) -> Result<Self, PipelineError> {
        let position = |field: &str| {
            config
                .group_by
                .iter()
                .position(|key| key == field)
                .ok_or_else(|| {
                    PipelineError::Configuration(format!(
                        "normalization key '{field}' is not a grouping key"
                    ))
                })
        };
        let mut specs = Vec::with_capacity(config.normalizations.len());
        for spec in &config.normalizations {
            let outer_positions = spec
                .outer_keys
                .iter()
                .map(|field| position(field.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            let baseline_position = position(spec.baseline_key.as_str())?;
            specs.push(ResolvedSpec {
                column: spec.column_name(),
                spec: spec.clone(),
                outer_positions,
                baseline_position,
            });
        }
        Ok(Self { specs })
    }

    /// Returns `true` when no normalization is configured.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Add every normalized column to `rows`.
    ///
    /// Undefined baselines are returned once per (column, outer key); the
    /// affected rows get a missing value.
    pub fn apply(&self, rows: &mut [GroupSummary]) -> Vec<BaselineUndefinedError> {
        let mut diagnostics = Vec::new();
        for resolved in &self.specs {
            diagnostics.extend(resolved.apply(rows));
        }
        diagnostics
    }
}

impl ResolvedSpec {
    /// Pooled baseline totals per outer key.
    ///
    /// Contributions are added in `GroupKey` order, so the pooled sum does not
    /// depend on the order rows were first seen.
    fn baselines(&self, rows: &[GroupSummary]) -> IndexMap<GroupKey, FieldTotals> {
        let mut parts: IndexMap<GroupKey, Vec<(&GroupKey, FieldTotals)>> = IndexMap::new();
        for row in rows {
            if row.key.values()[self.baseline_position] != self.spec.baseline_value {
                continue;
            }
            let totals = row
                .field_totals(&self.spec.field)
                .copied()
                .unwrap_or_default();
            parts
                .entry(row.key.project(&self.outer_positions))
                .or_default()
                .push((&row.key, totals));
        }
        parts
            .into_iter()
            .map(|(outer, mut groups)| {
                groups.sort_by(|left, right| left.0.cmp(right.0));
                let mut pooled = FieldTotals::default();
                for (_, totals) in groups {
                    pooled.present += totals.present;
                    pooled.sum += totals.sum;
                }
                (outer, pooled)
            })
            .collect()
    }

    fn apply(&self, rows: &mut [GroupSummary]) -> Vec<BaselineUndefinedError> {
        let baselines = self.baselines(rows);
        let mut reported: HashSet<GroupKey> = HashSet::new();
        let mut diagnostics = Vec::new();

        for row in rows.iter_mut() {
            let outer = row.key.project(&self.outer_positions);
            let baseline = match baselines.get(&outer) {
                None => Err("no baseline group for this outer key"),
                Some(totals) => match totals.mean() {
                    None => Err("baseline groups have no present values"),
                    Some(mean) if mean == 0.0 => Err("baseline mean is zero"),
                    Some(mean) => Ok(mean),
                },
            };
            let value = match baseline {
                Ok(baseline) => row
                    .field_totals(&self.spec.field)
                    .and_then(FieldTotals::mean)
                    .map(|mean| mean / baseline),
                Err(reason) => {
                    if reported.insert(outer.clone()) {
                        warn!(
                            column = %self.column,
                            outer_key = ?outer.values(),
                            reason,
                            "baseline undefined; normalized values left missing"
                        );
                        diagnostics.push(BaselineUndefinedError {
                            column: self.column.clone(),
                            field: self.spec.field.clone(),
                            baseline_key: self.spec.baseline_key.clone(),
                            baseline_value: self.spec.baseline_value.clone(),
                            outer_key: outer.0,
                            reason: reason.to_string(),
                        });
                    }
                    None
                }
            };
            row.columns.insert(self.column.clone(), value);
        }
        diagnostics
    }
}
