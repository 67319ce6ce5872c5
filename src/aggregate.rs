//! Grouping and per-group statistics.
//!
//! Accumulators keep every present value of the fields they track, and sums
//! are taken over the values in sorted order when a group is finalized. The
//! numeric result therefore does not depend on input order or on how partial
//! accumulators were merged.

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::Serialize;
use tracing::debug;

use crate::config::{ExperimentConfig, RowOrder, StatisticKind, StatisticSpec};
use crate::data::{FieldName, GroupKey, RawRecord};
use crate::errors::PipelineError;
use crate::types::ColumnName;

/// Pooled totals of one numeric field inside a group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FieldTotals {
    /// Records in the group where the field held a number.
    pub present: u64,
    /// Sum of those numbers.
    pub sum: f64,
}

impl FieldTotals {
    /// Mean of the present values, if any.
    pub fn mean(&self) -> Option<f64> {
        (self.present > 0).then(|| self.sum / self.present as f64)
    }
}

/// Partial per-group state; merging two accumulators is associative.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupAccumulator {
    count: u64,
    values: Vec<Vec<f64>>,
    successes: Vec<u64>,
}

impl GroupAccumulator {
    fn new(tracked: usize, fractions: usize) -> Self {
        Self {
            count: 0,
            values: vec![Vec::new(); tracked],
            successes: vec![0; fractions],
        }
    }

    /// Number of records folded into this accumulator.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: GroupAccumulator) {
        self.count += other.count;
        for (mine, theirs) in self.values.iter_mut().zip(other.values) {
            mine.extend(theirs);
        }
        for (mine, theirs) in self.successes.iter_mut().zip(other.successes) {
            *mine += theirs;
        }
    }
}

/// One aggregated row per group key.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupSummary {
    /// Grouping-key values in configured order.
    pub key: GroupKey,
    /// Number of records contributing to the group.
    pub count: u64,
    /// Statistic columns (`None` = missing), in configured order.
    pub columns: IndexMap<ColumnName, Option<f64>>,
    /// Pooled totals of the numeric fields the statistics and normalizers use.
    pub totals: IndexMap<FieldName, FieldTotals>,
}

impl GroupSummary {
    /// Value of `column`; `None` when the column is unknown or missing.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns.get(column).copied().flatten()
    }

    /// Pooled totals for `field`, if tracked.
    pub fn field_totals(&self, field: &str) -> Option<&FieldTotals> {
        self.totals.get(field)
    }
}

/// Groups records by key and accumulates the requested statistics.
#[derive(Clone, Debug)]
pub struct GroupAggregator {
    group_by: Vec<FieldName>,
    statistics: Vec<StatisticSpec>,
    tracked: Vec<FieldName>,
    fractions: Vec<usize>,
    groups: IndexMap<GroupKey, GroupAccumulator>,
    records: u64,
}

impl GroupAggregator {
    /// Create an empty aggregator for `config`.
    pub fn new(config: &ExperimentConfig) -> Self {
        let fractions = config
            .statistics
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.kind == StatisticKind::FractionPresent)
            .map(|(idx, _)| idx)
            .collect();
        Self {
            group_by: config.group_by.clone(),
            statistics: config.statistics.clone(),
            tracked: config.tracked_fields(),
            fractions,
            groups: IndexMap::new(),
            records: 0,
        }
    }

    /// Fold one record into its group.
    pub fn push(&mut self, record: &RawRecord) -> Result<(), PipelineError> {
        let mut sampled = Vec::with_capacity(self.tracked.len());
        for field in &self.tracked {
            sampled.push(record.number(field)?);
        }
        let hits: Vec<bool> = self
            .fractions
            .iter()
            .map(|&idx| {
                let spec = &self.statistics[idx];
                spec.success.matches(record.value(&spec.field))
            })
            .collect();

        let (tracked, fractions) = (self.tracked.len(), self.fractions.len());
        let accumulator = self
            .groups
            .entry(record.key(&self.group_by))
            .or_insert_with(|| GroupAccumulator::new(tracked, fractions));
        accumulator.count += 1;
        for (values, sample) in accumulator.values.iter_mut().zip(sampled) {
            if let Some(value) = sample {
                values.push(value);
            }
        }
        for (successes, hit) in accumulator.successes.iter_mut().zip(hits) {
            if hit {
                *successes += 1;
            }
        }
        self.records += 1;
        Ok(())
    }

    /// Fold every record of `records`.
    pub fn extend<'r, I>(&mut self, records: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = &'r RawRecord>,
    {
        for record in records {
            self.push(record)?;
        }
        Ok(())
    }

    /// Merge a partial aggregate built from the same config.
    ///
    /// Keys unseen by `self` are appended in `other`'s encounter order.
    pub fn merge(&mut self, other: GroupAggregator) {
        self.records += other.records;
        for (key, accumulator) in other.groups {
            match self.groups.entry(key) {
                Entry::Occupied(entry) => entry.into_mut().merge(accumulator),
                Entry::Vacant(entry) => {
                    entry.insert(accumulator);
                }
            }
        }
    }

    /// Records folded so far.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Distinct groups so far.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Finalize every group into a summary row.
    pub fn finish(self, order: RowOrder) -> Vec<GroupSummary> {
        let mut groups: Vec<(GroupKey, GroupAccumulator)> = self.groups.into_iter().collect();
        if order == RowOrder::Sorted {
            groups.sort_by(|(left, _), (right, _)| left.cmp(right));
        }
        debug!(
            groups = groups.len(),
            records = self.records,
            "aggregated record groups"
        );

        groups
            .into_iter()
            .map(|(key, accumulator)| {
                finalize(&self.statistics, &self.tracked, &self.fractions, key, accumulator)
            })
            .collect()
    }
}

fn finalize(
    statistics: &[StatisticSpec],
    tracked: &[FieldName],
    fractions: &[usize],
    key: GroupKey,
    accumulator: GroupAccumulator,
) -> GroupSummary {
    let GroupAccumulator {
        count,
        values,
        successes,
    } = accumulator;

    let mut sorted_values = Vec::with_capacity(values.len());
    let mut totals = IndexMap::with_capacity(tracked.len());
    for (field, mut field_values) in tracked.iter().zip(values) {
        field_values.sort_by(f64::total_cmp);
        let sum = field_values.iter().sum();
        totals.insert(
            field.clone(),
            FieldTotals {
                present: field_values.len() as u64,
                sum,
            },
        );
        sorted_values.push(field_values);
    }

    let mut columns = IndexMap::with_capacity(statistics.len());
    for (idx, spec) in statistics.iter().enumerate() {
        let value = match spec.kind {
            StatisticKind::Mean => totals.get(&spec.field).and_then(FieldTotals::mean),
            StatisticKind::Median => tracked
                .iter()
                .position(|field| *field == spec.field)
                .and_then(|pos| median(&sorted_values[pos])),
            StatisticKind::FractionPresent => fractions
                .iter()
                .position(|&fraction_idx| fraction_idx == idx)
                .map(|pos| {
                    if count == 0 {
                        0.0
                    } else {
                        successes[pos] as f64 / count as f64
                    }
                }),
        };
        columns.insert(spec.column_name(), value);
    }

    GroupSummary {
        key,
        count,
        columns,
        totals,
    }
}

fn median(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn config() -> ExperimentConfig {
        ExperimentConfig::new("insertions", ["algo"])
            .with_statistic(StatisticSpec::mean("insertions"))
            .with_statistic(StatisticSpec::median("insertions"))
            .with_statistic(StatisticSpec::fraction_equal("acc", "acc"))
    }

    fn record(algo: &str, insertions: Option<i32>, acc: &str) -> RawRecord {
        RawRecord::new()
            .with("insertions", insertions)
            .with("acc", acc)
            .with("algo", algo)
    }

    #[test]
    fn computes_mean_median_and_fraction() {
        let config = config();
        let mut aggregator = GroupAggregator::new(&config);
        let records = vec![
            record("bd", Some(2), "acc"),
            record("bd", Some(4), "rej"),
            record("bd", Some(9), "acc"),
            record("bd", None, "rej"),
            record("d", Some(5), "acc"),
        ];
        aggregator.extend(&records).unwrap();
        let rows = aggregator.finish(RowOrder::Encounter);

        assert_eq!(rows.len(), 2);
        let bd = &rows[0];
        assert_eq!(bd.key, GroupKey(vec![Value::from("bd")]));
        assert_eq!(bd.count, 4);
        assert!((bd.get("insertions_mean").unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(bd.get("insertions_median"), Some(4.0));
        assert!((bd.get("acc_fraction_present").unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(bd.field_totals("insertions").unwrap().present, 3);
        assert_eq!(rows[1].count, 1);
    }

    #[test]
    fn mean_without_present_values_is_missing() {
        let config = config();
        let mut aggregator = GroupAggregator::new(&config);
        aggregator.push(&record("bf", None, "rej")).unwrap();
        let rows = aggregator.finish(RowOrder::Encounter);
        assert_eq!(rows[0].get("insertions_mean"), None);
        assert_eq!(rows[0].get("insertions_median"), None);
        assert_eq!(rows[0].get("acc_fraction_present"), Some(0.0));
    }

    #[test]
    fn even_median_averages_middle_values() {
        assert_eq!(median(&[1.0, 3.0, 5.0, 11.0]), Some(4.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn label_in_mean_field_is_rejected() {
        let config = config();
        let mut aggregator = GroupAggregator::new(&config);
        let bad = RawRecord::new().with("algo", "d").with("insertions", "many");
        assert!(matches!(
            aggregator.push(&bad),
            Err(PipelineError::NonNumeric { .. })
        ));
    }

    #[test]
    fn encounter_and_sorted_orders() {
        let config = config();
        let mut aggregator = GroupAggregator::new(&config);
        for algo in ["d", "bf", "bd", "d"] {
            aggregator.push(&record(algo, Some(1), "acc")).unwrap();
        }
        let encounter: Vec<GroupKey> = aggregator
            .clone()
            .finish(RowOrder::Encounter)
            .into_iter()
            .map(|row| row.key)
            .collect();
        assert_eq!(
            encounter,
            vec![
                GroupKey(vec![Value::from("d")]),
                GroupKey(vec![Value::from("bf")]),
                GroupKey(vec![Value::from("bd")]),
            ]
        );
        let sorted: Vec<GroupKey> = aggregator
            .finish(RowOrder::Sorted)
            .into_iter()
            .map(|row| row.key)
            .collect();
        assert_eq!(
            sorted,
            vec![
                GroupKey(vec![Value::from("bd")]),
                GroupKey(vec![Value::from("bf")]),
                GroupKey(vec![Value::from("d")]),
            ]
        );
    }

    #[test]
    fn merged_partials_equal_single_pass() {
        let config = config();
        let records: Vec<RawRecord> = (0..40)
            .map(|idx| {
                let algo = if idx % 3 == 0 { "bd" } else { "d" };
                let acc = if idx % 2 == 0 { "acc" } else { "rej" };
                record(algo, Some(idx * 7 % 11), acc)
                    .with("insertions", 0.1 * f64::from(idx * 7 % 11))
            })
            .collect();

        let mut single = GroupAggregator::new(&config);
        single.extend(&records).unwrap();

        let mut left = GroupAggregator::new(&config);
        left.extend(&records[..17]).unwrap();
        let mut right = GroupAggregator::new(&config);
        right.extend(&records[17..]).unwrap();
        left.merge(right);

        assert_eq!(left.record_count(), 40);
        assert_eq!(
            left.finish(RowOrder::Encounter),
            single.finish(RowOrder::Encounter)
        );
    }

    #[test]
    fn absent_key_fields_group_as_missing() {
        let config = ExperimentConfig::new("hops", ["hops"]);
        let mut aggregator = GroupAggregator::new(&config);
        aggregator.push(&RawRecord::new()).unwrap();
        aggregator.push(&RawRecord::new().with("hops", Value::Missing)).unwrap();
        let rows = aggregator.finish(RowOrder::Encounter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 2);
        assert!(rows[0].columns.is_empty());
    }
}
