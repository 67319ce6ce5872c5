use tracing::{debug, warn};

use crate::aggregate::GroupSummary;
use crate::constants::summary::DEFAULT_MIN_SUPPORT;

/// Drops groups backed by too few records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupportFilter {
    min_support: u64,
}

impl Default for SupportFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SUPPORT)
    }
}

impl SupportFilter {
    /// Keep groups with at least `min_support` records.
    pub fn new(min_support: u64) -> Self {
        Self { min_support }
    }

    /// Configured threshold.
    pub fn min_support(&self) -> u64 {
        self.min_support
    }

    /// Returns `true` when a group with `count` records is kept.
    pub fn keeps(&self, count: u64) -> bool {
        count >= self.min_support
    }

    /// Remove under-supported rows in place, keeping the order of the rest.
    /// Returns how many rows were dropped.
    pub fn apply(&self, rows: &mut Vec<GroupSummary>) -> usize {
        let before = rows.len();
        rows.retain(|row| self.keeps(row.count));
        let dropped = before - rows.len();
        if dropped > 0 && rows.is_empty() {
            warn!(
                min_support = self.min_support,
                dropped, "support filter removed every group"
            );
        } else {
            debug!(
                min_support = self.min_support,
                kept = rows.len(),
                dropped,
                "applied support filter"
            );
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::GroupAggregator;
    use crate::config::{ExperimentConfig, RowOrder, StatisticSpec};
    use crate::data::{RawRecord, Value};

    fn rows(groups: &[(&str, usize)]) -> Vec<GroupSummary> {
        let config = ExperimentConfig::new("intervals", ["round", "algo"])
            .with_statistic(StatisticSpec::mean("avg"));
        let mut aggregator = GroupAggregator::new(&config);
        for (algo, size) in groups {
            for idx in 0..*size {
                let record = RawRecord::new()
                    .with("round", 100)
                    .with("algo", *algo)
                    .with("avg", idx);
                aggregator.push(&record).unwrap();
            }
        }
        aggregator.finish(RowOrder::Encounter)
    }

    #[test]
    fn small_groups_are_dropped_whole() {
        let mut rows = rows(&[("d", 15), ("bd", 3)]);
        let dropped = SupportFilter::new(10).apply(&mut rows);
        assert_eq!(dropped, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key.values()[1], Value::from("d"));
        assert_eq!(rows[0].count, 15);
    }

    #[test]
    fn threshold_is_inclusive() {
        let filter = SupportFilter::default();
        assert!(filter.keeps(10));
        assert!(!filter.keeps(9));
        assert!(SupportFilter::new(0).keeps(0));
    }

    #[test]
    fn lowering_the_threshold_never_removes_groups() {
        let all = rows(&[("d", 15), ("bd", 3), ("bf", 9), ("h", 10)]);
        let mut previous: Option<Vec<GroupSummary>> = None;
        for threshold in (0..=16).rev() {
            let mut kept = all.clone();
            SupportFilter::new(threshold).apply(&mut kept);
            if let Some(previous) = &previous {
                for row in previous {
                    assert!(kept.contains(row), "threshold {threshold} lost {:?}", row.key);
                }
            }
            previous = Some(kept);
        }
    }
}
