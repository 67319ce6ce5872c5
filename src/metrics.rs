use crate::summary::SummaryTable;

/// Spread of record counts across the groups of a summary.
#[derive(Clone, Debug, PartialEq)]
pub struct SupportSkew {
    /// Records across all groups.
    pub total: u64,
    /// Number of groups.
    pub groups: usize,
    /// Smallest group count.
    pub min: u64,
    /// Largest group count.
    pub max: u64,
    /// Mean records per group.
    pub mean: f64,
    /// Share of all records held by the largest group.
    pub max_share: f64,
    /// Share of all records held by the smallest group.
    pub min_share: f64,
    /// `max / min`; infinite when a group is empty.
    pub ratio: f64,
    /// Groups from largest to smallest.
    pub per_group: Vec<GroupShare>,
}

/// One group's share of the summarized records.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupShare {
    /// Key values joined with `/`.
    pub group: String,
    /// Records in the group.
    pub count: u64,
    /// Fraction of all records.
    pub share: f64,
}

/// Compute skew metrics from `(group label, count)` pairs.
pub fn support_skew(counts: &[(String, u64)]) -> Option<SupportSkew> {
    let min = counts.iter().map(|(_, count)| *count).min()?;
    let max = counts.iter().map(|(_, count)| *count).max()?;
    let total: u64 = counts.iter().map(|(_, count)| *count).sum();
    let groups = counts.len();
    let share = |count: u64| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let mut per_group: Vec<GroupShare> = counts
        .iter()
        .map(|(group, count)| GroupShare {
            group: group.clone(),
            count: *count,
            share: share(*count),
        })
        .collect();
    per_group.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.group.cmp(&b.group)));
    Some(SupportSkew {
        total,
        groups,
        min,
        max,
        mean: total as f64 / groups as f64,
        max_share: share(max),
        min_share: share(min),
        ratio,
        per_group,
    })
}

/// Skew of the groups that survived support filtering in `table`.
pub fn table_support_skew(table: &SummaryTable) -> Option<SupportSkew> {
    let counts: Vec<(String, u64)> = table
        .rows()
        .iter()
        .map(|row| {
            let label = row
                .key
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("/");
            (label, row.count)
        })
        .collect();
    support_skew(&counts)
}
