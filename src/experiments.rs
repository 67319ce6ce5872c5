//! Ready-made configurations for the experiment drivers' output files.
//!
//! Each preset describes one experiment's raw layout and the summary it
//! feeds. Per-file context such as the generator name is not part of the raw
//! lines; callers stamp it with source tags and add the tag to `group_by`
//! when the summary should be split by it.

use crate::config::{
    ExperimentConfig, InputFormat, NormalizationSpec, PairingConfig, RecordSchema, RowOrder,
    StatisticSpec,
};
use crate::transform::Derivation;

/// Names accepted by [`preset`].
pub const PRESET_NAMES: &[&str] = &[
    "cycle_cover",
    "acceptance",
    "intervals",
    "search_space",
    "insertions",
    "complete_hops",
    "cycle_weights",
];

/// Look up a preset by name.
pub fn preset(name: &str) -> Option<ExperimentConfig> {
    let config = match name {
        "cycle_cover" => cycle_cover(),
        "acceptance" => acceptance(),
        "intervals" => intervals(),
        "search_space" => search_space(),
        "insertions" => insertions(),
        "complete_hops" => complete_hops(),
        "cycle_weights" => cycle_weights(),
        _ => return None,
    };
    Some(config)
}

/// Cycle-cover convergence: JSON lines `{nodes, steps, completion_run, ...}`.
///
/// `normalized` divides each group's mean completion run by the mean over
/// zero-step runs of the same size; `frac_coverage` is the share of runs that
/// completed at all.
pub fn cycle_cover() -> ExperimentConfig {
    ExperimentConfig::new("cycle_cover", ["nodes", "steps"])
        .with_input(InputFormat::JsonLines)
        .with_derivation(Derivation::ratio("steps_per_node", "steps", "nodes"))
        .with_statistic(StatisticSpec::mean("steps_per_node").with_column("steps_per_node"))
        .with_statistic(StatisticSpec::mean("completion_run"))
        .with_statistic(StatisticSpec::fraction_present("completion_run").with_column("frac_coverage"))
        .with_normalization(
            NormalizationSpec::new("completion_run", ["nodes"], "steps", 0).with_column("normalized"),
        )
        .with_min_support(1)
        .with_row_order(RowOrder::Sorted)
}

/// MCMC acceptance rate per round: headed `round,rate,initial,degree`.
pub fn acceptance() -> ExperimentConfig {
    ExperimentConfig::new("acceptance", ["degree", "initial", "round"])
        .with_statistic(StatisticSpec::mean("rate"))
        .with_min_support(1)
}

/// Weight intervals over rounds: headed `round,avg,frac,time,algo`.
///
/// Rounds are recorded in units of 10 000 steps and times in tenths.
pub fn intervals() -> ExperimentConfig {
    ExperimentConfig::new("intervals", ["round", "algo"])
        .with_derivation(Derivation::scale("round", 10_000.0))
        .with_derivation(Derivation::scale("time", 0.1))
        .with_statistic(StatisticSpec::mean("avg"))
        .with_statistic(StatisticSpec::mean("frac"))
        .with_statistic(StatisticSpec::mean("time"))
}

/// Shortest-path tree sizes: headerless
/// `nodes_visited,nodes_queued,edges_traversed,algorithm,direction`.
///
/// Bidirectional runs report one line per direction; both halves are kept
/// and a total line is added after each pair.
pub fn search_space() -> ExperimentConfig {
    let schema = RecordSchema::new()
        .number("nodes_visited")
        .number("nodes_queued")
        .number("edges_traversed")
        .label("algorithm")
        .label("direction");
    ExperimentConfig::new("search_space", ["algorithm", "direction"])
        .with_input(InputFormat::Headerless { schema })
        .with_pairing(
            PairingConfig::new(["nodes_visited", "nodes_queued", "edges_traversed"])
                .with_algorithm_labels("bidijkstra", "bidijkstra-total")
                .with_retained_halves(true),
        )
        .with_statistic(StatisticSpec::mean("nodes_visited"))
        .with_statistic(StatisticSpec::mean("nodes_queued"))
        .with_statistic(StatisticSpec::mean("edges_traversed"))
        .with_statistic(StatisticSpec::median("edges_traversed"))
        .with_min_support(1)
}

/// Edge insertions until acceptance: headed `insertions,acc,algo`.
pub fn insertions() -> ExperimentConfig {
    ExperimentConfig::new("insertions", ["algo"])
        .with_statistic(StatisticSpec::mean("insertions"))
        .with_statistic(StatisticSpec::median("insertions"))
        .with_statistic(StatisticSpec::fraction_equal("acc", "acc").with_column("acceptance_rate"))
        .with_min_support(1)
}

/// Hops until a complete search: one integer per line.
pub fn complete_hops() -> ExperimentConfig {
    let schema = RecordSchema::new().number("hops");
    ExperimentConfig::new("complete_hops", ["hops"])
        .with_input(InputFormat::Headerless { schema })
        .with_min_support(1)
        .with_row_order(RowOrder::Sorted)
}

/// Minimum cycle weight per round: headed `round,weight,initial`.
pub fn cycle_weights() -> ExperimentConfig {
    ExperimentConfig::new("cycle_weights", ["initial", "round"])
        .with_statistic(StatisticSpec::mean("weight"))
        .with_statistic(StatisticSpec::median("weight"))
        .with_min_support(1)
}
