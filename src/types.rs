/// Name of a record field.
/// Examples: `nodes`, `completion_run`, `edges_traversed`
pub type FieldName = String;
/// Identifier for the source that produced a batch of records.
/// Examples: `gnp`, `sptree_size/100_1_1_f`, `cycle_cover`
pub type SourceId = String;
/// Category label stored in a record field.
/// Examples: `bidijkstra`, `forward`, `acc`, `m`
pub type Label = String;
/// Output column name in a summary table.
/// Examples: `completion_run_mean`, `completion_run_fraction_present`, `count`
pub type ColumnName = String;
/// Experiment configuration name.
/// Examples: `cycle_cover`, `intervals`
pub type ExperimentName = String;
/// File path strings used in errors and discovery.
/// Example: `data/acceptance/gnp.out`
pub type PathString = String;
