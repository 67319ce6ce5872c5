//! End-to-end run: ingest → prepare → pair → aggregate → normalize → filter → emit.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::aggregate::GroupAggregator;
use crate::config::ExperimentConfig;
use crate::data::RawRecord;
use crate::errors::PipelineError;
use crate::filter::SupportFilter;
use crate::normalize::Normalizer;
use crate::pairing::reconcile;
use crate::source::{InMemorySource, RecordSource};
use crate::summary::SummaryTable;
use crate::transform::prepare_record;

/// Configured aggregation pipeline for one experiment.
///
/// Each source is read, prepared, paired and partially aggregated on its
/// own; partial aggregates are merged in source order, so the table does not
/// depend on how the work was scheduled.
#[derive(Clone, Debug)]
pub struct SummaryPipeline {
    config: ExperimentConfig,
    normalizer: Normalizer,
    filter: SupportFilter,
}

impl SummaryPipeline {
    /// Validate `config` and build the pipeline.
    pub fn new(config: ExperimentConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let normalizer = Normalizer::new(&config)?;
        let filter = SupportFilter::new(config.min_support);
        Ok(Self {
            config,
            normalizer,
            filter,
        })
    }

    /// Experiment configuration driving the run.
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Run over every source and emit the summary table.
    pub fn run(&self, sources: &[Box<dyn RecordSource>]) -> Result<SummaryTable, PipelineError> {
        info!(
            experiment = %self.config.name,
            sources = sources.len(),
            "[summary] starting aggregation run"
        );
        let partials: Vec<Result<GroupAggregator, PipelineError>> = sources
            .par_iter()
            .map(|source| self.aggregate_source(source.as_ref()))
            .collect();

        let mut aggregator = GroupAggregator::new(&self.config);
        for partial in partials {
            aggregator.merge(partial?);
        }
        Ok(self.summarize(aggregator))
    }

    /// Run over a single in-memory record stream.
    pub fn run_records(&self, records: Vec<RawRecord>) -> Result<SummaryTable, PipelineError> {
        let source: Box<dyn RecordSource> =
            Box::new(InMemorySource::new(self.config.name.clone(), records));
        self.run(std::slice::from_ref(&source))
    }

    /// Records of `source` as the aggregator sees them: corrected, derived
    /// and paired.
    pub fn prepared_records(
        &self,
        source: &dyn RecordSource,
    ) -> Result<Vec<RawRecord>, PipelineError> {
        let records = source.read_records()?;
        let read = records.len();
        let prepared = records
            .into_iter()
            .map(|record| prepare_record(&self.config.corrections, &self.config.derived, record))
            .collect::<Result<Vec<_>, _>>()?;
        let prepared = match &self.config.pairing {
            Some(pairing) => reconcile(source.id(), pairing, &self.config.group_by, prepared)?.0,
            None => prepared,
        };
        debug!(
            source_id = %source.id(),
            read,
            prepared = prepared.len(),
            "prepared source records"
        );
        Ok(prepared)
    }

    fn aggregate_source(&self, source: &dyn RecordSource) -> Result<GroupAggregator, PipelineError> {
        let records = self.prepared_records(source)?;
        let mut aggregator = GroupAggregator::new(&self.config);
        aggregator.extend(&records)?;
        Ok(aggregator)
    }

    fn summarize(&self, aggregator: GroupAggregator) -> SummaryTable {
        let records = aggregator.record_count();
        let mut groups = aggregator.finish(self.config.row_order);
        let total_groups = groups.len();
        let diagnostics = self.normalizer.apply(&mut groups);
        let dropped = self.filter.apply(&mut groups);
        info!(
            experiment = %self.config.name,
            records,
            groups = total_groups,
            kept = groups.len(),
            dropped,
            undefined_baselines = diagnostics.len(),
            "[summary] aggregation run complete"
        );
        SummaryTable::from_groups(&self.config, groups, records, dropped, diagnostics)
    }
}
