//! Forward/backward half-record reconciliation.
//!
//! A bidirectional search reports one record per direction. The reconciler
//! folds each adjacent forward/backward pair into one total record and passes
//! every other record through untouched. It is the only order-sensitive stage
//! of the pipeline, so it is written as an explicit state machine:
//! `Empty -> PendingForward -> Empty`.

use tracing::debug;

use crate::config::PairingConfig;
use crate::data::{FieldName, RawRecord, Value};
use crate::errors::PipelineError;
use crate::types::SourceId;

/// Reconciler state between records.
#[derive(Debug, Default)]
enum PairState {
    /// No half record is waiting for its partner.
    #[default]
    Empty,
    /// A forward half arrived at `position` and waits for its backward half.
    PendingForward { record: RawRecord, position: usize },
}

enum Classification {
    PassThrough,
    Forward,
    Backward,
}

/// Counters reported when a stream has been reconciled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PairingStats {
    /// Records read from the input stream.
    pub records_in: usize,
    /// Records emitted downstream (totals, pass-throughs, retained halves).
    pub records_out: usize,
    /// Total records synthesized from pairs.
    pub totals: usize,
    /// Records passed through without pairing.
    pub passed_through: usize,
}

/// Stateful reducer merging forward/backward pairs into total records.
pub struct PairReconciler<'a> {
    source_id: SourceId,
    config: &'a PairingConfig,
    key_fields: &'a [FieldName],
    state: PairState,
    position: usize,
    stats: PairingStats,
}

impl<'a> PairReconciler<'a> {
    /// Create a reconciler for one source.
    ///
    /// `key_fields` are the grouping keys; both halves of a pair must agree on
    /// all of them except the direction field.
    pub fn new(
        source_id: impl Into<SourceId>,
        config: &'a PairingConfig,
        key_fields: &'a [FieldName],
    ) -> Self {
        Self {
            source_id: source_id.into(),
            config,
            key_fields,
            state: PairState::Empty,
            position: 0,
            stats: PairingStats::default(),
        }
    }

    /// Feed the next record; emitted records are appended to `out`.
    pub fn push(&mut self, record: RawRecord, out: &mut Vec<RawRecord>) -> Result<(), PipelineError> {
        let position = self.position;
        self.position += 1;
        self.stats.records_in += 1;

        match self.classify(&record, position)? {
            Classification::PassThrough => {
                self.stats.passed_through += 1;
                self.emit(record, out);
            }
            Classification::Forward => match std::mem::take(&mut self.state) {
                PairState::Empty => {
                    if self.config.retain_halves {
                        self.emit(record.clone(), out);
                    }
                    self.state = PairState::PendingForward { record, position };
                }
                PairState::PendingForward {
                    position: pending, ..
                } => {
                    return Err(self.unpaired(
                        position,
                        format!("forward record follows unmatched forward record at position {pending}"),
                    ));
                }
            },
            Classification::Backward => match std::mem::take(&mut self.state) {
                PairState::Empty => {
                    return Err(self.unpaired(
                        position,
                        "backward record without a preceding forward record".to_string(),
                    ));
                }
                PairState::PendingForward {
                    record: forward,
                    position: forward_position,
                } => {
                    self.check_keys_match(&forward, &record, forward_position, position)?;
                    let total = self.total(&forward, &record)?;
                    if self.config.retain_halves {
                        self.emit(record, out);
                    }
                    self.stats.totals += 1;
                    self.emit(total, out);
                }
            },
        }
        Ok(())
    }

    /// Close the stream; a pending forward record is an error.
    pub fn finish(self) -> Result<PairingStats, PipelineError> {
        if let PairState::PendingForward { position, .. } = &self.state {
            return Err(self.unpaired(
                *position,
                "stream ended before the backward record of this forward record".to_string(),
            ));
        }
        debug!(
            source_id = %self.source_id,
            records_in = self.stats.records_in,
            records_out = self.stats.records_out,
            totals = self.stats.totals,
            "reconciled half-search records"
        );
        Ok(self.stats)
    }

    fn emit(&mut self, record: RawRecord, out: &mut Vec<RawRecord>) {
        self.stats.records_out += 1;
        out.push(record);
    }

    fn classify(&self, record: &RawRecord, position: usize) -> Result<Classification, PipelineError> {
        let algorithm = record.value(&self.config.algorithm_field);
        if algorithm.as_label() != Some(self.config.bidirectional_label.as_str()) {
            return Ok(Classification::PassThrough);
        }
        match record.value(&self.config.direction_field) {
            Value::Label(direction) if *direction == self.config.forward_label => {
                Ok(Classification::Forward)
            }
            Value::Label(direction) if *direction == self.config.backward_label => {
                Ok(Classification::Backward)
            }
            other => Err(self.unpaired(
                position,
                format!(
                    "bidirectional record has unrecognized {} '{other}'",
                    self.config.direction_field
                ),
            )),
        }
    }

    fn check_keys_match(
        &self,
        forward: &RawRecord,
        backward: &RawRecord,
        forward_position: usize,
        position: usize,
    ) -> Result<(), PipelineError> {
        for field in self.key_fields {
            if *field == self.config.direction_field {
                continue;
            }
            let (left, right) = (forward.value(field), backward.value(field));
            if left != right {
                return Err(self.unpaired(
                    position,
                    format!(
                        "backward record disagrees with forward record at position {forward_position} on '{field}' ('{left}' vs '{right}')"
                    ),
                ));
            }
        }
        Ok(())
    }

    fn total(&self, forward: &RawRecord, backward: &RawRecord) -> Result<RawRecord, PipelineError> {
        let mut total = forward
            .clone()
            .without(&self.config.direction_field)
            .with(
                self.config.algorithm_field.clone(),
                self.config.total_label.as_str(),
            );
        for field in &self.config.summed_fields {
            let sum = match (forward.number(field)?, backward.number(field)?) {
                (Some(left), Some(right)) => Value::Number(left + right),
                _ => Value::Missing,
            };
            total = total.with(field.clone(), sum);
        }
        Ok(total)
    }

    fn unpaired(&self, position: usize, details: String) -> PipelineError {
        PipelineError::UnpairedHalfRecord {
            source_id: self.source_id.clone(),
            position,
            details,
        }
    }
}

/// Reconcile a whole record stream.
pub fn reconcile<I>(
    source_id: &str,
    config: &PairingConfig,
    key_fields: &[FieldName],
    records: I,
) -> Result<(Vec<RawRecord>, PairingStats), PipelineError>
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut reconciler = PairReconciler::new(source_id, config, key_fields);
    let mut out = Vec::new();
    for record in records {
        reconciler.push(record, &mut out)?;
    }
    let stats = reconciler.finish()?;
    Ok((out, stats))
}
