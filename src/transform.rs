//! Per-record corrections and derived columns.
//!
//! Both run after parsing and before pairing, so aggregation code never
//! special-cases a historical dataset. The correction table is plain data
//! and can be inspected or serialized alongside the experiment config.

use serde::{Deserialize, Serialize};

use crate::data::{RawRecord, Value};
use crate::errors::PipelineError;
use crate::types::FieldName;

/// Guard restricting a remap to records where `field == equals`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Field the guard reads.
    pub field: FieldName,
    /// Required value of `field`.
    pub equals: Value,
}

/// Replace `from` with `to` in `field`, optionally only when `when` holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRemap {
    /// Field to rewrite.
    pub field: FieldName,
    /// Value to replace.
    pub from: Value,
    /// Replacement value.
    pub to: Value,
    /// Optional guard on another field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition>,
}

impl ValueRemap {
    fn applies_to(&self, record: &RawRecord) -> bool {
        if record.value(&self.field) != &self.from {
            return false;
        }
        match &self.when {
            Some(condition) => record.value(&condition.field) == &condition.equals,
            None => true,
        }
    }
}

/// Ordered list of value remaps applied to every ingested record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrectionTable {
    remaps: Vec<ValueRemap>,
}

impl CorrectionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `from` with `to` in `field` on every record.
    pub fn remap(
        mut self,
        field: impl Into<FieldName>,
        from: impl Into<Value>,
        to: impl Into<Value>,
    ) -> Self {
        self.remaps.push(ValueRemap {
            field: field.into(),
            from: from.into(),
            to: to.into(),
            when: None,
        });
        self
    }

    /// Replace `from` with `to` in `field` only where `guard_field == guard_value`.
    pub fn remap_when(
        mut self,
        field: impl Into<FieldName>,
        from: impl Into<Value>,
        to: impl Into<Value>,
        guard_field: impl Into<FieldName>,
        guard_value: impl Into<Value>,
    ) -> Self {
        self.remaps.push(ValueRemap {
            field: field.into(),
            from: from.into(),
            to: to.into(),
            when: Some(Condition {
                field: guard_field.into(),
                equals: guard_value.into(),
            }),
        });
        self
    }

    /// Remaps in application order.
    pub fn entries(&self) -> &[ValueRemap] {
        &self.remaps
    }

    /// Returns `true` when no remaps are configured.
    pub fn is_empty(&self) -> bool {
        self.remaps.is_empty()
    }

    /// Apply every remap in order; later remaps see earlier results.
    pub fn apply(&self, mut record: RawRecord) -> RawRecord {
        for remap in &self.remaps {
            if remap.applies_to(&record) {
                record = record.with(remap.field.clone(), remap.to.clone());
            }
        }
        record
    }
}

/// Column computed from other numeric columns of the same record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Derivation {
    /// `target = field * factor`; `target` defaults to `field` (in place).
    Scale {
        /// Source field.
        field: FieldName,
        /// Multiplier.
        factor: f64,
        /// Output field, when not scaling in place.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<FieldName>,
    },
    /// `target = numerator / denominator`; missing on a zero denominator.
    Ratio {
        /// Output field.
        target: FieldName,
        /// Dividend field.
        numerator: FieldName,
        /// Divisor field.
        denominator: FieldName,
    },
}

impl Derivation {
    /// Scale `field` in place.
    pub fn scale(field: impl Into<FieldName>, factor: f64) -> Self {
        Derivation::Scale {
            field: field.into(),
            factor,
            target: None,
        }
    }

    /// Write `numerator / denominator` into `target`.
    pub fn ratio(
        target: impl Into<FieldName>,
        numerator: impl Into<FieldName>,
        denominator: impl Into<FieldName>,
    ) -> Self {
        Derivation::Ratio {
            target: target.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }

    /// Compute the derived column on `record`.
    pub fn apply(&self, record: RawRecord) -> Result<RawRecord, PipelineError> {
        match self {
            Derivation::Scale {
                field,
                factor,
                target,
            } => {
                let scaled = record.number(field)?.map(|value| value * factor);
                let target = target.as_ref().unwrap_or(field).clone();
                Ok(record.with(target, scaled))
            }
            Derivation::Ratio {
                target,
                numerator,
                denominator,
            } => {
                let ratio = match (record.number(numerator)?, record.number(denominator)?) {
                    (Some(num), Some(den)) if den != 0.0 => Some(num / den),
                    _ => None,
                };
                Ok(record.with(target.clone(), ratio))
            }
        }
    }
}

/// Apply corrections, then derivations, to one record.
pub fn prepare_record(
    corrections: &CorrectionTable,
    derived: &[Derivation],
    record: RawRecord,
) -> Result<RawRecord, PipelineError> {
    let mut record = corrections.apply(record);
    for derivation in derived {
        record = derivation.apply(record)?;
    }
    Ok(record)
}
