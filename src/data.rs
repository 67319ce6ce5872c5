use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constants::data::MISSING_TOKENS;
use crate::errors::PipelineError;

pub use crate::types::{FieldName, Label};

/// Scalar cell value of a record or a summary row.
///
/// Equality is value equality: numbers compare numerically (`10 == 10.0`,
/// `-0.0 == 0.0`), labels by content, and `Missing` only equals itself.
/// `Hash` and `Ord` agree with that equality, so values can form group keys.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Numeric measurement or numeric key (sizes, rounds, counts, times).
    Number(f64),
    /// Category label (algorithm, direction, generator, initial weights).
    Label(Label),
    /// Absent or explicitly empty value.
    #[default]
    Missing,
}

static MISSING: Value = Value::Missing;

impl Value {
    /// Parse a cell whose type is not declared: number, missing token, or label.
    pub fn infer(text: &str) -> Self {
        let trimmed = text.trim();
        if is_missing_token(trimmed) {
            return Value::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_nan() => Value::Missing,
            Ok(number) => Value::Number(number),
            Err(_) => Value::Label(trimmed.to_string()),
        }
    }

    /// Parse a cell declared numeric. Returns `None` when the text is neither
    /// a number nor a missing token.
    pub fn parse_number(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if is_missing_token(trimmed) {
            return Some(Value::Missing);
        }
        trimmed.parse::<f64>().ok().map(|number| {
            if number.is_nan() {
                Value::Missing
            } else {
                Value::Number(number)
            }
        })
    }

    /// Returns `true` unless the value is `Missing`.
    pub fn is_present(&self) -> bool {
        !matches!(self, Value::Missing)
    }

    /// Numeric payload, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(number) => Some(*number),
            _ => None,
        }
    }

    /// Label payload, if any.
    pub fn as_label(&self) -> Option<&str> {
        match self {
            Value::Label(label) => Some(label),
            _ => None,
        }
    }

    /// Interpret the value as an optional number for field `field`.
    ///
    /// `Missing` maps to `None`; a label is a `NonNumeric` error.
    pub fn numeric(&self, field: &str) -> Result<Option<f64>, PipelineError> {
        match self {
            Value::Number(number) => Ok(Some(*number)),
            Value::Missing => Ok(None),
            Value::Label(label) => Err(PipelineError::NonNumeric {
                field: field.to_string(),
                value: label.clone(),
            }),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Missing => 0,
            Value::Number(_) => 1,
            Value::Label(_) => 2,
        }
    }
}

fn is_missing_token(text: &str) -> bool {
    text.is_empty()
        || MISSING_TOKENS
            .iter()
            .any(|token| token.eq_ignore_ascii_case(text))
}

fn canonical(number: f64) -> f64 {
    if number == 0.0 {
        0.0
    } else if number.is_nan() {
        f64::NAN
    } else {
        number
    }
}

/// Render a number without a fractional part when it is integral.
pub fn format_number(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{number}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Number(number) => canonical(*number).to_bits().hash(state),
            Value::Label(label) => label.hash(state),
            Value::Missing => {}
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => canonical(*a).total_cmp(&canonical(*b)),
            (Value::Label(a), Value::Label(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(number) => f.write_str(&format_number(*number)),
            Value::Label(label) => f.write_str(label),
            Value::Missing => Ok(()),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Label(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Label(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Missing)
    }
}

/// One instrumentation record: ordered field name to scalar mapping.
///
/// Records are immutable once ingested; the builder-style helpers consume
/// `self` and return a new record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: IndexMap<FieldName, Value>,
}

impl RawRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(field, value)` pairs, keeping their order.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<FieldName>,
        V: Into<Value>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        }
    }

    /// Set `field` (appended when new, replaced in place otherwise).
    pub fn with(mut self, field: impl Into<FieldName>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Remove `field`, keeping the order of the remaining fields.
    pub fn without(mut self, field: &str) -> Self {
        self.fields.shift_remove(field);
        self
    }

    /// Field value, if the field exists.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field value, with absent fields reported as `Missing`.
    pub fn value(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&MISSING)
    }

    /// Optional numeric view of `field`; labels are a `NonNumeric` error.
    pub fn number(&self, field: &str) -> Result<Option<f64>, PipelineError> {
        self.value(field).numeric(field)
    }

    /// Returns `true` when `field` exists on the record (even if `Missing`).
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Extract the group key for `fields`, in the given order.
    pub fn key(&self, fields: &[FieldName]) -> GroupKey {
        GroupKey(fields.iter().map(|field| self.value(field).clone()).collect())
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldName, &Value)> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` when the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Tuple of grouping-key values; defines group membership.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(pub Vec<Value>);

impl GroupKey {
    /// Key values in grouping-field order.
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Project the key onto the given positions.
    pub fn project(&self, positions: &[usize]) -> GroupKey {
        GroupKey(positions.iter().map(|&idx| self.0[idx].clone()).collect())
    }
}
