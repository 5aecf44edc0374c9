use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{Number, Value};

use super::{sensitive_paths, tags};
use crate::consent::AccessMode;
use crate::error::Error;
use crate::key::Fork;
use crate::payload;
use crate::schema::Sensitivity;
use crate::traits::{Phase, Trait, Transform, TransformState, TransformerSpec};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// What a JSON value holds, for choosing a plausible substitute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Timestamp,
    Date,
    Time,
    Other,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => ValueKind::Timestamp,
            Value::String(s) if NaiveDate::parse_from_str(s, DATE_FORMAT).is_ok() => {
                ValueKind::Date
            }
            Value::String(s) if NaiveTime::parse_from_str(s, TIME_FORMAT).is_ok() => {
                ValueKind::Time
            }
            Value::String(_) => ValueKind::String,
            Value::Number(n) if n.is_i64() || n.is_u64() => ValueKind::Integer,
            Value::Number(_) => ValueKind::Float,
            _ => ValueKind::Other,
        }
    }

    /// A random value of this kind resembling `value`
    pub fn substitute(&self, value: &Value, rng: &mut impl Rng) -> Value {
        match self {
            ValueKind::String => {
                let len = value.as_str().map_or(8, |s| s.chars().count().max(1));
                Value::String(
                    rng.sample_iter(&Alphanumeric)
                        .take(len)
                        .map(char::from)
                        .collect(),
                )
            }
            ValueKind::Integer => {
                let magnitude = value
                    .as_i64()
                    .map(|n| n.unsigned_abs())
                    .or_else(|| value.as_u64())
                    .unwrap_or(0);
                let upper = magnitude.saturating_mul(2).max(10);
                Value::from(rng.random_range(0..upper))
            }
            ValueKind::Float => {
                // doubling must stay finite
                let magnitude = value
                    .as_f64()
                    .map_or(1.0, f64::abs)
                    .clamp(1.0, f64::MAX / 2.0);
                let n = rng.random_range(0.0..magnitude * 2.0);
                Number::from_f64(n).map_or(Value::Null, Value::Number)
            }
            ValueKind::Timestamp => {
                let offset = Duration::seconds(rng.random_range(-31_536_000..31_536_000));
                Value::String((Utc::now() + offset).to_rfc3339())
            }
            ValueKind::Date => {
                let offset = Duration::days(rng.random_range(-36_500..0));
                Value::String((Utc::now() + offset).format(DATE_FORMAT).to_string())
            }
            ValueKind::Time => {
                let secs = rng.random_range(0..86_400u32);
                let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)
                    .unwrap_or_default();
                Value::String(time.format(TIME_FORMAT).to_string())
            }
            ValueKind::Other => Value::Null,
        }
    }
}

/// Replace every leaf below `value` with a random substitute of its kind
fn anonymize(value: &mut Value, rng: &mut impl Rng) {
    match value {
        Value::Object(map) => map.values_mut().for_each(|v| anonymize(v, rng)),
        Value::Array(items) => items.iter_mut().for_each(|v| anonymize(v, rng)),
        Value::Bool(_) | Value::Null => {}
        leaf => *leaf = ValueKind::of(leaf).substitute(leaf, rng),
    }
}

/// Replaces identifying and quasi-identifying fields on reads in
/// anonymous mode
#[derive(Debug)]
pub struct Anonymize {
    spec: TransformerSpec,
}

impl Default for Anonymize {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::ANONYMIZE, Phase::PostLoad)
                .supports([AccessMode::Anonymous])
                .only_modes([AccessMode::Read])
                .only_forks([Fork::Data]),
        }
    }
}

#[async_trait]
impl Transform for Anonymize {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        let schema = state
            .schema
            .clone()
            .ok_or_else(|| Error::NotFound(format!("schema for {}", state.access.key())))?;
        let paths = sensitive_paths(
            schema.as_ref(),
            &state.schema_remainder(),
            &[Sensitivity::Eid, Sensitivity::Qid],
        );
        let Some(data) = state.data.as_mut() else {
            return Ok(());
        };

        let mut rng = rand::rng();
        for path in &paths {
            payload::for_each_at(data, path, &mut |v| anonymize(v, &mut rng));
        }
        tracing::debug!(fields = paths.len(), "anonymized payload");
        Ok(())
    }
}
