//! Transformation Pipeline
//!
//! Pure field-level value transformation: raw value in, transformed value
//! out, given an ordered operator chain. No I/O, no state, never suspends.
//!
//! Absence is modeled as `None`; JSON null and the empty string count as
//! "absent or empty" for `default_value` purposes. A field whose final value
//! is absent or empty is omitted from the mapped record rather than written
//! as null.

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::model::{Transformation, ValueMapping};

/// Failure of a single operator; aborts that field's mapping only and is
/// attributed to the owning record as a `processing` error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("value `{value}` is not numeric")]
    NotNumeric { value: String },
    #[error("value `{value}` does not match date format `{format}`")]
    DateMismatch { value: String, format: String },
}

/// Returns `true` for JSON null and the empty string.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Run the operator chain left-to-right over an optional raw value.
///
/// The output of one operator is the input of the next. A trailing absent or
/// empty value yields `None`, which callers omit from the output record.
pub fn apply(
    value: Option<Value>,
    ops: &[Transformation],
) -> Result<Option<Value>, TransformError> {
    let mut current = value.filter(|v| !v.is_null());

    for op in ops {
        current = apply_one(op, current)?;
        // Null produced mid-chain collapses to absence.
        current = current.filter(|v| !v.is_null());
    }

    Ok(current.filter(|v| !is_empty_value(v)))
}

fn apply_one(
    op: &Transformation,
    current: Option<Value>,
) -> Result<Option<Value>, TransformError> {
    match op {
        Transformation::Trim => Ok(current.map(|v| Value::String(coerce_string(&v).trim().to_string()))),
        Transformation::Lowercase => {
            Ok(current.map(|v| Value::String(coerce_string(&v).to_lowercase())))
        }
        Transformation::Uppercase => {
            Ok(current.map(|v| Value::String(coerce_string(&v).to_uppercase())))
        }
        Transformation::ToString => Ok(current.map(|v| Value::String(coerce_string(&v)))),
        Transformation::ToNumber => current.map(parse_number).transpose(),
        Transformation::ToDate { date_format } => current
            .map(|v| parse_date(&v, date_format))
            .transpose()
            .map(Option::flatten),
        Transformation::MapValue { table } => Ok(current.map(|v| map_value(v, table))),
        Transformation::DefaultValue { value } => {
            if current.as_ref().is_none_or(is_empty_value) {
                Ok(Some(value.clone()))
            } else {
                Ok(current)
            }
        }
    }
}

/// Stringify a loosely-typed value the way the source drivers render it.
fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn parse_number(value: Value) -> Result<Value, TransformError> {
    if let Value::Number(_) = value {
        return Ok(value);
    }

    let text = coerce_string(&value);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        // Empty input is absence, not a parse failure.
        return Ok(Value::Null);
    }

    if let Ok(integer) = trimmed.parse::<i64>() {
        return Ok(Value::Number(Number::from(integer)));
    }

    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or(TransformError::NotNumeric { value: text })
}

fn parse_date(value: &Value, format: &str) -> Result<Option<Value>, TransformError> {
    let text = coerce_string(value);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parsed = NaiveDateTime::parse_from_str(trimmed, format).or_else(|_| {
        NaiveDate::parse_from_str(trimmed, format)
            .map(|date| date.and_hms_opt(0, 0, 0).unwrap_or_default())
    });

    match parsed {
        Ok(naive) => Ok(Some(Value::String(
            Utc.from_utc_datetime(&naive).to_rfc3339(),
        ))),
        Err(_) => Err(TransformError::DateMismatch {
            value: text,
            format: format.to_string(),
        }),
    }
}

/// First matching `from` wins; an unmatched value passes through unchanged.
fn map_value(value: Value, table: &[ValueMapping]) -> Value {
    table
        .iter()
        .find(|entry| entry.from == value)
        .map(|entry| entry.to.clone())
        .unwrap_or(value)
}
