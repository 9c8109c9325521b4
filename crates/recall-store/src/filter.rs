// crates/recall-store/src/filter.rs
// Structural metadata filter over item values

use crate::error::{RecallError, Result};
use serde_json::{Map, Value};

/// Comparison operators accepted inside an operator object (`{"$gt": 10}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub fn parse(key: &str) -> Result<Self> {
        match key {
            "$eq" => Ok(Self::Eq),
            "$ne" => Ok(Self::Ne),
            "$gt" => Ok(Self::Gt),
            "$gte" => Ok(Self::Gte),
            "$lt" => Ok(Self::Lt),
            "$lte" => Ok(Self::Lte),
            other => Err(RecallError::UnsupportedOperator(other.to_string())),
        }
    }

    fn apply(self, value: &Value, operand: &Value) -> bool {
        match self {
            Self::Eq => json_eq(value, operand),
            Self::Ne => !json_eq(value, operand),
            Self::Gt => compare_numeric(value, operand, |a, b| a > b),
            Self::Gte => compare_numeric(value, operand, |a, b| a >= b),
            Self::Lt => compare_numeric(value, operand, |a, b| a < b),
            Self::Lte => compare_numeric(value, operand, |a, b| a <= b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    /// Scalar literal, compared with `json_eq`
    Literal(Value),
    /// Order- and length-sensitive list match
    List(Vec<Condition>),
    /// Nested mapping; the item side must be an object
    Fields(Vec<(String, Condition)>),
    /// Operator object; every operator must hold
    Operators(Vec<(Operator, Value)>),
}

impl Condition {
    fn parse(filter_value: &Value) -> Result<Self> {
        match filter_value {
            Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
                let ops = map
                    .iter()
                    .map(|(key, operand)| Ok((Operator::parse(key)?, operand.clone())))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Operators(ops))
            }
            Value::Object(map) => Ok(Self::Fields(parse_fields(map)?)),
            Value::Array(items) => Ok(Self::List(
                items.iter().map(Self::parse).collect::<Result<Vec<_>>>()?,
            )),
            scalar => Ok(Self::Literal(scalar.clone())),
        }
    }

    fn matches(&self, item_value: &Value) -> bool {
        match self {
            Self::Literal(expected) => json_eq(item_value, expected),
            Self::List(conditions) => match item_value {
                Value::Array(items) => {
                    items.len() == conditions.len()
                        && items
                            .iter()
                            .zip(conditions)
                            .all(|(item, condition)| condition.matches(item))
                }
                _ => false,
            },
            Self::Fields(fields) => match item_value {
                Value::Object(map) => fields_match(fields, map),
                _ => false,
            },
            Self::Operators(ops) => ops.iter().all(|(op, operand)| op.apply(item_value, operand)),
        }
    }
}

fn parse_fields(map: &Map<String, Value>) -> Result<Vec<(String, Condition)>> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), Condition::parse(value)?)))
        .collect()
}

fn fields_match(fields: &[(String, Condition)], map: &Map<String, Value>) -> bool {
    fields
        .iter()
        .all(|(key, condition)| condition.matches(map.get(key).unwrap_or(&Value::Null)))
}

/// A parsed filter. Parsing happens once per search so unsupported operators
/// fail the batch before any storage work.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    fields: Vec<(String, Condition)>,
}

impl Filter {
    /// Parse a filter object. `None` yields `Ok(None)` (match everything).
    pub fn parse(filter: Option<&Value>) -> Result<Option<Self>> {
        match filter {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(Self {
                fields: parse_fields(map)?,
            })),
            Some(other) => Err(RecallError::InvalidInput(format!(
                "filter must be an object, got {other}"
            ))),
        }
    }

    /// True if every top-level field condition holds for `value`.
    ///
    /// Fields missing from the value compare as null. A non-object value has
    /// no fields.
    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::Object(map) => fields_match(&self.fields, map),
            _ => self
                .fields
                .iter()
                .all(|(_, condition)| condition.matches(&Value::Null)),
        }
    }
}

/// Convenience: parse and evaluate in one step.
pub fn matches(value: &Value, filter: Option<&Value>) -> Result<bool> {
    Ok(Filter::parse(filter)?.is_none_or(|f| f.matches(value)))
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Float coercion for ordered comparisons: numbers, numeric strings and booleans.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn compare_numeric(value: &Value, operand: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (as_f64(value), as_f64(operand)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}
