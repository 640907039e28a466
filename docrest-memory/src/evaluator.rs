//! `where` clause evaluation for in-memory filtering.
//!
//! A `where` clause maps attribute names to either a value that must be equal or
//! an object of `$`-operators. Values are compared the way the service compares
//! them: numbers by value, dates by instant (whether stored as a `Date` tag or an
//! ISO string), and tagged pointers by class and id.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use std::{cmp::Ordering, collections::BTreeMap};

use docrest_core::{
    error::{DocumentError, DocumentResult},
    query::FieldOp,
    types::{JsonMap, TYPE_KEY, parse_iso},
};

/// Rows of one class, keyed by object id.
pub(crate) type ClassMap = BTreeMap<String, JsonMap>;
/// Every stored class, keyed by wire class name.
pub(crate) type StoreMap = BTreeMap<String, ClassMap>;

/// Comparable view of a wire JSON value.
///
/// Integers and floats are normalized to f64. `Date` tags become instants.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    Date(DateTime<Utc>),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(BTreeMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a JsonValue> for Comparable<'a> {
    fn from(json: &'a JsonValue) -> Self {
        match json {
            JsonValue::Null => Comparable::Null,
            JsonValue::Bool(value) => Comparable::Bool(*value),
            JsonValue::Number(value) => value.as_f64().map_or(Comparable::Null, Comparable::Number),
            JsonValue::String(value) => Comparable::String(value),
            JsonValue::Array(values) => Comparable::Array(values.iter().map(Comparable::from).collect()),
            JsonValue::Object(map) => Comparable::from(map),
        }
    }
}

impl<'a> From<&'a Map<String, JsonValue>> for Comparable<'a> {
    fn from(map: &'a Map<String, JsonValue>) -> Self {
        let date = map
            .get(TYPE_KEY)
            .and_then(JsonValue::as_str)
            .filter(|tag| *tag == "Date")
            .and_then(|_| map.get("iso"))
            .and_then(JsonValue::as_str)
            .and_then(|iso| parse_iso(iso).ok());

        match date {
            Some(date) => Comparable::Date(date),
            None => Comparable::Map(
                map.iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect(),
            ),
        }
    }
}

impl Comparable<'_> {
    /// The instant a string holds, for comparison with dates.
    fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Comparable::Date(date) => Some(*date),
            Comparable::String(value) => parse_iso(value).ok(),
            _ => None,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::Date(_), _) | (_, Comparable::Date(_)) => {
                matches!((self.as_date(), other.as_date()), (Some(a), Some(b)) if a == b)
            }
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::Date(_), _) | (_, Comparable::Date(_)) => {
                self.as_date()?.partial_cmp(&other.as_date()?)
            }
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Whether `needle` equals the value or, for arrays, one of its items.
fn matches_value(value: &Comparable<'_>, needle: &Comparable<'_>) -> bool {
    match value {
        Comparable::Array(items) if !matches!(needle, Comparable::Array(_)) => {
            items.iter().any(|item| item == needle)
        }
        _ => value == needle,
    }
}

pub(crate) struct WhereEvaluator<'a> {
    store: &'a StoreMap,
}

impl<'a> WhereEvaluator<'a> {
    pub fn new(store: &'a StoreMap) -> Self {
        Self { store }
    }

    /// Rows of `class` matching `clause`.
    pub fn filter_rows(&self, class: &str, clause: &JsonMap) -> DocumentResult<Vec<&'a JsonMap>> {
        let Some(rows) = self.store.get(class) else {
            return Ok(Vec::new());
        };

        let mut matched = Vec::new();
        for row in rows.values() {
            if self.evaluate(row, clause)? {
                matched.push(row);
            }
        }

        Ok(matched)
    }

    pub fn evaluate(&self, row: &JsonMap, clause: &JsonMap) -> DocumentResult<bool> {
        for (name, constraint) in clause {
            let value = row.get(name);

            let satisfied = match constraint {
                JsonValue::Object(map) if is_operator_map(map) => {
                    let mut all = true;
                    for (operator, operand) in map {
                        let op = FieldOp::from_operator(operator).ok_or_else(|| {
                            DocumentError::Transport(102, format!("unknown operator {operator}"))
                        })?;
                        if !self.apply(value, op, operand)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                expected => value.is_some_and(|value| {
                    matches_value(&Comparable::from(value), &Comparable::from(expected))
                }),
            };

            if !satisfied {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn apply(&self, value: Option<&JsonValue>, op: FieldOp, operand: &JsonValue) -> DocumentResult<bool> {
        if op == FieldOp::Exists {
            return Ok(value.is_some() == operand.as_bool().unwrap_or(true));
        }

        let operand_cmp = Comparable::from(operand);
        let Some(value) = value else {
            return Ok(matches!(op, FieldOp::Ne | FieldOp::Nin | FieldOp::DontSelect));
        };
        let value = Comparable::from(value);

        Ok(match op {
            FieldOp::Lt => value.partial_cmp(&operand_cmp) == Some(Ordering::Less),
            FieldOp::Lte => matches!(value.partial_cmp(&operand_cmp), Some(Ordering::Less | Ordering::Equal)),
            FieldOp::Gt => value.partial_cmp(&operand_cmp) == Some(Ordering::Greater),
            FieldOp::Gte => matches!(value.partial_cmp(&operand_cmp), Some(Ordering::Greater | Ordering::Equal)),
            FieldOp::Ne => !matches_value(&value, &operand_cmp),
            FieldOp::In => candidates(&operand_cmp)?
                .iter()
                .any(|candidate| matches_value(&value, candidate)),
            FieldOp::Nin => !candidates(&operand_cmp)?
                .iter()
                .any(|candidate| matches_value(&value, candidate)),
            FieldOp::All => match &value {
                Comparable::Array(items) => candidates(&operand_cmp)?
                    .iter()
                    .all(|candidate| items.contains(candidate)),
                _ => false,
            },
            FieldOp::Select | FieldOp::DontSelect => {
                let keys = self.selected_keys(operand)?;
                let found = keys
                    .into_iter()
                    .map(Comparable::from)
                    .any(|key| matches_value(&value, &key));
                (op == FieldOp::Select) == found
            }
            FieldOp::Exists => unreachable!("handled above"),
        })
    }

    /// Values of `key` over the rows a `$select` sub-query matches.
    fn selected_keys(&self, operand: &JsonValue) -> DocumentResult<Vec<&'a JsonValue>> {
        let invalid = || DocumentError::Transport(102, format!("invalid select operand {operand}"));

        let key = operand.get("key").and_then(JsonValue::as_str).ok_or_else(invalid)?;
        let query = operand.get("query").and_then(JsonValue::as_object).ok_or_else(invalid)?;
        let class = query.get("className").and_then(JsonValue::as_str).ok_or_else(invalid)?;
        let empty = JsonMap::new();
        let clause = match query.get("where") {
            Some(JsonValue::Object(clause)) => clause,
            Some(_) => return Err(invalid()),
            None => &empty,
        };

        Ok(self
            .filter_rows(class, clause)?
            .into_iter()
            .filter_map(|row| row.get(key))
            .collect())
    }
}

fn is_operator_map(map: &Map<String, JsonValue>) -> bool {
    !map.is_empty() && map.keys().all(|key| key.starts_with('$'))
}

fn candidates<'a, 'b>(operand: &'b Comparable<'a>) -> DocumentResult<&'b [Comparable<'a>]> {
    match operand {
        Comparable::Array(values) => Ok(values),
        other => Err(DocumentError::Transport(102, format!("expected an array operand, got {other:?}"))),
    }
}

/// Orders two rows by an `order` parameter of comma-separated attributes, each
/// optionally prefixed with `-` for descending order. Missing attributes sort first.
pub(crate) fn compare_rows(left: &JsonMap, right: &JsonMap, order: &str) -> Ordering {
    for key in order.split(',').map(str::trim).filter(|key| !key.is_empty()) {
        let (field, descending) = match key.strip_prefix('-') {
            Some(field) => (field, true),
            None => (key, false),
        };

        let left = left.get(field).map_or(Comparable::Null, Comparable::from);
        let right = right.get(field).map_or(Comparable::Null, Comparable::from);

        let ordering = match (&left, &right) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Null, _) => Ordering::Less,
            (_, Comparable::Null) => Ordering::Greater,
            _ => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
        };
        let ordering = if descending { ordering.reverse() } else { ordering };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}
