//! Filter-document parsing and evaluation.
//!
//! A filter document is parsed once into a closed operator tree and then
//! evaluated against individual records. The operator set is deliberately
//! finite: unknown `$operators` are rejected at parse time so a typo fails
//! loudly instead of matching nothing.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::query::path;

/// Parsed filter tree. `True` is the empty filter and matches everything.
#[derive(Debug, Clone)]
pub enum Filter {
    True,
    Field { path: String, cond: Cond },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
}

/// Condition applied to a single resolved field value.
#[derive(Debug, Clone)]
pub enum Cond {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(regex::Regex),
    Not(Box<Cond>),
    /// Several operators in one object, e.g. `{"$gte": 1, "$lt": 5}`.
    All(Vec<Cond>),
}

impl Filter {
    /// Parses a filter document. Multiple top-level keys conjoin implicitly.
    pub fn parse(doc: &Value) -> Result<Filter> {
        let object = doc
            .as_object()
            .ok_or_else(|| GraphError::query("filter document must be a mapping"))?;
        if object.is_empty() {
            return Ok(Filter::True);
        }
        let mut clauses = Vec::with_capacity(object.len());
        for (key, value) in object {
            match key.as_str() {
                "$and" => clauses.push(Filter::And(parse_filter_list(value, "$and")?)),
                "$or" => clauses.push(Filter::Or(parse_filter_list(value, "$or")?)),
                "$nor" => clauses.push(Filter::Nor(parse_filter_list(value, "$nor")?)),
                "$not" => clauses.push(Filter::Not(Box::new(Filter::parse(value)?))),
                other if other.starts_with('$') => {
                    return Err(GraphError::query(format!(
                        "unknown top-level operator '{other}'"
                    )));
                }
                field => clauses.push(Filter::Field {
                    path: field.to_string(),
                    cond: parse_cond(value)?,
                }),
            }
        }
        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Filter::And(clauses)
        })
    }

    /// Evaluates the filter against a record.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Filter::True => true,
            Filter::Field { path, cond } => eval_cond(cond, path::resolve(record, path)),
            Filter::And(children) => children.iter().all(|child| child.matches(record)),
            Filter::Or(children) => children.iter().any(|child| child.matches(record)),
            Filter::Nor(children) => !children.iter().any(|child| child.matches(record)),
            Filter::Not(child) => !child.matches(record),
        }
    }
}

fn parse_filter_list(value: &Value, operator: &str) -> Result<Vec<Filter>> {
    let items = value.as_array().ok_or_else(|| {
        GraphError::query(format!("{operator} expects a sequence of sub-filters"))
    })?;
    items.iter().map(Filter::parse).collect()
}

/// Parses the value at a field position: an operator object applies its
/// operators, anything else is shorthand for `$eq`.
fn parse_cond(value: &Value) -> Result<Cond> {
    let Some(object) = value.as_object() else {
        return Ok(Cond::Eq(value.clone()));
    };
    let has_operators = object.keys().any(|key| key.starts_with('$'));
    if !has_operators {
        return Ok(Cond::Eq(value.clone()));
    }
    if !object.keys().all(|key| key.starts_with('$')) {
        return Err(GraphError::query(
            "cannot mix operators and plain keys in one condition object",
        ));
    }

    let mut conds = Vec::new();
    for (key, operand) in object {
        match key.as_str() {
            "$eq" => conds.push(Cond::Eq(operand.clone())),
            "$ne" => conds.push(Cond::Ne(operand.clone())),
            "$gt" => conds.push(Cond::Gt(operand.clone())),
            "$gte" => conds.push(Cond::Gte(operand.clone())),
            "$lt" => conds.push(Cond::Lt(operand.clone())),
            "$lte" => conds.push(Cond::Lte(operand.clone())),
            "$in" => conds.push(Cond::In(operand_list(operand, "$in")?)),
            "$nin" => conds.push(Cond::Nin(operand_list(operand, "$nin")?)),
            "$exists" => {
                let want = operand.as_bool().ok_or_else(|| {
                    GraphError::query("$exists expects a boolean operand")
                })?;
                conds.push(Cond::Exists(want));
            }
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    GraphError::query("$regex expects a string pattern")
                })?;
                let options = object.get("$options").and_then(Value::as_str).unwrap_or("");
                conds.push(Cond::Regex(compile_regex(pattern, options)?));
            }
            // Consumed alongside $regex above.
            "$options" => {
                if !object.contains_key("$regex") {
                    return Err(GraphError::query("$options requires $regex"));
                }
            }
            "$not" => conds.push(Cond::Not(Box::new(parse_cond(operand)?))),
            other => {
                return Err(GraphError::query(format!("unknown operator '{other}'")));
            }
        }
    }
    Ok(if conds.len() == 1 {
        conds.remove(0)
    } else {
        Cond::All(conds)
    })
}

fn operand_list(value: &Value, operator: &str) -> Result<Vec<Value>> {
    value
        .as_array()
        .cloned()
        .ok_or_else(|| GraphError::query(format!("{operator} expects a sequence operand")))
}

fn compile_regex(pattern: &str, options: &str) -> Result<regex::Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(GraphError::query(format!(
                    "unsupported $options flag '{other}'"
                )));
            }
        };
    }
    builder
        .build()
        .map_err(|e| GraphError::query(format!("invalid $regex pattern: {e}")))
}

/// Evaluates a condition against the resolved field value (`None` = missing).
pub(crate) fn eval_cond(cond: &Cond, field: Option<&Value>) -> bool {
    match cond {
        Cond::Eq(target) => field.is_some_and(|value| value_eq(value, target)),
        Cond::Ne(target) => !field.is_some_and(|value| value_eq(value, target)),
        Cond::Gt(target) => ordered(field, target, |o| o == Ordering::Greater),
        Cond::Gte(target) => ordered(field, target, |o| o != Ordering::Less),
        Cond::Lt(target) => ordered(field, target, |o| o == Ordering::Less),
        Cond::Lte(target) => ordered(field, target, |o| o != Ordering::Greater),
        Cond::In(set) => field.is_some_and(|value| in_set(value, set)),
        Cond::Nin(set) => !field.is_some_and(|value| in_set(value, set)),
        Cond::Exists(want) => field.is_some() == *want,
        Cond::Regex(pattern) => field
            .and_then(Value::as_str)
            .is_some_and(|text| pattern.is_match(text)),
        Cond::Not(inner) => !eval_cond(inner, field),
        Cond::All(conds) => conds.iter().all(|inner| eval_cond(inner, field)),
    }
}

fn ordered(field: Option<&Value>, target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    field
        .and_then(|value| compare_ord(value, target))
        .is_some_and(accept)
}

/// Membership test with sequence unrolling: a sequence-valued field is in the
/// set iff any of its elements is.
fn in_set(value: &Value, set: &[Value]) -> bool {
    if set.iter().any(|candidate| value_eq(value, candidate)) {
        return true;
    }
    match value {
        Value::Array(items) => items
            .iter()
            .any(|item| set.iter().any(|candidate| value_eq(item, candidate))),
        _ => false,
    }
}

/// Equality with numeric unification: `1` equals `1.0`.
pub(crate) fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering for comparison operators: defined over numbers and strings;
/// anything cross-type is unordered and the comparison is false.
pub(crate) fn compare_ord(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}

/// Collation rank used only for sorting find results: null < boolean <
/// number < string < sequence < mapping.
fn collation_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over values for `sort` options. Missing fields sort as null.
pub fn compare_for_sort(a: &Value, b: &Value) -> Ordering {
    let ranks = collation_rank(a).cmp(&collation_rank(b));
    if ranks != Ordering::Equal {
        return ranks;
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(_), Value::Number(_)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(xs), Value::Array(ys)) => {
            for (x, y) in xs.iter().zip(ys.iter()) {
                let step = compare_for_sort(x, y);
                if step != Ordering::Equal {
                    return step;
                }
            }
            xs.len().cmp(&ys.len())
        }
        (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => Ordering::Equal,
    }
}
