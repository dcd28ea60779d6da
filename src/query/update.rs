//! Update-document parsing and application.

use serde_json::{Map, Number, Value};

use crate::error::{GraphError, Result};
use crate::query::filter::{eval_cond, value_eq, Cond};
use crate::query::path;

/// Parsed update document.
#[derive(Debug, Clone)]
pub enum Update {
    /// No operators: the document replaces the record's `context` wholesale.
    Replace(Map<String, Value>),
    Ops(Vec<UpdateOp>),
}

#[derive(Debug, Clone)]
pub enum UpdateOp {
    Set { path: String, value: Value },
    Unset { path: String },
    Inc { path: String, by: Number },
    Push { path: String, value: Value },
    Pull { path: String, operand: PullOperand },
}

/// `$pull` removes by equality, or by sub-filter when the operand is an
/// operator object.
#[derive(Debug, Clone)]
pub enum PullOperand {
    Equals(Value),
    Matching(Cond),
}

impl Update {
    pub fn parse(doc: &Value) -> Result<Update> {
        let object = doc
            .as_object()
            .ok_or_else(|| GraphError::query("update document must be a mapping"))?;
        if object.is_empty() {
            return Err(GraphError::query("update document cannot be empty"));
        }
        let operator_keys = object.keys().filter(|key| key.starts_with('$')).count();
        if operator_keys == 0 {
            return Ok(Update::Replace(object.clone()));
        }
        if operator_keys != object.len() {
            return Err(GraphError::query(
                "cannot mix update operators with replacement fields",
            ));
        }

        let mut ops = Vec::new();
        for (operator, spec) in object {
            let entries = spec.as_object().ok_or_else(|| {
                GraphError::query(format!("{operator} expects a mapping of paths"))
            })?;
            for (field_path, operand) in entries {
                ops.push(parse_op(operator, field_path, operand)?);
            }
        }
        Ok(Update::Ops(ops))
    }

    /// Applies the update to a record in place.
    pub fn apply(&self, record: &mut Value) -> Result<()> {
        match self {
            Update::Replace(context) => {
                path::set_path(record, "context", Value::Object(context.clone()))
            }
            Update::Ops(ops) => {
                for op in ops {
                    apply_op(record, op)?;
                }
                Ok(())
            }
        }
    }
}

fn parse_op(operator: &str, field_path: &str, operand: &Value) -> Result<UpdateOp> {
    let path = field_path.to_string();
    match operator {
        "$set" => Ok(UpdateOp::Set {
            path,
            value: operand.clone(),
        }),
        "$unset" => Ok(UpdateOp::Unset { path }),
        "$inc" => {
            let by = operand.as_number().cloned().ok_or_else(|| {
                GraphError::query(format!("$inc on '{field_path}' expects a numeric operand"))
            })?;
            Ok(UpdateOp::Inc { path, by })
        }
        "$push" => Ok(UpdateOp::Push {
            path,
            value: operand.clone(),
        }),
        "$pull" => {
            let operand = match operand.as_object() {
                Some(object) if object.keys().any(|key| key.starts_with('$')) => {
                    PullOperand::Matching(parse_pull_cond(operand)?)
                }
                _ => PullOperand::Equals(operand.clone()),
            };
            Ok(UpdateOp::Pull { path, operand })
        }
        other => Err(GraphError::query(format!("unknown update operator '{other}'"))),
    }
}

fn parse_pull_cond(operand: &Value) -> Result<Cond> {
    // Reuse the filter grammar for the element condition.
    match crate::query::filter::Filter::parse(&serde_json::json!({ "element": operand }))? {
        crate::query::filter::Filter::Field { cond, .. } => Ok(cond),
        _ => Err(GraphError::query("$pull operand must be a condition")),
    }
}

fn apply_op(record: &mut Value, op: &UpdateOp) -> Result<()> {
    match op {
        UpdateOp::Set { path, value } => path::set_path(record, path, value.clone()),
        UpdateOp::Unset { path } => {
            path::unset_path(record, path);
            Ok(())
        }
        UpdateOp::Inc { path, by } => {
            let next = match path::resolve(record, path) {
                None => add_numbers(&Number::from(0), by),
                Some(Value::Number(current)) => add_numbers(current, by),
                Some(other) => {
                    return Err(GraphError::query(format!(
                        "$inc target '{path}' holds a {}, not a number",
                        path::type_label(other)
                    )));
                }
            }?;
            path::set_path(record, path, Value::Number(next))
        }
        UpdateOp::Push { path, value } => match path::resolve(record, path) {
            None => path::set_path(record, path, Value::Array(vec![value.clone()])),
            Some(Value::Array(_)) => {
                let Some(Value::Array(items)) = resolve_mut(record, path) else {
                    unreachable!("resolved immutably above");
                };
                items.push(value.clone());
                Ok(())
            }
            Some(other) => Err(GraphError::query(format!(
                "$push target '{path}' holds a {}, not a sequence",
                path::type_label(other)
            ))),
        },
        UpdateOp::Pull { path, operand } => match resolve_mut(record, path) {
            None => Ok(()),
            Some(Value::Array(items)) => {
                items.retain(|item| !pull_matches(operand, item));
                Ok(())
            }
            Some(other) => Err(GraphError::query(format!(
                "$pull target '{path}' holds a {}, not a sequence",
                path::type_label(other)
            ))),
        },
    }
}

fn pull_matches(operand: &PullOperand, item: &Value) -> bool {
    match operand {
        PullOperand::Equals(target) => value_eq(item, target),
        PullOperand::Matching(cond) => eval_cond(cond, Some(item)),
    }
}

fn resolve_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

fn add_numbers(current: &Number, by: &Number) -> Result<Number> {
    if let (Some(a), Some(b)) = (current.as_i64(), by.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Number::from(sum));
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + by.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).ok_or_else(|| GraphError::query("$inc produced a non-finite number"))
}
