//! Dot-path field addressing over JSON documents.
//!
//! A field key is either a flat name or a dot-path such as
//! `context.skills.0.name`. Resolution walks the document left to right:
//! mappings are indexed by name, sequences by non-negative integer, and
//! anything else yields *missing*. Missing is distinct from null.

use serde_json::{Map, Value};

use crate::error::{GraphError, Result};

/// Resolves `path` against `doc`, returning `None` when any step is missing.
pub fn resolve<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Assigns `value` at `path`, creating intermediate mappings as needed.
///
/// Sequence segments must address an existing or directly appendable index;
/// descending through a scalar is an error rather than a silent overwrite.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for (position, segment) in segments.iter().enumerate() {
        let last = position == segments.len() - 1;
        match current {
            Value::Object(map) => {
                if last {
                    map.insert((*segment).to_string(), value);
                    return Ok(());
                }
                current = map
                    .entry((*segment).to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| {
                    GraphError::query(format!(
                        "cannot index sequence with non-numeric segment '{segment}' in '{path}'"
                    ))
                })?;
                while items.len() <= index {
                    items.push(Value::Null);
                }
                if last {
                    items[index] = value;
                    return Ok(());
                }
                if !items[index].is_object() && !items[index].is_array() {
                    items[index] = Value::Object(Map::new());
                }
                current = &mut items[index];
            }
            other => {
                return Err(GraphError::query(format!(
                    "cannot descend into {} at segment '{segment}' of '{path}'",
                    type_label(other)
                )));
            }
        }
    }
    unreachable!("set_path always returns within the loop")
}

/// Removes the field at `path`. Missing paths are a no-op. Sequence elements
/// are nulled in place so sibling indices stay stable.
pub fn unset_path(doc: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for (position, segment) in segments.iter().enumerate() {
        let last = position == segments.len() - 1;
        match current {
            Value::Object(map) => {
                if last {
                    map.remove(*segment);
                    return;
                }
                match map.get_mut(*segment) {
                    Some(next) => current = next,
                    None => return,
                }
            }
            Value::Array(items) => {
                let Ok(index) = segment.parse::<usize>() else {
                    return;
                };
                let Some(slot) = items.get_mut(index) else {
                    return;
                };
                if last {
                    *slot = Value::Null;
                    return;
                }
                current = slot;
            }
            _ => return,
        }
    }
}

pub(crate) fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
