//! Storage backends.
//!
//! Every backend persists collections of JSON records keyed by their `id`
//! field and answers queries expressed in the unified filter language. The
//! core holds an `Arc<dyn StorageBackend>` and never a concrete type;
//! backends are constructed through [`open_backend`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{BackendKind, Config};
use crate::error::{GraphError, Result};
use crate::query::{compare_for_sort, path, Filter};

mod file;
mod memory;
mod sqlite;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Pagination and ordering options for `find`.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub sort: Option<Vec<SortKey>>,
}

impl FindOptions {
    pub fn limited(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Capability set every backend provides. All operations are async and
/// atomic per record; no multi-document transaction is assumed.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Upserts a record keyed by its `id` field and returns the stored form.
    async fn save(&self, collection: &str, record: Value) -> Result<Value>;

    /// Removes a record. Missing ids are a no-op.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        options: &FindOptions,
    ) -> Result<Vec<Value>>;

    async fn find_one(&self, collection: &str, filter: &Value) -> Result<Option<Value>> {
        let mut found = self
            .find(collection, filter, &FindOptions::limited(1))
            .await?;
        Ok(found.pop())
    }

    async fn count(&self, collection: &str, filter: &Value) -> Result<u64> {
        let found = self.find(collection, filter, &FindOptions::default()).await?;
        Ok(found.len() as u64)
    }

    /// Distinct values of `field` across matching records. Sequence-valued
    /// fields contribute their elements, mirroring `$in` semantics.
    async fn distinct(&self, collection: &str, field: &str, filter: &Value) -> Result<Vec<Value>> {
        let found = self.find(collection, filter, &FindOptions::default()).await?;
        Ok(distinct_values(&found, field))
    }

    async fn bulk_save(&self, collection: &str, records: Vec<Value>) -> Result<Vec<Value>> {
        let mut saved = Vec::with_capacity(records.len());
        for record in records {
            saved.push(self.save(collection, record).await?);
        }
        Ok(saved)
    }

    /// Names of collections that currently hold records.
    async fn collections(&self) -> Result<Vec<String>>;

    /// Flushes and releases backend resources. Idempotent.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Maps the configured backend kind to a constructor.
pub async fn open_backend(config: &Config) -> Result<Arc<dyn StorageBackend>> {
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::File => Ok(Arc::new(FileBackend::new(&config.file_db_path))),
        BackendKind::Sqlite => Ok(Arc::new(SqliteBackend::open(&config.sqlite_db_path).await?)),
    }
}

/// Collection names become file names and table names, so they are kept to
/// a conservative character set.
pub(crate) fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(GraphError::validation(format!(
            "invalid collection name '{name}'"
        )))
    }
}

/// Extracts the mandatory `id` field of a record.
pub(crate) fn record_id(record: &Value) -> Result<String> {
    record
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GraphError::validation("record is missing a string 'id' field"))
}

/// Shared post-processing: sort, skip, limit.
pub(crate) fn apply_find_options(mut records: Vec<Value>, options: &FindOptions) -> Vec<Value> {
    if let Some(keys) = &options.sort {
        records.sort_by(|a, b| {
            for key in keys {
                let left = path::resolve(a, &key.field).unwrap_or(&Value::Null);
                let right = path::resolve(b, &key.field).unwrap_or(&Value::Null);
                let ordering = compare_for_sort(left, right);
                let ordering = if key.ascending {
                    ordering
                } else {
                    ordering.reverse()
                };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
    }
    let skip = options.skip.unwrap_or(0);
    let mut records: Vec<Value> = records.into_iter().skip(skip).collect();
    if let Some(limit) = options.limit {
        records.truncate(limit);
    }
    records
}

pub(crate) fn distinct_values(records: &[Value], field: &str) -> Vec<Value> {
    let mut seen = std::collections::BTreeSet::new();
    let mut values = Vec::new();
    let mut push = |value: &Value, seen: &mut std::collections::BTreeSet<String>, out: &mut Vec<Value>| {
        let key = value.to_string();
        if seen.insert(key) {
            out.push(value.clone());
        }
    };
    for record in records {
        match path::resolve(record, field) {
            Some(Value::Array(items)) => {
                for item in items {
                    push(item, &mut seen, &mut values);
                }
            }
            Some(value) => push(value, &mut seen, &mut values),
            None => {}
        }
    }
    values
}

/// Parses and evaluates in one step, for backends that scan.
pub(crate) fn filter_records(records: Vec<Value>, filter: &Value) -> Result<Vec<Value>> {
    let parsed = Filter::parse(filter)?;
    Ok(records
        .into_iter()
        .filter(|record| parsed.matches(record))
        .collect())
}
