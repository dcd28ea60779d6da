//! In-memory backend: the reference implementation of the storage
//! contract and the default choice for tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::Result;
use crate::storage::{
    apply_find_options, filter_records, record_id, FindOptions, StorageBackend,
};

#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned())
    }

    async fn save(&self, collection: &str, record: Value) -> Result<Value> {
        let id = record_id(&record)?;
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id, record.clone());
        Ok(record)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(records) = self.collections.write().get_mut(collection) {
            records.remove(id);
        }
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        let matched = filter_records(self.snapshot(collection), filter)?;
        Ok(apply_find_options(matched, options))
    }

    async fn collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
