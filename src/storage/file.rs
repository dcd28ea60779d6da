//! File-backed storage: one JSON array per collection.
//!
//! Collections load into memory on first access and every mutation is
//! flushed through a temp-file rename so a crash never leaves a
//! half-written collection behind. Writers are serialized per collection
//! by an in-process async mutex; concurrent external writers are not
//! tolerated.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::storage::{
    apply_find_options, filter_records, record_id, validate_collection_name, FindOptions,
    StorageBackend,
};

#[derive(Default)]
struct Collection {
    records: BTreeMap<String, Value>,
    loaded: bool,
}

pub struct FileBackend {
    dir: PathBuf,
    collections: RwLock<HashMap<String, Arc<Mutex<Collection>>>>,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn handle(&self, name: &str) -> Arc<Mutex<Collection>> {
        if let Some(handle) = self.collections.read().get(name) {
            return handle.clone();
        }
        self.collections
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    async fn load_if_needed(&self, name: &str, collection: &mut Collection) -> Result<()> {
        if collection.loaded {
            return Ok(());
        }
        let path = self.collection_path(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<Value> = serde_json::from_slice(&bytes).map_err(|e| {
                    GraphError::Corruption(format!("{} is not a record array: {e}", path.display()))
                })?;
                for record in records {
                    let id = record_id(&record)?;
                    collection.records.insert(id, record);
                }
                debug!(collection = name, count = collection.records.len(), "loaded collection");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        collection.loaded = true;
        Ok(())
    }

    /// Writes the collection to `<name>.json.tmp`, fsyncs, then renames over
    /// the live file.
    async fn flush(&self, name: &str, collection: &Collection) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let records: Vec<&Value> = collection.records.values().collect();
        let bytes = serde_json::to_vec_pretty(&records)?;
        let path = self.collection_path(name);
        let tmp = self.dir.join(format!("{name}.json.tmp"));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;
        debug!(collection = name, count = records.len(), "flushed collection");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        validate_collection_name(collection)?;
        let handle = self.handle(collection);
        let mut guard = handle.lock().await;
        self.load_if_needed(collection, &mut guard).await?;
        Ok(guard.records.get(id).cloned())
    }

    async fn save(&self, collection: &str, record: Value) -> Result<Value> {
        validate_collection_name(collection)?;
        let id = record_id(&record)?;
        let handle = self.handle(collection);
        let mut guard = handle.lock().await;
        self.load_if_needed(collection, &mut guard).await?;
        guard.records.insert(id, record.clone());
        self.flush(collection, &guard).await?;
        Ok(record)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        validate_collection_name(collection)?;
        let handle = self.handle(collection);
        let mut guard = handle.lock().await;
        self.load_if_needed(collection, &mut guard).await?;
        if guard.records.remove(id).is_some() {
            self.flush(collection, &guard).await?;
        }
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        validate_collection_name(collection)?;
        let handle = self.handle(collection);
        let mut guard = handle.lock().await;
        self.load_if_needed(collection, &mut guard).await?;
        let snapshot: Vec<Value> = guard.records.values().cloned().collect();
        drop(guard);
        let matched = filter_records(snapshot, filter)?;
        Ok(apply_find_options(matched, options))
    }

    async fn bulk_save(&self, collection: &str, records: Vec<Value>) -> Result<Vec<Value>> {
        validate_collection_name(collection)?;
        let handle = self.handle(collection);
        let mut guard = handle.lock().await;
        self.load_if_needed(collection, &mut guard).await?;
        for record in &records {
            let id = record_id(record)?;
            guard.records.insert(id, record.clone());
        }
        self.flush(collection, &guard).await?;
        Ok(records)
    }

    async fn collections(&self) -> Result<Vec<String>> {
        let mut names = std::collections::BTreeSet::new();
        match tokio::fs::read_dir(&self.dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    let file_name = entry.file_name();
                    let Some(name) = Path::new(&file_name)
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                    else {
                        continue;
                    };
                    if entry
                        .path()
                        .extension()
                        .is_some_and(|extension| extension == "json")
                    {
                        names.insert(name.to_string());
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(names.into_iter().collect())
    }
}
