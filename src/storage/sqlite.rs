//! Document-store adapter over SQLite.
//!
//! Each collection is a two-column table of `(id, doc)` where `doc` holds
//! the serialized record. Top-level `id` constraints are pushed down to
//! SQL; every other filter evaluates through the shared query engine so
//! semantics stay identical with the other backends. The connection is
//! synchronous, so all calls hop through `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use tracing::debug;

use crate::error::{acquire_lock, GraphError, Result};
use crate::storage::{
    apply_find_options, filter_records, record_id, validate_collection_name, FindOptions,
    StorageBackend,
};

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let conn = Connection::open(&path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            debug!(path = %path.display(), "opened sqlite document store");
            Ok(conn)
        })
        .await
        .map_err(join_error)??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = acquire_lock(&conn)?;
            work(&guard)
        })
        .await
        .map_err(join_error)?
    }
}

fn join_error(e: tokio::task::JoinError) -> GraphError {
    GraphError::Database(format!("blocking task failed: {e}"))
}

fn ensure_table(conn: &Connection, collection: &str) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS \"{collection}\" (id TEXT PRIMARY KEY, doc TEXT NOT NULL)"
        ),
        [],
    )?;
    Ok(())
}

fn parse_doc(doc: String) -> Result<Value> {
    serde_json::from_str(&doc)
        .map_err(|e| GraphError::Corruption(format!("stored document is not JSON: {e}")))
}

/// Extracts a pushdown id set from a top-level `id` constraint: a bare
/// string or an `$in` list of strings. Anything else scans.
fn id_pushdown(filter: &Value) -> Option<Vec<String>> {
    let constraint = filter.as_object()?.get("id")?;
    if let Some(id) = constraint.as_str() {
        return Some(vec![id.to_string()]);
    }
    let candidates = constraint.as_object()?.get("$in")?.as_array()?;
    candidates
        .iter()
        .map(|candidate| candidate.as_str().map(str::to_string))
        .collect()
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        validate_collection_name(collection)?;
        let collection = collection.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| {
            ensure_table(conn, &collection)?;
            let mut statement =
                conn.prepare(&format!("SELECT doc FROM \"{collection}\" WHERE id = ?1"))?;
            let mut rows = statement.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(parse_doc(row.get(0)?)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn save(&self, collection: &str, record: Value) -> Result<Value> {
        validate_collection_name(collection)?;
        let id = record_id(&record)?;
        let collection = collection.to_string();
        let doc = serde_json::to_string(&record)?;
        self.with_conn(move |conn| {
            ensure_table(conn, &collection)?;
            conn.execute(
                &format!(
                    "INSERT INTO \"{collection}\" (id, doc) VALUES (?1, ?2) \
                     ON CONFLICT(id) DO UPDATE SET doc = excluded.doc"
                ),
                params![id, doc],
            )?;
            Ok(())
        })
        .await?;
        Ok(record)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        validate_collection_name(collection)?;
        let collection = collection.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| {
            ensure_table(conn, &collection)?;
            conn.execute(
                &format!("DELETE FROM \"{collection}\" WHERE id = ?1"),
                params![id],
            )?;
            Ok(())
        })
        .await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        validate_collection_name(collection)?;
        let collection_name = collection.to_string();
        let pushdown = id_pushdown(filter);
        let candidates = self
            .with_conn(move |conn| {
                ensure_table(conn, &collection_name)?;
                let docs: Vec<String> = match pushdown {
                    Some(ids) if ids.is_empty() => Vec::new(),
                    Some(ids) => {
                        let placeholders = std::iter::repeat("?")
                            .take(ids.len())
                            .collect::<Vec<_>>()
                            .join(", ");
                        let mut statement = conn.prepare(&format!(
                            "SELECT doc FROM \"{collection_name}\" WHERE id IN ({placeholders})"
                        ))?;
                        let rows = statement.query_map(params_from_iter(ids.iter()), |row| {
                            row.get::<_, String>(0)
                        })?;
                        rows.collect::<std::result::Result<_, _>>()?
                    }
                    None => {
                        let mut statement =
                            conn.prepare(&format!("SELECT doc FROM \"{collection_name}\""))?;
                        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
                        rows.collect::<std::result::Result<_, _>>()?
                    }
                };
                docs.into_iter().map(parse_doc).collect::<Result<Vec<_>>>()
            })
            .await?;
        let matched = filter_records(candidates, filter)?;
        Ok(apply_find_options(matched, options))
    }

    async fn bulk_save(&self, collection: &str, records: Vec<Value>) -> Result<Vec<Value>> {
        validate_collection_name(collection)?;
        let collection_name = collection.to_string();
        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            rows.push((record_id(record)?, serde_json::to_string(record)?));
        }
        self.with_conn(move |conn| {
            ensure_table(conn, &collection_name)?;
            let tx = conn.unchecked_transaction()?;
            for (id, doc) in rows {
                tx.execute(
                    &format!(
                        "INSERT INTO \"{collection_name}\" (id, doc) VALUES (?1, ?2) \
                         ON CONFLICT(id) DO UPDATE SET doc = excluded.doc"
                    ),
                    params![id, doc],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        Ok(records)
    }

    async fn collections(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }
}
