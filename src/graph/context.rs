//! Graph context: binds the entity tree to a storage backend.
//!
//! A context is a cheap clonable handle. The process keeps a lazily
//! constructed default context configured from the environment; an
//! explicit context can be made ambient for a task scope, and entities
//! remember the context that created or loaded them so their storage
//! operations route correctly regardless of the default.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::config::Config;
use crate::error::{GraphError, Result};
use crate::graph::edge::Edge;
use crate::graph::node::Node;
use crate::graph::object::Object;
use crate::query::Update;
use crate::storage::{open_backend, FindOptions, StorageBackend};

static DEFAULT: Lazy<RwLock<Option<GraphContext>>> = Lazy::new(|| RwLock::new(None));

tokio::task_local! {
    static CURRENT: GraphContext;
}

/// Operation totals since the context was created, for observability
/// layers. Snapshots are not atomic across fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpStats {
    pub saves: u64,
    pub deletes: u64,
    pub queries: u64,
}

#[derive(Default)]
struct Counters {
    saves: AtomicU64,
    deletes: AtomicU64,
    queries: AtomicU64,
}

struct ContextInner {
    backend: Arc<dyn StorageBackend>,
    config: Config,
    counters: Counters,
}

#[derive(Clone)]
pub struct GraphContext {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for GraphContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphContext")
            .field("backend", &self.inner.config.backend)
            .finish_non_exhaustive()
    }
}

impl GraphContext {
    /// Opens the configured backend and ensures the root node exists.
    pub async fn initialize(config: Config) -> Result<Self> {
        let backend = open_backend(&config).await?;
        Self::with_backend(backend, config).await
    }

    /// Wraps an already constructed backend. The root node is ensured
    /// before the context is handed out.
    pub async fn with_backend(backend: Arc<dyn StorageBackend>, config: Config) -> Result<Self> {
        let context = Self {
            inner: Arc::new(ContextInner {
                backend,
                config,
                counters: Counters::default(),
            }),
        };
        context.ensure_root().await?;
        Ok(context)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The process-wide default context, built from the environment on
    /// first access.
    pub async fn default_context() -> Result<GraphContext> {
        if let Some(context) = DEFAULT.read().clone() {
            return Ok(context);
        }
        let built = GraphContext::initialize(Config::from_env()?).await?;
        let mut slot = DEFAULT.write();
        if let Some(existing) = slot.clone() {
            return Ok(existing);
        }
        *slot = Some(built.clone());
        Ok(built)
    }

    /// Replaces the process-wide default context.
    pub fn set_default(context: &GraphContext) {
        *DEFAULT.write() = Some(context.clone());
    }

    /// The ambient context: the innermost [`GraphContext::scope`] if one is
    /// active, otherwise the process default.
    pub async fn current() -> Result<GraphContext> {
        if let Ok(context) = CURRENT.try_with(|context| context.clone()) {
            return Ok(context);
        }
        Self::default_context().await
    }

    /// Runs `fut` with this context as the ambient default for its scope.
    /// Scopes nest; the previous ambient context is restored on exit.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        CURRENT.scope(self.clone(), fut).await
    }

    /// Flushes and releases the backend.
    pub async fn close(&self) -> Result<()> {
        self.inner.backend.close().await
    }

    pub fn stats(&self) -> OpStats {
        OpStats {
            saves: self.inner.counters.saves.load(Ordering::Relaxed),
            deletes: self.inner.counters.deletes.load(Ordering::Relaxed),
            queries: self.inner.counters.queries.load(Ordering::Relaxed),
        }
    }

    async fn ensure_root(&self) -> Result<()> {
        if self
            .inner
            .backend
            .get(Node::COLLECTION, Node::ROOT_ID)
            .await?
            .is_none()
        {
            self.inner
                .backend
                .save(Node::COLLECTION, Node::root().export())
                .await?;
            info!(id = Node::ROOT_ID, "created root node");
        }
        Ok(())
    }

    /// The singleton root node of this context's graph.
    pub async fn root(&self) -> Result<Node> {
        match self.get_node(Node::ROOT_ID).await? {
            Some(root) => Ok(root),
            None => {
                self.ensure_root().await?;
                self.get_node(Node::ROOT_ID).await?.ok_or_else(|| {
                    GraphError::EntityNotFound {
                        kind: "node",
                        id: Node::ROOT_ID.to_string(),
                    }
                })
            }
        }
    }

    // Record-level plumbing shared by the typed APIs.

    pub(crate) async fn save_record(&self, collection: &str, record: Value) -> Result<Value> {
        self.inner.counters.saves.fetch_add(1, Ordering::Relaxed);
        self.inner.backend.save(collection, record).await
    }

    pub(crate) async fn delete_record(&self, collection: &str, id: &str) -> Result<()> {
        self.inner.counters.deletes.fetch_add(1, Ordering::Relaxed);
        self.inner.backend.delete(collection, id).await
    }

    pub(crate) async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.inner.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.inner.backend.get(collection, id).await
    }

    pub(crate) async fn find_records(
        &self,
        collection: &str,
        filter: &Value,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        self.inner.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.inner.backend.find(collection, filter, options).await
    }

    async fn update_records(
        &self,
        collection: &str,
        filter: &Value,
        update: &Value,
    ) -> Result<u64> {
        let update = Update::parse(update)?;
        let records = self
            .find_records(collection, filter, &FindOptions::default())
            .await?;
        let mut modified = 0;
        for mut record in records {
            update.apply(&mut record)?;
            self.save_record(collection, record).await?;
            modified += 1;
        }
        Ok(modified)
    }

    // Nodes.

    /// Constructs, binds, and persists a node in one step.
    pub async fn create_node(
        &self,
        type_name: impl Into<String>,
        context: Map<String, Value>,
    ) -> Result<Node> {
        let mut node = Node::new(type_name, context);
        node.bind(self);
        node.save().await?;
        Ok(node)
    }

    pub async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        match self.get_record(Node::COLLECTION, id).await? {
            Some(record) => {
                let mut node = Node::from_record(&record)?;
                node.bind(self);
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    pub async fn find_nodes(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Node>> {
        let records = self
            .find_records(Node::COLLECTION, filter, options)
            .await?;
        records
            .iter()
            .map(|record| {
                let mut node = Node::from_record(record)?;
                node.bind(self);
                Ok(node)
            })
            .collect()
    }

    pub async fn find_one_node(&self, filter: &Value) -> Result<Option<Node>> {
        Ok(self
            .find_nodes(filter, &FindOptions::limited(1))
            .await?
            .pop())
    }

    /// Field/value sugar: each pair becomes an equality constraint on
    /// `context.<field>`.
    pub async fn find_nodes_by(&self, pairs: &[(&str, Value)]) -> Result<Vec<Node>> {
        self.find_nodes(&by_filter(pairs), &FindOptions::default())
            .await
    }

    pub async fn count_nodes(&self, filter: &Value) -> Result<u64> {
        self.inner.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.inner.backend.count(Node::COLLECTION, filter).await
    }

    pub async fn distinct_nodes(&self, field: &str, filter: &Value) -> Result<Vec<Value>> {
        self.inner.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.inner
            .backend
            .distinct(Node::COLLECTION, field, filter)
            .await
    }

    pub async fn all_nodes(&self) -> Result<Vec<Node>> {
        self.find_nodes(&json!({}), &FindOptions::default()).await
    }

    /// Applies an update document to every matching node.
    pub async fn update_nodes(&self, filter: &Value, update: &Value) -> Result<u64> {
        self.update_records(Node::COLLECTION, filter, update).await
    }

    // Edges.

    pub async fn get_edge(&self, id: &str) -> Result<Option<Edge>> {
        match self.get_record(Edge::COLLECTION, id).await? {
            Some(record) => {
                let mut edge = Edge::from_record(&record)?;
                edge.bind(self);
                Ok(Some(edge))
            }
            None => Ok(None),
        }
    }

    pub async fn find_edges(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Edge>> {
        let records = self
            .find_records(Edge::COLLECTION, filter, options)
            .await?;
        records
            .iter()
            .map(|record| {
                let mut edge = Edge::from_record(record)?;
                edge.bind(self);
                Ok(edge)
            })
            .collect()
    }

    pub async fn find_one_edge(&self, filter: &Value) -> Result<Option<Edge>> {
        Ok(self
            .find_edges(filter, &FindOptions::limited(1))
            .await?
            .pop())
    }

    pub async fn count_edges(&self, filter: &Value) -> Result<u64> {
        self.inner.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.inner.backend.count(Edge::COLLECTION, filter).await
    }

    pub async fn distinct_edges(&self, field: &str, filter: &Value) -> Result<Vec<Value>> {
        self.inner.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.inner
            .backend
            .distinct(Edge::COLLECTION, field, filter)
            .await
    }

    pub async fn all_edges(&self) -> Result<Vec<Edge>> {
        self.find_edges(&json!({}), &FindOptions::default()).await
    }

    pub async fn update_edges(&self, filter: &Value, update: &Value) -> Result<u64> {
        self.update_records(Edge::COLLECTION, filter, update).await
    }

    /// The edge joining `a` and `b` out of `a`'s edge set, if one survives.
    pub(crate) async fn find_connecting_edge(&self, a: &str, b: &str) -> Result<Option<Edge>> {
        let Some(node) = self.get_node(a).await? else {
            return Ok(None);
        };
        if node.edge_ids().is_empty() {
            return Ok(None);
        }
        let ids: Vec<&String> = node.edge_ids().iter().collect();
        let filter = json!({
            "$and": [
                {"id": {"$in": ids}},
                {"$or": [
                    {"source_id": a, "target_id": b},
                    {"source_id": b, "target_id": a},
                ]},
            ]
        });
        self.find_one_edge(&filter).await
    }

    // Generic objects.

    pub async fn create_object(
        &self,
        type_name: impl Into<String>,
        context: Map<String, Value>,
    ) -> Result<Object> {
        let mut object = Object::new(type_name, context);
        object.bind(self);
        object.save().await?;
        Ok(object)
    }

    pub async fn get_object(&self, id: &str) -> Result<Option<Object>> {
        match self.get_record(Object::COLLECTION, id).await? {
            Some(record) => {
                let mut object = Object::from_record(&record, "Object")?;
                object.bind(self);
                Ok(Some(object))
            }
            None => Ok(None),
        }
    }

    pub async fn find_objects(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Object>> {
        let records = self
            .find_records(Object::COLLECTION, filter, options)
            .await?;
        records
            .iter()
            .map(|record| {
                let mut object = Object::from_record(record, "Object")?;
                object.bind(self);
                Ok(object)
            })
            .collect()
    }

    pub async fn find_objects_by(&self, pairs: &[(&str, Value)]) -> Result<Vec<Object>> {
        self.find_objects(&by_filter(pairs), &FindOptions::default())
            .await
    }

    pub async fn count_objects(&self, filter: &Value) -> Result<u64> {
        self.inner.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.inner.backend.count(Object::COLLECTION, filter).await
    }

    pub async fn distinct_objects(&self, field: &str, filter: &Value) -> Result<Vec<Value>> {
        self.inner.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.inner
            .backend
            .distinct(Object::COLLECTION, field, filter)
            .await
    }
}

fn by_filter(pairs: &[(&str, Value)]) -> Value {
    let mut filter = Map::new();
    for (field, value) in pairs {
        filter.insert(format!("context.{field}"), value.clone());
    }
    Value::Object(filter)
}
