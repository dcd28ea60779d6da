//! Edges: typed connections between two nodes.

use serde_json::{Map, Value};

use crate::error::Result;
use crate::graph::context::GraphContext;
use crate::graph::object::Object;
use crate::graph::registry::EntityKind;

#[derive(Debug, Clone)]
pub struct Edge {
    base: Object,
    source_id: String,
    target_id: String,
    directed: bool,
}

impl Edge {
    pub const COLLECTION: &'static str = "edge";

    pub(crate) fn new(
        type_name: impl Into<String>,
        source_id: String,
        target_id: String,
        directed: bool,
        context: Map<String, Value>,
    ) -> Self {
        Self {
            base: Object::with_prefix("e", type_name, context),
            source_id,
            target_id,
            directed,
        }
    }

    pub fn from_record(record: &Value) -> Result<Edge> {
        let base = Object::from_record(record, "Edge")?;
        let source_id = record
            .get("source_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let target_id = record
            .get("target_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let directed = record
            .get("directed")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        Ok(Edge {
            base,
            source_id,
            target_id,
            directed,
        })
    }

    pub fn id(&self) -> &str {
        self.base.id()
    }

    pub fn type_name(&self) -> &str {
        self.base.type_name()
    }

    pub fn is_type(&self, type_name: &str) -> bool {
        self.base.is_type(type_name, EntityKind::Edge)
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn directed(&self) -> bool {
        self.directed
    }

    /// The endpoint on the other side of `node_id`. Self-loops return the
    /// same id.
    pub fn other_endpoint(&self, node_id: &str) -> &str {
        if self.source_id == node_id {
            &self.target_id
        } else {
            &self.source_id
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }

    pub fn context(&self) -> &Map<String, Value> {
        self.base.context()
    }

    pub fn get_field(&self, field: &str) -> Option<&Value> {
        self.base.get_field(field)
    }

    pub fn set_field(&mut self, field: &str, value: Value) -> Result<()> {
        self.base.set_field(field, value)
    }

    pub fn unset_field(&mut self, field: &str) -> Result<()> {
        self.base.unset_field(field)
    }

    pub fn bind(&mut self, graph: &GraphContext) {
        self.base.bind(graph);
    }

    pub async fn graph(&self) -> Result<GraphContext> {
        self.base.graph().await
    }

    pub fn export(&self) -> Value {
        let mut record = self.base.export();
        record["source_id"] = Value::String(self.source_id.clone());
        record["target_id"] = Value::String(self.target_id.clone());
        record["directed"] = Value::Bool(self.directed);
        record
    }

    pub async fn save(&mut self) -> Result<()> {
        let graph = self.graph().await?;
        graph.save_record(Self::COLLECTION, self.export()).await?;
        self.bind(&graph);
        Ok(())
    }

    /// Deletes the edge and detaches it from both endpoints' edge sets.
    pub async fn delete(&self) -> Result<()> {
        let graph = self.graph().await?;
        for endpoint in [&self.source_id, &self.target_id] {
            if let Some(mut node) = graph.get_node(endpoint).await? {
                node.detach_edge(self.id());
                node.save().await?;
            }
        }
        graph.delete_record(Self::COLLECTION, self.id()).await
    }
}
