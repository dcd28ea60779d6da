//! Nodes and the graph operations built on top of storage queries.
//!
//! A node carries a denormalized `edge_ids` set so neighbor discovery
//! never scans the edge collection. The set is maintained on `connect`
//! and cascade delete across two separate documents, so readers tolerate
//! entries whose edge has already gone (soft-missing).

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::graph::context::GraphContext;
use crate::graph::edge::Edge;
use crate::graph::object::Object;
use crate::graph::registry::{self, EntityKind};
use crate::storage::FindOptions;

/// Direction selector for edge traversals, relative to the node the
/// operation starts from.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    /// Edges leaving this node.
    #[default]
    Out,
    /// Edges arriving at this node.
    In,
    /// Edges in either direction.
    Both,
}

/// Restriction on entity type and context, used for both the `edge` and
/// `node` positions of a neighbor query. A bare name restricts by type
/// (subtypes included); the filter document applies on top.
#[derive(Clone, Debug, Default)]
pub struct TypeSpec {
    pub type_name: Option<String>,
    pub filter: Option<Value>,
}

impl TypeSpec {
    fn to_filter(&self) -> Value {
        let type_clause = self.type_name.as_ref().map(|name| {
            json!({"type_name": {"$in": registry::expand_with_descendants(name)}})
        });
        match (type_clause, &self.filter) {
            (Some(types), Some(filter)) => json!({"$and": [types, filter]}),
            (Some(types), None) => types,
            (None, Some(filter)) => filter.clone(),
            (None, None) => json!({}),
        }
    }
}

impl From<&str> for TypeSpec {
    fn from(name: &str) -> Self {
        TypeSpec {
            type_name: Some(name.to_string()),
            filter: None,
        }
    }
}

impl From<String> for TypeSpec {
    fn from(name: String) -> Self {
        TypeSpec {
            type_name: Some(name),
            filter: None,
        }
    }
}

impl From<(&str, Value)> for TypeSpec {
    fn from((name, filter): (&str, Value)) -> Self {
        TypeSpec {
            type_name: Some(name.to_string()),
            filter: Some(filter),
        }
    }
}

/// Neighbor query: which edges to cross, which far nodes to keep.
#[derive(Clone, Debug, Default)]
pub struct NodeQuery {
    pub direction: Direction,
    pub node: Vec<TypeSpec>,
    pub edge: Vec<TypeSpec>,
    pub limit: Option<usize>,
    pub context_eq: Vec<(String, Value)>,
}

impl NodeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn node(mut self, spec: impl Into<TypeSpec>) -> Self {
        self.node.push(spec.into());
        self
    }

    pub fn edge(mut self, spec: impl Into<TypeSpec>) -> Self {
        self.edge.push(spec.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Equality constraint on a far-node context field.
    pub fn where_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.context_eq.push((field.into(), value));
        self
    }
}

/// How a new edge is created by [`Node::connect`].
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub edge_type: String,
    pub direction: Direction,
    pub context: Map<String, Value>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            edge_type: "Edge".to_string(),
            direction: Direction::Out,
            context: Map::new(),
        }
    }
}

impl ConnectOptions {
    pub fn edge_type(mut self, name: impl Into<String>) -> Self {
        self.edge_type = name.into();
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    base: Object,
    edge_ids: BTreeSet<String>,
}

impl Node {
    pub const COLLECTION: &'static str = "node";

    /// Id of the singleton root node.
    pub const ROOT_ID: &'static str = "n:Root:root";

    pub fn new(type_name: impl Into<String>, context: Map<String, Value>) -> Self {
        Self {
            base: Object::with_prefix("n", type_name, context),
            edge_ids: BTreeSet::new(),
        }
    }

    /// The canonical entry point node, fixed id and type.
    pub(crate) fn root() -> Self {
        Self {
            base: Object::with_id(Self::ROOT_ID, "Root", Map::new()),
            edge_ids: BTreeSet::new(),
        }
    }

    pub fn from_record(record: &Value) -> Result<Node> {
        let base = Object::from_record(record, "Node")?;
        let edge_ids = record
            .get("edge_ids")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Node { base, edge_ids })
    }

    pub fn id(&self) -> &str {
        self.base.id()
    }

    pub fn type_name(&self) -> &str {
        self.base.type_name()
    }

    pub fn is_type(&self, type_name: &str) -> bool {
        self.base.is_type(type_name, EntityKind::Node)
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

    pub fn edge_ids(&self) -> &BTreeSet<String> {
        &self.edge_ids
    }

    pub(crate) fn attach_edge(&mut self, edge_id: &str) {
        self.edge_ids.insert(edge_id.to_string());
    }

    pub(crate) fn detach_edge(&mut self, edge_id: &str) {
        self.edge_ids.remove(edge_id);
    }

    pub fn bind(&mut self, graph: &GraphContext) {
        self.base.bind(graph);
    }

    pub(crate) fn bound(&self) -> Option<&GraphContext> {
        self.base.bound()
    }

    pub async fn graph(&self) -> Result<GraphContext> {
        self.base.graph().await
    }

    pub fn export(&self) -> Value {
        let mut record = self.base.export();
        record["edge_ids"] = Value::Array(
            self.edge_ids
                .iter()
                .map(|id| Value::String(id.clone()))
                .collect(),
        );
        record
    }

    pub async fn save(&mut self) -> Result<()> {
        let graph = self.graph().await?;
        graph.save_record(Self::COLLECTION, self.export()).await?;
        self.bind(&graph);
        Ok(())
    }

    /// Deletes this node and cascades: every incident edge is removed and
    /// detached from its far endpoint.
    pub async fn delete(&self) -> Result<()> {
        let graph = self.graph().await?;
        for edge in self.incident_edges(&graph).await? {
            let far_id = edge.other_endpoint(self.id());
            if far_id != self.id() {
                if let Some(mut far) = graph.get_node(far_id).await? {
                    far.detach_edge(edge.id());
                    far.save().await?;
                }
            }
            graph.delete_record(Edge::COLLECTION, edge.id()).await?;
        }
        graph.delete_record(Self::COLLECTION, self.id()).await?;
        debug!(node = self.id(), "deleted node with cascade");
        Ok(())
    }

    /// Creates an edge to `other` and maintains both endpoints' edge sets.
    /// The edge is persisted first, then the endpoints.
    pub async fn connect(&mut self, other: &mut Node, options: ConnectOptions) -> Result<Edge> {
        let graph = self.graph().await?;
        let (source_id, target_id) = match options.direction {
            Direction::Out | Direction::Both => (self.id().to_string(), other.id().to_string()),
            Direction::In => (other.id().to_string(), self.id().to_string()),
        };
        let directed = options.direction != Direction::Both;
        let mut edge = Edge::new(options.edge_type, source_id, target_id, directed, options.context);
        edge.bind(&graph);
        self.attach_edge(edge.id());
        other.attach_edge(edge.id());
        edge.save().await?;
        self.save().await?;
        other.save().await?;
        Ok(edge)
    }

    /// Incident edges that still resolve; dangling `edge_ids` entries are
    /// skipped.
    pub(crate) async fn incident_edges(&self, graph: &GraphContext) -> Result<Vec<Edge>> {
        let mut edges = Vec::with_capacity(self.edge_ids.len());
        for edge_id in &self.edge_ids {
            match graph.get_edge(edge_id).await? {
                Some(edge) => edges.push(edge),
                None => debug!(node = self.id(), edge = %edge_id, "skipping soft-missing edge"),
            }
        }
        Ok(edges)
    }

    /// Removes `edge_ids` entries whose edge no longer exists and persists
    /// the repaired set when anything changed.
    pub async fn prune_edge_ids(&mut self) -> Result<usize> {
        let graph = self.graph().await?;
        let live: BTreeSet<String> = self
            .incident_edges(&graph)
            .await?
            .into_iter()
            .map(|edge| edge.id().to_string())
            .collect();
        let pruned = self.edge_ids.len() - live.len();
        if pruned > 0 {
            self.edge_ids = live;
            self.save().await?;
        }
        Ok(pruned)
    }

    fn edge_filter(&self, direction: Direction, specs: &[TypeSpec]) -> Value {
        let ids: Vec<&String> = self.edge_ids.iter().collect();
        let mut clauses = vec![json!({"id": {"$in": ids}})];
        match direction {
            Direction::Out => clauses.push(json!({"source_id": self.id()})),
            Direction::In => clauses.push(json!({"target_id": self.id()})),
            Direction::Both => {}
        }
        if !specs.is_empty() {
            let alternatives: Vec<Value> = specs.iter().map(TypeSpec::to_filter).collect();
            clauses.push(json!({"$or": alternatives}));
        }
        json!({"$and": clauses})
    }

    /// Connected edges, without crossing to the far endpoint.
    pub async fn edges(&self, direction: Direction) -> Result<Vec<Edge>> {
        let graph = self.graph().await?;
        graph
            .find_edges(&self.edge_filter(direction, &[]), &FindOptions::default())
            .await
    }

    /// Connected nodes: filters incident edges, collects far endpoints, then
    /// filters the endpoint nodes.
    pub async fn nodes(&self, query: &NodeQuery) -> Result<Vec<Node>> {
        let graph = self.graph().await?;
        let edges = graph
            .find_edges(
                &self.edge_filter(query.direction, &query.edge),
                &FindOptions::default(),
            )
            .await?;

        let mut far_ids = Vec::new();
        let mut seen = BTreeSet::new();
        for edge in &edges {
            let far = edge.other_endpoint(self.id());
            if seen.insert(far.to_string()) {
                far_ids.push(far.to_string());
            }
        }
        if far_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut clauses = vec![json!({"id": {"$in": far_ids}})];
        if !query.node.is_empty() {
            let alternatives: Vec<Value> = query.node.iter().map(TypeSpec::to_filter).collect();
            clauses.push(json!({"$or": alternatives}));
        }
        for (field, value) in &query.context_eq {
            let mut clause = Map::new();
            clause.insert(format!("context.{field}"), value.clone());
            clauses.push(Value::Object(clause));
        }
        let filter = json!({"$and": clauses});

        let options = FindOptions {
            limit: query.limit,
            ..FindOptions::default()
        };
        graph.find_nodes(&filter, &options).await
    }
}
