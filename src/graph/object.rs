//! Base persisted entity: identity, type tag, and the `context` document
//! holding every user-defined field.

use serde_json::{Map, Value};

use crate::error::{GraphError, Result};
use crate::graph::context::GraphContext;
use crate::graph::registry;
use crate::query::path;

/// Field names that live beside `context` in the persisted record. They are
/// never assignable through the context accessors.
const RESERVED_FIELDS: &[&str] = &[
    "id",
    "type_name",
    "context",
    "edge_ids",
    "source_id",
    "target_id",
    "directed",
];

/// Base entity state shared by nodes, edges, walkers, and generic objects.
///
/// The `sealed` flag marks the end of the construction window: protected
/// fields are assignable while unsealed and frozen afterwards.
#[derive(Debug, Clone)]
pub struct Object {
    id: String,
    type_name: String,
    context: Map<String, Value>,
    sealed: bool,
    graph: Option<GraphContext>,
}

impl Object {
    /// Collection for generic objects.
    pub const COLLECTION: &'static str = "object";

    pub fn new(type_name: impl Into<String>, context: Map<String, Value>) -> Self {
        Self::with_prefix("o", type_name, context)
    }

    pub(crate) fn with_prefix(
        prefix: &str,
        type_name: impl Into<String>,
        context: Map<String, Value>,
    ) -> Self {
        let type_name = type_name.into();
        Self {
            id: registry::new_id(prefix, &type_name),
            type_name,
            context,
            sealed: true,
            graph: None,
        }
    }

    pub(crate) fn with_id(
        id: impl Into<String>,
        type_name: impl Into<String>,
        context: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            context,
            sealed: true,
            graph: None,
        }
    }

    pub(crate) fn from_record(record: &Value, fallback_type: &str) -> Result<Object> {
        let id = crate::storage::record_id(record)?;
        let type_name = record
            .get("type_name")
            .and_then(Value::as_str)
            .unwrap_or(fallback_type)
            .to_string();
        let context = record
            .get("context")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Ok(Object::with_id(id, type_name, context))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether this entity's type chain contains `type_name`.
    pub fn is_type(&self, type_name: &str, kind: registry::EntityKind) -> bool {
        registry::ancestry_names(&self.type_name, kind).contains(&type_name.to_string())
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Resolves a flat name or dot-path within `context`.
    pub fn get_field(&self, field: &str) -> Option<&Value> {
        let (head, rest) = split_field(field);
        let value = self.context.get(head)?;
        match rest {
            Some(rest) => path::resolve(value, rest),
            None => Some(value),
        }
    }

    /// Assigns a context field, enforcing protection once construction has
    /// finished. The stored value is unchanged on rejection.
    pub fn set_field(&mut self, field: &str, value: Value) -> Result<()> {
        self.check_assignable(field)?;
        let (head, rest) = split_field(field);
        match rest {
            None => {
                self.context.insert(head.to_string(), value);
                Ok(())
            }
            Some(rest) => {
                let slot = self
                    .context
                    .entry(head.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                path::set_path(slot, rest, value)
            }
        }
    }

    /// Removes a context field. Removal counts as assignment for protection.
    pub fn unset_field(&mut self, field: &str) -> Result<()> {
        self.check_assignable(field)?;
        let (head, rest) = split_field(field);
        match rest {
            None => {
                self.context.remove(head);
            }
            Some(rest) => {
                if let Some(slot) = self.context.get_mut(head) {
                    path::unset_path(slot, rest);
                }
            }
        }
        Ok(())
    }

    fn check_assignable(&self, field: &str) -> Result<()> {
        if !self.sealed {
            return Ok(());
        }
        let head = split_field(field).0;
        let protected = RESERVED_FIELDS.contains(&head)
            || registry::is_protected(&self.type_name, head);
        if protected {
            return Err(GraphError::AttributeProtection {
                attr: head.to_string(),
                cls: self.type_name.clone(),
            });
        }
        Ok(())
    }

    /// The persisted document: identity plus `context` with transient
    /// fields removed.
    pub fn export(&self) -> Value {
        let mut context = Map::new();
        for (key, value) in &self.context {
            if !registry::is_transient(&self.type_name, key) {
                context.insert(key.clone(), value.clone());
            }
        }
        serde_json::json!({
            "id": self.id,
            "type_name": self.type_name,
            "context": context,
        })
    }

    pub fn bind(&mut self, graph: &GraphContext) {
        self.graph = Some(graph.clone());
    }

    pub(crate) fn bound(&self) -> Option<&GraphContext> {
        self.graph.as_ref()
    }

    /// The context this entity routes storage operations through: the one
    /// it was created or loaded by, else the ambient default.
    pub async fn graph(&self) -> Result<GraphContext> {
        match &self.graph {
            Some(graph) => Ok(graph.clone()),
            None => GraphContext::current().await,
        }
    }

    pub async fn save(&mut self) -> Result<()> {
        let graph = self.graph().await?;
        graph.save_record(Self::COLLECTION, self.export()).await?;
        self.graph = Some(graph);
        Ok(())
    }

    pub async fn delete(&self) -> Result<()> {
        let graph = self.graph().await?;
        graph.delete_record(Self::COLLECTION, &self.id).await
    }
}

fn split_field(field: &str) -> (&str, Option<&str>) {
    match field.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (field, None),
    }
}
