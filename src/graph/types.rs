//! Builders for registering entity and walker types.
//!
//! A type registration declares a name, an optional parent, the protected
//! and transient context fields, and the hooks that fire during walker
//! traversal. Hooks are plain functions returning boxed futures:
//!
//! ```ignore
//! fn greet<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
//!     Box::pin(async move {
//!         scope.walker.report("greeted", serde_json::json!(true));
//!         Ok(())
//!     })
//! }
//!
//! WalkerType::define("Greeter").on_visit(&["Person"], greet).register()?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::graph::registry::{self, EntityKind, EntityTypeDef};
use crate::walker::hooks::{HookDef, HookFuture, VisitScope};

pub struct NodeType;
pub struct EdgeType;
pub struct ObjectType;
pub struct WalkerType;

impl NodeType {
    pub fn define(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder::new(name, EntityKind::Node)
    }
}

impl EdgeType {
    pub fn define(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder::new(name, EntityKind::Edge)
    }
}

impl ObjectType {
    pub fn define(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder::new(name, EntityKind::Object)
    }
}

impl WalkerType {
    pub fn define(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder::new(name, EntityKind::Walker)
    }
}

pub struct EntityTypeBuilder {
    def: EntityTypeDef,
}

impl EntityTypeBuilder {
    fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            def: EntityTypeDef {
                name: name.into(),
                kind,
                parent: None,
                protected: HashSet::new(),
                transient: HashSet::new(),
                visit_hooks: Vec::new(),
                exit_hooks: Vec::new(),
            },
        }
    }

    /// Declares the parent type; defaults to the base of the kind.
    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.def.parent = Some(name.into());
        self
    }

    /// Marks context fields assignable only during construction.
    pub fn protect(mut self, fields: &[&str]) -> Self {
        self.def.protected.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Marks context fields excluded from the persisted document.
    pub fn transient(mut self, fields: &[&str]) -> Self {
        self.def.transient.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Adds a visit hook. On walker types the targets name node/edge types;
    /// on node/edge types they name walker types. An empty target list is a
    /// catch-all that fires for every visit.
    pub fn on_visit<F>(mut self, targets: &[&str], hook: F) -> Self
    where
        F: for<'s, 'w> Fn(&'s mut VisitScope<'w>) -> HookFuture<'s> + Send + Sync + 'static,
    {
        self.def.visit_hooks.push(HookDef {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            hook: Arc::new(hook),
        });
        self
    }

    /// Adds an exit hook; only valid on walker types. Exit hooks fire on
    /// every programmatic termination of the traversal loop.
    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: for<'s, 'w> Fn(&'s mut VisitScope<'w>) -> HookFuture<'s> + Send + Sync + 'static,
    {
        self.def.exit_hooks.push(Arc::new(hook));
        self
    }

    /// Validates targeting rules and publishes the definition. Re-registering
    /// a name replaces its previous definition.
    pub fn register(self) -> Result<()> {
        registry::register(self.def)
    }
}
