//! Hook types and dispatch-order resolution.
//!
//! Hooks are registered per type and indexed by target names; dispatch
//! walks the visited entity's type chain against the visiting walker's, so
//! a hook targeting a supertype fires for every subtype. Walker hooks run
//! before entity hooks, and within each group the most-derived declaring
//! type contributes first, typed hooks before its catch-alls.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::graph::context::GraphContext;
use crate::graph::edge::Edge;
use crate::graph::node::Node;
use crate::graph::registry::{self, EntityKind};
use crate::walker::Walker;

pub type HookFuture<'a> = BoxFuture<'a, Result<()>>;

/// A registered hook. Hooks are written as plain functions:
///
/// ```ignore
/// fn my_hook<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
///     Box::pin(async move { /* ... */ Ok(()) })
/// }
/// ```
pub type HookFn =
    Arc<dyn for<'s, 'w> Fn(&'s mut VisitScope<'w>) -> HookFuture<'s> + Send + Sync>;

pub struct HookDef {
    /// Target type names; empty = catch-all.
    pub targets: Vec<String>,
    pub hook: HookFn,
}

/// The entity currently under visitation.
pub enum Here<'w> {
    /// Exit hooks run with no current entity.
    None,
    Node(&'w mut Node),
    Edge(&'w mut Edge),
}

impl Here<'_> {
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            Here::None => None,
            Here::Node(_) => Some(EntityKind::Node),
            Here::Edge(_) => Some(EntityKind::Edge),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Here::None => None,
            Here::Node(node) => Some(node.id()),
            Here::Edge(edge) => Some(edge.id()),
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            Here::None => None,
            Here::Node(node) => Some(node.type_name()),
            Here::Edge(edge) => Some(edge.type_name()),
        }
    }
}

/// Everything a hook can reach: the walker (queue, trail, response,
/// control actions), the visited entity, the edge the hop crossed, and
/// the context for storage access.
pub struct VisitScope<'w> {
    pub walker: &'w mut Walker,
    pub ctx: GraphContext,
    pub(crate) here: Here<'w>,
    pub(crate) via: Option<&'w Edge>,
}

impl<'w> VisitScope<'w> {
    pub fn here_node(&mut self) -> Option<&mut Node> {
        match &mut self.here {
            Here::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn here_edge(&mut self) -> Option<&mut Edge> {
        match &mut self.here {
            Here::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn here_id(&self) -> Option<&str> {
        self.here.id()
    }

    pub fn here_type(&self) -> Option<&str> {
        self.here.type_name()
    }

    /// The edge crossed to reach the current node, when the hop followed
    /// one.
    pub fn via(&self) -> Option<&Edge> {
        self.via
    }
}

/// Hooks a walker of type `walker_type` fires when visiting an entity of
/// `here_type`/`here_kind`.
pub(crate) fn walker_hooks_for(
    walker_type: &str,
    here_type: &str,
    here_kind: EntityKind,
) -> Vec<HookFn> {
    let here_names = registry::ancestry_names(here_type, here_kind);
    collect_matching(
        registry::ancestry_defs(walker_type, EntityKind::Walker),
        &here_names,
    )
}

/// Hooks an entity of `here_type` fires in reaction to a visiting walker
/// of `walker_type`.
pub(crate) fn entity_hooks_for(
    here_type: &str,
    here_kind: EntityKind,
    walker_type: &str,
) -> Vec<HookFn> {
    let walker_names = registry::ancestry_names(walker_type, EntityKind::Walker);
    collect_matching(registry::ancestry_defs(here_type, here_kind), &walker_names)
}

pub(crate) fn exit_hooks_for(walker_type: &str) -> Vec<HookFn> {
    registry::ancestry_defs(walker_type, EntityKind::Walker)
        .iter()
        .flat_map(|def| def.exit_hooks.iter().cloned())
        .collect()
}

fn collect_matching(
    defs: Vec<Arc<registry::EntityTypeDef>>,
    counterpart_names: &[String],
) -> Vec<HookFn> {
    let mut hooks = Vec::new();
    for def in defs {
        let mut catch_alls = Vec::new();
        for hook_def in &def.visit_hooks {
            if hook_def.targets.is_empty() {
                catch_alls.push(hook_def.hook.clone());
            } else if hook_def
                .targets
                .iter()
                .any(|target| counterpart_names.contains(target))
            {
                hooks.push(hook_def.hook.clone());
            }
        }
        hooks.extend(catch_alls);
    }
    hooks
}
