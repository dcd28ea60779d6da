//! Process-wide entity type registry.
//!
//! Maps `type_name` to its definition: kind, parent chain, protected and
//! transient field tables, and hook lists. Populated once per type at
//! startup, read freely afterwards. Records whose stored tag was never
//! registered still load: they fall back to the base Node/Edge semantics
//! so old data stays readable.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::walker::hooks::{HookDef, HookFn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Object,
    Node,
    Edge,
    Walker,
}

impl EntityKind {
    /// Name of the built-in base type of this kind.
    pub fn base_name(self) -> &'static str {
        match self {
            EntityKind::Object => "Object",
            EntityKind::Node => "Node",
            EntityKind::Edge => "Edge",
            EntityKind::Walker => "Walker",
        }
    }
}

pub struct EntityTypeDef {
    pub name: String,
    pub kind: EntityKind,
    pub parent: Option<String>,
    pub protected: HashSet<String>,
    pub transient: HashSet<String>,
    pub visit_hooks: Vec<HookDef>,
    pub exit_hooks: Vec<HookFn>,
}

impl EntityTypeDef {
    fn base(name: &str, kind: EntityKind, parent: Option<&str>) -> (String, Arc<EntityTypeDef>) {
        (
            name.to_string(),
            Arc::new(EntityTypeDef {
                name: name.to_string(),
                kind,
                parent: parent.map(str::to_string),
                protected: HashSet::new(),
                transient: HashSet::new(),
                visit_hooks: Vec::new(),
                exit_hooks: Vec::new(),
            }),
        )
    }
}

static REGISTRY: Lazy<RwLock<HashMap<String, Arc<EntityTypeDef>>>> = Lazy::new(|| {
    RwLock::new(HashMap::from([
        EntityTypeDef::base("Object", EntityKind::Object, None),
        EntityTypeDef::base("Node", EntityKind::Node, None),
        EntityTypeDef::base("Edge", EntityKind::Edge, None),
        EntityTypeDef::base("Walker", EntityKind::Walker, None),
        EntityTypeDef::base("Root", EntityKind::Node, Some("Node")),
    ]))
});

/// Generates `"<prefix>:<type_name>:<random>"`. The random portion is a v4
/// UUID, collision-resistant within any realistic collection size.
pub fn new_id(prefix: &str, type_name: &str) -> String {
    format!("{prefix}:{type_name}:{}", Uuid::new_v4().simple())
}

pub fn lookup(type_name: &str) -> Option<Arc<EntityTypeDef>> {
    REGISTRY.read().get(type_name).cloned()
}

/// Registers (or replaces) a type definition after validating its hook
/// targets and parent kind.
pub(crate) fn register(def: EntityTypeDef) -> Result<()> {
    if def.name.is_empty() || def.name.starts_with('$') || def.name.contains(':') {
        return Err(GraphError::validation(format!(
            "invalid type name '{}'",
            def.name
        )));
    }
    if let Some(parent) = &def.parent {
        if let Some(parent_def) = lookup(parent) {
            if parent_def.kind != def.kind {
                return Err(GraphError::validation(format!(
                    "type '{}' cannot inherit from '{}': kind mismatch",
                    def.name, parent
                )));
            }
        }
    }
    for hook in &def.visit_hooks {
        for target in &hook.targets {
            validate_hook_target(&def, target)?;
        }
    }
    if !def.exit_hooks.is_empty() && def.kind != EntityKind::Walker {
        return Err(GraphError::HookTarget(format!(
            "exit hooks are only valid on walker types, not '{}'",
            def.name
        )));
    }
    REGISTRY.write().insert(def.name.clone(), Arc::new(def));
    Ok(())
}

/// Walkers visit graph entities; graph entities react to walkers. A hook
/// target of the wrong kind is a programming error caught at definition
/// time. Targets that are not registered yet are allowed and simply never
/// match until their type is defined.
fn validate_hook_target(def: &EntityTypeDef, target: &str) -> Result<()> {
    let Some(target_def) = lookup(target) else {
        return Ok(());
    };
    let valid = match def.kind {
        EntityKind::Walker => matches!(target_def.kind, EntityKind::Node | EntityKind::Edge),
        EntityKind::Node | EntityKind::Edge => target_def.kind == EntityKind::Walker,
        EntityKind::Object => false,
    };
    if valid {
        Ok(())
    } else {
        Err(GraphError::HookTarget(format!(
            "'{}' ({:?}) cannot target '{}' ({:?})",
            def.name, def.kind, target, target_def.kind
        )))
    }
}

/// The type chain from `type_name` up to the base of its kind, inclusive.
/// Unregistered names still produce `[name, base]`.
pub fn ancestry_names(type_name: &str, kind: EntityKind) -> Vec<String> {
    let mut names = Vec::new();
    let mut current = Some(type_name.to_string());
    while let Some(name) = current {
        if names.contains(&name) {
            break;
        }
        names.push(name.clone());
        current = lookup(&name).and_then(|def| def.parent.clone());
    }
    let base = kind.base_name().to_string();
    if !names.contains(&base) {
        names.push(base);
    }
    names
}

/// Registered definitions along the ancestry chain, most-derived first.
pub(crate) fn ancestry_defs(type_name: &str, kind: EntityKind) -> Vec<Arc<EntityTypeDef>> {
    ancestry_names(type_name, kind)
        .iter()
        .filter_map(|name| lookup(name))
        .collect()
}

/// All registered names whose chain includes `type_name`, plus the name
/// itself: a type restriction admits the type and its subtypes.
pub fn expand_with_descendants(type_name: &str) -> Vec<String> {
    let registry = REGISTRY.read();
    let mut names = vec![type_name.to_string()];
    for (name, def) in registry.iter() {
        if name == type_name {
            continue;
        }
        let mut current = def.parent.clone();
        while let Some(parent) = current {
            if parent == type_name {
                names.push(name.clone());
                break;
            }
            current = registry.get(&parent).and_then(|d| d.parent.clone());
        }
    }
    names.sort();
    names
}

pub fn is_protected(type_name: &str, field: &str) -> bool {
    walk_chain(type_name, |def| def.protected.contains(field))
}

pub fn is_transient(type_name: &str, field: &str) -> bool {
    walk_chain(type_name, |def| def.transient.contains(field))
}

fn walk_chain(type_name: &str, check: impl Fn(&EntityTypeDef) -> bool) -> bool {
    let mut current = Some(type_name.to_string());
    let mut seen = HashSet::new();
    while let Some(name) = current {
        if !seen.insert(name.clone()) {
            break;
        }
        match lookup(&name) {
            Some(def) => {
                if check(&def) {
                    return true;
                }
                current = def.parent.clone();
            }
            None => break,
        }
    }
    false
}
