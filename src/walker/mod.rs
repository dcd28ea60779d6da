//! Walkers: traversal agents with a visit queue, a trail of visited
//! nodes, runaway protection, and typed hook dispatch.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::ProtectionConfig;
use crate::error::Result;
use crate::graph::context::GraphContext;
use crate::graph::object::Object;

pub mod engine;
pub mod hooks;
mod protection;
mod queue;
mod trail;

pub use hooks::{Here, HookDef, HookFn, HookFuture, VisitScope};

/// Traversal lifecycle. `Disengaged` is terminal; `Paused` is resumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkerState {
    Idle,
    Running,
    Paused,
    Disengaged,
    Finished,
}

/// One pending visit: the node to process and, when known, the edge the
/// hop crossed to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub node_id: String,
    pub via_edge: Option<String>,
}

impl QueueEntry {
    pub(crate) fn plain(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            via_edge: None,
        }
    }
}

/// One completed visit on the trail.
#[derive(Debug, Clone, Serialize)]
pub struct TrailStep {
    pub node_id: String,
    pub edge_id: Option<String>,
    pub metadata: Map<String, Value>,
}

/// A traversal agent. Create one, optionally adjust its protection limits
/// or seed its context, then [`Walker::spawn`] it at a start node.
#[derive(Debug, Clone)]
pub struct Walker {
    base: Object,
    pub(crate) queue: VecDeque<QueueEntry>,
    pub(crate) trail: Vec<TrailStep>,
    pub(crate) visit_counts: HashMap<String, u64>,
    pub(crate) state: WalkerState,
    pub(crate) step_count: u64,
    pub(crate) started_at: Option<Instant>,
    pub(crate) response: Map<String, Value>,
    pub(crate) max_trail_length: usize,
    pub(crate) protection: ProtectionConfig,
    pub(crate) protection_overridden: bool,
    pub(crate) skip_requested: bool,
}

impl Walker {
    /// Collection used when a walker is checkpointed with [`Walker::save`].
    pub const COLLECTION: &'static str = "walker";

    pub fn new(type_name: impl Into<String>) -> Self {
        Self::with_context(type_name, Map::new())
    }

    pub fn with_context(type_name: impl Into<String>, context: Map<String, Value>) -> Self {
        Self {
            base: Object::new(type_name, context),
            queue: VecDeque::new(),
            trail: Vec::new(),
            visit_counts: HashMap::new(),
            state: WalkerState::Idle,
            step_count: 0,
            started_at: None,
            response: Map::new(),
            max_trail_length: 0,
            protection: ProtectionConfig::default(),
            protection_overridden: false,
            skip_requested: false,
        }
    }

    pub fn id(&self) -> &str {
        self.base.id()
    }

    pub fn type_name(&self) -> &str {
        self.base.type_name()
    }

    pub fn state(&self) -> WalkerState {
        self.state
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn visit_count(&self, node_id: &str) -> u64 {
        self.visit_counts.get(node_id).copied().unwrap_or(0)
    }

    pub fn get_field(&self, field: &str) -> Option<&Value> {
        self.base.get_field(field)
    }

    pub fn set_field(&mut self, field: &str, value: Value) -> Result<()> {
        self.base.set_field(field, value)
    }

    /// Overrides the protection limits for this walker; without this the
    /// limits come from the context configuration at spawn time.
    pub fn set_protection(&mut self, protection: ProtectionConfig) {
        self.protection = protection;
        self.protection_overridden = true;
    }

    pub fn protection(&self) -> &ProtectionConfig {
        &self.protection
    }

    /// Caps the trail length; oldest steps are dropped past the cap.
    /// Zero (the default) keeps the whole trail.
    pub fn set_max_trail_length(&mut self, max: usize) {
        self.max_trail_length = max;
    }

    /// The result document this walker accumulates.
    pub fn response(&self) -> &Map<String, Value> {
        &self.response
    }

    /// Merges a key into the response document.
    pub fn report(&mut self, key: impl Into<String>, value: Value) {
        self.response.insert(key.into(), value);
    }

    /// Appends a value to a sequence-valued response key, creating it on
    /// first use.
    pub fn report_push(&mut self, key: &str, value: Value) {
        match self.response.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                self.response
                    .insert(key.to_string(), Value::Array(vec![value]));
            }
        }
    }

    pub fn bind(&mut self, graph: &GraphContext) {
        self.base.bind(graph);
    }

    pub(crate) fn bound(&self) -> Option<&GraphContext> {
        self.base.bound()
    }

    /// Walker traversal state is transient: only identity and context
    /// persist, so a checkpointed walker restarts clean.
    pub fn export(&self) -> Value {
        self.base.export()
    }

    /// Checkpoints the walker document (identity + context only).
    pub async fn save(&mut self) -> Result<()> {
        let graph = self.base.graph().await?;
        graph.save_record(Self::COLLECTION, self.export()).await?;
        self.bind(&graph);
        Ok(())
    }
}
