//! The traversal loop: dequeue, locate the crossed edge, record the
//! trail, and dispatch hooks until the queue drains or a control action
//! halts the walker.

use std::time::Instant;

use serde_json::{json, Map};
use tracing::{debug, trace};

use crate::error::{GraphError, Result};
use crate::graph::context::GraphContext;
use crate::graph::edge::Edge;
use crate::graph::node::Node;
use crate::walker::hooks::{self, Here, VisitScope};
use crate::walker::{QueueEntry, TrailStep, Walker, WalkerState};

impl Walker {
    /// Seeds the queue with `start` and runs the traversal to completion,
    /// pause, or disengage. Protection limits not overridden on the walker
    /// are taken from the context configuration.
    pub async fn spawn(&mut self, start: &Node) -> Result<&mut Self> {
        match self.state {
            WalkerState::Idle | WalkerState::Finished => {}
            other => {
                return Err(GraphError::validation(format!(
                    "cannot spawn a walker in state {other:?}"
                )));
            }
        }
        let graph = self.resolve_graph(start).await?;
        self.bind(&graph);
        if !self.protection_overridden {
            self.protection = graph.config().protection;
        }
        self.queue.clear();
        self.trail.clear();
        self.visit_counts.clear();
        self.response.clear();
        self.step_count = 0;
        self.skip_requested = false;
        self.queue.push_back(QueueEntry::plain(start.id()));
        self.started_at = Some(Instant::now());
        self.state = WalkerState::Running;
        debug!(walker = self.id(), start = start.id(), "spawning walker");
        self.run(&graph).await?;
        Ok(self)
    }

    /// Re-enters the traversal loop. Only valid while paused; a disengaged
    /// walker is not resumable.
    pub async fn resume(&mut self) -> Result<&mut Self> {
        if self.state != WalkerState::Paused {
            return Err(GraphError::validation(format!(
                "resume requires a paused walker, not {:?}",
                self.state
            )));
        }
        let graph = self.base.graph().await?;
        self.state = WalkerState::Running;
        debug!(walker = self.id(), "resuming walker");
        self.run(&graph).await?;
        Ok(self)
    }

    /// Halts after the current entity; the traversal can be resumed.
    pub fn pause(&mut self, reason: Option<&str>) {
        if self.state == WalkerState::Running {
            self.state = WalkerState::Paused;
            self.response
                .insert("_paused".to_string(), json!({ "reason": reason }));
        }
    }

    /// Irreversibly halts the traversal. Exit hooks still fire.
    pub fn disengage(&mut self) {
        if matches!(
            self.state,
            WalkerState::Idle | WalkerState::Running | WalkerState::Paused
        ) {
            self.state = WalkerState::Disengaged;
        }
    }

    /// Abandons the remaining hooks for the entity currently being
    /// visited; the loop proceeds to the next entry.
    pub fn skip(&mut self) {
        self.skip_requested = true;
    }

    async fn resolve_graph(&self, start: &Node) -> Result<GraphContext> {
        if let Some(graph) = self.bound() {
            return Ok(graph.clone());
        }
        if let Some(graph) = start.bound() {
            return Ok(graph.clone());
        }
        GraphContext::current().await
    }

    /// Drives the loop, settles the final state, and fires exit hooks on
    /// every programmatic termination, including hook errors.
    async fn run(&mut self, graph: &GraphContext) -> Result<()> {
        let outcome = self.drive(graph).await;
        if outcome.is_err() {
            self.state = WalkerState::Disengaged;
        } else if self.state == WalkerState::Running {
            self.state = WalkerState::Finished;
        }
        let exit_outcome = self.fire_exit_hooks(graph).await;
        match outcome {
            Err(e) => Err(e),
            Ok(()) => exit_outcome,
        }
    }

    async fn drive(&mut self, graph: &GraphContext) -> Result<()> {
        while self.state == WalkerState::Running {
            if let Some(violation) = self.check_protection() {
                self.trip_protection(violation);
                break;
            }
            let Some(entry) = self.queue.pop_front() else {
                break;
            };
            let Some(mut node) = graph.get_node(&entry.node_id).await? else {
                debug!(node = %entry.node_id, "queued node no longer exists, skipping");
                continue;
            };

            // The edge crossed into this node: carried on the queue entry,
            // otherwise located between the previous trail node and here.
            let mut via = match &entry.via_edge {
                Some(edge_id) => graph.get_edge(edge_id).await?,
                None => match self.trail.last().map(|step| step.node_id.clone()) {
                    Some(previous) => graph.find_connecting_edge(&previous, node.id()).await?,
                    None => None,
                },
            };

            self.step_count += 1;
            let mut metadata = Map::new();
            metadata.insert("step".to_string(), json!(self.step_count));
            metadata.insert("type_name".to_string(), json!(node.type_name()));
            self.push_trail(TrailStep {
                node_id: node.id().to_string(),
                edge_id: via.as_ref().map(|edge| edge.id().to_string()),
                metadata,
            });
            *self
                .visit_counts
                .entry(node.id().to_string())
                .or_insert(0) += 1;

            // Transparent edge traversal: the crossed edge is visited
            // before the node it leads to.
            if let Some(edge) = via.as_mut() {
                self.dispatch(graph, Here::Edge(edge), None).await?;
                if self.state == WalkerState::Disengaged {
                    break;
                }
            }
            self.dispatch(graph, Here::Node(&mut node), via.as_ref())
                .await?;
        }
        Ok(())
    }

    /// Fires the matching hooks for one visited entity: walker hooks
    /// first, then the entity's own hooks.
    async fn dispatch(
        &mut self,
        graph: &GraphContext,
        here: Here<'_>,
        via: Option<&Edge>,
    ) -> Result<()> {
        let (Some(kind), Some(here_type)) = (here.kind(), here.type_name().map(str::to_string))
        else {
            return Ok(());
        };
        let mut matched = hooks::walker_hooks_for(self.type_name(), &here_type, kind);
        matched.extend(hooks::entity_hooks_for(&here_type, kind, self.type_name()));
        if matched.is_empty() {
            return Ok(());
        }
        trace!(
            walker = self.id(),
            here = here.id().unwrap_or_default(),
            hooks = matched.len(),
            "dispatching visit hooks"
        );
        self.skip_requested = false;
        let mut scope = VisitScope {
            walker: self,
            ctx: graph.clone(),
            here,
            via,
        };
        for hook in matched {
            (hook.as_ref())(&mut scope).await?;
            if scope.walker.skip_requested {
                scope.walker.skip_requested = false;
                break;
            }
            if scope.walker.state == WalkerState::Disengaged {
                break;
            }
        }
        Ok(())
    }

    async fn fire_exit_hooks(&mut self, graph: &GraphContext) -> Result<()> {
        let exit_hooks = hooks::exit_hooks_for(self.type_name());
        if exit_hooks.is_empty() {
            return Ok(());
        }
        let mut scope = VisitScope {
            walker: self,
            ctx: graph.clone(),
            here: Here::None,
            via: None,
        };
        for hook in exit_hooks {
            (hook.as_ref())(&mut scope).await?;
        }
        Ok(())
    }
}
