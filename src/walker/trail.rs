//! Trail API: the ordered history of visited nodes.
//!
//! All accessors return defensive copies; the async variants fetch the
//! referenced entities and tolerate nodes or edges deleted since the
//! visit.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::graph::edge::Edge;
use crate::graph::node::Node;
use crate::walker::{TrailStep, Walker};

impl Walker {
    /// Visited node ids in visit order.
    pub fn trail(&self) -> Vec<String> {
        self.trail.iter().map(|step| step.node_id.clone()).collect()
    }

    /// Edge crossed into each step, `None` where the hop followed no edge.
    pub fn trail_edges(&self) -> Vec<Option<String>> {
        self.trail.iter().map(|step| step.edge_id.clone()).collect()
    }

    pub fn trail_metadata(&self) -> Vec<Map<String, Value>> {
        self.trail.iter().map(|step| step.metadata.clone()).collect()
    }

    pub fn trail_steps(&self) -> Vec<TrailStep> {
        self.trail.clone()
    }

    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    /// The most recent `count` node ids, oldest first.
    pub fn recent_trail(&self, count: usize) -> Vec<String> {
        let start = self.trail.len().saturating_sub(count);
        self.trail[start..]
            .iter()
            .map(|step| step.node_id.clone())
            .collect()
    }

    /// Metadata at a step index; negative indices count from the end, so
    /// `-1` is the most recent step.
    pub fn trail_metadata_at(&self, step: i64) -> Option<Map<String, Value>> {
        let len = self.trail.len() as i64;
        let index = if step < 0 { len + step } else { step };
        if (0..len).contains(&index) {
            Some(self.trail[index as usize].metadata.clone())
        } else {
            None
        }
    }

    pub fn clear_trail(&mut self) {
        self.trail.clear();
    }

    /// Fetches the visited nodes. Nodes deleted since their visit are
    /// skipped.
    pub async fn trail_nodes(&self) -> Result<Vec<Node>> {
        let graph = self.base.graph().await?;
        let mut nodes = Vec::with_capacity(self.trail.len());
        for step in &self.trail {
            match graph.get_node(&step.node_id).await? {
                Some(node) => nodes.push(node),
                None => debug!(node = %step.node_id, "trail node no longer exists"),
            }
        }
        Ok(nodes)
    }

    /// Fetches the visited nodes paired with the edge crossed to reach
    /// each, `None` for hops without one (including soft-missing edges).
    pub async fn trail_path(&self) -> Result<Vec<(Node, Option<Edge>)>> {
        let graph = self.base.graph().await?;
        let mut path = Vec::with_capacity(self.trail.len());
        for step in &self.trail {
            let Some(node) = graph.get_node(&step.node_id).await? else {
                debug!(node = %step.node_id, "trail node no longer exists");
                continue;
            };
            let edge = match &step.edge_id {
                Some(edge_id) => graph.get_edge(edge_id).await?,
                None => None,
            };
            path.push((node, edge));
        }
        Ok(path)
    }

    /// Appends a step, honoring the trail cap by dropping the oldest.
    pub(crate) fn push_trail(&mut self, step: TrailStep) {
        if self.max_trail_length > 0 && self.trail.len() >= self.max_trail_length {
            let overflow = self.trail.len() + 1 - self.max_trail_length;
            self.trail.drain(..overflow);
        }
        self.trail.push(step);
    }
}
