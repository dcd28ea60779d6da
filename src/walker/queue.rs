//! Queue control actions available to hooks and embedding code.

use tracing::warn;

use crate::error::{GraphError, Result};
use crate::graph::edge::Edge;
use crate::graph::node::Node;
use crate::walker::{QueueEntry, Walker};

/// Where a batch of entries lands relative to the existing queue.
enum Position {
    Front,
    Back,
    At(usize),
}

impl Walker {
    /// Schedules nodes at the end of the queue. Returns how many were
    /// accepted; entries past the queue-size limit are rejected with a
    /// warning and traversal continues.
    pub fn visit<'a>(&mut self, nodes: impl IntoIterator<Item = &'a Node>) -> usize {
        self.enqueue_at(Position::Back, nodes)
    }

    /// Alias of [`Walker::visit`].
    pub fn append<'a>(&mut self, nodes: impl IntoIterator<Item = &'a Node>) -> usize {
        self.visit(nodes)
    }

    /// Schedules nodes at the front of the queue.
    pub fn prepend<'a>(&mut self, nodes: impl IntoIterator<Item = &'a Node>) -> usize {
        self.enqueue_at(Position::Front, nodes)
    }

    /// Schedules nodes immediately after the current position. The current
    /// node has already been dequeued, so this is the queue front.
    pub fn add_next<'a>(&mut self, nodes: impl IntoIterator<Item = &'a Node>) -> usize {
        self.enqueue_at(Position::Front, nodes)
    }

    /// Schedules node ids directly, for callers holding references only.
    pub fn visit_ids(&mut self, ids: impl IntoIterator<Item = String>) -> usize {
        let entries: Vec<QueueEntry> = ids.into_iter().map(QueueEntry::plain).collect();
        self.insert_entries(Position::Back, entries)
    }

    /// Schedules a node together with the edge the hop crosses, so the
    /// engine fires that edge's hooks without locating one itself.
    pub fn visit_via(&mut self, node: &Node, edge: &Edge) -> usize {
        self.insert_entries(
            Position::Back,
            vec![QueueEntry {
                node_id: node.id().to_string(),
                via_edge: Some(edge.id().to_string()),
            }],
        )
    }

    /// Inserts nodes just before `target` in the queue.
    pub fn insert_before<'a>(
        &mut self,
        target: &Node,
        nodes: impl IntoIterator<Item = &'a Node>,
    ) -> Result<usize> {
        let index = self.queued_index(target.id())?;
        Ok(self.enqueue_at(Position::At(index), nodes))
    }

    /// Inserts nodes just after `target` in the queue.
    pub fn insert_after<'a>(
        &mut self,
        target: &Node,
        nodes: impl IntoIterator<Item = &'a Node>,
    ) -> Result<usize> {
        let index = self.queued_index(target.id())?;
        Ok(self.enqueue_at(Position::At(index + 1), nodes))
    }

    /// Removes every queued entry for the given nodes; returns the number
    /// removed.
    pub fn dequeue<'a>(&mut self, nodes: impl IntoIterator<Item = &'a Node>) -> usize {
        let ids: Vec<&str> = nodes.into_iter().map(Node::id).collect();
        let before = self.queue.len();
        self.queue.retain(|entry| !ids.contains(&entry.node_id.as_str()));
        before - self.queue.len()
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    pub fn is_queued(&self, node: &Node) -> bool {
        self.queue.iter().any(|entry| entry.node_id == node.id())
    }

    /// Snapshot of the pending node ids in visit order.
    pub fn queued_ids(&self) -> Vec<String> {
        self.queue.iter().map(|entry| entry.node_id.clone()).collect()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn queued_index(&self, node_id: &str) -> Result<usize> {
        self.queue
            .iter()
            .position(|entry| entry.node_id == node_id)
            .ok_or_else(|| GraphError::EntityNotFound {
                kind: "queued node",
                id: node_id.to_string(),
            })
    }

    fn enqueue_at<'a>(
        &mut self,
        position: Position,
        nodes: impl IntoIterator<Item = &'a Node>,
    ) -> usize {
        let entries: Vec<QueueEntry> = nodes
            .into_iter()
            .map(|node| QueueEntry::plain(node.id()))
            .collect();
        self.insert_entries(position, entries)
    }

    fn insert_entries(&mut self, position: Position, entries: Vec<QueueEntry>) -> usize {
        let mut accepted = 0;
        let mut index = match &position {
            Position::Front => 0,
            Position::Back => self.queue.len(),
            Position::At(at) => *at,
        };
        for entry in entries {
            if self.protection.enabled && self.queue.len() >= self.protection.max_queue_size {
                warn!(
                    walker = self.id(),
                    node = %entry.node_id,
                    max = self.protection.max_queue_size,
                    "queue size limit reached, rejecting enqueue"
                );
                continue;
            }
            self.queue.insert(index, entry);
            index += 1;
            accepted += 1;
        }
        accepted
    }
}
