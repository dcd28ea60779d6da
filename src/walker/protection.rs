//! Runaway protection: step, revisit, and wall-clock limits.

use serde_json::json;
use tracing::warn;

use crate::error::GraphError;
use crate::walker::{Walker, WalkerState};

impl Walker {
    /// Evaluated before each dequeue. Returns the limit violation, if any;
    /// the revisit cap is checked against the entry about to be popped.
    pub(crate) fn check_protection(&self) -> Option<GraphError> {
        if !self.protection.enabled {
            return None;
        }
        if self.step_count >= self.protection.max_steps {
            return Some(GraphError::WalkerProtection {
                limit: "max_steps",
                detail: format!("{} steps taken", self.step_count),
            });
        }
        if let Some(started_at) = self.started_at {
            if started_at.elapsed() >= self.protection.max_execution_time {
                return Some(GraphError::WalkerTimeout(
                    self.protection.max_execution_time,
                ));
            }
        }
        if let Some(head) = self.queue.front() {
            if self.visit_count(&head.node_id) >= self.protection.max_visits_per_node {
                return Some(GraphError::WalkerProtection {
                    limit: "max_visits_per_node",
                    detail: format!(
                        "node {} already visited {} times",
                        head.node_id,
                        self.visit_count(&head.node_id)
                    ),
                });
            }
        }
        None
    }

    /// Converts a tripped limit into a disengage. The condition is recorded
    /// in the response so callers can inspect what halted the walker.
    pub(crate) fn trip_protection(&mut self, violation: GraphError) {
        warn!(
            walker = self.id(),
            code = violation.code(),
            "protection tripped, disengaging walker: {violation}"
        );
        self.response.insert(
            "_protection_halted".to_string(),
            json!({
                "code": violation.code(),
                "detail": violation.to_string(),
            }),
        );
        self.state = WalkerState::Disengaged;
    }
}
