//! The entity model: objects, nodes, edges, the type registry, and the
//! context that binds them to a storage backend.

pub mod context;
pub mod edge;
pub mod node;
pub mod object;
pub mod registry;
pub mod types;

pub use context::{GraphContext, OpStats};
pub use edge::Edge;
pub use node::{ConnectOptions, Direction, Node, NodeQuery, TypeSpec};
pub use object::Object;
pub use registry::EntityKind;
pub use types::{EdgeType, EntityTypeBuilder, NodeType, ObjectType, WalkerType};
