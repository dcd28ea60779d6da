//! The unified query engine: filter and update documents evaluated
//! identically across every storage backend.
//!
//! Filters and updates arrive as JSON documents, are parsed once into
//! closed operator trees, and are then applied as pure functions over
//! records. Backends that can translate a sub-filter natively may do so
//! only where the semantics are identical; everything else funnels
//! through this module.

pub mod filter;
pub mod path;
pub mod update;

pub use filter::{compare_for_sort, Cond, Filter};
pub use update::{PullOperand, Update, UpdateOp};
