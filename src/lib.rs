//! # Errante - Object-Spatial Graph Toolkit
//!
//! Errante is a library for building persistent, asynchronous graph
//! applications: the domain is modeled as a typed graph of nodes and
//! edges, and business logic is expressed as walkers that traverse the
//! graph and fire typed hooks on the entities they visit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use errante::{Config, ConnectOptions, GraphContext, NodeQuery};
//! use serde_json::Map;
//!
//! # async fn demo() -> errante::Result<()> {
//! // Open a context over the configured backend.
//! let ctx = GraphContext::initialize(Config::memory()).await?;
//!
//! // Create nodes and connect them.
//! let mut alice = ctx.create_node("Person", Map::new()).await?;
//! let mut bob = ctx.create_node("Person", Map::new()).await?;
//! alice.connect(&mut bob, ConnectOptions::default()).await?;
//!
//! // Discover neighbors through the unified query engine.
//! let friends = alice.nodes(&NodeQuery::new().node("Person")).await?;
//! assert_eq!(friends.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Typed graph entities**: nodes and edges with protected and
//!   transient context fields, registered per type
//! - **Walkers**: queue-driven traversal agents with trails, runaway
//!   protection, and hook dispatch by runtime type
//! - **Unified query engine**: one filter/update document language across
//!   every backend
//! - **Pluggable storage**: in-memory, atomic JSON files, and a SQLite
//!   document store behind one async interface
//!
//! ## Architecture
//!
//! Errante is layered: the query engine is pure functions over records;
//! storage backends persist collections of records; the entity model and
//! registry give records their types and hooks; the walker engine drives
//! traversal on top. A [`GraphContext`] binds an entity tree to one
//! backend and can be process-default, task-scoped, or carried by the
//! entities themselves.

pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod query;
pub mod storage;
pub mod walker;

// Re-export the main public API
pub use crate::config::{BackendKind, Config, ProtectionConfig};
pub use crate::error::{GraphError, Result};
pub use crate::graph::{
    ConnectOptions, Direction, Edge, EdgeType, EntityKind, GraphContext, Node, NodeQuery,
    NodeType, Object, ObjectType, OpStats, TypeSpec, WalkerType,
};
pub use crate::query::{Filter, Update};
pub use crate::storage::{
    open_backend, FileBackend, FindOptions, MemoryBackend, SortKey, SqliteBackend, StorageBackend,
};
pub use crate::walker::{
    Here, HookFn, HookFuture, QueueEntry, TrailStep, VisitScope, Walker, WalkerState,
};
