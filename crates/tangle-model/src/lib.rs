#![forbid(unsafe_code)]
//! tangle-model: type and object graphs built on tangle-graph.
//!
//! # Overview
//!
//! ```text
//! TypeModel (Schema from TOML)
//!   ├─ TypeGraph      one vertex per reachable type; domain sort, has_path
//!   └─ Aggregate      arena of live members
//!        └─ ObjectGraph  members + collection proxies; swizzle, domain sort
//!             └─ persist   root discovery, creation/deletion order
//! ```
//!
//! # Conventions
//!
//! - **Errors**: typed [`ModelError`]; persistence collaborators return
//!   `anyhow::Result` and are wrapped.
//! - **Logging**: `tracing`; unresolved swizzle cycles log at `warn`.

pub mod domain;
pub mod error;
pub mod meta;
pub mod object;
pub mod object_graph;
pub mod persist;
pub mod sample;
pub mod type_graph;

pub use domain::{DomainEdge, OrderingRole, domain_sort};
pub use error::ModelError;
pub use meta::{Cardinality, EntityType, Property, Schema, TypeModel, load_schema};
pub use object::{Aggregate, FieldValue, Instance, ObjectId};
pub use object_graph::{ObjectEdge, ObjectGraph, ObjectNode, Swizzle, SwizzleReport};
pub use persist::{PersistPlan, Persister, delete_all, discover_roots, persist_all, plan};
pub use sample::{RelationshipGuard, SampleOptions, TraversalContext, generate};
pub use type_graph::{Relation, RelationKind, TypeGraph, TypeGraphOptions, TypeState};
