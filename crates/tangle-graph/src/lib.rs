#![forbid(unsafe_code)]
//! tangle-graph: the dependency-graph engine.
//!
//! # Overview
//!
//! ```text
//! Graph<V, E>             arena multigraph, order ids, journaled unlink/reverse
//!   ├─ scc                Tarjan components, isolates each component
//!   ├─ circuits           Johnson elementary circuits (vertex + edge form)
//!   ├─ topo               DFS topological sort with cycle traces, renumbering
//!   └─ export             DOT / GraphML
//! ```
//!
//! Every destructive algorithm records its inverse in the graph's
//! [`Journal`]; [`Graph::restore`] puts the edge set back exactly.
//!
//! # Conventions
//!
//! - **Errors**: structural violations and cycles are [`GraphError`] values.
//! - **Logging**: `tracing` macros; cycle skips log at `warn`, abandoned
//!   abstract excursions at `trace`.

pub mod circuits;
pub mod error;
pub mod export;
pub mod graph;
pub mod journal;
pub mod scc;
pub mod topo;

pub use circuits::{Circuit, circuit_labels, find_circuits};
pub use error::{CycleTrace, ErrorCode, GraphError};
pub use export::{to_dot, to_graphml};
pub use graph::{Edge, EdgeId, Graph, Link, Pair, START, Vertex, VertexId};
pub use journal::{Journal, JournalEntry};
pub use scc::strongly_connected;
pub use topo::{CyclePolicy, TopoOrder, topological_sort};
