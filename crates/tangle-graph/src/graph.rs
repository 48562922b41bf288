//! Directed multigraph with journaled unlink and reversal.
//!
//! # Overview
//!
//! Vertices and edges live in arenas and are addressed by [`VertexId`] and
//! [`EdgeId`] handles that never change. Independently of the handle, every
//! vertex carries an *order id*: a dense integer starting at [`START`] that is
//! assigned on insertion and reassigned by [`Graph::renumber`] (which the
//! topological sorter calls after every successful sort).
//!
//! # Indices
//!
//! A linked edge is registered in four indices that must always agree:
//!
//! - out-edges of its start vertex
//! - in-edges of its end vertex
//! - the `(start, end)` pair bucket
//! - the edge → pair map
//!
//! Removing the last edge of a pair removes the bucket. Any disagreement
//! between the indices surfaces as a [`GraphError`] and is never retried.
//!
//! # Undo
//!
//! [`Graph::unlink_edge`], [`Graph::unlink_vertex`] and [`Graph::reverse_edge`]
//! record their inverse in the [`Journal`]. [`Graph::restore`] replays it
//! newest first, leaving the linked edge set identical to its state before the
//! first recorded mutation. [`Graph::remove_edge`] is permanent.

#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;

use crate::error::GraphError;
use crate::journal::{Journal, JournalEntry};

/// First order id handed out by a graph.
pub const START: usize = 1;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Stable arena handle of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(usize);

impl VertexId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Stable arena handle of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(usize);

impl EdgeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Ordered `(start, end)` vertex pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    pub start: VertexId,
    pub end: VertexId,
}

impl Pair {
    #[must_use]
    pub const fn new(start: VertexId, end: VertexId) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn reversed(self) -> Self {
        Self {
            start: self.end,
            end: self.start,
        }
    }

    #[must_use]
    pub fn is_loop(self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// Payload traits
// ---------------------------------------------------------------------------

/// Vertex payload. Equality and hashing define vertex identity: adding an
/// equal payload twice yields the same handle.
pub trait Vertex: Clone + Eq + Hash + fmt::Debug {
    /// Display name used in diagnostics and exports.
    fn label(&self) -> String;

    /// Abstract vertices may sit on benign cycles during topological sorts.
    fn is_abstract(&self) -> bool {
        false
    }
}

impl Vertex for String {
    fn label(&self) -> String {
        self.clone()
    }
}

/// Edge payload.
pub trait Edge: fmt::Debug {
    /// Property name; `None` marks an unlabelled (inheritance) edge.
    fn label(&self) -> Option<&str>;

    /// Synthesized by scope extension rather than read from the base model.
    fn is_qualified(&self) -> bool {
        false
    }

    fn is_unlabelled(&self) -> bool {
        self.label().is_none()
    }
}

/// Plain edge payload for graphs that need nothing beyond a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Link {
    pub name: Option<String>,
    pub qualified: bool,
}

impl Link {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            qualified: false,
        }
    }

    #[must_use]
    pub const fn unlabelled() -> Self {
        Self {
            name: None,
            qualified: false,
        }
    }

    #[must_use]
    pub const fn qualified(mut self) -> Self {
        self.qualified = true;
        self
    }
}

impl Edge for Link {
    fn label(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn is_qualified(&self) -> bool {
        self.qualified
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct EdgeEntry<E> {
    payload: E,
    pair: Pair,
}

/// Directed multigraph over vertex payload `V` and edge payload `E`.
#[derive(Debug, Clone)]
pub struct Graph<V, E> {
    vertices: Vec<V>,
    lookup: HashMap<V, VertexId>,
    /// Order id per vertex handle.
    ids: Vec<usize>,
    /// Vertex handle per order id (offset by `START`).
    by_id: Vec<VertexId>,
    edges: Vec<Option<EdgeEntry<E>>>,
    out_edges: Vec<BTreeSet<EdgeId>>,
    in_edges: Vec<BTreeSet<EdgeId>>,
    pairs: BTreeMap<Pair, BTreeSet<EdgeId>>,
    edge_pairs: BTreeMap<EdgeId, Pair>,
    journal: Journal,
}

impl<V, E> Default for Graph<V, E> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            lookup: HashMap::new(),
            ids: Vec::new(),
            by_id: Vec::new(),
            edges: Vec::new(),
            out_edges: Vec::new(),
            in_edges: Vec::new(),
            pairs: BTreeMap::new(),
            edge_pairs: BTreeMap::new(),
            journal: Journal::new(),
        }
    }
}

impl<V: Vertex, E: Edge> Graph<V, E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Vertices
    // -----------------------------------------------------------------------

    /// Add a vertex, returning the existing handle if an equal payload is
    /// already present.
    pub fn add_vertex(&mut self, vertex: V) -> VertexId {
        if let Some(&existing) = self.lookup.get(&vertex) {
            return existing;
        }
        let id = VertexId(self.vertices.len());
        self.lookup.insert(vertex.clone(), id);
        self.vertices.push(vertex);
        self.ids.push(START + self.by_id.len());
        self.by_id.push(id);
        self.out_edges.push(BTreeSet::new());
        self.in_edges.push(BTreeSet::new());
        id
    }

    /// Handle of the vertex equal to `vertex`, if present.
    #[must_use]
    pub fn find(&self, vertex: &V) -> Option<VertexId> {
        self.lookup.get(vertex).copied()
    }

    #[must_use]
    pub fn vertex(&self, id: VertexId) -> Option<&V> {
        self.vertices.get(id.0)
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// All vertex handles in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        (0..self.vertices.len()).map(VertexId)
    }

    /// All vertex handles in order-id order.
    #[must_use]
    pub fn vertices_by_id(&self) -> Vec<VertexId> {
        self.by_id.clone()
    }

    /// Current order id of `vertex`.
    #[must_use]
    pub fn id(&self, vertex: VertexId) -> Option<usize> {
        self.ids.get(vertex.0).copied()
    }

    /// Vertex currently holding order id `id`.
    pub fn vertex_by_id(&self, id: usize) -> Result<VertexId, GraphError> {
        id.checked_sub(START)
            .and_then(|offset| self.by_id.get(offset).copied())
            .ok_or(GraphError::MissingVertex(id))
    }

    /// Reassign order ids following `order`; vertices missing from `order`
    /// keep their relative order and are numbered after it.
    pub fn renumber(&mut self, order: &[VertexId]) -> Result<(), GraphError> {
        let mut seen = vec![false; self.vertices.len()];
        let mut by_id = Vec::with_capacity(self.vertices.len());
        for &vertex in order {
            self.check_vertex(vertex)?;
            if !seen[vertex.0] {
                seen[vertex.0] = true;
                by_id.push(vertex);
            }
        }
        by_id.extend(self.by_id.iter().copied().filter(|v| !seen[v.0]));
        for (offset, vertex) in by_id.iter().enumerate() {
            self.ids[vertex.0] = START + offset;
        }
        self.by_id = by_id;
        Ok(())
    }

    /// Vertices with no linked incoming edge, in order-id order.
    #[must_use]
    pub fn roots(&self) -> Vec<VertexId> {
        self.by_id
            .iter()
            .copied()
            .filter(|v| self.in_edges[v.0].is_empty())
            .collect()
    }

    fn check_vertex(&self, vertex: VertexId) -> Result<(), GraphError> {
        if vertex.0 < self.vertices.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownVertex(vertex))
        }
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Add an edge between two existing vertices.
    pub fn add_edge(&mut self, start: VertexId, end: VertexId, payload: E) -> Result<EdgeId, GraphError> {
        self.check_vertex(start)?;
        self.check_vertex(end)?;
        let pair = Pair::new(start, end);
        let id = EdgeId(self.edges.len());
        self.edges.push(Some(EdgeEntry { payload, pair }));
        self.link(id, pair)?;
        Ok(id)
    }

    /// Add an edge between two vertex payloads, adding either endpoint that
    /// is not yet present.
    pub fn connect(&mut self, start: V, end: V, payload: E) -> EdgeId {
        let start = self.add_vertex(start);
        let end = self.add_vertex(end);
        let pair = Pair::new(start, end);
        let id = EdgeId(self.edges.len());
        self.edges.push(Some(EdgeEntry { payload, pair }));
        self.link_unchecked(id, pair);
        id
    }

    /// Payload of `edge`, linked or not. `None` once the edge is removed.
    #[must_use]
    pub fn edge(&self, edge: EdgeId) -> Option<&E> {
        self.edges
            .get(edge.0)
            .and_then(Option::as_ref)
            .map(|entry| &entry.payload)
    }

    /// Pair the edge is currently linked under.
    #[must_use]
    pub fn endpoints(&self, edge: EdgeId) -> Option<Pair> {
        self.edge_pairs.get(&edge).copied()
    }

    #[must_use]
    pub fn is_linked(&self, edge: EdgeId) -> bool {
        self.edge_pairs.contains_key(&edge)
    }

    /// Number of linked edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_pairs.len()
    }

    /// Linked edges in handle order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, Pair)> + '_ {
        self.edge_pairs.iter().map(|(&edge, &pair)| (edge, pair))
    }

    /// Linked edges leaving `vertex`, in handle order.
    pub fn out_edges(&self, vertex: VertexId) -> impl Iterator<Item = EdgeId> + '_ {
        self.out_edges
            .get(vertex.0)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Linked edges entering `vertex`, in handle order.
    pub fn in_edges(&self, vertex: VertexId) -> impl Iterator<Item = EdgeId> + '_ {
        self.in_edges
            .get(vertex.0)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Linked edges from `start` to `end`.
    #[must_use]
    pub fn edges_between(&self, start: VertexId, end: VertexId) -> Vec<EdgeId> {
        self.pairs
            .get(&Pair::new(start, end))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove an edge for good. Journal entries that mention it are dropped,
    /// so a later [`Graph::restore`] does not resurrect it.
    pub fn remove_edge(&mut self, edge: EdgeId) -> Result<E, GraphError> {
        if self.edge(edge).is_none() {
            return Err(GraphError::MissingEdge(edge));
        }
        if self.is_linked(edge) {
            self.unlink(edge)?;
        }
        self.journal.purge(edge);
        self.take_entry(edge)
            .map(|entry| entry.payload)
            .ok_or(GraphError::MissingEdge(edge))
    }

    /// Unlink one edge, remembering its endpoints for [`Graph::link_edge`]
    /// or [`Graph::restore`].
    pub fn unlink_edge(&mut self, edge: EdgeId) -> Result<(), GraphError> {
        let pair = self.unlink(edge)?;
        self.journal.push(JournalEntry::Unlinked { edge, pair });
        Ok(())
    }

    /// Relink an edge previously unlinked with [`Graph::unlink_edge`].
    pub fn link_edge(&mut self, edge: EdgeId) -> Result<(), GraphError> {
        let pair = self
            .edges
            .get(edge.0)
            .and_then(Option::as_ref)
            .map(|entry| entry.pair)
            .ok_or(GraphError::MissingEdge(edge))?;
        self.link(edge, pair)?;
        self.journal.forget_unlinked(edge);
        Ok(())
    }

    /// Unlink every edge incident to `vertex`. Returns how many were unlinked.
    pub fn unlink_vertex(&mut self, vertex: VertexId) -> Result<usize, GraphError> {
        self.check_vertex(vertex)?;
        let incident: BTreeSet<EdgeId> = self.out_edges[vertex.0]
            .iter()
            .chain(self.in_edges[vertex.0].iter())
            .copied()
            .collect();
        for &edge in &incident {
            self.unlink_edge(edge)?;
        }
        Ok(incident.len())
    }

    /// Swap the direction of `edge`. The replacement payload comes from
    /// `reverse`; the original is kept so [`Graph::restore`] can put it back.
    pub fn reverse_edge(
        &mut self,
        edge: EdgeId,
        reverse: impl FnOnce(&E) -> E,
    ) -> Result<EdgeId, GraphError> {
        let linked = self.endpoints(edge).ok_or(GraphError::MissingEdge(edge))?;
        let entry = self
            .edges
            .get(edge.0)
            .and_then(Option::as_ref)
            .ok_or(GraphError::MissingEdge(edge))?;
        if entry.pair != linked {
            return Err(GraphError::ReversalMismatch {
                edge,
                recorded: entry.pair,
                linked,
            });
        }
        let payload = reverse(&entry.payload);
        self.unlink(edge)?;
        let replacement = EdgeId(self.edges.len());
        let flipped = linked.reversed();
        self.edges.push(Some(EdgeEntry {
            payload,
            pair: flipped,
        }));
        self.link(replacement, flipped)?;
        self.journal.push(JournalEntry::Reversed {
            original: edge,
            replacement,
            pair: linked,
        });
        Ok(replacement)
    }

    /// Undo every unlink and reversal recorded since the last restore.
    pub fn restore(&mut self) -> Result<(), GraphError> {
        while let Some(entry) = self.journal.pop() {
            match entry {
                JournalEntry::Unlinked { edge, pair } => {
                    if self.edge(edge).is_some() {
                        self.link(edge, pair)?;
                    }
                }
                JournalEntry::Reversed {
                    original,
                    replacement,
                    pair,
                } => {
                    if self.is_linked(replacement) {
                        self.unlink(replacement)?;
                    }
                    self.take_entry(replacement);
                    // The newest replacement is always the last slot, so a
                    // full restore leaves the arena as long as it was.
                    if replacement.0 + 1 == self.edges.len() {
                        self.edges.pop();
                    }
                    self.link(original, pair)?;
                }
            }
        }
        Ok(())
    }

    /// The undo log.
    #[must_use]
    pub const fn journal(&self) -> &Journal {
        &self.journal
    }

    // -----------------------------------------------------------------------
    // Loop stripping
    // -----------------------------------------------------------------------

    /// Unlink (journaled) every self-loop. Returns how many were unlinked.
    pub fn unlink_self_loops(&mut self) -> Result<usize, GraphError> {
        let loops: Vec<EdgeId> = self
            .edge_pairs
            .iter()
            .filter(|(_, pair)| pair.is_loop())
            .map(|(&edge, _)| edge)
            .collect();
        for &edge in &loops {
            self.unlink_edge(edge)?;
        }
        Ok(loops.len())
    }

    /// Unlink (journaled) every labelled edge `u -> v` where `v` is a
    /// supertype of `u`, i.e. reachable from `u` through unlabelled edges
    /// only. Returns how many were unlinked.
    pub fn unlink_supertype_loops(&mut self) -> Result<usize, GraphError> {
        let loops: Vec<EdgeId> = self
            .edge_pairs
            .iter()
            .filter(|&(&edge, pair)| {
                !pair.is_loop()
                    && self.edge(edge).is_some_and(|payload| !payload.is_unlabelled())
                    && self.reaches_through_unlabelled(pair.start, pair.end)
            })
            .map(|(&edge, _)| edge)
            .collect();
        for &edge in &loops {
            self.unlink_edge(edge)?;
        }
        Ok(loops.len())
    }

    fn reaches_through_unlabelled(&self, from: VertexId, to: VertexId) -> bool {
        let mut seen: BTreeSet<VertexId> = BTreeSet::from([from]);
        let mut queue: VecDeque<VertexId> = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            for edge in self.out_edges(current) {
                if !self.edge(edge).is_some_and(Edge::is_unlabelled) {
                    continue;
                }
                let Some(pair) = self.endpoints(edge) else {
                    continue;
                };
                if pair.end == to {
                    return true;
                }
                if seen.insert(pair.end) {
                    queue.push_back(pair.end);
                }
            }
        }
        false
    }

    // -----------------------------------------------------------------------
    // Integrity
    // -----------------------------------------------------------------------

    /// BLAKE3 digest of the linked edge multiset (edge handle, endpoint
    /// handles, label, qualified flag). Equal digests mean equal edge sets.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (&edge, pair) in &self.edge_pairs {
            hasher.update(&(edge.0 as u64).to_le_bytes());
            hasher.update(&(pair.start.0 as u64).to_le_bytes());
            hasher.update(&(pair.end.0 as u64).to_le_bytes());
            if let Some(payload) = self.edge(edge) {
                hasher.update(payload.label().unwrap_or("").as_bytes());
                hasher.update(if payload.is_qualified() { b"\x01" } else { b"\x00" });
            }
            hasher.update(b"\x00");
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Verify that the four edge indices agree with each other.
    pub fn check_consistency(&self) -> Result<(), GraphError> {
        for (&edge, &pair) in &self.edge_pairs {
            let recorded = self
                .edges
                .get(edge.0)
                .and_then(Option::as_ref)
                .map(|entry| entry.pair);
            if recorded != Some(pair) {
                return Err(GraphError::Inconsistent(format!(
                    "{edge} linked under {pair} but recorded as {recorded:?}"
                )));
            }
            if !self.out_edges[pair.start.0].contains(&edge) {
                return Err(GraphError::Inconsistent(format!("{edge} missing from out-edges of {}", pair.start)));
            }
            if !self.in_edges[pair.end.0].contains(&edge) {
                return Err(GraphError::Inconsistent(format!("{edge} missing from in-edges of {}", pair.end)));
            }
            if !self.pairs.get(&pair).is_some_and(|set| set.contains(&edge)) {
                return Err(GraphError::Inconsistent(format!("{edge} missing from bucket {pair}")));
            }
        }
        for (pair, set) in &self.pairs {
            if set.is_empty() {
                return Err(GraphError::Inconsistent(format!("empty bucket {pair}")));
            }
            if set.iter().any(|edge| self.edge_pairs.get(edge) != Some(pair)) {
                return Err(GraphError::Inconsistent(format!("bucket {pair} holds a foreign edge")));
            }
        }
        let out_total: usize = self.out_edges.iter().map(BTreeSet::len).sum();
        let in_total: usize = self.in_edges.iter().map(BTreeSet::len).sum();
        if out_total != self.edge_pairs.len() || in_total != self.edge_pairs.len() {
            return Err(GraphError::Inconsistent(format!(
                "index sizes differ: out={out_total} in={in_total} pairs={}",
                self.edge_pairs.len()
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Index maintenance
    // -----------------------------------------------------------------------

    fn link(&mut self, edge: EdgeId, pair: Pair) -> Result<(), GraphError> {
        self.check_vertex(pair.start)?;
        self.check_vertex(pair.end)?;
        if let Some(&recorded) = self.edge_pairs.get(&edge) {
            if recorded == pair {
                return Ok(());
            }
            return Err(GraphError::PairConflict {
                edge,
                recorded,
                claimed: pair,
            });
        }
        self.link_unchecked(edge, pair);
        Ok(())
    }

    fn link_unchecked(&mut self, edge: EdgeId, pair: Pair) {
        self.out_edges[pair.start.0].insert(edge);
        self.in_edges[pair.end.0].insert(edge);
        self.pairs.entry(pair).or_default().insert(edge);
        self.edge_pairs.insert(edge, pair);
    }

    fn unlink(&mut self, edge: EdgeId) -> Result<Pair, GraphError> {
        let pair = self
            .edge_pairs
            .remove(&edge)
            .ok_or(GraphError::MissingEdge(edge))?;
        self.out_edges[pair.start.0].remove(&edge);
        self.in_edges[pair.end.0].remove(&edge);
        if let Some(bucket) = self.pairs.get_mut(&pair) {
            bucket.remove(&edge);
            if bucket.is_empty() {
                self.pairs.remove(&pair);
            }
        }
        Ok(pair)
    }

    fn take_entry(&mut self, edge: EdgeId) -> Option<EdgeEntry<E>> {
        self.edges.get_mut(edge.0).and_then(Option::take)
    }
}
