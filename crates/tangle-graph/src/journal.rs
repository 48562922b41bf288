//! Undo log for destructive graph algorithms.
//!
//! Every `unlink` and every `reverse` performed on a [`Graph`] appends one
//! inverse operation here. [`Graph::restore`] replays the entries newest
//! first, which puts the edge set back exactly as it was before the first
//! recorded mutation.
//!
//! [`Graph`]: crate::graph::Graph
//! [`Graph::restore`]: crate::graph::Graph::restore

use crate::graph::{EdgeId, Pair};

/// One recorded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEntry {
    /// `edge` was removed from the indices; it lived under `pair`.
    Unlinked { edge: EdgeId, pair: Pair },
    /// `original` (linked under `pair`) was replaced by `replacement`,
    /// linked under `pair.reversed()`.
    Reversed {
        original: EdgeId,
        replacement: EdgeId,
        pair: Pair,
    },
}

impl JournalEntry {
    /// Returns `true` if this entry refers to `edge` in any role.
    #[must_use]
    pub fn touches(&self, edge: EdgeId) -> bool {
        match *self {
            Self::Unlinked { edge: e, .. } => e == edge,
            Self::Reversed {
                original,
                replacement,
                ..
            } => original == edge || replacement == edge,
        }
    }
}

/// Ordered log of [`JournalEntry`] values, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter()
    }

    /// Edges currently recorded as unlinked, in unlink order.
    #[must_use]
    pub fn unlinked_edges(&self) -> Vec<EdgeId> {
        self.entries
            .iter()
            .filter_map(|entry| match *entry {
                JournalEntry::Unlinked { edge, .. } => Some(edge),
                JournalEntry::Reversed { .. } => None,
            })
            .collect()
    }

    /// `(original, replacement)` pairs for every recorded reversal.
    #[must_use]
    pub fn reversals(&self) -> Vec<(EdgeId, EdgeId)> {
        self.entries
            .iter()
            .filter_map(|entry| match *entry {
                JournalEntry::Reversed {
                    original,
                    replacement,
                    ..
                } => Some((original, replacement)),
                JournalEntry::Unlinked { .. } => None,
            })
            .collect()
    }

    pub(crate) fn push(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn pop(&mut self) -> Option<JournalEntry> {
        self.entries.pop()
    }

    /// Drop the newest `Unlinked` entry for `edge` (the edge was relinked by hand).
    pub(crate) fn forget_unlinked(&mut self, edge: EdgeId) {
        if let Some(pos) = self
            .entries
            .iter()
            .rposition(|entry| matches!(*entry, JournalEntry::Unlinked { edge: e, .. } if e == edge))
        {
            self.entries.remove(pos);
        }
    }

    /// Drop every entry mentioning `edge` (the edge was removed for good).
    pub(crate) fn purge(&mut self, edge: EdgeId) {
        self.entries.retain(|entry| !entry.touches(edge));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, Link};

    fn two_edge_graph() -> (Graph<String, Link>, EdgeId, EdgeId) {
        let mut graph = Graph::new();
        let a = graph.add_vertex("A".to_string());
        let b = graph.add_vertex("B".to_string());
        let ab = graph.add_edge(a, b, Link::named("ab")).expect("add ab");
        let ba = graph.add_edge(b, a, Link::named("ba")).expect("add ba");
        (graph, ab, ba)
    }

    #[test]
    fn unlink_and_reverse_are_recorded_in_order() {
        let (mut graph, ab, ba) = two_edge_graph();
        graph.unlink_edge(ab).expect("unlink");
        let replacement = graph.reverse_edge(ba, Link::clone).expect("reverse");

        let journal = graph.journal();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.unlinked_edges(), vec![ab]);
        assert_eq!(journal.reversals(), vec![(ba, replacement)]);
    }

    #[test]
    fn relinking_by_hand_forgets_the_entry() {
        let (mut graph, ab, _) = two_edge_graph();
        graph.unlink_edge(ab).expect("unlink");
        graph.link_edge(ab).expect("link");
        assert!(graph.journal().is_empty());
    }

    #[test]
    fn restore_empties_the_journal() {
        let (mut graph, ab, ba) = two_edge_graph();
        graph.unlink_edge(ab).expect("unlink");
        graph.reverse_edge(ba, Link::clone).expect("reverse");
        graph.restore().expect("restore");
        assert!(graph.journal().is_empty());
    }

    #[test]
    fn purge_drops_entries_for_removed_edges() {
        let (mut graph, ab, _) = two_edge_graph();
        graph.unlink_edge(ab).expect("unlink");
        graph.remove_edge(ab).expect("remove");
        assert!(graph.journal().is_empty());
        graph.restore().expect("restore");
        assert_eq!(graph.edge_count(), 1);
    }
}
