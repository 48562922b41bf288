//! Object-level dependency graph and loop breaking.
//!
//! # Overview
//!
//! One [`ObjectNode::Entity`] vertex per aggregate member reachable from the
//! roots, plus one [`ObjectNode::Collection`] proxy per non-empty list
//! field. A to-one reference becomes a named edge `owner -[prop]-> target`;
//! a list becomes `owner -[prop]-> proxy` followed by one *unnamed* edge
//! `proxy -> element` per element.
//!
//! # Swizzling
//!
//! [`ObjectGraph::swizzle`] enumerates every simple cycle. For each cycle
//! that is not already broken, the first edge that is nullable, single
//! valued and not cascading is cut: the owner's field is pointed at a fresh
//! reference stub of the target (identity fields only) and the edge is
//! removed. A cycle without such an edge is logged and reported in
//! [`SwizzleReport::unresolved`]; it is never broken through an ineligible
//! edge.

#![allow(clippy::module_name_repetitions)]

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tangle_graph::{
    Circuit, CyclePolicy, Edge, EdgeId, Graph, GraphError, TopoOrder, Vertex, VertexId, circuit_labels,
};
use tracing::{debug, info, instrument, warn};

use crate::domain::{DomainEdge, OrderingRole, domain_sort};
use crate::error::ModelError;
use crate::meta::TypeModel;
use crate::object::{Aggregate, FieldValue, ObjectId};
use crate::type_graph::split_path;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectNode {
    Entity { id: ObjectId, type_name: String },
    Collection { owner: ObjectId, property: String },
}

impl ObjectNode {
    #[must_use]
    pub const fn object(&self) -> Option<ObjectId> {
        match self {
            Self::Entity { id, .. } => Some(*id),
            Self::Collection { .. } => None,
        }
    }
}

impl Vertex for ObjectNode {
    fn label(&self) -> String {
        match self {
            Self::Entity { id, type_name } => format!("{type_name}{id}"),
            Self::Collection { owner, property } => format!("{owner}.{property}[]"),
        }
    }
}

/// Edge payload of an [`ObjectGraph`]. `property` is `None` on proxy to
/// element edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEdge {
    pub property: Option<String>,
    pub nullable: bool,
    pub many: bool,
    pub cascade: bool,
    pub reversed: bool,
}

impl ObjectEdge {
    /// Whether swizzling may cut this edge.
    #[must_use]
    pub const fn is_breakable(&self) -> bool {
        self.property.is_some() && self.nullable && !self.many && !self.cascade
    }
}

impl Edge for ObjectEdge {
    fn label(&self) -> Option<&str> {
        self.property.as_deref()
    }
}

impl DomainEdge for ObjectEdge {
    fn role(&self) -> OrderingRole {
        if self.many || self.nullable {
            OrderingRole::Unlink
        } else if self.cascade {
            OrderingRole::Reverse
        } else {
            OrderingRole::Keep
        }
    }

    fn flipped(&self) -> Self {
        Self {
            reversed: !self.reversed,
            ..self.clone()
        }
    }
}

/// One cut made by [`ObjectGraph::swizzle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swizzle {
    pub owner: ObjectId,
    pub property: String,
    pub target: ObjectId,
    pub stub: ObjectId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwizzleReport {
    pub swizzled: Vec<Swizzle>,
    /// Cycles with no breakable edge, rendered `A -[x]-> B -[y]-> A`.
    pub unresolved: Vec<String>,
}

impl SwizzleReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Dependency graph over aggregate members.
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    graph: Graph<ObjectNode, ObjectEdge>,
    nodes: HashMap<ObjectId, VertexId>,
    by_name: HashMap<VertexId, BTreeMap<String, EdgeId>>,
}

impl ObjectGraph {
    /// Walk the aggregate depth-first from `roots`.
    #[instrument(skip(model, aggregate))]
    pub fn build(model: &dyn TypeModel, aggregate: &Aggregate, roots: &[ObjectId]) -> Result<Self, ModelError> {
        let mut this = Self {
            graph: Graph::new(),
            nodes: HashMap::new(),
            by_name: HashMap::new(),
        };
        let mut visited = vec![false; aggregate.len()];
        let mut stack: Vec<ObjectId> = roots.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            let instance = aggregate.try_get(id)?;
            if visited[id.index()] {
                continue;
            }
            visited[id.index()] = true;
            let owner = this.entity_vertex(aggregate, id)?;

            let mut next = Vec::new();
            for (field, value) in &instance.fields {
                let targets = value.targets();
                if targets.is_empty() {
                    continue;
                }
                let property = model.property(&instance.type_name, field).ok_or_else(|| {
                    ModelError::UnknownProperty {
                        owner: instance.type_name.clone(),
                        property: field.clone(),
                    }
                })?;
                match value {
                    FieldValue::Ref(target) => {
                        let end = this.entity_vertex(aggregate, *target)?;
                        let edge = this.graph.add_edge(
                            owner,
                            end,
                            ObjectEdge {
                                property: Some(field.clone()),
                                nullable: property.nullable,
                                many: false,
                                cascade: property.cascade,
                                reversed: false,
                            },
                        )?;
                        this.by_name.entry(owner).or_default().insert(field.clone(), edge);
                    }
                    FieldValue::List(items) => {
                        let proxy = this.graph.add_vertex(ObjectNode::Collection {
                            owner: id,
                            property: field.clone(),
                        });
                        let edge = this.graph.add_edge(
                            owner,
                            proxy,
                            ObjectEdge {
                                property: Some(field.clone()),
                                nullable: true,
                                many: true,
                                cascade: property.cascade,
                                reversed: false,
                            },
                        )?;
                        this.by_name.entry(owner).or_default().insert(field.clone(), edge);
                        for item in items {
                            let end = this.entity_vertex(aggregate, *item)?;
                            this.graph.add_edge(
                                proxy,
                                end,
                                ObjectEdge {
                                    property: None,
                                    nullable: true,
                                    many: true,
                                    cascade: property.cascade,
                                    reversed: false,
                                },
                            )?;
                        }
                    }
                    FieldValue::Null | FieldValue::Scalar(_) => {}
                }
                next.extend(targets);
            }
            stack.extend(next.into_iter().rev().filter(|t| !visited.get(t.index()).copied().unwrap_or(true)));
        }

        debug!(
            vertices = this.graph.vertex_count(),
            edges = this.graph.edge_count(),
            "object graph built"
        );
        Ok(this)
    }

    fn entity_vertex(&mut self, aggregate: &Aggregate, id: ObjectId) -> Result<VertexId, ModelError> {
        if let Some(&vertex) = self.nodes.get(&id) {
            return Ok(vertex);
        }
        let instance = aggregate.try_get(id)?;
        let vertex = self.graph.add_vertex(ObjectNode::Entity {
            id,
            type_name: instance.type_name.clone(),
        });
        self.nodes.insert(id, vertex);
        Ok(vertex)
    }

    #[must_use]
    pub const fn graph(&self) -> &Graph<ObjectNode, ObjectEdge> {
        &self.graph
    }

    #[must_use]
    pub fn vertex(&self, object: ObjectId) -> Option<VertexId> {
        self.nodes.get(&object).copied()
    }

    #[must_use]
    pub fn order_id(&self, object: ObjectId) -> Option<usize> {
        self.vertex(object).and_then(|v| self.graph.id(v))
    }

    /// Named outgoing edge of `object` (references and list owners only).
    #[must_use]
    pub fn outgoing_by_name(&self, object: ObjectId, property: &str) -> Option<EdgeId> {
        let vertex = self.vertex(object)?;
        self.by_name.get(&vertex).and_then(|m| m.get(property)).copied()
    }

    /// Every simple cycle, graph restored afterwards.
    pub fn circuits(&mut self) -> Result<Vec<Circuit>, GraphError> {
        self.graph.circuits()
    }

    /// Render a circuit of this graph.
    #[must_use]
    pub fn describe(&self, circuit: &Circuit) -> String {
        circuit_labels(&self.graph, circuit)
    }

    /// Break cycles by substituting reference stubs.
    #[instrument(skip_all)]
    pub fn swizzle(&mut self, model: &dyn TypeModel, aggregate: &mut Aggregate) -> Result<SwizzleReport, ModelError> {
        let circuits = self.graph.circuits()?;
        let mut broken: BTreeSet<EdgeId> = BTreeSet::new();
        let mut report = SwizzleReport::default();

        for circuit in &circuits {
            if circuit.edges.iter().any(|edge| broken.contains(edge)) {
                continue;
            }
            let eligible = circuit
                .edges
                .iter()
                .copied()
                .find(|&edge| self.graph.edge(edge).is_some_and(ObjectEdge::is_breakable));
            let Some(edge) = eligible else {
                let cycle = self.describe(circuit);
                warn!(%cycle, "cycle has no breakable edge; left unresolved");
                report.unresolved.push(cycle);
                continue;
            };

            let pair = self.graph.endpoints(edge).ok_or(GraphError::MissingEdge(edge))?;
            let owner = self.object_at(pair.start)?;
            let target = self.object_at(pair.end)?;
            let property = self
                .graph
                .edge(edge)
                .and_then(|payload| payload.property.clone())
                .ok_or(GraphError::MissingEdge(edge))?;

            let stub = aggregate.stub(model, target)?;
            aggregate.set(owner, property.clone(), FieldValue::Ref(stub))?;
            self.graph.remove_edge(edge)?;
            if let Some(names) = self.by_name.get_mut(&pair.start) {
                names.remove(&property);
            }
            broken.insert(edge);

            info!(owner = %owner, property = %property, target = %target, stub = %stub, "swizzled reference");
            report.swizzled.push(Swizzle {
                owner,
                property,
                target,
                stub,
            });
        }
        Ok(report)
    }

    fn object_at(&self, vertex: VertexId) -> Result<ObjectId, ModelError> {
        self.graph
            .vertex(vertex)
            .and_then(ObjectNode::object)
            .ok_or(ModelError::Graph(GraphError::UnknownVertex(vertex)))
    }

    /// Domain-aware sort. Cycles left by swizzling are skipped, not raised.
    pub fn sort(&mut self) -> Result<TopoOrder, GraphError> {
        domain_sort(&mut self.graph, CyclePolicy::Tolerant)
    }

    /// Whether `path` can be walked from `from`. A segment applied to a list
    /// field continues from every element.
    pub fn has_path(&self, from: ObjectId, path: &str) -> Result<bool, ModelError> {
        let segments = split_path(path)?;
        let Some(start) = self.vertex(from) else {
            return Ok(false);
        };
        let mut frontier: BTreeSet<VertexId> = BTreeSet::from([start]);
        for segment in segments {
            let mut next = BTreeSet::new();
            for vertex in frontier {
                let Some(edge) = self.by_name.get(&vertex).and_then(|m| m.get(segment)) else {
                    continue;
                };
                let Some(pair) = self.graph.endpoints(*edge) else {
                    continue;
                };
                match self.graph.vertex(pair.end) {
                    Some(ObjectNode::Collection { .. }) => {
                        next.extend(
                            self.graph
                                .out_edges(pair.end)
                                .filter_map(|e| self.graph.endpoints(e))
                                .map(|p| p.end),
                        );
                    }
                    Some(ObjectNode::Entity { .. }) => {
                        next.insert(pair.end);
                    }
                    None => {}
                }
            }
            if next.is_empty() {
                return Ok(false);
            }
            frontier = next;
        }
        Ok(true)
    }
}
