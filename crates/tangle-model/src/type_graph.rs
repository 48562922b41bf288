//! Type-level dependency graph.
//!
//! # Overview
//!
//! One [`TypeState`] vertex per entity type reachable from the root types
//! (following property targets, parents and subtypes). Edges:
//!
//! - `T -[prop]-> U` for every relationship property `prop: U` declared on `T`
//! - `T -> P` (unlabelled) when `T` extends `P`
//! - with scope extension, `T -[prop]-> U` *qualified* for every relationship
//!   `T` inherits without redeclaring it
//!
//! Property-keyed adjacency lives in a side table owned by the
//! [`TypeGraph`], not in the vertices.

#![allow(clippy::module_name_repetitions)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use tangle_graph::{
    Circuit, CyclePolicy, Edge, EdgeId, Graph, GraphError, TopoOrder, Vertex, VertexId,
};
use tracing::{debug, instrument};

use crate::domain::{DomainEdge, OrderingRole, domain_sort};
use crate::error::ModelError;
use crate::meta::TypeModel;

/// A type plus the attribute names in scope for it. Identity is the type
/// name alone.
#[derive(Debug, Clone)]
pub struct TypeState {
    pub type_name: String,
    pub scope: BTreeSet<String>,
    pub is_abstract: bool,
}

impl PartialEq for TypeState {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

impl Eq for TypeState {}

impl Hash for TypeState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
    }
}

impl Vertex for TypeState {
    fn label(&self) -> String {
        self.type_name.clone()
    }

    fn is_abstract(&self) -> bool {
        self.is_abstract
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Inheritance,
    Property { nullable: bool, many: bool, cascade: bool },
}

/// Edge payload of a [`TypeGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: Option<String>,
    pub kind: RelationKind,
    pub qualified: bool,
    /// Set on the temporary replacement created by a domain reversal.
    pub reversed: bool,
}

impl Relation {
    #[must_use]
    pub const fn inheritance() -> Self {
        Self {
            name: None,
            kind: RelationKind::Inheritance,
            qualified: false,
            reversed: false,
        }
    }
}

impl Edge for Relation {
    fn label(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn is_qualified(&self) -> bool {
        self.qualified
    }
}

impl DomainEdge for Relation {
    fn role(&self) -> OrderingRole {
        match self.kind {
            RelationKind::Inheritance => OrderingRole::Reverse,
            RelationKind::Property { many: true, .. } | RelationKind::Property { nullable: true, .. } => {
                OrderingRole::Unlink
            }
            RelationKind::Property { cascade: true, .. } => OrderingRole::Reverse,
            RelationKind::Property { .. } => OrderingRole::Keep,
        }
    }

    fn flipped(&self) -> Self {
        Self {
            reversed: !self.reversed,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeGraphOptions {
    /// Copy inherited relationships into each subtype as qualified edges.
    pub extend_scope: bool,
}

/// Dependency graph over entity types.
#[derive(Debug, Clone)]
pub struct TypeGraph {
    graph: Graph<TypeState, Relation>,
    vertices: HashMap<String, VertexId>,
    by_name: HashMap<VertexId, BTreeMap<String, EdgeId>>,
    roots: Vec<VertexId>,
}

impl TypeGraph {
    /// Build the graph of every type reachable from `root`.
    pub fn build(model: &dyn TypeModel, root: &str, options: TypeGraphOptions) -> Result<Self, ModelError> {
        Self::build_many(model, &[root.to_string()], options)
    }

    /// Build the graph of every type reachable from any of `roots`.
    #[instrument(skip(model))]
    pub fn build_many(
        model: &dyn TypeModel,
        roots: &[String],
        options: TypeGraphOptions,
    ) -> Result<Self, ModelError> {
        let discovered = discover(model, roots)?;

        let mut graph = Graph::new();
        let mut vertices = HashMap::new();
        for type_name in &discovered {
            let scope = if options.extend_scope {
                model.all_properties(type_name).iter().map(|p| p.name.clone()).collect()
            } else {
                model
                    .entity(type_name)
                    .map(|e| e.properties.iter().map(|p| p.name.clone()).collect())
                    .unwrap_or_default()
            };
            let id = graph.add_vertex(TypeState {
                type_name: type_name.clone(),
                scope,
                is_abstract: model.is_abstract(type_name),
            });
            vertices.insert(type_name.clone(), id);
        }

        let mut this = Self {
            graph,
            vertices,
            by_name: HashMap::new(),
            roots: Vec::new(),
        };

        for type_name in &discovered {
            let entity = model
                .entity(type_name)
                .ok_or_else(|| ModelError::UnknownType(type_name.clone()))?;
            let own: BTreeSet<&str> = entity.properties.iter().map(|p| p.name.as_str()).collect();
            for property in model.all_properties(type_name) {
                let Some(target) = &property.target else {
                    continue;
                };
                let inherited = !own.contains(property.name.as_str());
                if inherited && !options.extend_scope {
                    continue;
                }
                let relation = Relation {
                    name: Some(property.name.clone()),
                    kind: RelationKind::Property {
                        nullable: property.nullable,
                        many: property.many,
                        cascade: property.cascade,
                    },
                    qualified: inherited,
                    reversed: false,
                };
                this.add_named(type_name, target, relation)?;
            }
            if let Some(parent) = &entity.parent {
                let (start, end) = (this.require(type_name)?, this.require(parent)?);
                this.graph.add_edge(start, end, Relation::inheritance())?;
            }
        }

        this.roots = roots.iter().filter_map(|r| this.vertices.get(r).copied()).collect();
        debug!(
            types = this.graph.vertex_count(),
            relations = this.graph.edge_count(),
            "type graph built"
        );
        Ok(this)
    }

    fn require(&self, type_name: &str) -> Result<VertexId, ModelError> {
        self.vertices
            .get(type_name)
            .copied()
            .ok_or_else(|| ModelError::UnknownType(type_name.to_string()))
    }

    fn add_named(&mut self, owner: &str, target: &str, relation: Relation) -> Result<(), ModelError> {
        let (start, end) = (self.require(owner)?, self.require(target)?);
        let name = relation.name.clone();
        let edge = self.graph.add_edge(start, end, relation)?;
        if let Some(name) = name {
            self.by_name.entry(start).or_default().insert(name, edge);
        }
        Ok(())
    }

    #[must_use]
    pub const fn graph(&self) -> &Graph<TypeState, Relation> {
        &self.graph
    }

    #[must_use]
    pub fn vertex(&self, type_name: &str) -> Option<VertexId> {
        self.vertices.get(type_name).copied()
    }

    /// Current order id of a type.
    #[must_use]
    pub fn order_id(&self, type_name: &str) -> Option<usize> {
        self.vertex(type_name).and_then(|v| self.graph.id(v))
    }

    /// Type names in order-id order.
    #[must_use]
    pub fn type_order(&self) -> Vec<String> {
        self.graph
            .vertices_by_id()
            .into_iter()
            .filter_map(|v| self.graph.vertex(v).map(|s| s.type_name.clone()))
            .collect()
    }

    /// Named outgoing relationship of `type_name`, own or qualified.
    #[must_use]
    pub fn outgoing_by_name(&self, type_name: &str, property: &str) -> Option<EdgeId> {
        let vertex = self.vertex(type_name)?;
        self.by_name.get(&vertex).and_then(|m| m.get(property)).copied()
    }

    /// Domain-aware sort; concrete cycles are fatal.
    pub fn sort(&mut self) -> Result<TopoOrder, GraphError> {
        self.sort_with(CyclePolicy::Strict)
    }

    /// Domain-aware sort under `policy`.
    pub fn sort_with(&mut self, policy: CyclePolicy) -> Result<TopoOrder, GraphError> {
        domain_sort(&mut self.graph, policy)
    }

    /// Every simple cycle among the types, graph restored afterwards.
    pub fn circuits(&mut self) -> Result<Vec<Circuit>, GraphError> {
        self.graph.circuits()
    }

    /// Whether `path` (dot-separated property names) can be walked from the
    /// first root type. Inherited properties are found by climbing to the
    /// parent type.
    pub fn has_path(&self, path: &str) -> Result<bool, ModelError> {
        let segments = split_path(path)?;
        let Some(&root) = self.roots.first() else {
            return Ok(false);
        };
        let mut current = root;
        for segment in segments {
            match self.step(current, segment) {
                Some(next) => current = next,
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn step(&self, from: VertexId, property: &str) -> Option<VertexId> {
        let mut seen = BTreeSet::new();
        let mut current = Some(from);
        while let Some(vertex) = current {
            if !seen.insert(vertex) {
                return None;
            }
            if let Some(edge) = self.by_name.get(&vertex).and_then(|m| m.get(property)) {
                return self.graph.endpoints(*edge).map(|pair| pair.end);
            }
            current = self.graph.out_edges(vertex).find_map(|edge| {
                let payload = self.graph.edge(edge)?;
                if payload.kind == RelationKind::Inheritance {
                    self.graph.endpoints(edge).map(|pair| pair.end)
                } else {
                    None
                }
            });
        }
        None
    }
}

/// Split a dot-separated property path, rejecting empty segments.
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>, ModelError> {
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ModelError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Depth-first discovery from `roots` over targets, parents and subtypes.
fn discover(model: &dyn TypeModel, roots: &[String]) -> Result<Vec<String>, ModelError> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut order = Vec::new();
    let mut stack: Vec<String> = roots.iter().rev().cloned().collect();
    while let Some(type_name) = stack.pop() {
        if seen.contains(&type_name) {
            continue;
        }
        let entity = model
            .entity(&type_name)
            .ok_or_else(|| ModelError::UnknownType(type_name.clone()))?;
        seen.insert(type_name.clone());
        order.push(type_name.clone());

        let mut next: Vec<String> = entity
            .properties
            .iter()
            .filter_map(|p| p.target.clone())
            .collect();
        next.extend(entity.parent.clone());
        next.extend(model.subtypes(&type_name));
        stack.extend(next.into_iter().rev().filter(|t| !seen.contains(t)));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{EntityType, Property, Schema};

    fn shop() -> Schema {
        Schema::new([
            EntityType::new("Customer")
                .with(Property::scalar("email").identity())
                .with(Property::collection("orders", "Order").cascade())
                .with(Property::reference("lastOrder", "Order")),
            EntityType::new("Order")
                .with(Property::reference("customer", "Customer").required())
                .with(Property::collection("lines", "Line").cascade()),
            EntityType::new("Line")
                .with(Property::reference("order", "Order").required())
                .with(Property::reference("product", "Product").required()),
            EntityType::new("Product").with(Property::scalar("sku")),
        ])
        .expect("schema")
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|t| t == name).expect("type in order")
    }

    #[test]
    fn reachable_types_are_discovered() {
        let graph = TypeGraph::build(&shop(), "Line", TypeGraphOptions::default()).expect("build");
        assert_eq!(graph.graph().vertex_count(), 4);
        assert!(graph.outgoing_by_name("Order", "lines").is_some());
        assert!(graph.outgoing_by_name("Order", "missing").is_none());
    }

    #[test]
    fn sorted_order_puts_referencing_types_first() {
        let mut graph = TypeGraph::build(&shop(), "Customer", TypeGraphOptions::default()).expect("build");
        let before = graph.graph().fingerprint();
        graph.sort().expect("sort");
        let order = graph.type_order();

        // Deletion-safe: Line before Order before Customer; Line before Product.
        assert!(position(&order, "Line") < position(&order, "Order"));
        assert!(position(&order, "Order") < position(&order, "Customer"));
        assert!(position(&order, "Line") < position(&order, "Product"));
        assert_eq!(graph.graph().fingerprint(), before);
    }

    #[test]
    fn required_cycle_between_concrete_types_is_fatal() {
        let schema = Schema::new([
            EntityType::new("Order").with(Property::reference("customer", "Customer").required()),
            EntityType::new("Customer").with(Property::reference("lastOrder", "Order").required()),
        ])
        .expect("schema");
        let mut graph = TypeGraph::build(&schema, "Order", TypeGraphOptions::default()).expect("build");
        let err = graph.sort().expect_err("cycle");
        let GraphError::Cycle(trace) = err else {
            panic!("expected cycle");
        };
        assert!(trace.mentions("Order"));
        assert!(trace.mentions("Customer"));
    }

    #[test]
    fn required_cycle_between_abstract_types_is_tolerated() {
        let schema = Schema::new([
            EntityType::new("Shape")
                .into_abstract()
                .with(Property::reference("group", "Group").required()),
            EntityType::new("Group")
                .into_abstract()
                .with(Property::reference("anchor", "Shape").required()),
        ])
        .expect("schema");
        let mut graph = TypeGraph::build(&schema, "Shape", TypeGraphOptions::default()).expect("build");
        let sorted = graph.sort().expect("abstract cycle is benign");
        assert_eq!(sorted.order.len(), 2);
        assert_eq!(sorted.abandoned, 1);
    }

    #[test]
    fn inheritance_orders_supertypes_first() {
        let schema = Schema::new([
            EntityType::new("Party").into_abstract().with(Property::scalar("name")),
            EntityType::new("Person").extends("Party"),
            EntityType::new("Company").extends("Party"),
        ])
        .expect("schema");
        let mut graph = TypeGraph::build(&schema, "Person", TypeGraphOptions::default()).expect("build");
        graph.sort().expect("sort");
        let order = graph.type_order();
        assert_eq!(order.len(), 3, "subtypes of the parent are discovered too");
        assert!(position(&order, "Party") < position(&order, "Person"));
        assert!(position(&order, "Party") < position(&order, "Company"));
    }

    #[test]
    fn scope_extension_adds_qualified_edges() {
        let schema = Schema::new([
            EntityType::new("Party")
                .into_abstract()
                .with(Property::reference("address", "Address")),
            EntityType::new("Person").extends("Party").with(Property::scalar("born")),
            EntityType::new("Address").with(Property::scalar("street")),
        ])
        .expect("schema");

        let plain = TypeGraph::build(&schema, "Person", TypeGraphOptions::default()).expect("build");
        assert!(plain.outgoing_by_name("Person", "address").is_none());

        let extended =
            TypeGraph::build(&schema, "Person", TypeGraphOptions { extend_scope: true }).expect("build");
        let edge = extended.outgoing_by_name("Person", "address").expect("qualified edge");
        assert!(extended.graph().edge(edge).is_some_and(Edge::is_qualified));
        let person = extended.vertex("Person").and_then(|v| extended.graph().vertex(v)).expect("person");
        assert!(person.scope.contains("address"));
        assert!(person.scope.contains("born"));
    }

    #[test]
    fn has_path_walks_properties_and_climbs_parents() {
        let schema = Schema::new([
            EntityType::new("Party")
                .into_abstract()
                .with(Property::reference("address", "Address")),
            EntityType::new("Person").extends("Party"),
            EntityType::new("Address").with(Property::reference("country", "Country")),
            EntityType::new("Country").with(Property::scalar("code")),
        ])
        .expect("schema");
        let graph = TypeGraph::build(&schema, "Person", TypeGraphOptions::default()).expect("build");
        assert!(graph.has_path("address.country").expect("path"));
        assert!(!graph.has_path("address.planet").expect("path"));
        assert!(matches!(graph.has_path("address..country"), Err(ModelError::InvalidPath(_))));
    }

    #[test]
    fn circuits_enumerate_type_cycles() {
        let mut graph = TypeGraph::build(&shop(), "Customer", TypeGraphOptions::default()).expect("build");
        let circuits = graph.circuits().expect("circuits");
        // Customer<->Order twice (orders/customer, lastOrder/customer) and Order<->Line.
        assert_eq!(circuits.len(), 3);
    }
}
