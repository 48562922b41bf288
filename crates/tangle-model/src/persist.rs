//! Save/delete ordering for object aggregates.
//!
//! # Overview
//!
//! 1. Each member climbs its container chain (cascade containers and
//!    embedded types) to the nearest independently persisted ancestor; the
//!    ancestors found this way are the *roots*, de-duplicated.
//! 2. The object graph over those roots is swizzled and sorted with the
//!    domain policy; the type graph is sorted the same way. Cycles that
//!    swizzling could not break are skipped by both sorts and reported in
//!    the plan.
//! 3. Roots are ranked by `(object order id, type order id)`. That ranking is
//!    deletion order; creation runs in reverse.
//!
//! Roots are handed one at a time to a [`Persister`].

use std::collections::BTreeSet;

use tangle_graph::{CyclePolicy, CycleTrace};
use tracing::{info, instrument, warn};

use crate::error::ModelError;
use crate::meta::TypeModel;
use crate::object::{Aggregate, ObjectId};
use crate::object_graph::{ObjectGraph, SwizzleReport};
use crate::type_graph::{TypeGraph, TypeGraphOptions};

/// Persistence collaborator.
pub trait Persister {
    fn save(&mut self, aggregate: &Aggregate, object: ObjectId) -> anyhow::Result<()>;
    fn delete(&mut self, aggregate: &Aggregate, object: ObjectId) -> anyhow::Result<()>;
}

/// Ordered roots of an aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistPlan {
    /// Save order.
    pub creation: Vec<ObjectId>,
    pub swizzle: SwizzleReport,
    /// Cycle edges the object and type sorts skipped.
    pub skipped: Vec<CycleTrace>,
}

impl PersistPlan {
    /// Delete order: the reverse of [`PersistPlan::creation`].
    #[must_use]
    pub fn deletion(&self) -> Vec<ObjectId> {
        self.creation.iter().rev().copied().collect()
    }
}

/// Roots of `members`, de-duplicated, in first-seen order.
pub fn discover_roots(
    model: &dyn TypeModel,
    aggregate: &Aggregate,
    members: &[ObjectId],
) -> Result<Vec<ObjectId>, ModelError> {
    let mut roots = Vec::new();
    let mut seen_roots = BTreeSet::new();
    for &member in members {
        let mut current = member;
        let mut chain = BTreeSet::from([current]);
        loop {
            let instance = aggregate.try_get(current)?;
            let contained = aggregate.containers(model, current);
            let must_climb = !contained.is_empty() || model.is_embedded(&instance.type_name);
            let Some((container, _)) = contained.first().filter(|_| must_climb) else {
                break;
            };
            if !chain.insert(*container) {
                break;
            }
            current = *container;
        }
        if seen_roots.insert(current) {
            roots.push(current);
        }
    }
    Ok(roots)
}

/// Swizzle and order the roots of `members`.
#[instrument(skip_all, fields(members = members.len()))]
pub fn plan(
    model: &dyn TypeModel,
    aggregate: &mut Aggregate,
    members: &[ObjectId],
) -> Result<PersistPlan, ModelError> {
    let roots = discover_roots(model, aggregate, members)?;

    let mut objects = ObjectGraph::build(model, aggregate, &roots)?;
    let swizzle = objects.swizzle(model, aggregate)?;
    let mut skipped = objects.sort()?.skipped;

    let root_types: Vec<String> = roots
        .iter()
        .map(|&r| aggregate.try_get(r).map(|i| i.type_name.clone()))
        .collect::<Result<BTreeSet<_>, _>>()?
        .into_iter()
        .collect();
    let mut types = TypeGraph::build_many(model, &root_types, TypeGraphOptions::default())?;
    skipped.extend(types.sort_with(CyclePolicy::Tolerant)?.skipped);
    if !swizzle.is_clean() {
        warn!(unresolved = swizzle.unresolved.len(), "ordering aggregate with unresolved cycles");
    }

    let mut ranked: Vec<(Option<usize>, Option<usize>, ObjectId)> = roots
        .iter()
        .map(|&root| {
            let type_id = aggregate.get(root).and_then(|i| types.order_id(&i.type_name));
            (objects.order_id(root), type_id, root)
        })
        .collect();
    ranked.sort_by_key(|&(object_id, type_id, root)| {
        (object_id.is_none(), object_id, type_id, root)
    });

    let creation: Vec<ObjectId> = ranked.into_iter().rev().map(|(_, _, root)| root).collect();
    info!(
        roots = creation.len(),
        swizzled = swizzle.swizzled.len(),
        skipped = skipped.len(),
        "persist plan ready"
    );
    Ok(PersistPlan {
        creation,
        swizzle,
        skipped,
    })
}

/// Save every root of `members` in creation order.
pub fn persist_all(
    model: &dyn TypeModel,
    aggregate: &mut Aggregate,
    members: &[ObjectId],
    persister: &mut dyn Persister,
) -> Result<PersistPlan, ModelError> {
    let plan = plan(model, aggregate, members)?;
    for &object in &plan.creation {
        persister
            .save(aggregate, object)
            .map_err(|e| ModelError::persist("save", object, e))?;
    }
    Ok(plan)
}

/// Delete every root of `members` in deletion order.
pub fn delete_all(
    model: &dyn TypeModel,
    aggregate: &mut Aggregate,
    members: &[ObjectId],
    persister: &mut dyn Persister,
) -> Result<PersistPlan, ModelError> {
    let plan = plan(model, aggregate, members)?;
    for object in plan.deletion() {
        persister
            .delete(aggregate, object)
            .map_err(|e| ModelError::persist("delete", object, e))?;
    }
    Ok(plan)
}
