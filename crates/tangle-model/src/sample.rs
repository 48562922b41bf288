//! Sample aggregate generation.
//!
//! Walks the type model from a root type and creates one object per visited
//! type, filling scalars with deterministic values and relationships with
//! freshly generated members. The walk carries an explicit
//! [`TraversalContext`]; the relationship name a member is being created
//! under is pushed for the duration of that sub-walk by a
//! [`RelationshipGuard`] and popped when the guard drops.

use std::ops::{Deref, DerefMut};

use tracing::{debug, instrument};

use crate::error::ModelError;
use crate::meta::TypeModel;
use crate::object::{Aggregate, FieldValue, Instance, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOptions {
    /// Elements generated per list field.
    pub collection_size: usize,
    /// Relationship depth below the root; deeper references stay null.
    pub max_depth: usize,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            collection_size: 2,
            max_depth: 3,
        }
    }
}

/// Mutable state threaded through one generation run.
#[derive(Debug, Default)]
pub struct TraversalContext {
    pub aggregate: Aggregate,
    pub sequence: u64,
    pub depth: usize,
    pub relationship: Option<String>,
}

impl TraversalContext {
    /// Enter a relationship: bumps the depth and overrides the relationship
    /// name until the returned guard drops.
    pub fn enter(&mut self, relationship: &str) -> RelationshipGuard<'_> {
        let previous = self.relationship.replace(relationship.to_string());
        self.depth += 1;
        RelationshipGuard { ctx: self, previous }
    }

    const fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

/// Restores the previous relationship name and depth on drop.
pub struct RelationshipGuard<'a> {
    ctx: &'a mut TraversalContext,
    previous: Option<String>,
}

impl Deref for RelationshipGuard<'_> {
    type Target = TraversalContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for RelationshipGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for RelationshipGuard<'_> {
    fn drop(&mut self) {
        self.ctx.relationship = self.previous.take();
        self.ctx.depth -= 1;
    }
}

/// Generate a sample aggregate rooted at an instance of `root_type`.
#[instrument(skip(model))]
pub fn generate(
    model: &dyn TypeModel,
    root_type: &str,
    options: SampleOptions,
) -> Result<(Aggregate, ObjectId), ModelError> {
    let mut ctx = TraversalContext::default();
    let root = generate_object(model, &mut ctx, root_type, &options)?;
    debug!(objects = ctx.aggregate.len(), "sample generated");
    Ok((ctx.aggregate, root))
}

fn generate_object(
    model: &dyn TypeModel,
    ctx: &mut TraversalContext,
    type_name: &str,
    options: &SampleOptions,
) -> Result<ObjectId, ModelError> {
    let concrete = concrete_type(model, type_name)?;
    let id = ctx.aggregate.insert(Instance::new(concrete.clone()));
    let properties: Vec<_> = model.all_properties(&concrete).into_iter().cloned().collect();

    for property in properties {
        let value = match &property.target {
            None => {
                let seq = ctx.next_sequence();
                let prefix = ctx.relationship.as_deref().unwrap_or(&concrete);
                FieldValue::Scalar(format!("{prefix}.{}-{seq}", property.name))
            }
            Some(_) if ctx.depth >= options.max_depth => FieldValue::Null,
            Some(target) if property.many => {
                let mut guard = ctx.enter(&property.name);
                let items = (0..options.collection_size)
                    .map(|_| generate_object(model, &mut guard, target, options))
                    .collect::<Result<Vec<_>, _>>()?;
                FieldValue::List(items)
            }
            Some(target) => {
                let mut guard = ctx.enter(&property.name);
                FieldValue::Ref(generate_object(model, &mut guard, target, options)?)
            }
        };
        ctx.aggregate.set(id, property.name.clone(), value)?;
    }
    Ok(id)
}

/// `type_name` itself, or its first concrete descendant if it is abstract.
fn concrete_type(model: &dyn TypeModel, type_name: &str) -> Result<String, ModelError> {
    if model.entity(type_name).is_none() {
        return Err(ModelError::UnknownType(type_name.to_string()));
    }
    let mut stack = vec![type_name.to_string()];
    while let Some(candidate) = stack.pop() {
        if !model.is_abstract(&candidate) {
            return Ok(candidate);
        }
        stack.extend(model.subtypes(&candidate).into_iter().rev());
    }
    Err(ModelError::Invalid(format!("abstract type `{type_name}` has no concrete subtype")))
}
