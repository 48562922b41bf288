//! In-memory object aggregates.
//!
//! An [`Aggregate`] is an arena of [`Instance`] values addressed by
//! [`ObjectId`]. References between members are ids, never pointers, so
//! cyclic aggregates need no shared ownership.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ModelError;
use crate::meta::TypeModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(usize);

impl ObjectId {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value held by one field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Scalar(String),
    Ref(ObjectId),
    List(Vec<ObjectId>),
}

impl FieldValue {
    /// Member ids this value points at.
    #[must_use]
    pub fn targets(&self) -> Vec<ObjectId> {
        match self {
            Self::Ref(id) => vec![*id],
            Self::List(ids) => ids.clone(),
            Self::Null | Self::Scalar(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub type_name: String,
    pub fields: BTreeMap<String, FieldValue>,
    /// Set on reference stubs: the member this stub stands in for.
    pub stub_of: Option<ObjectId>,
}

impl Instance {
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
            stub_of: None,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> &FieldValue {
        const NULL: &FieldValue = &FieldValue::Null;
        self.fields.get(name).unwrap_or(NULL)
    }

    #[must_use]
    pub const fn is_stub(&self) -> bool {
        self.stub_of.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    objects: Vec<Instance>,
}

impl Aggregate {
    #[must_use]
    pub const fn new() -> Self {
        Self { objects: Vec::new() }
    }

    pub fn insert(&mut self, instance: Instance) -> ObjectId {
        self.objects.push(instance);
        ObjectId(self.objects.len() - 1)
    }

    pub fn create(&mut self, type_name: impl Into<String>) -> ObjectId {
        self.insert(Instance::new(type_name))
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&Instance> {
        self.objects.get(id.0)
    }

    pub fn try_get(&self, id: ObjectId) -> Result<&Instance, ModelError> {
        self.get(id).ok_or(ModelError::UnknownObject(id))
    }

    pub fn set(&mut self, id: ObjectId, field: impl Into<String>, value: FieldValue) -> Result<(), ModelError> {
        let instance = self.objects.get_mut(id.0).ok_or(ModelError::UnknownObject(id))?;
        instance.fields.insert(field.into(), value);
        Ok(())
    }

    /// Append `item` to a list field, creating the list if needed.
    pub fn push(&mut self, id: ObjectId, field: &str, item: ObjectId) -> Result<(), ModelError> {
        let instance = self.objects.get_mut(id.0).ok_or(ModelError::UnknownObject(id))?;
        match instance.fields.entry(field.to_string()).or_insert_with(|| FieldValue::List(Vec::new())) {
            FieldValue::List(items) => items.push(item),
            other => *other = FieldValue::List(vec![item]),
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> {
        (0..self.objects.len()).map(ObjectId)
    }

    /// Members that hold `id` through a cascade property, with the property
    /// name, in id order.
    #[must_use]
    pub fn containers(&self, model: &dyn TypeModel, id: ObjectId) -> Vec<(ObjectId, String)> {
        let mut out = Vec::new();
        for (index, instance) in self.objects.iter().enumerate() {
            for (field, value) in &instance.fields {
                let cascades = model
                    .property(&instance.type_name, field)
                    .is_some_and(|p| p.cascade);
                if cascades && value.targets().contains(&id) {
                    out.push((ObjectId(index), field.clone()));
                }
            }
        }
        out
    }

    /// Add a reference stub for `target`: same type, identity fields only.
    pub fn stub(&mut self, model: &dyn TypeModel, target: ObjectId) -> Result<ObjectId, ModelError> {
        let original = self.try_get(target)?;
        let mut stub = Instance::new(original.type_name.clone());
        for (field, value) in &original.fields {
            if model
                .property(&original.type_name, field)
                .is_some_and(|p| p.identity)
            {
                stub.fields.insert(field.clone(), value.clone());
            }
        }
        stub.stub_of = Some(target);
        Ok(self.insert(stub))
    }
}
