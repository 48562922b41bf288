//! Entity type metadata.
//!
//! [`TypeModel`] is the narrow interface the graph layers read from: property
//! lookup (with inheritance), nullability, cardinality, cascade flags,
//! abstract flags, parent/subtype navigation and natural keys. [`Schema`] is
//! the in-memory implementation, loaded from TOML:
//!
//! ```toml
//! [types.Customer]
//! natural_key = ["email"]
//! properties = [
//!   { name = "email", identity = true },
//!   { name = "orders", target = "Order", many = true, cascade = true },
//! ]
//!
//! [types.Order]
//! properties = [{ name = "customer", target = "Customer", nullable = false }]
//! ```

#![allow(clippy::module_name_repetitions)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// To-one or to-many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    One,
    Many,
}

/// One attribute of an entity type. A property with a `target` is a
/// relationship; without one it is a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub cascade: bool,
    /// Copied into reference stubs.
    #[serde(default)]
    pub identity: bool,
}

const fn default_true() -> bool {
    true
}

impl Property {
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            nullable: true,
            many: false,
            cascade: false,
            identity: false,
        }
    }

    #[must_use]
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::scalar(name)
        }
    }

    #[must_use]
    pub fn collection(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            many: true,
            ..Self::reference(name, target)
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub const fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    #[must_use]
    pub const fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    #[must_use]
    pub const fn cardinality(&self) -> Cardinality {
        if self.many { Cardinality::Many } else { Cardinality::One }
    }

    #[must_use]
    pub const fn is_relationship(&self) -> bool {
        self.target.is_some()
    }
}

/// An entity type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityType {
    /// Filled from the table key when loaded from TOML.
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Embedded types have no identity of their own and persist with their
    /// container.
    #[serde(default)]
    pub embedded: bool,
    #[serde(default)]
    pub natural_key: Vec<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl EntityType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn into_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub const fn into_embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    #[must_use]
    pub fn key(mut self, columns: &[&str]) -> Self {
        self.natural_key = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn own_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

// ---------------------------------------------------------------------------
// TypeModel
// ---------------------------------------------------------------------------

/// Read-only type metadata.
pub trait TypeModel {
    fn entity(&self, name: &str) -> Option<&EntityType>;

    /// Every type name, in a stable order.
    fn type_names(&self) -> Vec<String>;

    /// Direct subtypes of `name`, in a stable order.
    fn subtypes(&self, name: &str) -> Vec<String> {
        self.type_names()
            .into_iter()
            .filter(|t| self.parent(t) == Some(name))
            .collect()
    }

    fn parent(&self, name: &str) -> Option<&str> {
        self.entity(name).and_then(|e| e.parent.as_deref())
    }

    fn is_abstract(&self, name: &str) -> bool {
        self.entity(name).is_some_and(|e| e.is_abstract)
    }

    fn is_embedded(&self, name: &str) -> bool {
        self.entity(name).is_some_and(|e| e.embedded)
    }

    /// `name` followed by its ancestors, nearest first.
    fn ancestry(&self, name: &str) -> Vec<&EntityType> {
        let mut chain: Vec<&EntityType> = Vec::new();
        let mut current = self.entity(name);
        while let Some(entity) = current {
            if chain.iter().any(|seen| seen.name == entity.name) {
                break;
            }
            chain.push(entity);
            current = entity.parent.as_deref().and_then(|p| self.entity(p));
        }
        chain
    }

    /// Property lookup including inherited properties; the nearest
    /// declaration wins.
    fn property(&self, type_name: &str, property: &str) -> Option<&Property> {
        self.ancestry(type_name)
            .into_iter()
            .find_map(|entity| entity.own_property(property))
    }

    /// All properties visible on `type_name`: own first, then inherited ones
    /// not shadowed by a nearer declaration.
    fn all_properties(&self, type_name: &str) -> Vec<&Property> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut out = Vec::new();
        for entity in self.ancestry(type_name) {
            for property in &entity.properties {
                if seen.insert(property.name.as_str()) {
                    out.push(property);
                }
            }
        }
        out
    }

    /// Nearest non-empty natural key declaration.
    fn natural_key(&self, type_name: &str) -> Vec<String> {
        self.ancestry(type_name)
            .into_iter()
            .find(|entity| !entity.natural_key.is_empty())
            .map(|entity| entity.natural_key.clone())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    types: BTreeMap<String, EntityType>,
}

/// Validated in-memory type model.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<String, EntityType>,
    children: BTreeMap<String, Vec<String>>,
}

impl Schema {
    /// Build and validate a schema.
    pub fn new(types: impl IntoIterator<Item = EntityType>) -> Result<Self, ModelError> {
        let mut map = BTreeMap::new();
        for entity in types {
            if entity.name.is_empty() {
                return Err(ModelError::Invalid("type with an empty name".into()));
            }
            if map.contains_key(&entity.name) {
                return Err(ModelError::Invalid(format!("type `{}` declared twice", entity.name)));
            }
            map.insert(entity.name.clone(), entity);
        }

        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entity in map.values() {
            if let Some(parent) = &entity.parent {
                children.entry(parent.clone()).or_default().push(entity.name.clone());
            }
        }

        let schema = Self { types: map, children };
        schema.validate()?;
        Ok(schema)
    }

    /// Parse a TOML model document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ModelError> {
        let file: SchemaFile = toml::from_str(raw).map_err(|e| ModelError::Invalid(e.to_string()))?;
        Self::new(file.types.into_iter().map(|(name, mut entity)| {
            entity.name = name;
            entity
        }))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn validate(&self) -> Result<(), ModelError> {
        for entity in self.types.values() {
            if let Some(parent) = &entity.parent {
                if !self.types.contains_key(parent) {
                    return Err(ModelError::Invalid(format!(
                        "type `{}` extends unknown type `{parent}`",
                        entity.name
                    )));
                }
            }

            let mut names = BTreeSet::new();
            for property in &entity.properties {
                if !names.insert(property.name.as_str()) {
                    return Err(ModelError::Invalid(format!(
                        "type `{}` declares `{}` twice",
                        entity.name, property.name
                    )));
                }
                match &property.target {
                    Some(target) if !self.types.contains_key(target) => {
                        return Err(ModelError::Invalid(format!(
                            "`{}.{}` targets unknown type `{target}`",
                            entity.name, property.name
                        )));
                    }
                    None if property.many || property.cascade => {
                        return Err(ModelError::Invalid(format!(
                            "scalar `{}.{}` cannot be many or cascade",
                            entity.name, property.name
                        )));
                    }
                    _ => {}
                }
            }
        }

        // Parent chains must terminate.
        for name in self.types.keys() {
            let mut seen = BTreeSet::from([name.as_str()]);
            let mut current = self.types.get(name).and_then(|e| e.parent.as_deref());
            while let Some(parent) = current {
                if !seen.insert(parent) {
                    return Err(ModelError::Invalid(format!("inheritance cycle through `{name}`")));
                }
                current = self.types.get(parent).and_then(|e| e.parent.as_deref());
            }
        }

        for entity in self.types.values() {
            for key in &entity.natural_key {
                if self.property(&entity.name, key).is_none() {
                    return Err(ModelError::UnknownProperty {
                        owner: entity.name.clone(),
                        property: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl TypeModel for Schema {
    fn entity(&self, name: &str) -> Option<&EntityType> {
        self.types.get(name)
    }

    fn type_names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    fn subtypes(&self, name: &str) -> Vec<String> {
        self.children.get(name).cloned().unwrap_or_default()
    }
}

/// Load a model file.
pub fn load_schema(path: &Path) -> Result<Schema> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Schema::from_toml_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
