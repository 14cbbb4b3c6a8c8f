//! Registry of entity types
//!
//! Registration is two-phase:
//!
//! 1. `RegistryBuilder::register` collects schemas in any order; a
//!    reference may name a type that is registered later.
//! 2. `build` binds every reference and collection target to its schema.
//!    A target that was never registered is a startup error, as is a name
//!    that would collide with the key layout.
//!
//! ```
//! use tessera_model::{RegistryBuilder, Schema};
//!
//! let registry = RegistryBuilder::new()
//!     .register_schema(Schema::new("Post").reference("author", "User"))
//!     .register_schema(Schema::new("User").unique("email"))
//!     .build()
//!     .unwrap();
//! assert_eq!(registry.target("Post", "author").unwrap().name(), "User");
//! ```

use rustc_hash::FxHashMap;
use std::sync::Arc;
use tessera_core::{Error, Result, RESERVED_SEGMENTS, SEPARATOR};

use crate::model::Model;
use crate::schema::Schema;

/// Collects schemas before resolution
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    pending: Vec<Schema>,
    errors: Vec<Error>,
}

impl RegistryBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model type
    pub fn register<M: Model>(self) -> Self {
        let schema = M::schema();
        if schema.name() != M::NAME {
            let mut builder = self;
            builder.errors.push(Error::invalid_input(format!(
                "schema name '{}' does not match model name '{}'",
                schema.name(),
                M::NAME
            )));
            return builder;
        }
        self.register_schema(schema)
    }

    /// Register a bare schema
    pub fn register_schema(mut self, schema: Schema) -> Self {
        self.pending.push(schema);
        self
    }

    /// Resolve every reference and collection target
    pub fn build(self) -> Result<Registry> {
        if let Some(e) = self.errors.into_iter().next() {
            return Err(e);
        }

        let mut types: FxHashMap<String, Arc<Schema>> = FxHashMap::default();
        for schema in self.pending {
            check_names(&schema)?;
            let name = schema.name().to_string();
            if types.insert(name.clone(), Arc::new(schema)).is_some() {
                return Err(Error::invalid_input(format!(
                    "type '{}' registered twice",
                    name
                )));
            }
        }

        let mut targets = FxHashMap::default();
        for schema in types.values() {
            let members = schema
                .references()
                .iter()
                .map(|r| (&r.name, &r.target))
                .chain(schema.collections().iter().map(|c| (&c.name, &c.target)));
            for (member, target) in members {
                let bound = types
                    .get(target)
                    .ok_or_else(|| Error::UnresolvedReference {
                        type_name: schema.name().to_string(),
                        attribute: member.clone(),
                        target: target.clone(),
                    })?;
                targets.insert(
                    (schema.name().to_string(), member.clone()),
                    Arc::clone(bound),
                );
            }
        }

        Ok(Registry { types, targets })
    }
}

// Type and collection names become key segments
fn check_names(schema: &Schema) -> Result<()> {
    if schema.name().is_empty() || schema.name().contains(SEPARATOR) {
        return Err(Error::invalid_input(format!(
            "type name '{}' must be non-empty and free of '{}'",
            schema.name(),
            SEPARATOR
        )));
    }
    for collection in schema.collections() {
        let name = collection.name.as_str();
        if name.is_empty() || name.contains(SEPARATOR) {
            return Err(Error::invalid_input(format!(
                "{} collection '{}' must be non-empty and free of '{}'",
                schema.name(),
                name,
                SEPARATOR
            )));
        }
        if RESERVED_SEGMENTS.contains(&name) {
            return Err(Error::invalid_input(format!(
                "{} collection '{}' clashes with a reserved key",
                schema.name(),
                name
            )));
        }
    }
    Ok(())
}

/// Resolved set of entity types
#[derive(Debug, Clone)]
pub struct Registry {
    types: FxHashMap<String, Arc<Schema>>,
    targets: FxHashMap<(String, String), Arc<Schema>>,
}

impl Registry {
    /// Start registering types
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Schema of a registered type
    pub fn schema(&self, type_name: &str) -> Result<&Arc<Schema>> {
        self.types.get(type_name).ok_or_else(|| Error::UnknownType {
            type_name: type_name.to_string(),
        })
    }

    /// Schema a reference or collection of `type_name` points at
    pub fn target(&self, type_name: &str, member: &str) -> Result<&Arc<Schema>> {
        self.targets
            .get(&(type_name.to_string(), member.to_string()))
            .ok_or_else(|| {
                Error::invalid_input(format!(
                    "{} has no reference or collection '{}'",
                    type_name, member
                ))
            })
    }

    /// Every registered schema
    pub fn schemas(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.types.values()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
