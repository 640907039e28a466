//! Class name to schema resolution.
//!
//! The registry is built once, before a client issues requests, and is read-only
//! afterwards. Pointers read from the wire and untyped queries resolve their class
//! through it.

use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

use crate::{
    error::{DocumentError, DocumentResult},
    schema::{Resource, Schema},
    types::native_class_name,
    user::User,
};

#[derive(Debug, Clone)]
pub struct Registry {
    schemas: BTreeMap<String, Arc<Schema>>,
    strict: bool,
}

impl Registry {
    /// Creates a registry holding the built-in [`User`] resource.
    ///
    /// In `strict` mode, classes that were never registered fail to resolve instead
    /// of falling back to an untyped schema.
    pub fn new(strict: bool) -> DocumentResult<Self> {
        let mut registry = Self { schemas: BTreeMap::new(), strict };
        registry.register::<User>()?;
        Ok(registry)
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Registers a statically declared resource.
    pub fn register<R: Resource>(&mut self) -> DocumentResult<Arc<Schema>> {
        self.register_schema(R::schema()?)
    }

    /// Registers a schema, replacing any schema of the same class name.
    ///
    /// Join classes of the schema's many-to-many attributes are registered as untyped
    /// schemas unless a schema for them already exists.
    pub fn register_schema(&mut self, schema: Schema) -> DocumentResult<Arc<Schema>> {
        for join_class in schema.join_classes() {
            if !self.schemas.contains_key(&join_class) {
                let join = Arc::new(Schema::untyped(&join_class)?);
                debug!(class = %join_class, owner = %schema.class_name(), "registered join class");
                self.schemas.insert(join_class, join);
            }
        }

        let schema = Arc::new(schema);
        debug!(class = %schema.class_name(), "registered resource class");
        self.schemas.insert(schema.class_name().to_string(), schema.clone());

        Ok(schema)
    }

    /// Returns the registered schema of a class, if any.
    pub fn get(&self, class_name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(native_class_name(class_name)).cloned()
    }

    /// Resolves a class name, as written in memory or on the wire, to its schema.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnknownResourceType`] if the name is malformed, or if
    /// it is unregistered and the registry is strict.
    pub fn resolve(&self, class_name: &str) -> DocumentResult<Arc<Schema>> {
        if let Some(schema) = self.get(class_name) {
            return Ok(schema);
        }

        if self.strict {
            return Err(DocumentError::UnknownResourceType(class_name.to_string()));
        }

        Ok(Arc::new(Schema::untyped(class_name)?))
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
