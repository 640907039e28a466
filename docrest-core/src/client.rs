//! The client: a transport, a registry of resource classes and a configuration.
//!
//! Every remote operation in this crate takes a [`Client`]. It is the only place
//! where wire payloads become [`Object`]s, including the pointer resolution that
//! fetches referenced resources.
//!
//! # Example
//!
//! ```ignore
//! use docrest_core::client::Client;
//!
//! let client = Client::builder(transport)
//!     .register::<GameScore>()
//!     .build()?;
//!
//! let best = client.query::<GameScore>()?.all().order_by("score", true).nth(0).await?;
//! ```

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, info};

use crate::{
    batch::Batcher,
    config::ClientConfig,
    error::DocumentResult,
    function::Function,
    marshal::Marshaller,
    object::Object,
    query::QueryManager,
    registry::Registry,
    schema::{Resource, Schema},
    transport::{QueryParams, Transport},
    types::JsonMap,
    value::Value,
};

#[derive(Debug)]
pub struct Client {
    transport: Box<dyn Transport>,
    registry: Registry,
    config: ClientConfig,
}

impl Client {
    pub fn builder(transport: impl Transport + 'static) -> ClientBuilder {
        ClientBuilder::new(transport)
    }

    pub fn transport(&self) -> &dyn Transport {
        &*self.transport
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The schema of a resource class, resolved through the registry.
    pub fn schema<R: Resource>(&self) -> DocumentResult<Arc<Schema>> {
        self.registry.resolve(R::class_name())
    }

    /// A new unsaved instance of a resource class, holding its defaults.
    pub fn create<R: Resource>(&self) -> DocumentResult<Object> {
        Object::new(self.schema::<R>()?)
    }

    /// The query manager of a resource class.
    pub fn query<R: Resource>(&self) -> DocumentResult<QueryManager<'_>> {
        Ok(QueryManager::new(self, self.schema::<R>()?))
    }

    /// The query manager of a class known only by name.
    pub fn query_class(&self, class_name: &str) -> DocumentResult<QueryManager<'_>> {
        Ok(QueryManager::new(self, self.registry.resolve(class_name)?))
    }

    pub fn batcher(&self) -> Batcher<'_> {
        Batcher::new(self)
    }

    /// Fetches a stored resource by id.
    pub async fn retrieve(&self, schema: &Arc<Schema>, object_id: &str) -> DocumentResult<Object> {
        self.retrieve_at(schema.clone(), object_id.to_string(), self.config.pointer_depth)
            .await
    }

    fn retrieve_at(&self, schema: Arc<Schema>, object_id: String, depth: usize) -> BoxFuture<'_, DocumentResult<Object>> {
        async move {
            let path = schema.instance_path(&object_id);
            debug!(class = %schema.class_name(), %path, depth, "retrieving");

            let fields = self.transport.get(&path, &QueryParams::new()).await?;
            self.populate_at(&schema, fields, depth).await
        }
        .boxed()
    }

    /// Builds an instance from a wire payload, resolving its pointers up to the
    /// configured depth.
    pub async fn populate(&self, schema: &Arc<Schema>, fields: JsonMap) -> DocumentResult<Object> {
        self.populate_at(schema, fields, self.config.pointer_depth).await
    }

    pub(crate) async fn populate_at(&self, schema: &Arc<Schema>, fields: JsonMap, depth: usize) -> DocumentResult<Object> {
        let mut resolved = BTreeMap::new();

        for (name, value) in Marshaller::decode_fields(&fields)? {
            resolved.insert(name, self.resolve(value, depth).await?);
        }

        Object::from_fields(schema.clone(), resolved)
    }

    /// Replaces pointers inside `value` with the resources they reference.
    ///
    /// Pointers nested more than `depth` fetches deep stay unresolved.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownResourceType`](crate::error::DocumentError::UnknownResourceType)
    /// for a pointer to a class that does not resolve, and any error of the fetch
    /// itself.
    pub fn resolve(&self, value: Value, depth: usize) -> BoxFuture<'_, DocumentResult<Value>> {
        async move {
            match value {
                Value::Pointer(pointer) if depth > 0 => {
                    let schema = self.registry.resolve(&pointer.class_name)?;
                    let object = self.retrieve_at(schema, pointer.object_id, depth - 1).await?;
                    Ok(Value::from(object))
                }
                Value::Pointer(pointer) => {
                    self.registry.resolve(&pointer.class_name)?;
                    Ok(Value::Pointer(pointer))
                }
                Value::Array(values) => {
                    let mut resolved = Vec::with_capacity(values.len());
                    for value in values {
                        resolved.push(self.resolve(value, depth).await?);
                    }
                    Ok(Value::Array(resolved))
                }
                Value::Map(map) => {
                    let mut resolved = BTreeMap::new();
                    for (key, value) in map {
                        resolved.insert(key, self.resolve(value, depth).await?);
                    }
                    Ok(Value::Map(resolved))
                }
                other => Ok(other),
            }
        }
        .boxed()
    }

    /// Runs a cloud function and returns its result.
    pub async fn call_function(&self, name: &str, params: JsonMap) -> DocumentResult<JsonValue> {
        Function::new(name).call(self, params).await
    }
}

/// Assembles a [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    transport: Box<dyn Transport>,
    config: ClientConfig,
    schemas: Vec<DocumentResult<Schema>>,
}

impl ClientBuilder {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            config: ClientConfig::default(),
            schemas: Vec::new(),
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a statically declared resource class.
    pub fn register<R: Resource>(mut self) -> Self {
        self.schemas.push(R::schema());
        self
    }

    /// Registers an assembled schema, e.g. one whose default providers the caller
    /// constructed.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schemas.push(Ok(schema));
        self
    }

    /// # Errors
    ///
    /// Returns the first error raised while declaring a registered schema, or a
    /// [`Configuration`](crate::error::DocumentError::Configuration) error for an invalid
    /// configuration.
    pub fn build(self) -> DocumentResult<Client> {
        self.config.validate()?;

        let mut registry = Registry::new(self.config.strict_types)?;
        for schema in self.schemas {
            registry.register_schema(schema?)?;
        }

        info!(
            api_root = %self.config.api_root,
            classes = registry.class_names().count(),
            strict = self.config.strict_types,
            "client ready"
        );

        Ok(Client {
            transport: self.transport,
            registry,
            config: self.config,
        })
    }
}
