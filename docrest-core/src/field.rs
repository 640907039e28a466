//! Field descriptors.
//!
//! A [`Field`] declares a scalar attribute and its default. Defaults are either a
//! constant [`Value`] or a [`DefaultProvider`] invoked once per new instance. A
//! [`ManyToMany`] declares a derived attribute backed by a join resource.

use serde_json::Value as JsonValue;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use crate::{
    error::{DocumentError, DocumentResult},
    marshal::Marshaller,
    types::JsonMap,
    value::Value,
};

/// Produces default values for new instances.
///
/// Any state a provider carries belongs to whoever constructed it; the schema only
/// holds a shared handle.
pub trait DefaultProvider: Send + Sync {
    fn produce(&self) -> Value;
}

impl<F> DefaultProvider for F
where
    F: Fn() -> Value + Send + Sync,
{
    fn produce(&self) -> Value {
        self()
    }
}

/// A counter yielding consecutive integers, one per produced default.
///
/// ```ignore
/// let numbers = Arc::new(Sequence::starting_at(1));
/// let field = Field::new().default_with(numbers.clone());
/// ```
#[derive(Debug, Default)]
pub struct Sequence {
    next: AtomicI64,
}

impl Sequence {
    pub fn starting_at(first: i64) -> Self {
        Self { next: AtomicI64::new(first) }
    }

    /// The value the next call to [`DefaultProvider::produce`] will return.
    pub fn peek(&self) -> i64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl DefaultProvider for Sequence {
    fn produce(&self) -> Value {
        Value::from(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// The default of a field.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    Producer(Arc<dyn DefaultProvider>),
}

impl FieldDefault {
    /// Evaluates the default for a new instance.
    pub fn resolve(&self) -> DocumentResult<Value> {
        match self {
            FieldDefault::Value(value) => Marshaller::normalize(value.clone()),
            FieldDefault::Producer(provider) => Marshaller::normalize(provider.produce()),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldDefault::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// A scalar field declaration.
#[derive(Debug, Clone, Default)]
pub struct Field {
    default: Option<FieldDefault>,
}

impl Field {
    /// Declares a field whose default is `Null`.
    pub fn new() -> Self {
        Self { default: None }
    }

    /// Sets a constant default.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Sets a default produced for every new instance.
    pub fn default_with(mut self, provider: Arc<dyn DefaultProvider>) -> Self {
        self.default = Some(FieldDefault::Producer(provider));
        self
    }

    /// Declares a field from an options object such as `{"default": 0}`.
    ///
    /// Default values may be given in their wire shape.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Configuration`] for any key other than `default`.
    pub fn from_options(options: &JsonMap) -> DocumentResult<Self> {
        let mut field = Field::new();

        for (key, value) in options {
            match key.as_str() {
                "default" => field = field.default(Marshaller::decode(value)?),
                other => {
                    return Err(DocumentError::Configuration(format!(
                        "Field does not support attribute {other}"
                    )));
                }
            }
        }

        Ok(field)
    }

    pub fn default_value(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    /// Evaluates this field's default, `Null` if none was declared.
    pub fn resolve_default(&self) -> DocumentResult<Value> {
        match &self.default {
            Some(default) => default.resolve(),
            None => Ok(Value::Null),
        }
    }
}

impl TryFrom<&JsonValue> for Field {
    type Error = DocumentError;

    fn try_from(options: &JsonValue) -> Result<Self, Self::Error> {
        match options {
            JsonValue::Object(map) => Field::from_options(map),
            other => Err(DocumentError::Configuration(format!(
                "field options must be an object, got {other}"
            ))),
        }
    }
}

/// A many-to-many declaration.
///
/// Each edge is stored as one join resource holding two pointers, named after the
/// lower-cased owner and related class names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManyToMany {
    related: String,
    join_class: Option<String>,
}

impl ManyToMany {
    pub fn new(related: impl Into<String>) -> Self {
        Self { related: related.into(), join_class: None }
    }

    /// Uses an explicit join class instead of the derived `<Owner><Related>s` name.
    pub fn through(mut self, join_class: impl Into<String>) -> Self {
        self.join_class = Some(join_class.into());
        self
    }

    pub fn related(&self) -> &str {
        &self.related
    }

    /// The join class name for this relation when declared on `owner`.
    pub fn join_class(&self, owner: &str) -> String {
        match &self.join_class {
            Some(name) => name.clone(),
            None => format!("{}{}s", owner, self.related),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_default_option() {
        let field = Field::try_from(&json!({ "default": 1 })).unwrap();
        assert_eq!(field.resolve_default().unwrap(), Value::from(1));
    }

    #[test]
    fn rejects_unknown_option() {
        let result = Field::try_from(&json!({ "foo": 1 }));
        assert!(matches!(result, Err(DocumentError::Configuration(_))));
    }

    #[test]
    fn bare_fields_default_to_null() {
        let field = <Field as Default>::default();
        assert_eq!(field.resolve_default().unwrap(), Value::Null);
        assert_eq!(Field::new().resolve_default().unwrap(), Value::Null);
    }

    #[test]
    fn constant_defaults_are_shared() {
        let field = Field::new().default(0);
        assert_eq!(field.resolve_default().unwrap(), field.resolve_default().unwrap());
    }

    #[test]
    fn producers_run_per_instance() {
        let numbers = Arc::new(Sequence::starting_at(1));
        let field = Field::new().default_with(numbers.clone());

        assert_eq!(field.resolve_default().unwrap(), Value::from(1));
        assert_eq!(field.resolve_default().unwrap(), Value::from(2));
        assert_eq!(numbers.peek(), 3);
    }

    #[test]
    fn closure_producer() {
        let field = Field::new().default_with(Arc::new(|| Value::from(5)));
        assert_eq!(field.resolve_default().unwrap(), Value::from(5));
    }

    #[test]
    fn wire_shaped_option_default() {
        let field = Field::try_from(&json!({
            "default": { "__type": "GeoPoint", "latitude": 1.0, "longitude": 2.0 },
        }))
        .unwrap();
        assert!(field.resolve_default().unwrap().as_geo_point().is_some());
    }

    #[test]
    fn join_class_name_is_derived() {
        assert_eq!(ManyToMany::new("Address").join_class("Customer"), "CustomerAddresss");
        assert_eq!(ManyToMany::new("Address").through("Residence").join_class("Customer"), "Residence");
    }
}
