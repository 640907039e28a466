//! Resource schemas.
//!
//! A [`Schema`] is assembled once per resource class by a [`SchemaBuilder`] and shared
//! behind an `Arc` by every instance of that class. It knows the class name, the
//! endpoint root the class lives under, the declared fields with their defaults and
//! the many-to-many attributes.
//!
//! Resource classes are usually declared through the [`Resource`] trait:
//!
//! ```ignore
//! use docrest_core::{field::Field, schema::{Resource, SchemaBuilder}};
//!
//! pub struct Order;
//!
//! impl Resource for Order {
//!     fn class_name() -> &'static str {
//!         "Order"
//!     }
//!
//!     fn declare(schema: SchemaBuilder) -> SchemaBuilder {
//!         schema.field("total", Field::new().default(0))
//!     }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::{DocumentError, DocumentResult},
    field::{Field, ManyToMany},
    types::{USER_CLASS, wire_class_name},
    value::Value,
};

/// Attribute names managed by the service. They are never editable.
pub const PROTECTED_NAMES: [&str; 3] = ["objectId", "createdAt", "updatedAt"];

/// Returns true for names managed by the service.
pub fn is_protected(name: &str) -> bool {
    PROTECTED_NAMES.contains(&name)
}

/// Returns true if `name` can be used as a class name.
///
/// Class names start with a letter or `_` and contain only ASCII letters, digits and
/// underscores.
pub fn is_valid_class_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn endpoint_root_for(class_name: &str) -> String {
    if class_name == USER_CLASS {
        "users".to_string()
    } else {
        format!("classes/{class_name}")
    }
}

/// A statically declared resource class.
pub trait Resource: Send + Sync + 'static {
    /// The in-memory class name of this resource.
    fn class_name() -> &'static str;

    /// Adds this resource's fields to `schema`.
    fn declare(schema: SchemaBuilder) -> SchemaBuilder {
        schema
    }

    /// Builds the schema of this resource.
    fn schema() -> DocumentResult<Schema> {
        Self::declare(SchemaBuilder::new(Self::class_name())).build()
    }
}

/// The assembled description of a resource class.
#[derive(Debug, Clone)]
pub struct Schema {
    class_name: String,
    endpoint_root: String,
    fields: BTreeMap<String, Field>,
    many_to_many: BTreeMap<String, ManyToMany>,
    typed: bool,
}

impl Schema {
    /// A schema without declared fields, used for classes nobody registered.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnknownResourceType`] if `class_name` is not a valid
    /// class name.
    pub fn untyped(class_name: &str) -> DocumentResult<Self> {
        if !is_valid_class_name(class_name) {
            return Err(DocumentError::UnknownResourceType(class_name.to_string()));
        }

        Ok(Self {
            class_name: class_name.to_string(),
            endpoint_root: endpoint_root_for(class_name),
            fields: BTreeMap::new(),
            many_to_many: BTreeMap::new(),
            typed: false,
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The class name as the service knows it (`_User` for the user class).
    pub fn wire_class_name(&self) -> &str {
        wire_class_name(&self.class_name)
    }

    /// The path collection requests for this class are issued against.
    pub fn endpoint_root(&self) -> &str {
        &self.endpoint_root
    }

    /// The path of a single stored instance.
    pub fn instance_path(&self, object_id: &str) -> String {
        format!("{}/{}", self.endpoint_root, object_id)
    }

    /// False for the fallback schema of unregistered classes.
    pub fn is_typed(&self) -> bool {
        self.typed
    }

    /// A copy of this schema under another class name, with its endpoint root
    /// recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Configuration`] if `class_name` is not a valid class
    /// name.
    pub fn renamed(&self, class_name: &str) -> DocumentResult<Self> {
        if !is_valid_class_name(class_name) {
            return Err(DocumentError::Configuration(format!(
                "invalid class name {class_name:?}"
            )));
        }

        Ok(Self {
            class_name: class_name.to_string(),
            endpoint_root: endpoint_root_for(class_name),
            ..self.clone()
        })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.fields.iter()
    }

    pub fn relation(&self, name: &str) -> Option<&ManyToMany> {
        self.many_to_many.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&String, &ManyToMany)> {
        self.many_to_many.iter()
    }

    pub fn is_many_to_many(&self, name: &str) -> bool {
        self.many_to_many.contains_key(name)
    }

    /// Whether an attribute is written back to the service on save.
    pub fn is_editable(&self, name: &str) -> bool {
        !is_protected(name) && !name.starts_with('_') && !self.is_many_to_many(name)
    }

    /// Join class names of every many-to-many attribute.
    pub fn join_classes(&self) -> impl Iterator<Item = String> + '_ {
        self.many_to_many
            .values()
            .map(|relation| relation.join_class(&self.class_name))
    }

    /// Evaluates the default of every declared field for which `supplied` returns
    /// false. Producers of supplied fields are not invoked.
    pub fn defaults(&self, supplied: impl Fn(&str) -> bool) -> DocumentResult<BTreeMap<String, Value>> {
        self.fields
            .iter()
            .filter(|(name, _)| !supplied(name.as_str()))
            .map(|(name, field)| Ok((name.clone(), field.resolve_default()?)))
            .collect()
    }
}

/// Assembles a [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    class_name: String,
    fields: Vec<(String, Field)>,
    many_to_many: Vec<(String, ManyToMany)>,
}

impl SchemaBuilder {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: Vec::new(),
            many_to_many: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    pub fn many_to_many(mut self, name: impl Into<String>, relation: ManyToMany) -> Self {
        self.many_to_many.push((name.into(), relation));
        self
    }

    /// Validates the declarations and builds the schema.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Configuration`] for an invalid class name, or for an
    /// attribute that is protected, starts with `_` or is declared twice.
    pub fn build(self) -> DocumentResult<Schema> {
        if !is_valid_class_name(&self.class_name) {
            return Err(DocumentError::Configuration(format!(
                "invalid class name {:?}",
                self.class_name
            )));
        }

        let mut seen = BTreeSet::new();
        let names = self
            .fields
            .iter()
            .map(|(name, _)| name)
            .chain(self.many_to_many.iter().map(|(name, _)| name));

        for name in names {
            if is_protected(name) || name.starts_with('_') {
                return Err(DocumentError::Configuration(format!(
                    "{} can not declare reserved attribute {name}",
                    self.class_name
                )));
            }

            if !seen.insert(name.clone()) {
                return Err(DocumentError::Configuration(format!(
                    "{} declares attribute {name} twice",
                    self.class_name
                )));
            }
        }

        Ok(Schema {
            endpoint_root: endpoint_root_for(&self.class_name),
            class_name: self.class_name,
            fields: self.fields.into_iter().collect(),
            many_to_many: self.many_to_many.into_iter().collect(),
            typed: true,
        })
    }
}
