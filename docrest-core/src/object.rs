//! Resource instances.
//!
//! An [`Object`] is one instance of a resource class: its schema, the identity and
//! timestamps the service assigns, and an open map of attributes. Declared fields
//! get their defaults when the instance is built; anything else the service returns
//! is kept as it came.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::{debug, info};

use crate::{
    batch::{StagedKind, StagedRequest},
    client::Client,
    error::{DocumentError, DocumentResult},
    marshal::Marshaller,
    schema::Schema,
    transport::{BatchRequest, Method},
    types::{JsonMap, Pointer, parse_iso},
    value::Value,
};

#[derive(Debug, Clone)]
pub struct Object {
    schema: Arc<Schema>,
    object_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    attrs: BTreeMap<String, Value>,
}

impl Object {
    /// Builds an unsaved instance holding the defaults of its schema.
    pub fn new(schema: Arc<Schema>) -> DocumentResult<Self> {
        Self::with_attrs(schema, Vec::<(String, Value)>::new())
    }

    /// Builds an instance from explicit attributes.
    ///
    /// Defaults are evaluated for declared fields missing from `attrs`; explicit
    /// values are applied after them. `objectId`, `createdAt` and `updatedAt` are
    /// accepted and populate the identity and timestamps.
    ///
    /// # Errors
    ///
    /// Fails as [`Object::set`] does for each attribute.
    pub fn with_attrs<I, K, V>(schema: Arc<Schema>, attrs: I) -> DocumentResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let supplied = attrs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect::<Vec<(String, Value)>>();
        let defaults = schema.defaults(|name| supplied.iter().any(|(key, _)| key == name))?;

        let mut object = Self {
            schema,
            object_id: None,
            created_at: None,
            updated_at: None,
            attrs: defaults,
        };

        for (name, value) in supplied {
            object.set(name, value)?;
        }

        Ok(object)
    }

    /// Builds an instance from decoded wire fields. Many-to-many attributes are
    /// derived, so any the service sends are skipped.
    pub(crate) fn from_fields(schema: Arc<Schema>, fields: BTreeMap<String, Value>) -> DocumentResult<Self> {
        let fields = fields
            .into_iter()
            .filter(|(name, _)| !schema.is_many_to_many(name))
            .collect::<Vec<_>>();

        Self::with_attrs(schema, fields)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn class_name(&self) -> &str {
        self.schema.class_name()
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    pub fn created_at(&self) -> Option<&DateTime<Utc>> {
        self.created_at.as_ref()
    }

    pub fn updated_at(&self) -> Option<&DateTime<Utc>> {
        self.updated_at.as_ref()
    }

    pub fn is_saved(&self) -> bool {
        self.object_id.is_some()
    }

    /// Assigns the object id.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::IdentityViolation`] if the instance already has an id.
    pub fn set_object_id(&mut self, object_id: impl Into<String>) -> DocumentResult<()> {
        if let Some(existing) = &self.object_id {
            return Err(DocumentError::IdentityViolation(
                self.class_name().to_string(),
                existing.clone(),
            ));
        }

        self.object_id = Some(object_id.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Sets an attribute.
    ///
    /// Values given in their wire shape are rebuilt into native values.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::IdentityViolation`] when setting `objectId` twice.
    /// - [`DocumentError::Configuration`] for a many-to-many attribute, which is
    ///   changed through its relation manager, or for a protected attribute given a
    ///   value of the wrong kind.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> DocumentResult<()> {
        let name = name.into();
        let value = Marshaller::normalize(value.into())?;

        match name.as_str() {
            "objectId" => match value {
                Value::String(id) => self.set_object_id(id),
                Value::Null => Ok(()),
                other => Err(DocumentError::Configuration(format!(
                    "objectId must be a string, got {other:?}"
                ))),
            },
            "createdAt" => {
                self.created_at = timestamp(&name, value)?;
                Ok(())
            }
            "updatedAt" => {
                self.updated_at = timestamp(&name, value)?;
                Ok(())
            }
            _ if self.schema.is_many_to_many(&name) => Err(DocumentError::Configuration(format!(
                "{name} is a many-to-many attribute of {}",
                self.class_name()
            ))),
            _ => {
                self.attrs.insert(name, value);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attrs.remove(name)
    }

    /// Every attribute held by this instance, editable or not.
    pub fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    /// The attributes written back to the service on save.
    pub fn editable_attrs(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attrs
            .iter()
            .filter(|(name, _)| self.schema.is_editable(name))
    }

    /// Empties the instance, including its identity and timestamps.
    pub fn clear(&mut self) {
        self.object_id = None;
        self.created_at = None;
        self.updated_at = None;
        self.attrs.clear();
    }

    /// A pointer to this instance.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnsavedReference`] if the instance has no id.
    pub fn as_pointer(&self) -> DocumentResult<Pointer> {
        Ok(Pointer::new(self.class_name(), self.require_id()?))
    }

    /// The path of this instance under its class endpoint.
    pub fn path(&self) -> DocumentResult<String> {
        Ok(self.schema.instance_path(self.require_id()?))
    }

    /// The wire form of the editable attributes.
    pub fn to_wire(&self) -> DocumentResult<JsonMap> {
        Marshaller::object_to_wire(self)
    }

    fn require_id(&self) -> DocumentResult<&str> {
        self.object_id()
            .ok_or_else(|| DocumentError::UnsavedReference(self.class_name().to_string()))
    }

    /// Composes the create or update request of this instance without sending it.
    pub fn stage_save(&self) -> DocumentResult<StagedRequest> {
        let body = Some(self.to_wire()?);

        Ok(match &self.object_id {
            None => StagedRequest {
                kind: StagedKind::Create,
                request: BatchRequest::new(Method::Post, self.schema.endpoint_root(), body),
            },
            Some(object_id) => StagedRequest {
                kind: StagedKind::Update,
                request: BatchRequest::new(Method::Put, self.schema.instance_path(object_id), body),
            },
        })
    }

    /// Composes the delete request of this instance without sending it.
    pub fn stage_delete(&self) -> DocumentResult<StagedRequest> {
        Ok(StagedRequest {
            kind: StagedKind::Delete,
            request: BatchRequest::new(Method::Delete, self.path()?, None),
        })
    }

    /// Applies the service's response to a staged request of this instance.
    ///
    /// A create populates the id and both timestamps, an update refreshes
    /// `updatedAt` and a delete clears the instance.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidPayload`] if a create response has no
    /// `objectId`, and [`DocumentError::Parse`] for malformed timestamps.
    pub fn apply_response(&mut self, kind: StagedKind, response: &JsonMap) -> DocumentResult<()> {
        match kind {
            StagedKind::Create => {
                let object_id = response
                    .get("objectId")
                    .and_then(|id| id.as_str())
                    .ok_or_else(|| {
                        DocumentError::InvalidPayload(format!(
                            "create response for {} has no objectId",
                            self.class_name()
                        ))
                    })?;
                self.set_object_id(object_id)?;

                if let Some(created_at) = response.get("createdAt") {
                    let created_at = timestamp("createdAt", Marshaller::decode(created_at)?)?;
                    self.created_at = created_at;
                    self.updated_at = created_at;
                }
            }
            StagedKind::Update => {
                if let Some(updated_at) = response.get("updatedAt") {
                    self.updated_at = timestamp("updatedAt", Marshaller::decode(updated_at)?)?;
                }
            }
            StagedKind::Delete => self.clear(),
        }

        Ok(())
    }

    /// Creates the instance if it has no id, updates it otherwise.
    pub async fn save(&mut self, client: &Client) -> DocumentResult<()> {
        let StagedRequest { kind, request } = self.stage_save()?;
        let body = request.body.unwrap_or_default();

        debug!(class = %self.class_name(), path = %request.path, ?kind, "saving");
        let response = match kind {
            StagedKind::Create => client.transport().post(&request.path, body).await?,
            _ => client.transport().put(&request.path, body).await?,
        };

        self.apply_response(kind, &response)?;
        info!(class = %self.class_name(), object_id = ?self.object_id, ?kind, "saved");

        Ok(())
    }

    /// Deletes the instance remotely, then clears it.
    pub async fn delete(&mut self, client: &Client) -> DocumentResult<()> {
        let StagedRequest { kind, request } = self.stage_delete()?;

        debug!(class = %self.class_name(), path = %request.path, "deleting");
        let response = client.transport().delete(&request.path).await?;
        info!(class = %self.class_name(), object_id = ?self.object_id, "deleted");

        self.apply_response(kind, &response)
    }

    /// Atomically adds `amount` to a numeric attribute on the service, then mirrors
    /// the addition locally.
    ///
    /// The request is sent immediately; other unsaved changes are not written.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::UnsavedReference`] if the instance was never saved.
    /// - [`DocumentError::Configuration`] if `key` is not an editable attribute.
    /// - [`DocumentError::InvalidPayload`] if the local value is not numeric.
    pub async fn increment(&mut self, client: &Client, key: &str, amount: i64) -> DocumentResult<()> {
        let path = self.path()?;

        if !self.schema.is_editable(key) {
            return Err(DocumentError::Configuration(format!(
                "can not increment {key} of {}",
                self.class_name()
            )));
        }

        let next = Marshaller::add(self.attrs.get(key), amount)?;

        let mut body = JsonMap::new();
        body.insert(key.to_string(), json!({ "__op": "Increment", "amount": amount }));

        debug!(class = %self.class_name(), %path, key, amount, "incrementing");
        let response = client.transport().put(&path, body).await?;

        self.apply_response(StagedKind::Update, &response)?;
        self.attrs.insert(key.to_string(), next);

        Ok(())
    }
}

fn timestamp(name: &str, value: Value) -> DocumentResult<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::Date(date) => Ok(Some(date)),
        Value::String(iso) => Ok(Some(parse_iso(&iso)?)),
        other => Err(DocumentError::Configuration(format!(
            "{name} must be a date, got {other:?}"
        ))),
    }
}

impl PartialEq for Object {
    /// Instances are equal if they share a class and an id. An instance without an
    /// id equals only itself.
    fn eq(&self, other: &Self) -> bool {
        match (&self.object_id, &other.object_id) {
            (Some(left), Some(right)) => left == right && self.class_name() == other.class_name(),
            _ => std::ptr::eq(self, other),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object_id {
            Some(object_id) => write!(f, "<{}:{}>", self.class_name(), object_id),
            None => write!(f, "<{}:unsaved>", self.class_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::{Field, ManyToMany, Sequence},
        schema::SchemaBuilder,
    };
    use chrono::TimeZone;

    fn order_schema() -> Arc<Schema> {
        Arc::new(
            SchemaBuilder::new("Order")
                .field("total", Field::new().default(0))
                .field("note", Field::new())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn object_id_is_set_once() {
        let mut order = Object::new(order_schema()).unwrap();
        assert!(!order.is_saved());

        order.set_object_id("a1").unwrap();
        assert_eq!(
            order.set_object_id("b2"),
            Err(DocumentError::IdentityViolation("Order".into(), "a1".into())),
        );
        assert_eq!(order.object_id(), Some("a1"));
    }

    #[test]
    fn defaults_then_explicit_values() {
        let order = Object::new(order_schema()).unwrap();
        assert_eq!(order.get_i64("total"), Some(0));
        assert_eq!(order.get("note"), Some(&Value::Null));

        let order = Object::with_attrs(order_schema(), [("total", 12)]).unwrap();
        assert_eq!(order.get_i64("total"), Some(12));
    }

    #[test]
    fn producers_of_supplied_fields_do_not_run() {
        let numbers = Arc::new(Sequence::starting_at(1));
        let schema = Arc::new(
            SchemaBuilder::new("Ticket")
                .field("number", Field::new().default_with(numbers.clone()))
                .build()
                .unwrap(),
        );

        let first = Object::new(schema.clone()).unwrap();
        let explicit = Object::with_attrs(schema.clone(), [("number", 99)]).unwrap();
        let second = Object::new(schema).unwrap();

        assert_eq!(first.get_i64("number"), Some(1));
        assert_eq!(explicit.get_i64("number"), Some(99));
        assert_eq!(second.get_i64("number"), Some(2));
    }

    #[test]
    fn reserved_names_are_not_editable() {
        let mut order = Object::with_attrs(
            order_schema(),
            [
                ("objectId", Value::from("a1")),
                ("createdAt", Value::from("2024-01-02T03:04:05.000Z")),
                ("_internal", Value::from(true)),
            ],
        )
        .unwrap();
        order.set("note", "rush").unwrap();

        assert_eq!(order.object_id(), Some("a1"));
        assert_eq!(order.created_at(), Some(&Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()));

        let editable = order.editable_attrs().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
        assert_eq!(editable, vec!["note", "total"]);
    }

    #[test]
    fn many_to_many_attributes_can_not_be_set() {
        let schema = Arc::new(
            SchemaBuilder::new("Customer")
                .many_to_many("addresses", ManyToMany::new("Address"))
                .build()
                .unwrap(),
        );
        let mut customer = Object::new(schema).unwrap();
        assert!(matches!(customer.set("addresses", 1), Err(DocumentError::Configuration(_))));
    }

    #[test]
    fn equality_follows_identity() {
        let mut left = Object::new(order_schema()).unwrap();
        let mut right = Object::new(order_schema()).unwrap();
        let alias = &left;
        assert_eq!(&left, alias);
        assert_ne!(left, right);

        left.set_object_id("same").unwrap();
        right.set_object_id("same").unwrap();
        right.set("note", "different").unwrap();
        assert_eq!(left, right);

        let other_class = Arc::new(SchemaBuilder::new("Invoice").build().unwrap());
        let mut invoice = Object::new(other_class).unwrap();
        invoice.set_object_id("same").unwrap();
        assert_ne!(left, invoice);
    }

    #[test]
    fn staged_requests() {
        let mut order = Object::with_attrs(order_schema(), [("total", 3)]).unwrap();

        let create = order.stage_save().unwrap();
        assert_eq!(create.kind, StagedKind::Create);
        assert_eq!(create.request.method, Method::Post);
        assert_eq!(create.request.path, "classes/Order");
        assert_eq!(create.request.body.as_ref().unwrap()["total"], 3);

        assert!(matches!(order.stage_delete(), Err(DocumentError::UnsavedReference(_))));

        order.set_object_id("o1").unwrap();
        let update = order.stage_save().unwrap();
        assert_eq!(update.kind, StagedKind::Update);
        assert_eq!(update.request.path, "classes/Order/o1");

        let delete = order.stage_delete().unwrap();
        assert_eq!(delete.request.method, Method::Delete);
        assert_eq!(delete.request.body, None);
    }

    #[test]
    fn responses_are_applied() {
        let mut order = Object::new(order_schema()).unwrap();
        let created = json!({ "objectId": "o1", "createdAt": "2024-05-01T10:00:00.000Z" });
        order.apply_response(StagedKind::Create, created.as_object().unwrap()).unwrap();

        assert_eq!(order.object_id(), Some("o1"));
        assert_eq!(order.created_at(), order.updated_at());

        let updated = json!({ "updatedAt": "2024-05-02T10:00:00.000Z" });
        order.apply_response(StagedKind::Update, updated.as_object().unwrap()).unwrap();
        assert_ne!(order.created_at(), order.updated_at());

        order.apply_response(StagedKind::Delete, &JsonMap::new()).unwrap();
        assert_eq!(order.object_id(), None);
        assert_eq!(order.created_at(), None);
        assert!(order.attrs().is_empty());
    }

    #[test]
    fn create_response_without_id_is_invalid() {
        let mut order = Object::new(order_schema()).unwrap();
        assert!(matches!(
            order.apply_response(StagedKind::Create, &JsonMap::new()),
            Err(DocumentError::InvalidPayload(_))
        ));
    }

    #[test]
    fn display() {
        let mut order = Object::new(order_schema()).unwrap();
        assert_eq!(order.to_string(), "<Order:unsaved>");
        order.set_object_id("o1").unwrap();
        assert_eq!(order.to_string(), "<Order:o1>");
    }
}
