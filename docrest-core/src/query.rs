//! Query construction and execution.
//!
//! A [`Query`] accumulates criteria written as `attribute__op` names, the way a
//! caller would spell keyword filters, and translates them into the service's
//! `where` protocol. A [`Queryset`] binds a query to a client and a resource class
//! and runs it; nothing is fetched until one of its terminal operations is awaited.
//!
//! # Criteria
//!
//! | Name | `where` entry |
//! |---|---|
//! | `score` | `{"score": v}` |
//! | `score__gt` | `{"score": {"$gt": v}}` |
//! | `tags__all` | `{"tags": {"$all": v}}` |
//!
//! Recognized suffixes: `lt`, `lte`, `gt`, `gte`, `ne`, `in`, `nin`, `exists`,
//! `select`, `dontSelect`, `all`. Any other name is an equality criterion.
//!
//! ```ignore
//! let cheap = client
//!     .query::<Product>()?
//!     .filter("price__lt", 10)?
//!     .filter("price__gte", 1)?
//!     .order_by("price", false);
//!
//! for product in cheap.fetch().await? {
//!     println!("{product}");
//! }
//! ```

use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

use crate::{
    batch::Batcher,
    client::Client,
    error::{DocumentError, DocumentResult},
    marshal::Marshaller,
    object::Object,
    schema::Schema,
    transport::QueryParams,
    types::JsonMap,
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    /// The `order` parameter for this sort; descending sorts carry a `-` prefix.
    pub fn to_param(&self) -> String {
        match self.direction {
            SortDirection::Asc => self.field.clone(),
            SortDirection::Desc => format!("-{}", self.field),
        }
    }
}

/// A comparison operator of the `where` protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Ne,
    In,
    Nin,
    Exists,
    Select,
    DontSelect,
    All,
}

impl FieldOp {
    pub const ALL: [FieldOp; 11] = [
        FieldOp::Lt,
        FieldOp::Lte,
        FieldOp::Gt,
        FieldOp::Gte,
        FieldOp::Ne,
        FieldOp::In,
        FieldOp::Nin,
        FieldOp::Exists,
        FieldOp::Select,
        FieldOp::DontSelect,
        FieldOp::All,
    ];

    /// The name suffix selecting this operator.
    pub fn suffix(self) -> &'static str {
        match self {
            FieldOp::Lt => "lt",
            FieldOp::Lte => "lte",
            FieldOp::Gt => "gt",
            FieldOp::Gte => "gte",
            FieldOp::Ne => "ne",
            FieldOp::In => "in",
            FieldOp::Nin => "nin",
            FieldOp::Exists => "exists",
            FieldOp::Select => "select",
            FieldOp::DontSelect => "dontSelect",
            FieldOp::All => "all",
        }
    }

    /// The `$`-prefixed key of this operator in a `where` object.
    pub fn operator(self) -> String {
        format!("${}", self.suffix())
    }

    pub fn from_operator(operator: &str) -> Option<Self> {
        let suffix = operator.strip_prefix('$')?;
        Self::ALL.into_iter().find(|op| op.suffix() == suffix)
    }

    /// Splits a criterion name into its attribute and operator.
    ///
    /// ```ignore
    /// assert_eq!(FieldOp::extract("score__gte"), ("score", Some(FieldOp::Gte)));
    /// assert_eq!(FieldOp::extract("score"), ("score", None));
    /// ```
    pub fn extract(name: &str) -> (&str, Option<FieldOp>) {
        for op in Self::ALL {
            if let Some(attribute) = name
                .strip_suffix(op.suffix())
                .and_then(|rest| rest.strip_suffix("__"))
            {
                return (attribute, Some(op));
            }
        }

        (name, None)
    }
}

/// The constraint on one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Equals(JsonValue),
    Operators(BTreeMap<FieldOp, JsonValue>),
}

impl Criterion {
    fn to_wire(&self) -> JsonValue {
        match self {
            Criterion::Equals(value) => value.clone(),
            Criterion::Operators(operators) => JsonValue::Object(
                operators
                    .iter()
                    .map(|(op, value)| (op.operator(), value.clone()))
                    .collect(),
            ),
        }
    }
}

/// Criteria and options of a query, independent of where it runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    criteria: BTreeMap<String, Criterion>,
    sort: Option<Sort>,
    limit: Option<usize>,
    skip: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a criterion.
    ///
    /// Equality replaces whatever was recorded for the attribute. An operator joins
    /// the attribute's other operators, replacing a previous equality. The value is
    /// stored in its wire form, resources as pointers.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnsavedReference`] if the value is or contains an
    /// unsaved resource.
    pub fn filter(mut self, name: &str, value: impl Into<Value>) -> DocumentResult<Self> {
        let value = Marshaller::to_wire(&value.into(), true)?;
        let (attribute, op) = FieldOp::extract(name);

        match op {
            None => {
                self.criteria.insert(attribute.to_string(), Criterion::Equals(value));
            }
            Some(op) => match self.criteria.get_mut(attribute) {
                Some(Criterion::Operators(operators)) => {
                    operators.insert(op, value);
                }
                _ => {
                    self.criteria.insert(
                        attribute.to_string(),
                        Criterion::Operators(BTreeMap::from([(op, value)])),
                    );
                }
            },
        }

        Ok(self)
    }

    /// A copy of this query sorted by `field`, replacing any previous sort.
    pub fn order_by(&self, field: impl Into<String>, descending: bool) -> Self {
        let direction = if descending { SortDirection::Desc } else { SortDirection::Asc };
        Self { sort: Some(Sort { field: field.into(), direction }), ..self.clone() }
    }

    /// A copy of this query returning at most `limit` results.
    pub fn limit(&self, limit: usize) -> Self {
        Self { limit: Some(limit), ..self.clone() }
    }

    /// A copy of this query skipping the first `skip` results.
    pub fn skip(&self, skip: usize) -> Self {
        Self { skip: Some(skip), ..self.clone() }
    }

    pub fn criterion(&self, attribute: &str) -> Option<&Criterion> {
        self.criteria.get(attribute)
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn skip_value(&self) -> Option<usize> {
        self.skip
    }

    pub fn is_unfiltered(&self) -> bool {
        self.criteria.is_empty()
    }

    /// The `where` object of this query.
    pub fn where_clause(&self) -> JsonMap {
        self.criteria
            .iter()
            .map(|(attribute, criterion)| (attribute.clone(), criterion.to_wire()))
            .collect()
    }

    /// Request parameters fetching the matching results.
    pub fn params(&self) -> DocumentResult<QueryParams> {
        let mut params = QueryParams::new();

        if !self.criteria.is_empty() {
            params.insert("where", serde_json::to_string(&self.where_clause())?);
        }
        if let Some(sort) = &self.sort {
            params.insert("order", sort.to_param());
        }
        if let Some(limit) = self.limit {
            params.insert("limit", limit.to_string());
        }
        if let Some(skip) = self.skip {
            params.insert("skip", skip.to_string());
        }

        Ok(params)
    }

    /// Request parameters counting the matching results without returning them.
    pub fn count_params(&self) -> DocumentResult<QueryParams> {
        let mut params = self.params()?;
        params.insert("count", "1");
        params.insert("limit", "0");
        Ok(params)
    }
}

/// A query bound to a client and a resource class.
#[derive(Debug, Clone)]
pub struct Queryset<'a> {
    client: &'a Client,
    schema: Arc<Schema>,
    query: Query,
    shallow: bool,
}

impl<'a> Queryset<'a> {
    pub fn new(client: &'a Client, schema: Arc<Schema>) -> Self {
        Self { client, schema, query: Query::new(), shallow: false }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Adds a criterion. See [`Query::filter`].
    pub fn filter(mut self, name: &str, value: impl Into<Value>) -> DocumentResult<Self> {
        self.query = self.query.filter(name, value)?;
        Ok(self)
    }

    pub fn order_by(&self, field: impl Into<String>, descending: bool) -> Self {
        self.with_query(self.query.order_by(field, descending))
    }

    pub fn limit(&self, limit: usize) -> Self {
        self.with_query(self.query.limit(limit))
    }

    pub fn skip(&self, skip: usize) -> Self {
        self.with_query(self.query.skip(skip))
    }

    /// A copy of this queryset whose results keep their pointers unresolved.
    pub fn shallow(&self) -> Self {
        Self { shallow: true, ..self.clone() }
    }

    fn with_query(&self, query: Query) -> Self {
        Self { query, ..self.clone() }
    }

    /// Fetches the matching resources. Every call issues a new request.
    pub async fn fetch(&self) -> DocumentResult<Vec<Object>> {
        let params = self.query.params()?;
        debug!(class = %self.schema.class_name(), ?params, "fetching");

        let mut response = self
            .client
            .transport()
            .get(self.schema.endpoint_root(), &params)
            .await?;

        let results = match response.remove("results") {
            Some(JsonValue::Array(results)) => results,
            Some(other) => {
                return Err(DocumentError::InvalidPayload(format!(
                    "results must be an array, got {other}"
                )));
            }
            None => Vec::new(),
        };

        let depth = if self.shallow { 0 } else { self.client.config().pointer_depth };
        let mut objects = Vec::with_capacity(results.len());

        for result in results {
            match result {
                JsonValue::Object(fields) => {
                    objects.push(self.client.populate_at(&self.schema, fields, depth).await?);
                }
                other => {
                    return Err(DocumentError::InvalidPayload(format!(
                        "result must be an object, got {other}"
                    )));
                }
            }
        }

        Ok(objects)
    }

    /// Fetches the matching resources and returns the one at `index`.
    pub async fn nth(&self, index: usize) -> DocumentResult<Option<Object>> {
        Ok(self.fetch().await?.into_iter().nth(index))
    }

    /// Counts the matching resources on the service.
    pub async fn count(&self) -> DocumentResult<usize> {
        let params = self.query.count_params()?;
        debug!(class = %self.schema.class_name(), ?params, "counting");

        let response = self
            .client
            .transport()
            .get(self.schema.endpoint_root(), &params)
            .await?;

        response
            .get("count")
            .and_then(JsonValue::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| DocumentError::InvalidPayload("count response has no count".to_string()))
    }

    /// Whether at least one resource matches.
    pub async fn exists(&self) -> DocumentResult<bool> {
        let probe = match self.query.limit_value() {
            Some(_) => self.shallow(),
            None => self.shallow().limit(1),
        };

        Ok(!probe.fetch().await?.is_empty())
    }

    /// The single matching resource.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::DoesNotExist`] if nothing matches and
    /// [`DocumentError::MultipleResultsReturned`] if more than one resource does.
    pub async fn get(&self) -> DocumentResult<Object> {
        let mut results = self.fetch().await?;

        match results.len() {
            0 => Err(DocumentError::DoesNotExist(self.schema.class_name().to_string())),
            1 => Ok(results.remove(0)),
            found => Err(DocumentError::MultipleResultsReturned(
                self.schema.class_name().to_string(),
                found,
            )),
        }
    }

    /// Deletes every matching resource in batches. Matching nothing is not an error.
    pub async fn delete(&self) -> DocumentResult<()> {
        let mut results = self.shallow().fetch().await?;

        match Batcher::new(self.client).batch_delete(&mut results).await {
            Err(DocumentError::EmptyBatch) => Ok(()),
            other => other,
        }
    }
}

/// Entry point for queries on one resource class.
#[derive(Debug, Clone)]
pub struct QueryManager<'a> {
    client: &'a Client,
    schema: Arc<Schema>,
}

impl<'a> QueryManager<'a> {
    pub fn new(client: &'a Client, schema: Arc<Schema>) -> Self {
        Self { client, schema }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// A queryset matching every resource of the class.
    pub fn all(&self) -> Queryset<'a> {
        Queryset::new(self.client, self.schema.clone())
    }

    pub fn filter(&self, name: &str, value: impl Into<Value>) -> DocumentResult<Queryset<'a>> {
        self.all().filter(name, value)
    }

    pub async fn fetch(&self) -> DocumentResult<Vec<Object>> {
        self.all().fetch().await
    }

    /// The single resource matching one criterion.
    pub async fn get(&self, name: &str, value: impl Into<Value>) -> DocumentResult<Object> {
        self.filter(name, value)?.get().await
    }

    pub async fn count(&self) -> DocumentResult<usize> {
        self.all().count().await
    }

    /// Fetches a resource by id.
    pub async fn retrieve(&self, object_id: &str) -> DocumentResult<Object> {
        self.client.retrieve(&self.schema, object_id).await
    }

    /// Builds a resource from `attrs` and saves it.
    pub async fn create<I, K, V>(&self, attrs: I) -> DocumentResult<Object>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut object = Object::with_attrs(self.schema.clone(), attrs)?;
        object.save(self.client).await?;
        Ok(object)
    }
}
