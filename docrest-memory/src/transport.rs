//! In-memory implementation of the REST service.
//!
//! Rows are kept as wire JSON objects, grouped by wire class name. The transport
//! answers the same paths and payloads the remote service does, so everything
//! above the [`Transport`] boundary runs unchanged against it.

use async_trait::async_trait;
use chrono::Utc;
use mea::rwlock::RwLock;
use serde_json::{Number, Value as JsonValue, json};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;
use uuid::Uuid;

use docrest_core::{
    error::{DocumentError, DocumentResult},
    transport::{BatchRequest, BatchResponse, Method, QueryParams, Transport, TransportBuilder},
    types::{JsonMap, WIRE_USER_CLASS, format_iso},
};

use crate::evaluator::{StoreMap, WhereEvaluator, compare_rows};

/// Service error code of a missing object.
pub const OBJECT_NOT_FOUND: i64 = 101;
/// Service error code of a malformed query or operation.
pub const INVALID_QUERY: i64 = 102;
/// Service error code of a failing or missing cloud function.
pub const SCRIPT_FAILED: i64 = 141;

/// Result limit of a query without an explicit `limit`.
pub const DEFAULT_LIMIT: usize = 100;

/// A cloud function: takes the call parameters, returns the `result`.
pub type FunctionHandler = Arc<dyn Fn(JsonMap) -> DocumentResult<JsonValue> + Send + Sync>;

/// Thread-safe in-memory service.
///
/// `MemoryTransport` is cloneable and every clone shares the same rows, so a test
/// can hand one clone to a [`Client`](docrest_core::client::Client) and inspect the
/// stored payloads through another.
///
/// # Example
///
/// ```ignore
/// use docrest_memory::MemoryTransport;
/// use docrest_core::transport::{QueryParams, Transport};
///
/// let transport = MemoryTransport::new();
/// let created = transport.post("classes/GameScore", body).await?;
/// let page = transport.get("classes/GameScore", &QueryParams::new()).await?;
/// ```
#[derive(Clone)]
pub struct MemoryTransport {
    store: Arc<RwLock<StoreMap>>,
    functions: Arc<BTreeMap<String, FunctionHandler>>,
}

/// The resource a path addresses.
#[derive(Debug, PartialEq)]
enum Route<'a> {
    Class(String),
    Instance(String, &'a str),
    Function(&'a str),
}

impl<'a> Route<'a> {
    fn parse(path: &'a str) -> DocumentResult<Self> {
        let segments = path.trim_matches('/').split('/').collect::<Vec<_>>();

        match segments.as_slice() {
            ["classes", class] => Ok(Route::Class(class.to_string())),
            ["classes", class, id] => Ok(Route::Instance(class.to_string(), *id)),
            ["users"] => Ok(Route::Class(WIRE_USER_CLASS.to_string())),
            ["users", id] => Ok(Route::Instance(WIRE_USER_CLASS.to_string(), *id)),
            ["functions", name] => Ok(Route::Function(*name)),
            _ => Err(DocumentError::Transport(INVALID_QUERY, format!("unknown path {path}"))),
        }
    }
}

fn not_found(class: &str, id: &str) -> DocumentError {
    DocumentError::Transport(OBJECT_NOT_FOUND, format!("object not found: {class}/{id}"))
}

fn invalid(message: impl Into<String>) -> DocumentError {
    DocumentError::Transport(INVALID_QUERY, message.into())
}

fn new_object_id() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::with_functions(BTreeMap::new())
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_functions(functions: BTreeMap<String, FunctionHandler>) -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            functions: Arc::new(functions),
        }
    }

    pub fn builder() -> MemoryTransportBuilder {
        MemoryTransportBuilder::default()
    }

    /// A copy of a stored row, addressed by wire class name.
    pub async fn row(&self, class: &str, object_id: &str) -> Option<JsonMap> {
        self.store
            .read()
            .await
            .get(class)
            .and_then(|rows| rows.get(object_id))
            .cloned()
    }

    /// Number of stored rows of a class.
    pub async fn row_count(&self, class: &str) -> usize {
        self.store.read().await.get(class).map_or(0, BTreeMap::len)
    }

    async fn query(&self, class: &str, params: &QueryParams) -> DocumentResult<JsonMap> {
        let clause = match params.get("where") {
            Some(clause) => match serde_json::from_str::<JsonValue>(clause)? {
                JsonValue::Object(clause) => clause,
                other => return Err(invalid(format!("where must be an object, got {other}"))),
            },
            None => JsonMap::new(),
        };

        let skip = usize_param(params, "skip")?.unwrap_or(0);
        let limit = usize_param(params, "limit")?.unwrap_or(DEFAULT_LIMIT);

        let store = self.store.read().await;
        let mut rows = WhereEvaluator::new(&store).filter_rows(class, &clause)?;

        if let Some(order) = params.get("order") {
            rows.sort_by(|left, right| compare_rows(left, right, order));
        }

        let count = rows.len();
        let results = rows
            .into_iter()
            .skip(skip)
            .take(limit)
            .cloned()
            .map(JsonValue::Object)
            .collect::<Vec<_>>();

        debug!(class, count, returned = results.len(), "query");

        let mut response = JsonMap::new();
        response.insert("results".to_string(), JsonValue::Array(results));
        if params.get("count") == Some("1") {
            response.insert("count".to_string(), json!(count));
        }

        Ok(response)
    }

    async fn create(&self, class: String, body: JsonMap) -> DocumentResult<JsonMap> {
        let object_id = new_object_id();
        let now = JsonValue::String(format_iso(&Utc::now()));

        let mut row = JsonMap::new();
        for (key, value) in body {
            apply_field(&mut row, key, value)?;
        }
        row.insert("objectId".to_string(), JsonValue::String(object_id.clone()));
        row.insert("createdAt".to_string(), now.clone());
        row.insert("updatedAt".to_string(), now.clone());

        debug!(%class, %object_id, "create");
        self.store
            .write()
            .await
            .entry(class)
            .or_default()
            .insert(object_id.clone(), row);

        Ok(JsonMap::from_iter([
            ("objectId".to_string(), JsonValue::String(object_id)),
            ("createdAt".to_string(), now),
        ]))
    }

    async fn update(&self, class: &str, object_id: &str, body: JsonMap) -> DocumentResult<JsonMap> {
        let mut store = self.store.write().await;
        let row = store
            .get_mut(class)
            .and_then(|rows| rows.get_mut(object_id))
            .ok_or_else(|| not_found(class, object_id))?;

        // Apply to a copy so a failing operation leaves the row untouched.
        let mut updated = row.clone();
        for (key, value) in body {
            if matches!(key.as_str(), "objectId" | "createdAt" | "updatedAt") {
                continue;
            }
            apply_field(&mut updated, key, value)?;
        }

        let now = JsonValue::String(format_iso(&Utc::now()));
        updated.insert("updatedAt".to_string(), now.clone());
        *row = updated;

        debug!(class, object_id, "update");
        Ok(JsonMap::from_iter([("updatedAt".to_string(), now)]))
    }

    async fn remove(&self, class: &str, object_id: &str) -> DocumentResult<JsonMap> {
        self.store
            .write()
            .await
            .get_mut(class)
            .and_then(|rows| rows.remove(object_id))
            .ok_or_else(|| not_found(class, object_id))?;

        debug!(class, object_id, "delete");
        Ok(JsonMap::new())
    }

    fn call(&self, name: &str, params: JsonMap) -> DocumentResult<JsonMap> {
        let handler = self
            .functions
            .get(name)
            .ok_or_else(|| DocumentError::Transport(SCRIPT_FAILED, format!("function {name} not found")))?;

        debug!(function = name, "call");
        let result = handler(params)?;
        Ok(JsonMap::from_iter([("result".to_string(), result)]))
    }

    async fn dispatch(&self, method: Method, path: &str, body: Option<JsonMap>) -> DocumentResult<JsonMap> {
        match (method, Route::parse(path)?) {
            (Method::Get, Route::Class(class)) => self.query(&class, &QueryParams::new()).await,
            (Method::Get, Route::Instance(class, id)) => self.fetch(&class, id).await,
            (Method::Post, Route::Class(class)) => self.create(class, body.unwrap_or_default()).await,
            (Method::Post, Route::Function(name)) => self.call(name, body.unwrap_or_default()),
            (Method::Put, Route::Instance(class, id)) => self.update(&class, id, body.unwrap_or_default()).await,
            (Method::Delete, Route::Instance(class, id)) => self.remove(&class, id).await,
            (method, _) => Err(invalid(format!("{method:?} is not supported on {path}"))),
        }
    }

    async fn fetch(&self, class: &str, object_id: &str) -> DocumentResult<JsonMap> {
        self.row(class, object_id)
            .await
            .ok_or_else(|| not_found(class, object_id))
    }
}

/// Stores a written field, applying `__op` operations to the current value.
fn apply_field(row: &mut JsonMap, key: String, value: JsonValue) -> DocumentResult<()> {
    let op = value.get("__op").and_then(JsonValue::as_str);

    match op {
        None => {
            row.insert(key, value);
        }
        Some("Delete") => {
            row.remove(&key);
        }
        Some("Increment") => {
            let amount = value
                .get("amount")
                .and_then(JsonValue::as_number)
                .ok_or_else(|| invalid(format!("increment of {key} has no numeric amount")))?;

            let incremented = match row.get(&key) {
                None | Some(JsonValue::Null) => amount.clone(),
                Some(JsonValue::Number(current)) => add_numbers(current, amount)
                    .ok_or_else(|| invalid(format!("increment of {key} overflows")))?,
                Some(other) => return Err(invalid(format!("can not increment {key} holding {other}"))),
            };
            row.insert(key, JsonValue::Number(incremented));
        }
        Some(other) => return Err(invalid(format!("unsupported operation {other} on {key}"))),
    }

    Ok(())
}

fn add_numbers(left: &Number, right: &Number) -> Option<Number> {
    match (left.as_i64(), right.as_i64()) {
        (Some(left), Some(right)) => left.checked_add(right).map(Number::from),
        _ => Number::from_f64(left.as_f64()? + right.as_f64()?),
    }
}

fn usize_param(params: &QueryParams, key: &str) -> DocumentResult<Option<usize>> {
    params
        .get(key)
        .map(|value| {
            value
                .parse::<usize>()
                .map_err(|_| invalid(format!("{key} must be a non-negative integer, got {value}")))
        })
        .transpose()
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, path: &str, params: &QueryParams) -> DocumentResult<JsonMap> {
        match Route::parse(path)? {
            Route::Class(class) => self.query(&class, params).await,
            Route::Instance(class, id) => self.fetch(&class, id).await,
            Route::Function(_) => Err(invalid(format!("GET is not supported on {path}"))),
        }
    }

    async fn post(&self, path: &str, body: JsonMap) -> DocumentResult<JsonMap> {
        self.dispatch(Method::Post, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: JsonMap) -> DocumentResult<JsonMap> {
        self.dispatch(Method::Put, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> DocumentResult<JsonMap> {
        self.dispatch(Method::Delete, path, None).await
    }

    async fn batch(&self, requests: Vec<BatchRequest>) -> DocumentResult<Vec<BatchResponse>> {
        if requests.is_empty() {
            return Err(DocumentError::EmptyBatch);
        }

        debug!(size = requests.len(), "batch");

        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            let result = self.dispatch(request.method, &request.path, request.body).await;
            responses.push(BatchResponse::from(result));
        }

        Ok(responses)
    }
}

/// Builder for [`MemoryTransport`] instances with registered cloud functions.
///
/// ```ignore
/// let transport = MemoryTransport::builder()
///     .function("hello", |_| Ok(json!("Hello world!")))
///     .build()
///     .await?;
/// ```
#[derive(Default)]
pub struct MemoryTransportBuilder {
    functions: BTreeMap<String, FunctionHandler>,
}

impl MemoryTransportBuilder {
    pub fn function<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(JsonMap) -> DocumentResult<JsonValue> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(handler));
        self
    }
}

#[async_trait]
impl TransportBuilder for MemoryTransportBuilder {
    type Transport = MemoryTransport;

    async fn build(self) -> DocumentResult<Self::Transport> {
        Ok(MemoryTransport::with_functions(self.functions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: JsonValue) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn routes() {
        assert_eq!(Route::parse("classes/Order").unwrap(), Route::Class("Order".to_string()));
        assert_eq!(Route::parse("/classes/Order/x1").unwrap(), Route::Instance("Order".to_string(), "x1"));
        assert_eq!(Route::parse("users/u1").unwrap(), Route::Instance("_User".to_string(), "u1"));
        assert_eq!(Route::parse("functions/hello").unwrap(), Route::Function("hello"));
        assert!(Route::parse("login").is_err());
    }

    #[tokio::test]
    async fn create_update_delete() {
        let transport = MemoryTransport::new();

        let created = transport
            .post("classes/Order", body(json!({ "total": 3 })))
            .await
            .unwrap();
        let id = created["objectId"].as_str().unwrap().to_string();
        assert_eq!(id.len(), 10);
        assert!(created.contains_key("createdAt"));

        let updated = transport
            .put(
                &format!("classes/Order/{id}"),
                body(json!({ "total": { "__op": "Increment", "amount": 2 }, "note": "x" })),
            )
            .await
            .unwrap();
        assert!(updated.contains_key("updatedAt"));

        let row = transport.row("Order", &id).await.unwrap();
        assert_eq!(row["total"], json!(5));
        assert_eq!(row["note"], json!("x"));

        transport.delete(&format!("classes/Order/{id}")).await.unwrap();
        assert_eq!(transport.row_count("Order").await, 0);
        assert!(matches!(
            transport.delete(&format!("classes/Order/{id}")).await,
            Err(DocumentError::Transport(OBJECT_NOT_FOUND, _))
        ));
    }

    #[tokio::test]
    async fn queries_sort_page_and_count() {
        let transport = MemoryTransport::new();
        for score in [3, 1, 5, 2, 4] {
            transport.post("classes/Score", body(json!({ "score": score }))).await.unwrap();
        }

        let params = QueryParams::from_iter([
            ("where", r#"{"score":{"$gt":1}}"#),
            ("order", "-score"),
            ("skip", "1"),
            ("limit", "2"),
            ("count", "1"),
        ]);
        let response = transport.get("classes/Score", &params).await.unwrap();

        let scores = response["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["score"].as_i64().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(scores, vec![4, 3]);
        assert_eq!(response["count"], json!(4));
    }

    #[tokio::test]
    async fn batch_reports_each_item() {
        let transport = MemoryTransport::new();

        let responses = transport
            .batch(vec![
                BatchRequest::new(Method::Post, "classes/Order", Some(body(json!({ "total": 1 })))),
                BatchRequest::new(Method::Delete, "classes/Order/missing", None),
            ])
            .await
            .unwrap();

        assert!(matches!(responses[0], BatchResponse::Success(_)));
        assert!(matches!(responses[1], BatchResponse::Error { code: OBJECT_NOT_FOUND, .. }));
        assert_eq!(transport.batch(Vec::new()).await, Err(DocumentError::EmptyBatch));
    }

    #[tokio::test]
    async fn functions() {
        let transport = MemoryTransport::builder()
            .function("echo", |params| Ok(JsonValue::Object(params)))
            .build()
            .await
            .unwrap();

        let response = transport.post("functions/echo", body(json!({ "a": 1 }))).await.unwrap();
        assert_eq!(response["result"], json!({ "a": 1 }));

        assert!(matches!(
            transport.post("functions/missing", JsonMap::new()).await,
            Err(DocumentError::Transport(SCRIPT_FAILED, _))
        ));
    }
}
