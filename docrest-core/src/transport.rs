//! The boundary to the remote service.
//!
//! A [`Transport`] issues the REST calls of the service: the plain verbs against
//! class and instance paths and the batch endpoint. Paths are relative to the API
//! root, e.g. `classes/GameScore/abc` or `users`. Implementations own the HTTP
//! client and authentication; this crate never performs I/O except through them.
//!
//! # Traits
//!
//! - [`Transport`]: the request interface
//! - [`TransportBuilder`]: factory trait for creating transport instances
//!
//! # Example
//!
//! ```ignore
//! use docrest_core::transport::{QueryParams, Transport};
//!
//! let mut params = QueryParams::new();
//! params.insert("limit", "10");
//! let page = transport.get("classes/GameScore", &params).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use crate::{
    error::{DocumentError, DocumentResult},
    types::JsonMap,
};

/// Abstract interface to the remote REST service.
///
/// # Thread Safety
///
/// Implementations must be usable from several tasks at once.
///
/// # Error Handling
///
/// Failures reported by the service are returned as
/// [`DocumentError::Transport`] carrying the service error code.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Issues a GET. Collection paths answer `{"results": [...]}`, with a `count`
    /// key when counting was requested; instance paths answer the stored object.
    async fn get(&self, path: &str, params: &QueryParams) -> DocumentResult<JsonMap>;

    /// Issues a POST with a JSON body.
    async fn post(&self, path: &str, body: JsonMap) -> DocumentResult<JsonMap>;

    /// Issues a PUT with a JSON body.
    async fn put(&self, path: &str, body: JsonMap) -> DocumentResult<JsonMap>;

    /// Issues a DELETE.
    async fn delete(&self, path: &str) -> DocumentResult<JsonMap>;

    /// Submits several requests in one call.
    ///
    /// Returns one response per request, in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::EmptyBatch`] when `requests` is empty. Failures of
    /// single requests are reported as [`BatchResponse::Error`], not as an `Err`.
    async fn batch(&self, requests: Vec<BatchRequest>) -> DocumentResult<Vec<BatchResponse>>;
}

#[async_trait]
impl<T> Transport for &T
where
    T: Transport + ?Sized,
{
    async fn get(&self, path: &str, params: &QueryParams) -> DocumentResult<JsonMap> {
        (**self).get(path, params).await
    }

    async fn post(&self, path: &str, body: JsonMap) -> DocumentResult<JsonMap> {
        (**self).post(path, body).await
    }

    async fn put(&self, path: &str, body: JsonMap) -> DocumentResult<JsonMap> {
        (**self).put(path, body).await
    }

    async fn delete(&self, path: &str) -> DocumentResult<JsonMap> {
        (**self).delete(path).await
    }

    async fn batch(&self, requests: Vec<BatchRequest>) -> DocumentResult<Vec<BatchResponse>> {
        (**self).batch(requests).await
    }
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn get(&self, path: &str, params: &QueryParams) -> DocumentResult<JsonMap> {
        (**self).get(path, params).await
    }

    async fn post(&self, path: &str, body: JsonMap) -> DocumentResult<JsonMap> {
        (**self).post(path, body).await
    }

    async fn put(&self, path: &str, body: JsonMap) -> DocumentResult<JsonMap> {
        (**self).put(path, body).await
    }

    async fn delete(&self, path: &str) -> DocumentResult<JsonMap> {
        (**self).delete(path).await
    }

    async fn batch(&self, requests: Vec<BatchRequest>) -> DocumentResult<Vec<BatchResponse>> {
        (**self).batch(requests).await
    }
}

/// Factory trait for transports that need asynchronous setup.
#[async_trait]
pub trait TransportBuilder {
    type Transport: Transport;

    async fn build(self) -> DocumentResult<Self::Transport>;
}

/// HTTP method of a batched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// One request of a batch, in the shape the batch endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonMap>,
}

impl BatchRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Option<JsonMap>) -> Self {
        Self { method, path: path.into(), body }
    }
}

/// The outcome of one batched request.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResponse {
    Success(JsonMap),
    Error { code: i64, message: String },
}

impl BatchResponse {
    /// Parses `{"success": {...}}` or `{"error": {"code": n, "error": "..."}}`.
    pub fn from_json(json: &JsonValue) -> DocumentResult<Self> {
        if let Some(success) = json.get("success") {
            return match success {
                JsonValue::Object(map) => Ok(BatchResponse::Success(map.clone())),
                JsonValue::Null => Ok(BatchResponse::Success(JsonMap::new())),
                other => Err(DocumentError::InvalidPayload(format!(
                    "batch success must be an object, got {other}"
                ))),
            };
        }

        match json.get("error") {
            Some(error) => Ok(BatchResponse::Error {
                code: error.get("code").and_then(JsonValue::as_i64).unwrap_or_default(),
                message: error
                    .get("error")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            None => Err(DocumentError::InvalidPayload(format!(
                "batch response has neither success nor error: {json}"
            ))),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            BatchResponse::Success(map) => json!({ "success": map }),
            BatchResponse::Error { code, message } => {
                json!({ "error": { "code": code, "error": message } })
            }
        }
    }
}

impl From<DocumentResult<JsonMap>> for BatchResponse {
    fn from(result: DocumentResult<JsonMap>) -> Self {
        match result {
            Ok(map) => BatchResponse::Success(map),
            Err(DocumentError::Transport(code, message)) => BatchResponse::Error { code, message },
            Err(other) => BatchResponse::Error { code: 0, message: other.to_string() },
        }
    }
}

/// URL query parameters of a GET.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        QueryParams(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
