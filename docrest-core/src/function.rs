//! Cloud functions.

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{
    client::Client,
    error::{DocumentError, DocumentResult},
    types::JsonMap,
};

/// A server-side function, invoked by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    name: String,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> String {
        format!("functions/{}", self.name)
    }

    /// Invokes the function with `params` and returns its `result`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidPayload`] if the response carries no result.
    pub async fn call(&self, client: &Client, params: JsonMap) -> DocumentResult<JsonValue> {
        debug!(function = %self.name, "calling function");

        let mut response = client.transport().post(&self.path(), params).await?;
        response.remove("result").ok_or_else(|| {
            DocumentError::InvalidPayload(format!("function {} returned no result", self.name))
        })
    }
}
