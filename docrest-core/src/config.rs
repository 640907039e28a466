//! Client configuration.
//!
//! Every setting has a default, so a configuration can be read from a partial
//! JSON document:
//!
//! ```ignore
//! let config = ClientConfig::from_json(r#"{ "application_id": "app", "batch_size": 20 }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, DocumentResult};

/// The largest number of requests the service accepts in one batch.
pub const MAX_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base url of the REST API. Transports resolve request paths against it.
    pub api_root: String,
    pub application_id: Option<String>,
    pub rest_api_key: Option<String>,
    pub master_key: Option<String>,
    /// Requests per batch call.
    pub batch_size: usize,
    /// How many levels of pointers are fetched when a resource is read.
    pub pointer_depth: usize,
    /// Reject classes that were not registered instead of reading them untyped.
    pub strict_types: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_root: "https://api.parse.com/1".to_string(),
            application_id: None,
            rest_api_key: None,
            master_key: None,
            batch_size: MAX_BATCH_SIZE,
            pointer_depth: 1,
            strict_types: false,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Reads a configuration from JSON and validates it.
    pub fn from_json(input: &str) -> DocumentResult<Self> {
        let config: ClientConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`DocumentError::Configuration`] for an empty API root or a batch size
    /// outside `1..=50`.
    pub fn validate(&self) -> DocumentResult<()> {
        if self.api_root.trim().is_empty() {
            return Err(DocumentError::Configuration("api_root must not be empty".to_string()));
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(DocumentError::Configuration(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn api_root(mut self, api_root: impl Into<String>) -> Self {
        self.config.api_root = api_root.into();
        self
    }

    pub fn application_id(mut self, application_id: impl Into<String>) -> Self {
        self.config.application_id = Some(application_id.into());
        self
    }

    pub fn rest_api_key(mut self, rest_api_key: impl Into<String>) -> Self {
        self.config.rest_api_key = Some(rest_api_key.into());
        self
    }

    pub fn master_key(mut self, master_key: impl Into<String>) -> Self {
        self.config.master_key = Some(master_key.into());
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn pointer_depth(mut self, pointer_depth: usize) -> Self {
        self.config.pointer_depth = pointer_depth;
        self
    }

    pub fn strict_types(mut self, strict_types: bool) -> Self {
        self.config.strict_types = strict_types;
        self
    }

    pub fn build(self) -> DocumentResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
