//! Batched persistence.
//!
//! Saving or deleting many objects happens in two phases. Staging
//! ([`Object::stage_save`], [`Object::stage_delete`]) composes a [`StagedRequest`]
//! without I/O. The [`Batcher`] then submits the staged requests through
//! [`Transport::batch`](crate::transport::Transport::batch) and applies every response
//! to the object it was staged from, in submission order.

use tracing::{debug, warn};

use crate::{
    client::Client,
    error::{DocumentError, DocumentResult},
    object::Object,
    transport::{BatchRequest, BatchResponse},
};

/// The lifecycle operation a staged request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedKind {
    Create,
    Update,
    Delete,
}

/// A request composed for an object, waiting for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRequest {
    pub kind: StagedKind,
    pub request: BatchRequest,
}

/// Submits staged requests in chunks and routes the responses back.
#[derive(Debug, Clone, Copy)]
pub struct Batcher<'a> {
    client: &'a Client,
}

impl<'a> Batcher<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Creates or updates every object.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::EmptyBatch`] when `objects` is empty, and
    /// [`DocumentError::BatchItem`] for the first operation the service rejected.
    /// Objects whose operation succeeded are updated either way.
    pub async fn batch_save(&self, objects: &mut [Object]) -> DocumentResult<()> {
        let staged = objects
            .iter()
            .map(Object::stage_save)
            .collect::<DocumentResult<Vec<_>>>()?;

        self.submit(objects, staged).await
    }

    /// Deletes every object, clearing each one whose deletion succeeded.
    ///
    /// # Errors
    ///
    /// As [`Batcher::batch_save`]. Objects that were never saved make the whole call
    /// fail with [`DocumentError::UnsavedReference`] before anything is submitted.
    pub async fn batch_delete(&self, objects: &mut [Object]) -> DocumentResult<()> {
        let staged = objects
            .iter()
            .map(Object::stage_delete)
            .collect::<DocumentResult<Vec<_>>>()?;

        self.submit(objects, staged).await
    }

    async fn submit(&self, objects: &mut [Object], staged: Vec<StagedRequest>) -> DocumentResult<()> {
        if staged.is_empty() {
            return Err(DocumentError::EmptyBatch);
        }

        let batch_size = self.client.config().batch_size.max(1);
        let mut first_failure = None;

        for (chunk_index, (targets, chunk)) in objects
            .chunks_mut(batch_size)
            .zip(staged.chunks(batch_size))
            .enumerate()
        {
            let requests = chunk
                .iter()
                .map(|staged| staged.request.clone())
                .collect::<Vec<_>>();

            debug!(chunk = chunk_index, size = requests.len(), "submitting batch");
            let responses = self.client.transport().batch(requests).await?;

            if responses.len() != chunk.len() {
                return Err(DocumentError::InvalidPayload(format!(
                    "batch of {} requests answered with {} responses",
                    chunk.len(),
                    responses.len()
                )));
            }

            for (offset, ((object, staged), response)) in targets
                .iter_mut()
                .zip(chunk)
                .zip(responses)
                .enumerate()
            {
                let index = chunk_index * batch_size + offset;

                match response {
                    BatchResponse::Success(body) => {
                        if let Err(error) = object.apply_response(staged.kind, &body) {
                            warn!(index, %error, "batch item answered with a malformed body");
                            first_failure.get_or_insert(error);
                        }
                    }
                    BatchResponse::Error { code, message } => {
                        warn!(index, code, %message, "batch item failed");
                        first_failure.get_or_insert(DocumentError::BatchItem { index, code, message });
                    }
                }
            }
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    use crate::{
        config::ClientConfig,
        schema::SchemaBuilder,
        transport::{QueryParams, Transport},
        types::JsonMap,
    };

    /// Answers every create with a sequential id, rejects items named `bad` and
    /// answers items named `blank` with an empty body.
    #[derive(Debug, Default)]
    struct Recorder {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn get(&self, _path: &str, _params: &QueryParams) -> DocumentResult<JsonMap> {
            Ok(JsonMap::new())
        }

        async fn post(&self, _path: &str, _body: JsonMap) -> DocumentResult<JsonMap> {
            Ok(JsonMap::new())
        }

        async fn put(&self, _path: &str, _body: JsonMap) -> DocumentResult<JsonMap> {
            Ok(JsonMap::new())
        }

        async fn delete(&self, _path: &str) -> DocumentResult<JsonMap> {
            Ok(JsonMap::new())
        }

        async fn batch(&self, requests: Vec<BatchRequest>) -> DocumentResult<Vec<BatchResponse>> {
            let mut calls = self.calls.lock().unwrap();
            let offset = calls.iter().sum::<usize>();
            calls.push(requests.len());

            Ok(requests
                .iter()
                .enumerate()
                .map(|(index, request)| {
                    let bad = request
                        .body
                        .as_ref()
                        .is_some_and(|body| body.get("name") == Some(&json!("bad")));

                    let blank = request
                        .body
                        .as_ref()
                        .is_some_and(|body| body.get("name") == Some(&json!("blank")));

                    if bad {
                        BatchResponse::Error { code: 142, message: "rejected".into() }
                    } else if blank {
                        BatchResponse::Success(JsonMap::new())
                    } else {
                        let body = json!({
                            "objectId": format!("id{}", offset + index),
                            "createdAt": "2024-01-01T00:00:00.000Z",
                        });
                        BatchResponse::Success(body.as_object().cloned().unwrap_or_default())
                    }
                })
                .collect())
        }
    }

    fn objects(names: &[&str]) -> Vec<Object> {
        let schema = Arc::new(SchemaBuilder::new("Item").build().unwrap());
        names
            .iter()
            .map(|name| Object::with_attrs(schema.clone(), [("name", *name)]).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn submits_in_chunks_and_applies_in_order() {
        let recorder = Arc::new(Recorder::default());
        let client = Client::builder(recorder.clone())
            .config(ClientConfig::builder().batch_size(2).build().unwrap())
            .build()
            .unwrap();

        let mut items = objects(&["a", "b", "c", "d", "e"]);
        Batcher::new(&client).batch_save(&mut items).await.unwrap();

        assert_eq!(*recorder.calls.lock().unwrap(), vec![2, 2, 1]);
        let ids = items.iter().map(|item| item.object_id().unwrap()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["id0", "id1", "id2", "id3", "id4"]);
    }

    #[tokio::test]
    async fn item_failures_are_reported_after_successes() {
        let client = Client::builder(Recorder::default()).build().unwrap();

        let mut items = objects(&["a", "bad", "c"]);
        let result = Batcher::new(&client).batch_save(&mut items).await;

        assert_eq!(
            result,
            Err(DocumentError::BatchItem { index: 1, code: 142, message: "rejected".into() }),
        );
        assert!(items[0].is_saved());
        assert!(!items[1].is_saved());
        assert!(items[2].is_saved());
    }

    #[tokio::test]
    async fn malformed_bodies_do_not_stop_the_chunk() {
        let client = Client::builder(Recorder::default()).build().unwrap();

        let mut items = objects(&["a", "blank", "c"]);
        let result = Batcher::new(&client).batch_save(&mut items).await;

        assert!(matches!(result, Err(DocumentError::InvalidPayload(_))));
        assert!(items[0].is_saved());
        assert!(!items[1].is_saved());
        assert_eq!(items[2].object_id(), Some("id2"));
    }

    #[tokio::test]
    async fn empty_batches_are_rejected() {
        let client = Client::builder(Recorder::default()).build().unwrap();
        assert_eq!(
            Batcher::new(&client).batch_delete(&mut []).await,
            Err(DocumentError::EmptyBatch),
        );
    }
}
