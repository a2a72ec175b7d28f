//! # Embedding generation
//!
//! Turns text into fixed-dimension vectors by calling an external,
//! OpenAI-compatible `/embeddings` endpoint.
//!
//! - [`Embedder`] is the seam: the pipeline only ever talks to the trait, so
//!   tests and alternative backends plug in without touching retrieval code.
//! - [`OpenAiEmbedder`] is the production client. It is an explicit object
//!   built from [`RecommenderConfig`]; it never looks up credentials itself.
//! - [`embed_all`] embeds a whole catalog with a bounded number of requests in
//!   flight and hands the vectors back **in input order**, because position
//!   `i` of the index must be the embedding of catalog entry `i`.
//!
//! ## Failure classification
//! | Cause                                   | Error                           |
//! |-----------------------------------------|---------------------------------|
//! | timeout, connection failure             | [`RecommendError::Transient`]   |
//! | HTTP 408, 429, 5xx                      | [`RecommendError::Transient`]   |
//! | any other non-2xx (401, 403, 404, ...)  | [`RecommendError::Fatal`]       |
//! | malformed or empty response             | [`RecommendError::Fatal`]       |

use async_trait::async_trait;
use futures::{StreamExt, stream};
use indicatif::ProgressBar;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RecommenderConfig;
use crate::error::{RecommendError, Result};
use crate::retry::RetryPolicy;

const SERVICE: &str = "embeddings";

/// Anything that can turn text into a vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifier of the model producing the vectors.
    fn model(&self) -> &str;
}

/// Client for an OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_base: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecommendError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn from_config(config: &RecommenderConfig) -> Result<Self> {
        Self::new(
            &config.api_base,
            config.api_key.clone(),
            config.embedding_model.clone(),
            config.request_timeout(),
        )
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: [text],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let mut parsed: EmbeddingResponse =
            response.json().await.map_err(|e| RecommendError::Fatal {
                service: SERVICE,
                message: format!("malformed embedding response: {e}"),
            })?;

        parsed.data.sort_by_key(|d| d.index);
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RecommendError::Fatal {
                service: SERVICE,
                message: "response contained no embedding".into(),
            })?;

        debug!("Embedded {} chars into {} dims", text.len(), vector.len());
        Ok(vector)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

pub(crate) fn classify_transport(err: reqwest::Error) -> RecommendError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RecommendError::Transient {
            service: SERVICE,
            message: err.to_string(),
        }
    } else {
        RecommendError::Fatal {
            service: SERVICE,
            message: err.to_string(),
        }
    }
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> RecommendError {
    let message = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    };

    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RecommendError::Transient {
            service: SERVICE,
            message,
        }
    } else {
        RecommendError::Fatal {
            service: SERVICE,
            message,
        }
    }
}

/// Embed `texts` with at most `concurrency` requests in flight.
///
/// Vectors come back in the order of `texts` regardless of completion order.
/// The first error that survives `retry` aborts the whole run; in-flight
/// requests are dropped with the stream.
pub async fn embed_all<E>(
    embedder: &E,
    texts: &[String],
    concurrency: usize,
    retry: &RetryPolicy,
    progress: &ProgressBar,
) -> Result<Vec<Vec<f32>>>
where
    E: Embedder + ?Sized,
{
    info!(
        "Embedding {} texts with {} (concurrency {})",
        texts.len(),
        embedder.model(),
        concurrency
    );

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

    let mut pending = stream::iter(texts.iter().enumerate())
        .map(move |(position, text)| async move {
            let vector = retry.run(move || embedder.embed(text)).await?;
            Ok::<_, RecommendError>((position, vector))
        })
        .buffer_unordered(concurrency.max(1));

    while let Some(result) = pending.next().await {
        let (position, vector) = result?;
        slots[position] = Some(vector);
        progress.inc(1);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(position, slot)| {
            slot.ok_or_else(|| RecommendError::Fatal {
                service: SERVICE,
                message: format!("no embedding produced for position {position}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FlakyEmbedder, VocabularyEmbedder};
    use httpmock::prelude::*;
    use serde_json::json;

    fn embedder_for(server: &MockServer) -> OpenAiEmbedder {
        OpenAiEmbedder::new(
            &server.base_url(),
            "test-key",
            "text-embedding-3-small",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn embeds_through_http() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "object": "list",
                    "data": [{"object": "embedding", "index": 0, "embedding": [0.25, -0.5, 1.0]}],
                    "model": "text-embedding-3-small"
                }));
            })
            .await;

        let vector = embedder_for(&server).embed("etichette adesive").await.unwrap();

        mock.assert_async().await;
        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(429).body("slow down");
            })
            .await;

        let err = embedder_for(&server).embed("x").await.unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
    }

    #[tokio::test]
    async fn auth_failure_is_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(401).body("invalid api key");
            })
            .await;

        let err = embedder_for(&server).embed("x").await.unwrap_err();
        assert!(matches!(err, RecommendError::Fatal { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_response_is_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({"data": []}));
            })
            .await;

        let err = embedder_for(&server).embed("x").await.unwrap_err();
        assert!(matches!(err, RecommendError::Fatal { .. }));
    }

    #[tokio::test]
    async fn server_errors_exhaust_into_unavailable() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(503);
            })
            .await;

        let embedder = &embedder_for(&server);
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let err = policy.run(move || embedder.embed("x")).await.unwrap_err();

        mock.assert_calls_async(2).await;
        assert!(matches!(err, RecommendError::Unavailable { attempts: 2, .. }));
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").is_retryable());
        assert!(!classify_status(StatusCode::NOT_FOUND, "model not found").is_retryable());
        assert!(!classify_status(StatusCode::FORBIDDEN, "").is_retryable());
    }

    #[tokio::test]
    async fn embed_all_preserves_input_order() {
        let embedder = VocabularyEmbedder::default();
        let texts: Vec<String> = (0..32)
            .map(|i| if i % 2 == 0 { "etichette".into() } else { "pilot giallo".into() })
            .collect();

        let vectors = embed_all(&embedder, &texts, 4, &RetryPolicy::none(), &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(vectors.len(), texts.len());
        for (text, vector) in texts.iter().zip(&vectors) {
            assert_eq!(vector, &embedder.vector_for(text));
        }
    }

    #[tokio::test]
    async fn embed_all_retries_transient_failures() {
        let embedder = FlakyEmbedder::new(VocabularyEmbedder::default(), 2);
        let texts = vec!["etichette".to_string(), "trapano".to_string()];
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let vectors = embed_all(&embedder, &texts, 1, &policy, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
    }

    #[tokio::test]
    async fn embed_all_aborts_on_exhausted_retries() {
        let embedder = FlakyEmbedder::new(VocabularyEmbedder::default(), usize::MAX);
        let texts = vec!["etichette".to_string()];
        let policy = RetryPolicy::new(2, Duration::ZERO);

        let err = embed_all(&embedder, &texts, 2, &policy, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendError::Unavailable { .. }));
    }
}
