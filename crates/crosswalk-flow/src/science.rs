//! Typed client for the ML inference service.
//!
//! The inference service exposes three synchronous, side-effect-free
//! endpoints: `/api/v1/embed`, `/api/v1/retrieve`, `/api/v1/rerank`.
//! All three are idempotent, so transient failures (5xx, timeouts) are
//! retried up to three times with exponential backoff before surfacing as
//! [`Error::Science`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};

const MAX_ATTEMPTS: usize = 3;
const RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_secs(2),
];

/// Tolerance for the unit-norm check on returned embeddings.
const UNIT_NORM_EPSILON: f64 = 1e-6;

/// A returned embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// Fixed-dimension unit-norm vector.
    pub vector: Vec<f32>,
    /// Whether the service answered from its own cache.
    pub cache_hit: bool,
}

/// One retrieval result: an index into the submitted target list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalHit {
    /// Index of the target vector this hit refers to.
    pub index: usize,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f64,
}

/// A candidate submitted for reranking.
#[derive(Debug, Clone, Serialize)]
pub struct RerankCandidate {
    /// Caller-chosen candidate ID (the control key).
    pub id: String,
    /// Candidate text.
    pub text: String,
}

/// One rerank result.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankScore {
    /// The candidate ID this score refers to.
    pub id: String,
    /// Cross-encoder score in `[0, 1]`.
    pub score: f64,
}

/// ML inference operations used by the mapping workflow.
///
/// Implementations must be idempotent and side-effect-free; the workflow
/// retries freely.
#[async_trait]
pub trait Science: Send + Sync {
    /// Embeds one control text into a unit-norm vector.
    async fn embed(&self, control_id: &str, text: &str) -> Result<Embedding>;

    /// Scores all target vectors against the source and returns at most
    /// `top_k` hits ordered by similarity descending.
    async fn retrieve(
        &self,
        source: &[f32],
        targets: &[Vec<f32>],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>>;

    /// Cross-encodes the source text against each candidate and returns
    /// scores ordered descending.
    async fn rerank(
        &self,
        source_text: &str,
        candidates: &[RerankCandidate],
    ) -> Result<Vec<RerankScore>>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    control_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    cache_hit: bool,
}

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    source_embedding: &'a [f32],
    target_embeddings: &'a [Vec<f32>],
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    candidates: Vec<RetrieveCandidate>,
}

#[derive(Debug, Deserialize)]
struct RetrieveCandidate {
    index: usize,
    similarity_score: f64,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    source_text: &'a str,
    candidates: &'a [RerankCandidate],
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    rankings: Vec<Ranking>,
}

#[derive(Debug, Deserialize)]
struct Ranking {
    control_id: String,
    rerank_score: f64,
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// HTTP client for the inference service.
#[derive(Debug, Clone)]
pub struct HttpScienceClient {
    base_url: String,
    client: reqwest::Client,
    embedding_dim: usize,
}

impl HttpScienceClient {
    /// Creates a client targeting the given base URL with the configured
    /// timeouts and expected embedding dimension.
    #[must_use]
    pub fn new(base_url: impl Into<String>, config: &PipelineConfig) -> Self {
        let client = reqwest::Client::builder()
            .read_timeout(config.science_read_timeout)
            .timeout(config.science_total_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            client,
            embedding_dim: config.embedding_dim,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }

    fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
        error.is_connect() || error.is_timeout()
    }

    async fn post_json<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: serde::de::DeserializeOwned,
    {
        let url = self.url(path);
        for attempt in 1..=MAX_ATTEMPTS {
            let response = match self.client.post(&url).json(request).send().await {
                Ok(response) => response,
                Err(e) => {
                    if attempt < MAX_ATTEMPTS && Self::is_retryable_transport_error(&e) {
                        tokio::time::sleep(RETRY_BACKOFF[attempt - 1]).await;
                        continue;
                    }
                    return Err(Error::science(format!("{path} request failed: {e}")));
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.json::<Resp>().await.map_err(|e| {
                    Error::science(format!("invalid {path} response: {e}"))
                });
            }

            if attempt < MAX_ATTEMPTS && Self::is_retryable_status(status) {
                tracing::debug!(path, %status, attempt, "retrying inference call");
                tokio::time::sleep(RETRY_BACKOFF[attempt - 1]).await;
                continue;
            }
            return Err(Error::science(format!("{path} returned {status}")));
        }
        Err(Error::science(format!("{path} failed after retry attempts")))
    }

    fn validate_embedding(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.embedding_dim {
            return Err(Error::science(format!(
                "embedding has dimension {}, expected {}",
                vector.len(),
                self.embedding_dim
            )));
        }
        let norm_sq: f64 = vector.iter().map(|x| f64::from(*x) * f64::from(*x)).sum();
        if (norm_sq.sqrt() - 1.0).abs() > UNIT_NORM_EPSILON {
            return Err(Error::science(format!(
                "embedding is not unit-norm (|v| = {:.8})",
                norm_sq.sqrt()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Science for HttpScienceClient {
    async fn embed(&self, control_id: &str, text: &str) -> Result<Embedding> {
        let response: EmbedResponse = self
            .post_json("/api/v1/embed", &EmbedRequest { control_id, text })
            .await?;
        self.validate_embedding(&response.embedding)?;
        Ok(Embedding {
            vector: response.embedding,
            cache_hit: response.cache_hit,
        })
    }

    async fn retrieve(
        &self,
        source: &[f32],
        targets: &[Vec<f32>],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>> {
        let response: RetrieveResponse = self
            .post_json(
                "/api/v1/retrieve",
                &RetrieveRequest {
                    source_embedding: source,
                    target_embeddings: targets,
                    top_k,
                },
            )
            .await?;
        let mut hits = Vec::with_capacity(response.candidates.len());
        for candidate in response.candidates {
            if candidate.index >= targets.len() {
                return Err(Error::science(format!(
                    "retrieve returned out-of-range index {}",
                    candidate.index
                )));
            }
            hits.push(RetrievalHit {
                index: candidate.index,
                similarity: candidate.similarity_score,
            });
        }
        Ok(hits)
    }

    async fn rerank(
        &self,
        source_text: &str,
        candidates: &[RerankCandidate],
    ) -> Result<Vec<RerankScore>> {
        let response: RerankResponse = self
            .post_json(
                "/api/v1/rerank",
                &RerankRequest {
                    source_text,
                    candidates,
                },
            )
            .await?;
        Ok(response
            .rankings
            .into_iter()
            .map(|r| RerankScore {
                id: r.control_id,
                score: r.rerank_score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn test_config(dim: usize) -> PipelineConfig {
        PipelineConfig {
            embedding_dim: dim,
            science_read_timeout: Duration::from_secs(2),
            science_total_timeout: Duration::from_secs(5),
            ..PipelineConfig::default()
        }
    }

    fn unit_vector(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[0] = 1.0;
        v
    }

    async fn spawn_server(app: Router) -> (String, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve test app");
        });

        (format!("http://{addr}"), shutdown_tx)
    }

    #[tokio::test]
    async fn embed_returns_validated_vector() {
        let app = Router::new().route(
            "/api/v1/embed",
            post(|| async {
                Json(serde_json::json!({
                    "embedding": [1.0, 0.0, 0.0, 0.0],
                    "cache_hit": true,
                }))
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpScienceClient::new(base_url, &test_config(4));
        let embedding = client.embed("AWS.EC2#1.0#PR.1", "some text").await.unwrap();
        assert_eq!(embedding.vector.len(), 4);
        assert!(embedding.cache_hit);
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn embed_rejects_non_unit_norm_vector() {
        let app = Router::new().route(
            "/api/v1/embed",
            post(|| async {
                Json(serde_json::json!({ "embedding": [0.5, 0.5, 0.0, 0.0] }))
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpScienceClient::new(base_url, &test_config(4));
        let err = client.embed("c", "t").await.unwrap_err();
        assert!(err.to_string().contains("unit-norm"));
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn embed_rejects_wrong_dimension() {
        let app = Router::new().route(
            "/api/v1/embed",
            post(|| async { Json(serde_json::json!({ "embedding": [1.0, 0.0] })) }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpScienceClient::new(base_url, &test_config(4));
        let err = client.embed("c", "t").await.unwrap_err();
        assert!(err.to_string().contains("dimension"));
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn retries_on_503_then_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_state = attempts.clone();

        let app = Router::new().route(
            "/api/v1/embed",
            post(move || {
                let attempts_state = attempts_state.clone();
                async move {
                    let n = attempts_state.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        (
                            axum::http::StatusCode::SERVICE_UNAVAILABLE,
                            Json(serde_json::json!({ "message": "warming up" })),
                        )
                    } else {
                        (
                            axum::http::StatusCode::OK,
                            Json(serde_json::json!({ "embedding": [1.0, 0.0, 0.0, 0.0] })),
                        )
                    }
                }
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpScienceClient::new(base_url, &test_config(4));
        let embedding = client.embed("c", "t").await.unwrap();
        assert_eq!(embedding.vector, unit_vector(4));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_science_error() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_state = attempts.clone();

        let app = Router::new().route(
            "/api/v1/embed",
            post(move || {
                let attempts_state = attempts_state.clone();
                async move {
                    attempts_state.fetch_add(1, Ordering::SeqCst);
                    (
                        axum::http::StatusCode::SERVICE_UNAVAILABLE,
                        Json(serde_json::json!({ "message": "down" })),
                    )
                }
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpScienceClient::new(base_url, &test_config(4));
        let err = client.embed("c", "t").await.unwrap_err();
        assert!(matches!(err, Error::Science { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn client_error_does_not_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_state = attempts.clone();

        let app = Router::new().route(
            "/api/v1/embed",
            post(move || {
                let attempts_state = attempts_state.clone();
                async move {
                    attempts_state.fetch_add(1, Ordering::SeqCst);
                    (
                        axum::http::StatusCode::BAD_REQUEST,
                        Json(serde_json::json!({ "message": "bad input" })),
                    )
                }
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpScienceClient::new(base_url, &test_config(4));
        let err = client.embed("c", "t").await.unwrap_err();
        assert!(err.to_string().contains("400"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn retrieve_maps_candidates_and_checks_indexes() {
        let app = Router::new().route(
            "/api/v1/retrieve",
            post(|| async {
                Json(serde_json::json!({
                    "candidates": [
                        { "index": 0, "similarity_score": 0.90 },
                        { "index": 2, "similarity_score": 0.70 },
                    ]
                }))
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpScienceClient::new(base_url, &test_config(4));
        let targets = vec![unit_vector(4), unit_vector(4), unit_vector(4)];
        let hits = client
            .retrieve(&unit_vector(4), &targets, 20)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].index, 0);
        assert!((hits[1].similarity - 0.70).abs() < 1e-9);

        // An index past the submitted targets is a protocol violation.
        let short = vec![unit_vector(4)];
        let err = client
            .retrieve(&unit_vector(4), &short, 20)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("out-of-range"));
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn rerank_maps_rankings() {
        let app = Router::new().route(
            "/api/v1/rerank",
            post(|| async {
                Json(serde_json::json!({
                    "rankings": [
                        { "control_id": "NIST-SP-800-53#R5#AC-1", "rerank_score": 0.92 },
                        { "control_id": "NIST-SP-800-53#R5#AC-3", "rerank_score": 0.55 },
                    ]
                }))
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpScienceClient::new(base_url, &test_config(4));
        let candidates = vec![
            RerankCandidate {
                id: "NIST-SP-800-53#R5#AC-1".to_string(),
                text: "policy".to_string(),
            },
            RerankCandidate {
                id: "NIST-SP-800-53#R5#AC-3".to_string(),
                text: "enforcement".to_string(),
            },
        ];
        let scores = client.rerank("source text", &candidates).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].id, "NIST-SP-800-53#R5#AC-1");
        assert!((scores[0].score - 0.92).abs() < 1e-9);
        let _ = shutdown.send(());
    }
}
