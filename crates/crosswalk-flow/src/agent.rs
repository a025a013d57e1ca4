//! Typed client for the LLM agent service.
//!
//! Two operations: `enrich` (expand a control description; latency tail up
//! to a minute) and `reason` (produce a mapping rationale; sub-second).
//! Both are treated as idempotent and retried up to twice on transient
//! failure. Agent failures are never fatal to a workflow; callers degrade:
//! enrichment falls back to the raw description and reasoning falls back
//! to an empty string.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};

const MAX_ATTEMPTS: usize = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Request to expand a control description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichRequest {
    /// Framework name segment.
    pub framework_name: String,
    /// Framework version segment.
    pub framework_version: String,
    /// Control ID within the framework.
    pub short_id: String,
    /// Control title.
    pub title: String,
    /// Raw control description.
    pub description: String,
}

/// Response from an enrichment call.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichResponse {
    /// The expanded description.
    pub enriched_text: String,
    /// Service-reported status string.
    #[serde(default)]
    pub status: String,
}

/// The scored mapping a reasoning call explains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonMapping {
    /// Target control ID.
    pub target_control_id: String,
    /// Target framework key.
    pub target_framework: String,
    /// Target control text.
    pub text: String,
    /// Embedding similarity score.
    pub similarity_score: f64,
    /// Cross-encoder rerank score.
    pub rerank_score: f64,
}

/// Request for a mapping rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonRequest {
    /// Source control ID.
    pub source_control_id: String,
    /// Source control text (enriched when available).
    pub source_text: String,
    /// The mapping to explain.
    pub mapping: ReasonMapping,
}

/// Response from a reasoning call.
#[derive(Debug, Clone, Deserialize)]
pub struct ReasonResponse {
    /// Human-readable rationale.
    pub reasoning: String,
    /// Service-reported status string.
    #[serde(default)]
    pub status: String,
}

/// LLM agent operations used by the mapping workflow.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Expands a control description.
    async fn enrich(&self, request: EnrichRequest) -> Result<EnrichResponse>;

    /// Produces a rationale for one scored mapping.
    async fn reason(&self, request: ReasonRequest) -> Result<ReasonResponse>;
}

/// HTTP client for the agent service.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAgentClient {
    /// Creates a client targeting the given base URL with the configured
    /// timeouts.
    #[must_use]
    pub fn new(base_url: impl Into<String>, config: &PipelineConfig) -> Self {
        let client = reqwest::Client::builder()
            .read_timeout(config.agent_read_timeout)
            .timeout(config.agent_total_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            client,
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
                        tokio::time::sleep(RETRY_BACKOFF).await;
                        continue;
                    }
                    return Err(Error::agent(format!("{path} request failed: {e}")));
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Resp>()
                    .await
                    .map_err(|e| Error::agent(format!("invalid {path} response: {e}")));
            }

            if attempt < MAX_ATTEMPTS && Self::is_retryable_status(status) {
                tracing::debug!(path, %status, attempt, "retrying agent call");
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
            return Err(Error::agent(format!("{path} returned {status}")));
        }
        Err(Error::agent(format!("{path} failed after retry attempts")))
    }
}

#[async_trait]
impl Agent for HttpAgentClient {
    async fn enrich(&self, request: EnrichRequest) -> Result<EnrichResponse> {
        self.post_json("/api/v1/enrich", &request).await
    }

    async fn reason(&self, request: ReasonRequest) -> Result<ReasonResponse> {
        self.post_json("/api/v1/reason", &request).await
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

    fn enrich_request() -> EnrichRequest {
        EnrichRequest {
            framework_name: "AWS.EC2".to_string(),
            framework_version: "1.0".to_string(),
            short_id: "PR.1".to_string(),
            title: "Public access".to_string(),
            description: "Instances must not expose public IPs".to_string(),
        }
    }

    fn reason_request() -> ReasonRequest {
        ReasonRequest {
            source_control_id: "AWS.EC2#1.0#PR.1".to_string(),
            source_text: "Instances must not expose public IPs".to_string(),
            mapping: ReasonMapping {
                target_control_id: "AC-1".to_string(),
                target_framework: "NIST-SP-800-53#R5".to_string(),
                text: "Access control policy".to_string(),
                similarity_score: 0.9,
                rerank_score: 0.92,
            },
        }
    }

    #[tokio::test]
    async fn enrich_returns_text() {
        let app = Router::new().route(
            "/api/v1/enrich",
            post(|Json(req): Json<serde_json::Value>| async move {
                assert_eq!(req["short_id"], "PR.1");
                Json(serde_json::json!({
                    "enriched_text": "Expanded: public exposure of compute endpoints...",
                    "status": "ok",
                }))
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpAgentClient::new(base_url, &PipelineConfig::default());
        let response = client.enrich(enrich_request()).await.unwrap();
        assert!(response.enriched_text.starts_with("Expanded"));
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn enrich_retries_once_then_fails() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_state = attempts.clone();

        let app = Router::new().route(
            "/api/v1/enrich",
            post(move || {
                let attempts_state = attempts_state.clone();
                async move {
                    attempts_state.fetch_add(1, Ordering::SeqCst);
                    (
                        axum::http::StatusCode::SERVICE_UNAVAILABLE,
                        Json(serde_json::json!({ "message": "overloaded" })),
                    )
                }
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpAgentClient::new(base_url, &PipelineConfig::default());
        let err = client.enrich(enrich_request()).await.unwrap_err();
        assert!(matches!(err, Error::Agent { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn reason_returns_rationale() {
        let app = Router::new().route(
            "/api/v1/reason",
            post(|Json(req): Json<serde_json::Value>| async move {
                assert_eq!(req["mapping"]["target_control_id"], "AC-1");
                Json(serde_json::json!({
                    "reasoning": "Both controls restrict network exposure.",
                    "status": "ok",
                }))
            }),
        );
        let (base_url, shutdown) = spawn_server(app).await;

        let client = HttpAgentClient::new(base_url, &PipelineConfig::default());
        let response = client.reason(reason_request()).await.unwrap();
        assert!(response.reasoning.contains("network exposure"));
        let _ = shutdown.send(());
    }
}
