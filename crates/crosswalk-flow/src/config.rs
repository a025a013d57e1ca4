//! Pipeline configuration.
//!
//! All tunables are process-startup input loaded from `CROSSWALK_*`
//! environment variables; there is no global mutable state.

use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for the mapping pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Embedding model version; keys the embedding cache. Changing it
    /// invalidates cached embeddings without migration.
    pub model_version: String,
    /// Enrichment version; stamped on enrichment cache entries. Changing
    /// it forces re-enrichment for new reads only.
    pub enrichment_version: String,
    /// Retrieval cut: number of candidates passed to rerank.
    pub top_k: usize,
    /// Minimum rerank score; candidates below are dropped.
    pub rerank_min: f64,
    /// Maximum concurrent reasoning calls per run.
    pub reasoning_concurrency: usize,
    /// Batch size for target embedding calls.
    pub embed_batch_size: usize,
    /// Expected embedding dimension.
    pub embedding_dim: usize,
    /// Per-attempt read timeout for the inference service.
    pub science_read_timeout: Duration,
    /// Overall timeout for one inference call including retries.
    pub science_total_timeout: Duration,
    /// Per-attempt read timeout for the agent service.
    pub agent_read_timeout: Duration,
    /// Overall timeout for one agent call including retries.
    pub agent_total_timeout: Duration,
    /// Overall soft budget for one workflow run.
    pub workflow_budget: Duration,
    /// Queue visibility timeout for in-flight messages.
    pub visibility_timeout: Duration,
    /// Deliveries before a message moves to the DLQ.
    pub max_receive_count: u32,
    /// Job record time-to-live.
    pub job_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_version: "v1".to_string(),
            enrichment_version: "v1".to_string(),
            top_k: 20,
            rerank_min: 0.5,
            reasoning_concurrency: 5,
            embed_batch_size: 32,
            embedding_dim: 4096,
            science_read_timeout: Duration::from_secs(30),
            science_total_timeout: Duration::from_secs(120),
            agent_read_timeout: Duration::from_secs(60),
            agent_total_timeout: Duration::from_secs(120),
            workflow_budget: Duration::from_secs(540),
            visibility_timeout: Duration::from_secs(360),
            max_receive_count: 3,
            job_ttl: Duration::from_secs(604_800),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().map(Some).map_err(|e| {
            Error::Core(crosswalk_core::Error::serialization(format!(
                "invalid {name}={raw}: {e}"
            )))
        }),
        Err(_) => Ok(None),
    }
}

fn secs_env(name: &str) -> Result<Option<Duration>> {
    Ok(parse_env::<u64>(name)?.map(Duration::from_secs))
}

impl PipelineConfig {
    /// Loads configuration from `CROSSWALK_*` environment variables,
    /// falling back to the documented defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = parse_env("CROSSWALK_MODEL_VERSION")? {
            config.model_version = v;
        }
        if let Some(v) = parse_env("CROSSWALK_ENRICHMENT_VERSION")? {
            config.enrichment_version = v;
        }
        if let Some(v) = parse_env("CROSSWALK_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = parse_env("CROSSWALK_RERANK_MIN")? {
            config.rerank_min = v;
        }
        if let Some(v) = parse_env("CROSSWALK_REASONING_CONCURRENCY")? {
            config.reasoning_concurrency = v;
        }
        if let Some(v) = parse_env("CROSSWALK_EMBED_BATCH_SIZE")? {
            config.embed_batch_size = v;
        }
        if let Some(v) = parse_env("CROSSWALK_EMBEDDING_DIM")? {
            config.embedding_dim = v;
        }
        if let Some(v) = secs_env("CROSSWALK_SCIENCE_READ_TIMEOUT_SECS")? {
            config.science_read_timeout = v;
        }
        if let Some(v) = secs_env("CROSSWALK_SCIENCE_TOTAL_TIMEOUT_SECS")? {
            config.science_total_timeout = v;
        }
        if let Some(v) = secs_env("CROSSWALK_AGENT_READ_TIMEOUT_SECS")? {
            config.agent_read_timeout = v;
        }
        if let Some(v) = secs_env("CROSSWALK_AGENT_TOTAL_TIMEOUT_SECS")? {
            config.agent_total_timeout = v;
        }
        if let Some(v) = secs_env("CROSSWALK_WORKFLOW_BUDGET_SECS")? {
            config.workflow_budget = v;
        }
        if let Some(v) = secs_env("CROSSWALK_VISIBILITY_TIMEOUT_SECS")? {
            config.visibility_timeout = v;
        }
        if let Some(v) = parse_env("CROSSWALK_MAX_RECEIVE_COUNT")? {
            config.max_receive_count = v;
        }
        if let Some(v) = secs_env("CROSSWALK_JOB_TTL_SECS")? {
            config.job_ttl = v;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.model_version, "v1");
        assert_eq!(config.top_k, 20);
        assert!((config.rerank_min - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.reasoning_concurrency, 5);
        assert_eq!(config.embed_batch_size, 32);
        assert_eq!(config.embedding_dim, 4096);
        assert_eq!(config.workflow_budget, Duration::from_secs(540));
        assert_eq!(config.visibility_timeout, Duration::from_secs(360));
        assert_eq!(config.max_receive_count, 3);
        assert_eq!(config.job_ttl, Duration::from_secs(604_800));
    }
}
