//! API server configuration.

use std::net::SocketAddr;

use crosswalk_flow::config::PipelineConfig;

/// Configuration for the crosswalk API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Socket address to bind.
    pub bind_addr: SocketAddr,
    /// Development posture: pretty logs and in-memory backends allowed.
    pub debug: bool,
    /// Pipeline tunables shared with the processing side (queue
    /// parameters, job TTL).
    pub pipeline: PipelineConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            debug: false,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `CROSSWALK_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a set variable fails to parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self {
            pipeline: PipelineConfig::from_env()
                .map_err(|e| anyhow::anyhow!("loading pipeline config: {e}"))?,
            ..Self::default()
        };
        if let Ok(raw) = std::env::var("CROSSWALK_BIND_ADDR") {
            config.bind_addr = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid CROSSWALK_BIND_ADDR {raw}: {e}"))?;
        }
        if let Ok(raw) = std::env::var("CROSSWALK_DEBUG") {
            config.debug = raw.eq_ignore_ascii_case("true") || raw == "1";
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_all_interfaces() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(!config.debug);
    }
}
