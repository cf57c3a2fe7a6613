//! # HTTP Gateway
//!
//! Exposes the prediction pipeline over HTTP. The gateway owns no model state
//! of its own: it shares one immutable [`PredictionContext`](crate::pipeline::PredictionContext)
//! across all requests and maps every failure to a uniform `400 Bad Request`.

mod server;

pub use server::{GatewayState, UPLOAD_FIELD, router, run};

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Deadline for one request from upload to response (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Decode and inference passes allowed to run at once. A pass abandoned
    /// at its deadline keeps its slot until it stops.
    #[serde(default = "default_max_concurrent_predictions")]
    pub max_concurrent_predictions: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_predictions: default_max_concurrent_predictions(),
        }
    }
}

impl GatewayConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_concurrent_predictions() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_concurrent_predictions, 4);
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_gateway_config_partial_deserialization() {
        let config: GatewayConfig = serde_json::from_str(r#"{"port": 9090}"#).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.request_timeout_secs, 30);
    }
}
