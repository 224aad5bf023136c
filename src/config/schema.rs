//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every field
//! has a default, so an empty file is a valid configuration.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::SetupError;
use crate::transform::{Aes128CbcEncrypt, AsciiCase, BlockCodec, BlockTransform, Identity, Xor};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Where clients connect.
    pub listener: ListenerConfig,

    /// Where relayed bodies go.
    pub target: TargetConfig,

    /// Framing and buffering limits.
    pub pipeline: PipelineConfig,

    /// Block transform applied to every body.
    pub transform: TransformConfig,

    pub timeouts: TimeoutConfig,

    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// The only request path that is relayed.
    pub path: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_connections: 10_000,
            path: "/chunked".to_string(),
        }
    }
}

/// Downstream peer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Target address (e.g., "127.0.0.1:8080"). Also sent as the Host header.
    pub address: String,

    /// Request path used on the target.
    pub path: String,

    pub content_type: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            path: "/chunked".to_string(),
            content_type: "application/octet-stream".to_string(),
        }
    }
}

/// Sizes and limits for the relay pipeline, all in bytes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Transform block size.
    pub block_size: usize,

    /// Payload size of every outbound chunk except the last.
    pub outbound_chunk_size: usize,

    /// Pause upstream reads at this many pending bytes.
    pub high_watermark: usize,

    /// Resume upstream reads at this many pending bytes.
    pub low_watermark: usize,

    /// Longest accepted chunk-size line, CRLF included.
    pub max_line_len: usize,

    /// Largest accepted inbound chunk.
    pub max_chunk_len: usize,

    /// Largest accepted request head.
    pub max_head_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: 16,
            outbound_chunk_size: 4096,
            high_watermark: 1024 * 1024,
            low_watermark: 256 * 1024,
            max_line_len: 256,
            max_chunk_len: 16 * 1024 * 1024,
            max_head_bytes: 16 * 1024,
        }
    }
}

/// Block codec selection. Keys and IVs are base64.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransformConfig {
    Identity,
    #[default]
    Uppercase,
    Lowercase,
    Xor {
        key: String,
    },
    #[serde(rename = "aes128-cbc")]
    Aes128Cbc {
        key: String,
        iv: String,
    },
}

impl TransformConfig {
    /// Instantiate the configured codec for one session.
    pub fn build(&self, block_size: usize) -> Result<BlockTransform, SetupError> {
        let codec: Box<dyn BlockCodec> = match self {
            TransformConfig::Identity => Box::new(Identity::new(block_size)),
            TransformConfig::Uppercase => Box::new(AsciiCase::upper(block_size)),
            TransformConfig::Lowercase => Box::new(AsciiCase::lower(block_size)),
            TransformConfig::Xor { key } => Box::new(Xor::new(block_size, decode_key("key", key)?)?),
            TransformConfig::Aes128Cbc { key, iv } => Box::new(Aes128CbcEncrypt::new(
                block_size,
                &decode_key("key", key)?,
                &decode_key("iv", iv)?,
            )?),
        };
        BlockTransform::new(codec)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransformConfig::Identity => "identity",
            TransformConfig::Uppercase => "uppercase",
            TransformConfig::Lowercase => "lowercase",
            TransformConfig::Xor { .. } => "xor",
            TransformConfig::Aes128Cbc { .. } => "aes128-cbc",
        }
    }
}

fn decode_key(field: &str, value: &str) -> Result<Vec<u8>, SetupError> {
    BASE64
        .decode(value.trim())
        .map_err(|e| SetupError::InvalidKey(format!("{field} is not valid base64: {e}")))
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Target connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Longest wait for a single upstream read in seconds.
    pub read_secs: u64,

    /// Longest wait for a single downstream write in seconds.
    pub write_secs: u64,

    /// Longest wait for the target's response head in seconds.
    pub response_secs: u64,

    /// Grace period for in-flight sessions on shutdown in seconds.
    pub shutdown_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn response(&self) -> Duration {
        Duration::from_secs(self.response_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            read_secs: 30,
            write_secs: 30,
            response_secs: 30,
            shutdown_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Serve a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
