//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Check that the watermarks leave the encoder room to drain
//! - Check that the configured transform can be built
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before the config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::buffer::Watermarks;
use crate::config::schema::RelayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. "pipeline.low_watermark").
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    if config.target.address.trim().is_empty() {
        errors.push(ValidationError::new("target.address", "must not be empty"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    check_path(&mut errors, "listener.path", &config.listener.path);
    check_path(&mut errors, "target.path", &config.target.path);

    let pipeline = &config.pipeline;
    let limits = [
        ("pipeline.block_size", pipeline.block_size),
        ("pipeline.outbound_chunk_size", pipeline.outbound_chunk_size),
        ("pipeline.max_line_len", pipeline.max_line_len),
        ("pipeline.max_chunk_len", pipeline.max_chunk_len),
        ("pipeline.max_head_bytes", pipeline.max_head_bytes),
    ];
    for (field, value) in limits {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    if pipeline.outbound_chunk_size > 0 {
        if let Err(e) = Watermarks::new(
            pipeline.high_watermark,
            pipeline.low_watermark,
            pipeline.outbound_chunk_size,
        ) {
            errors.push(ValidationError::new("pipeline.low_watermark", e.to_string()));
        }
    }

    if pipeline.block_size > 0 {
        if let Err(e) = config.transform.build(pipeline.block_size) {
            errors.push(ValidationError::new("transform", e.to_string()));
        }
    }

    let timeouts = [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.read_secs", config.timeouts.read_secs),
        ("timeouts.write_secs", config.timeouts.write_secs),
        ("timeouts.response_secs", config.timeouts.response_secs),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address '{value}'")));
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::new(field, "must start with '/'"));
    }
}
