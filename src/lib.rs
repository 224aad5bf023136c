//! Chunked transfer-encoding relay.
//!
//! Accepts an HTTP/1.1 request with a chunked body, passes the payload
//! through a block transform, and re-frames it into fixed-size chunks on a
//! connection to a target server.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ net::listener ──▶ http::server ──▶ session ──▶ target
//!                                                   │
//!                         framing::decoder ─▶ buffer (transform) ─▶ framing::encoder
//! ```

// Relay core
pub mod buffer;
pub mod error;
pub mod framing;
pub mod session;
pub mod transform;

// Serving
pub mod config;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::RelayConfig;
pub use error::{FramingError, SessionError, SetupError, TransportError};
pub use http::RelayServer;
pub use lifecycle::Shutdown;
pub use session::{Session, SessionConfig, SessionEvents};
