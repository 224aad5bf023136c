//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     SIGINT / SIGTERM → trigger → stop accepting → drain connections → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Drain has a deadline; sessions still running after it are dropped

pub mod shutdown;

pub use shutdown::{wait_for_signal, Shutdown};
