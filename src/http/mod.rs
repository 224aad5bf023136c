//! HTTP handling around the chunked relay.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, per-connection handler)
//!     → head.rs (parse request head, leave body in the stream)
//!     → forward.rs (connect to target, build outbound head)
//!     → session (relay body)
//!     → head.rs (parse target response) → status back to client
//! ```

pub mod forward;
pub mod head;
pub mod server;

pub use head::{HeadError, RequestHead};
pub use server::{status_for, RelayServer};
