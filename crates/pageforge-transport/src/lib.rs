//! Streaming transport for the generation endpoint.
//!
//! The engine opens a chunked request against an OpenAI-compatible
//! chat-completions endpoint, decodes `data:`-prefixed delta events from the
//! body, and watches liveness on a fixed period: streaming endpoints can
//! stall indefinitely without closing the connection, so "connection open"
//! and "content arriving" are tracked separately. Stalls, connection-level
//! failures, and empty streams are retried up to a bounded attempt count;
//! non-success HTTP statuses fail immediately.
//!
//! # Usage
//!
//! ```no_run
//! use pageforge_transport::{
//!     AbortSignal, CompletionRequest, CompletionStreamer, HttpStreamClient, StreamObserver,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), pageforge_transport::TransportError> {
//! let client = HttpStreamClient::from_env()?;
//! let completion = client
//!     .stream_completion(
//!         CompletionRequest::new("gpt-5-mini")
//!             .system("Answer briefly.")
//!             .user("Say hello"),
//!         StreamObserver::new().on_delta(|text| eprint!("\r{} chars", text.len())),
//!         AbortSignal::never(),
//!     )
//!     .await?;
//! println!("{}", completion.text);
//! # Ok(())
//! # }
//! ```

/// Streaming client, configuration, observer, and abort primitives.
pub mod client;
/// Public error types for the transport.
pub mod errors;
/// Completion request and message types.
pub mod request;
/// Wire-format decoding (event marker lines, snapshot diffing).
mod sse;
/// Liveness status surface.
pub mod status;
/// Token usage accounting.
pub mod usage;

pub use client::{
    AbortHandle, AbortSignal, Completion, CompletionStreamer, HttpStreamClient, StreamClientConfig,
    StreamObserver, abort_pair,
};
pub use errors::TransportError;
pub use request::{CompletionRequest, Message, Role};
pub use status::StreamStatus;
pub use usage::TokenUsage;
