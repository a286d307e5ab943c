//! Resumable chunked upload protocol.
//!
//! [`TransferSession`] speaks the HTTP-range PUT protocol against a single
//! signed-URL style resumable endpoint: offset tracking, 308 resync,
//! retry with exponential backoff, final-chunk finalization.
//! [`UploadQueue`] feeds it chunks in strict byte-offset order with at most
//! one drain loop in flight.

mod queue;
mod session;
mod types;

pub use queue::UploadQueue;
pub use session::TransferSession;
pub use types::{ChunkOutcome, PendingChunk, RetryPolicy};

/// Errors produced by the uplink crate.
#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("destination rejected chunk: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed Range header in 308 response: {0:?}")]
    MalformedRange(String),

    #[error("invalid terminal response payload: {0}")]
    CompletionPayload(#[source] serde_json::Error),
}
