//! Resumable chunked upload engine.
//!
//! Wires fragment ingestion through the chunk buffer, aligner-driven
//! extraction, the ordered upload queue, and the resumable transfer
//! session. The capture side feeds `(bytes, is_last)` fragments in;
//! lifecycle events and the terminal result come back out.

mod engine;
mod types;

pub use engine::UploadEngine;
pub use types::{EngineConfig, EngineEvent, UploadResult};

pub use clipcast_buffer::{DEFAULT_CHUNK_ALIGNMENT, DEFAULT_INITIAL_CAPACITY};
pub use clipcast_uplink::RetryPolicy;

/// Errors produced by the engine crate.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("upload failed: {0}")]
    Uplink(#[from] clipcast_uplink::UplinkError),

    #[error("buffer error: {0}")]
    Buffer(#[from] clipcast_buffer::BufferError),

    #[error("no data was ingested")]
    NoData,

    #[error("fragment received after the last fragment")]
    IngestAfterLast,

    #[error("engine already finalized")]
    AlreadyFinalized,

    #[error("upload cancelled")]
    Cancelled,

    #[error("engine terminated: {0}")]
    Terminated(String),
}
