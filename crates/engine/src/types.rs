use clipcast_buffer::{DEFAULT_CHUNK_ALIGNMENT, DEFAULT_INITIAL_CAPACITY};
use clipcast_uplink::RetryPolicy;

/// Configuration for one upload engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Signed-URL style resumable upload endpoint.
    pub upload_url: String,
    /// Media type of the recording, sent as `Content-Type` on every PUT.
    pub content_type: String,
    /// Alignment granularity for non-final chunks.
    pub chunk_alignment: usize,
    /// Initial buffer capacity; the buffer doubles on overflow.
    pub initial_buffer_capacity: usize,
    /// Retry policy for transport-level failures.
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Creates a config with default alignment (256 KiB), buffer capacity
    /// (1 MiB) and retry policy.
    pub fn new(upload_url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            upload_url: upload_url.into(),
            content_type: content_type.into(),
            chunk_alignment: DEFAULT_CHUNK_ALIGNMENT,
            initial_buffer_capacity: DEFAULT_INITIAL_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Lifecycle events emitted by an engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A chunk was accepted by the destination.
    ChunkUploaded {
        start: u64,
        len: usize,
        is_final: bool,
    },
    /// The destination resynced the upload cursor via a 308 response.
    Resynced { confirmed: u64 },
    /// The final chunk was accepted; the upload is complete.
    Completed {
        response: Option<serde_json::Value>,
    },
    /// The engine failed terminally.
    Failed { error: String },
}

/// Terminal result of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadResult {
    /// Total bytes the destination confirmed.
    pub total_bytes: u64,
    /// Terminal payload returned by the destination on the final chunk.
    pub response: Option<serde_json::Value>,
}
