//! Upload worker: routes serializable requests to per-instance upload
//! engines running on a background task.
//!
//! The capture side stays on its own thread and communicates purely
//! through [`WorkerRequest`]/[`WorkerResponse`] messages, so heavy
//! buffering and network I/O never block frame capture.
//!
//! [`WorkerRequest`]: clipcast_protocol::WorkerRequest
//! [`WorkerResponse`]: clipcast_protocol::WorkerResponse

mod router;

pub use router::{UploadWorker, WorkerConfig};

/// Errors produced by the worker crate.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker is shut down")]
    Closed,
}
