//! Byte buffering and chunk alignment for resumable uploads.
//!
//! [`ChunkBuffer`] accumulates recorded fragments of arbitrary size;
//! [`Aligner`] decides how many bytes to carve out of it as upload-sized,
//! byte-aligned chunks.

mod aligner;
mod store;

pub use aligner::{Aligner, Extraction};
pub use store::ChunkBuffer;

/// Default alignment granularity: 256 KiB.
///
/// Resumable endpoints require every non-final chunk length to be a
/// multiple of this; only the last chunk may be an arbitrary size.
pub const DEFAULT_CHUNK_ALIGNMENT: usize = 256 * 1024;

/// Default initial buffer capacity: 1 MiB.
pub const DEFAULT_INITIAL_CAPACITY: usize = 1024 * 1024;

/// Errors produced by the buffer crate.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("insufficient data: requested {requested} bytes, {available} buffered")]
    InsufficientData { requested: usize, available: usize },
}
