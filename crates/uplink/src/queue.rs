use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::session::TransferSession;
use crate::types::{ChunkOutcome, PendingChunk};
use crate::UplinkError;

/// Ordered queue of pending chunks with single-flight drain.
///
/// Chunks are uploaded strictly in insertion order, which is byte-offset
/// order. At most one drain loop runs at a time; concurrent [`drain`]
/// calls are no-ops. A chunk leaves the queue only after its upload fully
/// succeeds — on an unrecoverable failure it stays at the head and the
/// error is returned, leaving the caller to decide.
///
/// [`drain`]: UploadQueue::drain
pub struct UploadQueue {
    chunks: Mutex<VecDeque<PendingChunk>>,
    draining: AtomicBool,
}

impl Default for UploadQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Appends a chunk at the tail. Safe to call while a drain is running.
    pub fn enqueue(&self, chunk: PendingChunk) {
        self.chunks.lock().unwrap().push_back(chunk);
    }

    /// Pending chunk count.
    pub fn len(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    /// Returns `true` if no chunks are pending.
    pub fn is_empty(&self) -> bool {
        self.chunks.lock().unwrap().is_empty()
    }

    /// Uploads queued chunks through `session` until the queue is empty or
    /// an upload fails.
    ///
    /// Idempotent-safe: returns immediately if another drain is active.
    /// `on_chunk` is invoked after each successful upload with the chunk's
    /// start offset (the cursor before the upload), the chunk, and its
    /// outcome.
    pub async fn drain<F>(
        &self,
        session: &tokio::sync::Mutex<TransferSession>,
        mut on_chunk: F,
    ) -> Result<(), UplinkError>
    where
        F: FnMut(u64, &PendingChunk, &ChunkOutcome),
    {
        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                debug!("drain already in flight, skipping");
                return Ok(());
            }

            // The guard releases the flag even if this future is dropped
            // mid-upload, so a cancelled drain never wedges the queue.
            let guard = DrainGuard(&self.draining);
            let result = self.drain_inner(session, &mut on_chunk).await;
            drop(guard);

            // A chunk enqueued between the last pop and the flag reset would
            // otherwise sit stranded until the next trigger.
            if result.is_err() || self.is_empty() {
                return result;
            }
        }
    }

    async fn drain_inner<F>(
        &self,
        session: &tokio::sync::Mutex<TransferSession>,
        on_chunk: &mut F,
    ) -> Result<(), UplinkError>
    where
        F: FnMut(u64, &PendingChunk, &ChunkOutcome),
    {
        loop {
            let chunk = { self.chunks.lock().unwrap().pop_front() };
            let Some(chunk) = chunk else {
                return Ok(());
            };

            let mut session = session.lock().await;
            let start = session.start_byte();
            match session.upload_chunk(&chunk).await {
                Ok(outcome) => {
                    drop(session);
                    on_chunk(start, &chunk, &outcome);
                }
                Err(e) => {
                    // The failed chunk stays at the head.
                    self.chunks.lock().unwrap().push_front(chunk);
                    return Err(e);
                }
            }
        }
    }
}

/// Clears the draining flag when the drain loop exits or is dropped.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
