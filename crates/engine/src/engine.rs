use std::sync::{Arc, Mutex as StdMutex};

use clipcast_buffer::{Aligner, ChunkBuffer};
use clipcast_uplink::{ChunkOutcome, PendingChunk, TransferSession, UploadQueue};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::{EngineConfig, EngineEvent, UploadResult};
use crate::EngineError;

/// Capacity of the lifecycle event channel.
const EVENT_BUFFER_SIZE: usize = 64;

/// Engine lifecycle status. Once terminal it never resets.
enum Status {
    Active,
    Completed,
    Failed(String),
}

/// State shared between the engine and its spawned drain tasks.
struct Shared {
    status: StdMutex<Status>,
    events_tx: mpsc::Sender<EngineEvent>,
    completion_tx: StdMutex<Option<oneshot::Sender<Result<UploadResult, EngineError>>>>,
}

impl Shared {
    /// Delivers a terminal event even when the event channel is full.
    ///
    /// Intermediate chunk events may be shed under backpressure, but the
    /// terminal `Completed`/`Failed` must reach the consumer: when the
    /// channel has no room the send is handed to a task that waits for it.
    fn emit_terminal(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events_tx.try_send(event) {
            let events_tx = self.events_tx.clone();
            tokio::spawn(async move {
                let _ = events_tx.send(event).await;
            });
        }
    }

    /// Latches successful completion. No-op if already terminal.
    fn complete(&self, result: UploadResult) {
        {
            let mut status = self.status.lock().unwrap();
            if !matches!(*status, Status::Active) {
                return;
            }
            *status = Status::Completed;
        }
        debug!(total_bytes = result.total_bytes, "upload completed");
        self.emit_terminal(EngineEvent::Completed {
            response: result.response.clone(),
        });
        if let Some(tx) = self.completion_tx.lock().unwrap().take() {
            let _ = tx.send(Ok(result));
        }
    }

    /// Latches terminal failure with the first unrecoverable error.
    /// No-op if already terminal.
    fn fail(&self, error: EngineError) {
        let message = error.to_string();
        {
            let mut status = self.status.lock().unwrap();
            if !matches!(*status, Status::Active) {
                return;
            }
            *status = Status::Failed(message.clone());
        }
        warn!(error = %message, "upload failed terminally");
        self.emit_terminal(EngineEvent::Failed { error: message });
        if let Some(tx) = self.completion_tx.lock().unwrap().take() {
            let _ = tx.send(Err(error));
        }
    }
}

/// The resumable chunked upload engine.
///
/// One engine owns one fully isolated buffer/session pair. Ingestion is
/// synchronous and non-blocking; uploads run in a spawned drain task that
/// issues at most one PUT at a time, in byte order. After a terminal
/// failure every subsequent operation fails with the same error — there is
/// no implicit reset, the session must be reconstructed from scratch.
pub struct UploadEngine {
    buffer: ChunkBuffer,
    aligner: Aligner,
    queue: Arc<UploadQueue>,
    session: Arc<tokio::sync::Mutex<TransferSession>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    events_rx: Option<mpsc::Receiver<EngineEvent>>,
    completion_rx: Option<oneshot::Receiver<Result<UploadResult, EngineError>>>,
    last_seen: bool,
    final_enqueued: bool,
    chunks_enqueued: u64,
    total_ingested: u64,
}

impl UploadEngine {
    /// Creates an engine for the configured destination.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let session =
            TransferSession::new(&config.upload_url, &config.content_type, config.retry)?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (completion_tx, completion_rx) = oneshot::channel();

        Ok(Self {
            buffer: ChunkBuffer::new(config.initial_buffer_capacity),
            aligner: Aligner::new(config.chunk_alignment),
            queue: Arc::new(UploadQueue::new()),
            session: Arc::new(tokio::sync::Mutex::new(session)),
            shared: Arc::new(Shared {
                status: StdMutex::new(Status::Active),
                events_tx,
                completion_tx: StdMutex::new(Some(completion_tx)),
            }),
            cancel: CancellationToken::new(),
            events_rx: Some(events_rx),
            completion_rx: Some(completion_rx),
            last_seen: false,
            final_enqueued: false,
            chunks_enqueued: 0,
            total_ingested: 0,
        })
    }

    /// Takes the lifecycle event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<EngineEvent>> {
        self.events_rx.take()
    }

    /// Total bytes ingested so far.
    pub fn bytes_ingested(&self) -> u64 {
        self.total_ingested
    }

    /// Ingests one captured fragment.
    ///
    /// Appends to the buffer, extracts zero or more aligned chunks, and
    /// triggers a queue drain. Fire-and-forget from the caller's
    /// perspective: upload completion and errors surface via the event and
    /// completion channels, not this return value (which only reports
    /// latched terminal state or contract misuse).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn ingest(&mut self, fragment: &[u8], is_last: bool) -> Result<(), EngineError> {
        self.ensure_active()?;
        if self.last_seen {
            return Err(EngineError::IngestAfterLast);
        }

        self.buffer.append(fragment);
        self.total_ingested += fragment.len() as u64;
        if is_last {
            self.last_seen = true;
        }

        if self.extract_pending(is_last)? {
            self.spawn_drain();
        }
        Ok(())
    }

    /// Finalizes the upload and waits for it to drain to completion.
    ///
    /// Guarantees a final chunk is enqueued: residual buffered bytes become
    /// the terminal chunk; an empty buffer after aligned chunks were
    /// already sent produces a zero-length close-out chunk so the
    /// destination learns the total. Resolves exactly once with the
    /// terminal payload or the first unrecoverable error; finding nothing
    /// ever ingested is reported as [`EngineError::NoData`].
    pub async fn finalize(&mut self) -> Result<UploadResult, EngineError> {
        let Some(completion_rx) = self.completion_rx.take() else {
            return Err(EngineError::AlreadyFinalized);
        };

        let active = matches!(*self.shared.status.lock().unwrap(), Status::Active);
        if active {
            self.last_seen = true;
            if !self.final_enqueued {
                if !self.buffer.is_empty() {
                    let used = self.buffer.used_bytes();
                    let data = self.buffer.extract(used)?;
                    self.enqueue_chunk(PendingChunk {
                        data,
                        is_final: true,
                    });
                } else if self.chunks_enqueued > 0 {
                    // Every ingested byte happened to be aligned and is
                    // already on its way; close out with an empty final
                    // chunk so the transfer can terminate.
                    self.enqueue_chunk(PendingChunk {
                        data: Vec::new(),
                        is_final: true,
                    });
                } else {
                    self.shared.fail(EngineError::NoData);
                }
            }
            if self.final_enqueued {
                self.spawn_drain();
            }
        }

        match completion_rx.await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Terminated("engine task dropped".into())),
        }
    }

    /// Cancels the upload: aborts any in-flight PUT or backoff delay and
    /// latches the engine in a terminal cancelled state.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.shared.fail(EngineError::Cancelled);
    }

    /// Returns a token cancelled when [`cancel`](Self::cancel) is called.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn ensure_active(&self) -> Result<(), EngineError> {
        match &*self.shared.status.lock().unwrap() {
            Status::Active => Ok(()),
            Status::Completed => Err(EngineError::AlreadyFinalized),
            Status::Failed(message) => Err(EngineError::Terminated(message.clone())),
        }
    }

    /// Runs the aligner against the buffer, enqueueing every extraction.
    /// Returns `true` if any chunk was enqueued.
    fn extract_pending(&mut self, is_last: bool) -> Result<bool, EngineError> {
        let mut enqueued = false;
        while let Some(extraction) = self
            .aligner
            .next_extraction(self.buffer.used_bytes(), is_last)
        {
            // The aligner never requests more than is buffered, so this
            // extraction cannot fail in correct operation.
            let data = self.buffer.extract(extraction.len)?;
            self.enqueue_chunk(PendingChunk {
                data,
                is_final: extraction.is_final,
            });
            enqueued = true;
            if extraction.is_final {
                break;
            }
        }
        Ok(enqueued)
    }

    fn enqueue_chunk(&mut self, chunk: PendingChunk) {
        debug!(
            len = chunk.data.len(),
            is_final = chunk.is_final,
            "enqueueing chunk"
        );
        if chunk.is_final {
            self.final_enqueued = true;
        }
        self.chunks_enqueued += 1;
        self.queue.enqueue(chunk);
    }

    fn spawn_drain(&self) {
        let queue = Arc::clone(&self.queue);
        let session = Arc::clone(&self.session);
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        tokio::spawn(drive_queue(queue, session, shared, cancel));
    }
}

/// Drains the queue through the session, forwarding outcomes to the event
/// channel and latching terminal states. The drain and its backoff delays
/// are the engine's only suspension points; cancellation aborts them.
async fn drive_queue(
    queue: Arc<UploadQueue>,
    session: Arc<tokio::sync::Mutex<TransferSession>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let drain = {
        let shared = Arc::clone(&shared);
        let requeue = Arc::clone(&queue);
        queue.drain(&session, move |start, chunk, outcome| match outcome {
            ChunkOutcome::Accepted { response } => {
                let _ = shared.events_tx.try_send(EngineEvent::ChunkUploaded {
                    start,
                    len: chunk.data.len(),
                    is_final: chunk.is_final,
                });
                if chunk.is_final {
                    shared.complete(UploadResult {
                        total_bytes: start + chunk.data.len() as u64,
                        response: response.clone(),
                    });
                }
            }
            ChunkOutcome::RangeResynced { confirmed } => {
                let _ = shared.events_tx.try_send(EngineEvent::Resynced {
                    confirmed: *confirmed,
                });
                if chunk.is_final {
                    // The destination stopped short on the terminal chunk;
                    // requeue the unsent tail so the session can still
                    // finish. An empty tail becomes the close-out form.
                    let sent = ((confirmed + 1).saturating_sub(start) as usize)
                        .min(chunk.data.len());
                    requeue.enqueue(PendingChunk {
                        data: chunk.data[sent..].to_vec(),
                        is_final: true,
                    });
                }
            }
        })
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            shared.fail(EngineError::Cancelled);
        }
        result = drain => {
            if let Err(e) = result {
                shared.fail(EngineError::Uplink(e));
            }
        }
    }
}
