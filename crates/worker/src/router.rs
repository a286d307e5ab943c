use std::collections::HashMap;

use clipcast_engine::{
    DEFAULT_CHUNK_ALIGNMENT, DEFAULT_INITIAL_CAPACITY, EngineConfig, EngineEvent, RetryPolicy,
    UploadEngine,
};
use clipcast_protocol::{WorkerRequest, WorkerResponse};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::WorkerError;

/// Capacity of the request and response channels.
const CHANNEL_SIZE: usize = 256;

/// Worker-level settings applied to every engine instance it creates.
///
/// Per-instance parameters (destination URL, content type) arrive on the
/// `initialize` message instead.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Alignment granularity for non-final chunks.
    pub chunk_alignment: usize,
    /// Initial buffer capacity per instance.
    pub initial_buffer_capacity: usize,
    /// Retry policy for transport-level failures.
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            chunk_alignment: DEFAULT_CHUNK_ALIGNMENT,
            initial_buffer_capacity: DEFAULT_INITIAL_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Handle to the background upload worker.
///
/// Owns the routing task; dropping the handle does not stop it, call
/// [`shutdown`](Self::shutdown) to cancel outstanding uploads.
pub struct UploadWorker {
    requests_tx: mpsc::Sender<WorkerRequest>,
    responses_rx: Option<mpsc::Receiver<WorkerResponse>>,
    cancel: CancellationToken,
}

impl UploadWorker {
    /// Spawns a worker with default settings.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn() -> Self {
        Self::spawn_with(WorkerConfig::default())
    }

    /// Spawns a worker with the given settings.
    pub fn spawn_with(config: WorkerConfig) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(CHANNEL_SIZE);
        let (responses_tx, responses_rx) = mpsc::channel(CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        tokio::spawn(route_requests(
            config,
            requests_rx,
            responses_tx,
            cancel.clone(),
        ));

        Self {
            requests_tx,
            responses_rx: Some(responses_rx),
            cancel,
        }
    }

    /// Submits one request to the worker.
    pub async fn submit(&self, request: WorkerRequest) -> Result<(), WorkerError> {
        self.requests_tx
            .send(request)
            .await
            .map_err(|_| WorkerError::Closed)
    }

    /// Returns a cloneable request sender for callers that need to feed the
    /// worker from their own tasks.
    pub fn sender(&self) -> mpsc::Sender<WorkerRequest> {
        self.requests_tx.clone()
    }

    /// Takes the response receiver. Can only be called once.
    pub fn take_responses(&mut self) -> Option<mpsc::Receiver<WorkerResponse>> {
        self.responses_rx.take()
    }

    /// Stops the routing task and cancels every active instance.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Routing loop. Owns the engine instances; each message is dispatched by
/// `instance_id`, so concurrent recordings never share state.
async fn route_requests(
    config: WorkerConfig,
    mut requests: mpsc::Receiver<WorkerRequest>,
    responses: mpsc::Sender<WorkerResponse>,
    cancel: CancellationToken,
) {
    let mut engines: HashMap<String, UploadEngine> = HashMap::new();

    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        match request {
            WorkerRequest::Initialize {
                instance_id,
                destination_url,
                content_type,
            } => {
                if engines.contains_key(&instance_id) {
                    warn!(instance_id = %instance_id, "duplicate initialize");
                    let _ = responses
                        .send(WorkerResponse::UploadError {
                            instance_id,
                            error: "instance already initialized".into(),
                        })
                        .await;
                    continue;
                }

                let engine_config = EngineConfig {
                    upload_url: destination_url,
                    content_type,
                    chunk_alignment: config.chunk_alignment,
                    initial_buffer_capacity: config.initial_buffer_capacity,
                    retry: config.retry.clone(),
                };
                match UploadEngine::new(engine_config) {
                    Ok(mut engine) => {
                        if let Some(events) = engine.take_events() {
                            tokio::spawn(forward_events(
                                instance_id.clone(),
                                events,
                                responses.clone(),
                            ));
                        }
                        debug!(instance_id = %instance_id, "upload instance initialized");
                        engines.insert(instance_id, engine);
                    }
                    Err(e) => {
                        let _ = responses
                            .send(WorkerResponse::UploadError {
                                instance_id,
                                error: e.to_string(),
                            })
                            .await;
                    }
                }
            }

            WorkerRequest::BufferChunk {
                instance_id,
                chunk,
                is_last,
            } => {
                let Some(engine) = engines.get_mut(&instance_id) else {
                    let _ = responses
                        .send(WorkerResponse::UploadError {
                            instance_id,
                            error: "unknown instance".into(),
                        })
                        .await;
                    continue;
                };

                if let Err(e) = engine.ingest(&chunk, is_last) {
                    warn!(instance_id = %instance_id, error = %e, "chunk rejected");
                    let _ = responses
                        .send(WorkerResponse::UploadError {
                            instance_id: instance_id.clone(),
                            error: e.to_string(),
                        })
                        .await;
                }

                if is_last {
                    // The instance is retired from routing; completion (or
                    // failure) surfaces through its event channel.
                    if let Some(mut engine) = engines.remove(&instance_id) {
                        tokio::spawn(async move {
                            let _ = engine.finalize().await;
                        });
                    }
                }
            }
        }
    }

    for (instance_id, engine) in engines {
        debug!(instance_id = %instance_id, "cancelling instance on shutdown");
        engine.cancel();
    }
}

/// Translates engine lifecycle events into worker responses for one
/// instance. Final-chunk acceptance is reported via `Completed`, which
/// carries the destination payload, so the raw final `ChunkUploaded` event
/// is not forwarded separately.
async fn forward_events(
    instance_id: String,
    mut events: mpsc::Receiver<EngineEvent>,
    responses: mpsc::Sender<WorkerResponse>,
) {
    while let Some(event) = events.recv().await {
        let response = match event {
            EngineEvent::ChunkUploaded {
                start,
                len,
                is_final: false,
            } => {
                debug!(instance_id = %instance_id, start, len, "chunk uploaded");
                Some(WorkerResponse::UploadSuccess {
                    instance_id: instance_id.clone(),
                    is_final: false,
                    video_upload_response: None,
                })
            }
            EngineEvent::ChunkUploaded { .. } => None,
            EngineEvent::Resynced { confirmed } => {
                debug!(instance_id = %instance_id, confirmed, "upload cursor resynced");
                None
            }
            EngineEvent::Completed { response } => Some(WorkerResponse::UploadSuccess {
                instance_id: instance_id.clone(),
                is_final: true,
                video_upload_response: response,
            }),
            EngineEvent::Failed { error } => Some(WorkerResponse::UploadError {
                instance_id: instance_id.clone(),
                error,
            }),
        };

        if let Some(response) = response {
            if responses.send(response).await.is_err() {
                break;
            }
        }
    }
}
