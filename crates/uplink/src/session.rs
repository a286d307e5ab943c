use reqwest::{StatusCode, header};
use tracing::{debug, info, warn};

use crate::types::{ChunkOutcome, PendingChunk, RetryPolicy};
use crate::UplinkError;

/// A resumable transfer session against one destination endpoint.
///
/// Owns the running byte cursor: `start_byte` is the single source of truth
/// for the `Content-Range` lower bound of the next PUT and only ever
/// advances after a fully decoded response. A retried PUT therefore reuses
/// the identical range, and a subsequent 308 resync moves the cursor past
/// any bytes the server already received — no loss, no duplication.
pub struct TransferSession {
    client: reqwest::Client,
    upload_url: String,
    content_type: String,
    start_byte: u64,
    retry: RetryPolicy,
}

/// One attempt either decodes to an outcome, fails the whole chunk, or is
/// worth retrying.
enum AttemptError {
    Transient(reqwest::Error),
    Terminal(UplinkError),
}

impl TransferSession {
    /// Creates a session for the given destination.
    ///
    /// Redirect following is disabled: the endpoint signals "resume
    /// incomplete" with a bare 308, which must reach us as a response.
    pub fn new(
        upload_url: impl Into<String>,
        content_type: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self, UplinkError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(UplinkError::Client)?;
        Ok(Self {
            client,
            upload_url: upload_url.into(),
            content_type: content_type.into(),
            start_byte: 0,
            retry,
        })
    }

    /// Cursor of the next byte not yet confirmed uploaded.
    pub fn start_byte(&self) -> u64 {
        self.start_byte
    }

    /// Destination endpoint URL.
    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    /// Uploads one chunk at the current cursor.
    ///
    /// Transport failures are retried with exponential backoff up to the
    /// configured maximum; a well-formed non-2xx/308 response fails
    /// immediately. The cursor advances only on success.
    pub async fn upload_chunk(
        &mut self,
        chunk: &PendingChunk,
    ) -> Result<ChunkOutcome, UplinkError> {
        let start = self.start_byte;
        let content_range = content_range(start, chunk);

        let mut attempt: u32 = 0;
        let outcome = loop {
            attempt += 1;
            if attempt > 1 {
                let delay = self.retry.delay_for_retry(attempt - 1);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before chunk retry"
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt_upload(&content_range, chunk).await {
                Ok(outcome) => break outcome,
                Err(AttemptError::Terminal(e)) => return Err(e),
                Err(AttemptError::Transient(e)) if attempt < self.retry.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "transport failure during chunk upload, will retry"
                    );
                }
                Err(AttemptError::Transient(e)) => {
                    return Err(UplinkError::RetriesExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        };

        match &outcome {
            ChunkOutcome::Accepted { .. } => {
                self.start_byte = start + chunk.data.len() as u64;
                debug!(
                    start,
                    len = chunk.data.len(),
                    is_final = chunk.is_final,
                    "chunk accepted"
                );
            }
            ChunkOutcome::RangeResynced { confirmed } => {
                // The cursor only ever moves forward; a server reporting
                // less than it already confirmed cannot rewind it.
                self.start_byte = self.start_byte.max(confirmed + 1);
                info!(
                    confirmed,
                    start_byte = self.start_byte,
                    "resynced cursor from 308 response"
                );
            }
        }
        Ok(outcome)
    }

    /// One PUT attempt, fully decoded. Does not touch the cursor.
    async fn attempt_upload(
        &self,
        content_range: &str,
        chunk: &PendingChunk,
    ) -> Result<ChunkOutcome, AttemptError> {
        let response = self
            .client
            .put(&self.upload_url)
            .header(header::CONTENT_TYPE, &self.content_type)
            .header(header::CONTENT_LENGTH, chunk.data.len() as u64)
            .header(header::CONTENT_RANGE, content_range)
            .body(chunk.data.clone())
            .send()
            .await
            .map_err(AttemptError::Transient)?;

        let status = response.status();
        if status.is_success() {
            if !chunk.is_final {
                return Ok(ChunkOutcome::Accepted { response: None });
            }
            // Final chunk: the body is the terminal upload-result payload.
            let body = response.text().await.map_err(AttemptError::Transient)?;
            let payload = if body.trim().is_empty() {
                None
            } else {
                Some(
                    serde_json::from_str(&body)
                        .map_err(|e| AttemptError::Terminal(UplinkError::CompletionPayload(e)))?,
                )
            };
            Ok(ChunkOutcome::Accepted { response: payload })
        } else if status == StatusCode::PERMANENT_REDIRECT {
            // 308 Resume Incomplete: the Range header reports how much the
            // server actually has, e.g. "bytes 0-12345".
            let value = response
                .headers()
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
                .unwrap_or_default();
            match parse_range_end(&value) {
                Some(confirmed) => Ok(ChunkOutcome::RangeResynced { confirmed }),
                None => Err(AttemptError::Terminal(UplinkError::MalformedRange(value))),
            }
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AttemptError::Terminal(UplinkError::Rejected {
                status: status.as_u16(),
                body,
            }))
        }
    }
}

/// Builds the `Content-Range` value for a chunk at `start`.
///
/// Non-final chunks carry an unknown total (`*`); the final chunk carries
/// the now-known total. A zero-length final chunk becomes the close-out
/// form `bytes */{total}`.
fn content_range(start: u64, chunk: &PendingChunk) -> String {
    let len = chunk.data.len() as u64;
    if chunk.is_final {
        if len == 0 {
            format!("bytes */{start}")
        } else {
            format!("bytes {start}-{}/{}", start + len - 1, start + len)
        }
    } else {
        format!("bytes {start}-{}/*", start + len - 1)
    }
}

/// Parses the inclusive upper bound out of a `<unit> <start>-<end>` header.
fn parse_range_end(value: &str) -> Option<u64> {
    let range = value.split_whitespace().last()?;
    let (_, end) = range.split_once('-')?;
    end.trim().parse().ok()
}
