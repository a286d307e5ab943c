use std::time::Duration;

/// An upload-unit slice of the recorded byte stream.
///
/// Produced by the aligner, consumed exactly once by the queue. A
/// zero-length chunk is valid only as a final close-out (the session sends
/// it as a `bytes */{total}` range query that finalizes the transfer).
#[derive(Debug, Clone)]
pub struct PendingChunk {
    /// Raw chunk bytes.
    pub data: Vec<u8>,
    /// `true` for the terminal chunk of the stream.
    pub is_final: bool,
}

/// Outcome of a successfully completed chunk upload.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// The destination accepted the full chunk. `response` carries the
    /// terminal JSON payload when the chunk was final.
    Accepted { response: Option<serde_json::Value> },
    /// The destination answered 308 and reported the last byte it actually
    /// received; the session cursor was resynced to `confirmed + 1`.
    RangeResynced { confirmed: u64 },
}

/// Retry policy for transport-level upload failures.
///
/// Well-formed HTTP responses are never retried; only network errors and
/// failures mid response are.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Base backoff delay; retry `n` waits `base_delay * 2^(n-1)`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based: the first retry is 1).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(20);
        self.base_delay * 2u32.pow(exp)
    }
}
