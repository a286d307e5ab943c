use tracing::trace;

use crate::{BufferError, DEFAULT_INITIAL_CAPACITY};

/// Growable ring buffer holding not-yet-uploaded bytes.
///
/// Backed by a contiguous store with plain index cursors. When an incoming
/// fragment does not fit, capacity doubles and the live region is copied
/// contiguously to offset 0 of the fresh store. The buffer never shrinks.
pub struct ChunkBuffer {
    store: Vec<u8>,
    /// Index of the first live byte.
    read_offset: usize,
    /// Live byte count. The write cursor is `(read_offset + used) % capacity`.
    used: usize,
}

impl ChunkBuffer {
    /// Creates a buffer with the given initial capacity.
    ///
    /// If `initial_capacity` is 0, [`DEFAULT_INITIAL_CAPACITY`] (1 MiB) is used.
    pub fn new(initial_capacity: usize) -> Self {
        let capacity = if initial_capacity == 0 {
            DEFAULT_INITIAL_CAPACITY
        } else {
            initial_capacity
        };
        Self {
            store: vec![0u8; capacity],
            read_offset: 0,
            used: 0,
        }
    }

    /// Appends `bytes`, growing the store if they do not fit in free space.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if bytes.len() > self.free_space() {
            self.grow(self.used + bytes.len());
        }

        let capacity = self.store.len();
        let write_offset = (self.read_offset + self.used) % capacity;
        let first = bytes.len().min(capacity - write_offset);
        self.store[write_offset..write_offset + first].copy_from_slice(&bytes[..first]);
        if first < bytes.len() {
            // Wrap around to the start of the store.
            let rest = bytes.len() - first;
            self.store[..rest].copy_from_slice(&bytes[first..]);
        }
        self.used += bytes.len();
    }

    /// Removes and returns exactly `n` contiguous bytes in original order.
    ///
    /// Fails with [`BufferError::InsufficientData`] if `n` exceeds the live
    /// byte count — the caller is responsible for bounds-checking first, so
    /// hitting this indicates a logic bug, not recoverable state.
    pub fn extract(&mut self, n: usize) -> Result<Vec<u8>, BufferError> {
        if n > self.used {
            return Err(BufferError::InsufficientData {
                requested: n,
                available: self.used,
            });
        }

        let capacity = self.store.len();
        let mut out = Vec::with_capacity(n);
        let first = n.min(capacity - self.read_offset);
        out.extend_from_slice(&self.store[self.read_offset..self.read_offset + first]);
        if first < n {
            out.extend_from_slice(&self.store[..n - first]);
        }
        self.read_offset = (self.read_offset + n) % capacity;
        self.used -= n;
        Ok(out)
    }

    /// Live byte count.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Bytes that can be appended without growing.
    pub fn free_space(&self) -> usize {
        self.store.len() - self.used
    }

    /// Current store capacity.
    pub fn capacity(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if no live bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Doubles capacity until at least `needed` bytes fit, copying the live
    /// (possibly wrapped) region contiguously to offset 0.
    fn grow(&mut self, needed: usize) {
        let mut new_capacity = self.store.len() * 2;
        while new_capacity < needed {
            new_capacity *= 2;
        }
        trace!(
            old_capacity = self.store.len(),
            new_capacity,
            used = self.used,
            "growing chunk buffer"
        );

        let mut new_store = vec![0u8; new_capacity];
        self.copy_live_region(&mut new_store);
        self.store = new_store;
        self.read_offset = 0;
    }

    fn copy_live_region(&self, dst: &mut [u8]) {
        if self.used == 0 {
            return;
        }
        let capacity = self.store.len();
        let first = self.used.min(capacity - self.read_offset);
        dst[..first].copy_from_slice(&self.store[self.read_offset..self.read_offset + first]);
        if first < self.used {
            dst[first..self.used].copy_from_slice(&self.store[..self.used - first]);
        }
    }
}
