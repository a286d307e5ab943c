use crate::DEFAULT_CHUNK_ALIGNMENT;

/// A planned extraction from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extraction {
    /// Bytes to extract.
    pub len: usize,
    /// `true` when this extraction carries the terminal chunk.
    pub is_final: bool,
}

/// Decides how many buffered bytes to carve out as the next upload chunk.
///
/// Non-final chunks must be byte-aligned to the destination's granularity:
/// intermediate PUTs against a resumable endpoint require range-aligned
/// boundaries, only the last PUT may be an arbitrary size. While more data
/// is still coming, the aligner therefore extracts the largest whole
/// multiple of the target size; once the last fragment has been ingested it
/// drains everything that remains as one terminal chunk.
#[derive(Debug, Clone, Copy)]
pub struct Aligner {
    target_chunk_size: usize,
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_ALIGNMENT)
    }
}

impl Aligner {
    /// Creates an aligner for the given target chunk size.
    ///
    /// If `target_chunk_size` is 0, [`DEFAULT_CHUNK_ALIGNMENT`] (256 KiB) is used.
    pub fn new(target_chunk_size: usize) -> Self {
        let target_chunk_size = if target_chunk_size == 0 {
            DEFAULT_CHUNK_ALIGNMENT
        } else {
            target_chunk_size
        };
        Self { target_chunk_size }
    }

    /// Configured target chunk size.
    pub fn target_chunk_size(&self) -> usize {
        self.target_chunk_size
    }

    /// Returns the next extraction for `used_bytes` buffered bytes, or
    /// `None` if no extraction should occur yet.
    ///
    /// `is_last` signals that the final fragment has been ingested. The
    /// returned length never exceeds `used_bytes`, so a bounds-checked
    /// buffer extraction cannot fail.
    pub fn next_extraction(&self, used_bytes: usize, is_last: bool) -> Option<Extraction> {
        if is_last {
            if used_bytes > 0 {
                Some(Extraction {
                    len: used_bytes,
                    is_final: true,
                })
            } else {
                None
            }
        } else if used_bytes >= self.target_chunk_size {
            Some(Extraction {
                len: used_bytes / self.target_chunk_size * self.target_chunk_size,
                is_final: false,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChunkBuffer;

    #[test]
    fn zero_target_uses_default() {
        let aligner = Aligner::new(0);
        assert_eq!(aligner.target_chunk_size(), DEFAULT_CHUNK_ALIGNMENT);
    }

    #[test]
    fn below_threshold_extracts_nothing() {
        let aligner = Aligner::new(1000);
        assert_eq!(aligner.next_extraction(0, false), None);
        assert_eq!(aligner.next_extraction(999, false), None);
    }

    #[test]
    fn extracts_largest_whole_multiple() {
        let aligner = Aligner::new(1000);
        assert_eq!(
            aligner.next_extraction(1000, false),
            Some(Extraction {
                len: 1000,
                is_final: false,
            })
        );
        assert_eq!(
            aligner.next_extraction(2600, false),
            Some(Extraction {
                len: 2000,
                is_final: false,
            })
        );
    }

    #[test]
    fn non_final_extraction_is_always_aligned() {
        let aligner = Aligner::new(256 * 1024);
        for used in [262144usize, 300_000, 524_288, 1_000_000, 5_000_001] {
            let extraction = aligner.next_extraction(used, false).unwrap();
            assert_eq!(extraction.len % (256 * 1024), 0, "used = {used}");
            assert!(extraction.len <= used);
            assert!(!extraction.is_final);
        }
    }

    #[test]
    fn final_mode_drains_everything() {
        let aligner = Aligner::new(1000);
        assert_eq!(
            aligner.next_extraction(42, true),
            Some(Extraction {
                len: 42,
                is_final: true,
            })
        );
        // Even above the target, the final chunk takes all remaining bytes.
        assert_eq!(
            aligner.next_extraction(2600, true),
            Some(Extraction {
                len: 2600,
                is_final: true,
            })
        );
    }

    #[test]
    fn final_mode_with_empty_buffer_extracts_nothing() {
        let aligner = Aligner::new(1000);
        assert_eq!(aligner.next_extraction(0, true), None);
    }

    #[test]
    fn fragment_sequence_produces_expected_chunks() {
        // Fragments of 300000, 300000, 500000 bytes at 256 KiB alignment:
        // two aligned chunks of 262144 then a final chunk of 575712.
        let aligner = Aligner::new(262_144);
        let mut buf = ChunkBuffer::new(1024);
        let mut chunks = Vec::new();

        for (size, is_last) in [(300_000usize, false), (300_000, false), (500_000, true)] {
            buf.append(&vec![0u8; size]);
            while let Some(extraction) = aligner.next_extraction(buf.used_bytes(), is_last) {
                let data = buf.extract(extraction.len).unwrap();
                chunks.push((data.len(), extraction.is_final));
                if extraction.is_final {
                    break;
                }
            }
        }

        assert_eq!(
            chunks,
            vec![(262_144, false), (262_144, false), (575_712, true)]
        );
        assert!(buf.is_empty());
        let total: usize = chunks.iter().map(|(len, _)| len).sum();
        assert_eq!(total, 1_100_000);
    }
}
