//! Delimiter-based frame splitting.
//!
//! Supports multiple alternative delimiters because tracker firmware is
//! inconsistent about line endings; the earliest match wins. The delimiter
//! itself is consumed but not included in the emitted frame.

use bytes::{Bytes, BytesMut};

use super::FrameSplitter;
use crate::error::{GatewayError, Result};

/// Splits frames at the earliest match among configured byte sequences.
pub struct DelimiterSplitter {
    buffer: BytesMut,
    delimiters: Vec<Vec<u8>>,
    max_size: usize,
}

impl DelimiterSplitter {
    pub fn new(delimiters: Vec<Vec<u8>>, max_size: usize) -> Self {
        debug_assert!(!delimiters.is_empty());
        debug_assert!(delimiters.iter().all(|d| !d.is_empty()));
        Self {
            buffer: BytesMut::with_capacity(max_size.min(4 * 1024)),
            delimiters,
            max_size,
        }
    }

    /// Earliest (position, delimiter length) match in the buffer, if any.
    fn find_boundary(&self) -> Option<(usize, usize)> {
        let haystack = &self.buffer[..];
        self.delimiters
            .iter()
            .filter_map(|delim| {
                haystack
                    .windows(delim.len())
                    .position(|window| window == &delim[..])
                    .map(|pos| (pos, delim.len()))
            })
            .min_by_key(|&(pos, _)| pos)
    }
}

impl FrameSplitter for DelimiterSplitter {
    fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some((pos, delim_len)) = self.find_boundary() {
            let frame = self.buffer.split_to(pos).freeze();
            let _ = self.buffer.split_to(delim_len);
            frames.push(frame);
        }

        if self.buffer.len() > self.max_size {
            return Err(GatewayError::Framing(format!(
                "no delimiter within {} bytes",
                self.max_size
            )));
        }

        Ok(frames)
    }
}
