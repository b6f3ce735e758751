//! Fixed-length frame splitting.

use bytes::{Bytes, BytesMut};

use super::FrameSplitter;
use crate::error::Result;

/// Every frame is exactly `size` bytes.
pub struct FixedLengthSplitter {
    buffer: BytesMut,
    size: usize,
}

impl FixedLengthSplitter {
    pub fn new(size: usize) -> Self {
        debug_assert!(size > 0);
        Self {
            buffer: BytesMut::with_capacity(size * 4),
            size,
        }
    }
}

impl FrameSplitter for FixedLengthSplitter {
    fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while self.buffer.len() >= self.size {
            frames.push(self.buffer.split_to(self.size).freeze());
        }
        Ok(frames)
    }
}
