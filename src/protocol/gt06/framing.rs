//! GT06 frame splitting.
//!
//! Two frame shapes share the wire:
//!
//! ```text
//! client -> server:  78 78 | size u8  | body... | 0D 0A   total = size + 5
//! command echo:      79 79 | size u16 | body... | 0D 0A   total = size + 6
//! ```
//!
//! The size field counts from the protocol-number byte through the checksum.
//! The whole frame, magic and trailer included, is emitted; field extraction
//! and checksum verification belong to the decoder.

use bytes::{Bytes, BytesMut};

use crate::error::{GatewayError, Result};
use crate::framing::FrameSplitter;

/// Largest frame any known GT06 firmware produces.
const MAX_FRAME_SIZE: usize = 1024;

/// Client-to-server magic.
pub const HEADER_STANDARD: [u8; 2] = [0x78, 0x78];
/// Device-relayed command echo magic.
pub const HEADER_ECHO: [u8; 2] = [0x79, 0x79];

/// Frame trailer.
pub const TRAILER: [u8; 2] = [0x0D, 0x0A];

/// Splitter for the GT06 magic + length + trailer format.
pub struct Gt06FrameSplitter {
    buffer: BytesMut,
}

impl Gt06FrameSplitter {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
        }
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }

        let magic = [self.buffer[0], self.buffer[1]];
        let total = match magic {
            HEADER_STANDARD => usize::from(self.buffer[2]) + 5,
            HEADER_ECHO => usize::from(u16::from_be_bytes([self.buffer[2], self.buffer[3]])) + 6,
            _ => {
                return Err(GatewayError::Framing(format!(
                    "bad magic {:02x} {:02x}",
                    magic[0], magic[1]
                )))
            }
        };

        if total > MAX_FRAME_SIZE {
            return Err(GatewayError::Framing(format!(
                "declared frame size {} exceeds {}",
                total, MAX_FRAME_SIZE
            )));
        }
        if self.buffer.len() < total {
            return Ok(None);
        }
        if self.buffer[total - 2..total] != TRAILER {
            return Err(GatewayError::Framing("missing 0D 0A trailer".into()));
        }

        Ok(Some(self.buffer.split_to(total).freeze()))
    }
}

impl Default for Gt06FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSplitter for Gt06FrameSplitter {
    fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}
