//! Length-field-based frame splitting.
//!
//! The total frame size is `offset + width + value + adjustment`, where
//! `value` is the unsigned integer read at `offset` with the configured
//! width and byte order. The whole frame, length field included, is emitted.

use bytes::{Bytes, BytesMut};

use super::{ByteOrder, FrameSplitter};
use crate::error::{GatewayError, Result};

/// Splits frames whose size is declared by an embedded length field.
pub struct LengthFieldSplitter {
    buffer: BytesMut,
    offset: usize,
    width: usize,
    adjustment: i32,
    byte_order: ByteOrder,
    max_size: usize,
}

impl LengthFieldSplitter {
    pub fn new(
        offset: usize,
        width: usize,
        adjustment: i32,
        byte_order: ByteOrder,
        max_size: usize,
    ) -> Self {
        debug_assert!(matches!(width, 1 | 2 | 4));
        Self {
            buffer: BytesMut::with_capacity(max_size.min(4 * 1024)),
            offset,
            width,
            adjustment,
            byte_order,
            max_size,
        }
    }

    fn read_length(&self) -> u64 {
        let field = &self.buffer[self.offset..self.offset + self.width];
        let mut value: u64 = 0;
        match self.byte_order {
            ByteOrder::Big => {
                for &b in field {
                    value = (value << 8) | u64::from(b);
                }
            }
            ByteOrder::Little => {
                for &b in field.iter().rev() {
                    value = (value << 8) | u64::from(b);
                }
            }
        }
        value
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < self.offset + self.width {
            return Ok(None);
        }

        let declared = self.read_length() as i64;
        let total = (self.offset + self.width) as i64 + declared + i64::from(self.adjustment);
        if total < (self.offset + self.width) as i64 || total as usize > self.max_size {
            return Err(GatewayError::Framing(format!(
                "declared frame size {} outside 0..={}",
                total, self.max_size
            )));
        }

        let total = total as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }
        Ok(Some(self.buffer.split_to(total).freeze()))
    }
}

impl FrameSplitter for LengthFieldSplitter {
    fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_prefix() {
        // u16 length prefix counting the payload only.
        let mut splitter = LengthFieldSplitter::new(0, 2, 0, ByteOrder::Big, 64);
        let frames = splitter.push(&[0x00, 0x03, b'a', b'b', b'c']).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0x00, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn test_little_endian_prefix() {
        let mut splitter = LengthFieldSplitter::new(0, 2, 0, ByteOrder::Little, 64);
        let frames = splitter.push(&[0x03, 0x00, 1, 2, 3]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 5);
    }

    #[test]
    fn test_length_includes_trailer_via_adjustment() {
        // Length counts from a 2-byte magic through a 2-byte checksum:
        // magic(2) + len(1) at offset 2, value covers body + checksum.
        let mut splitter = LengthFieldSplitter::new(2, 1, 0, ByteOrder::Big, 64);
        let frame = [0xAA, 0xBB, 0x04, 1, 2, 0xDE, 0xAD];
        let frames = splitter.push(&frame).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &frame);
    }

    #[test]
    fn test_waits_for_payload() {
        let mut splitter = LengthFieldSplitter::new(0, 2, 0, ByteOrder::Big, 64);
        assert!(splitter.push(&[0x00, 0x04, b'x']).unwrap().is_empty());
        let frames = splitter.push(&[b'y', b'z', b'w']).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 6);
    }

    #[test]
    fn test_two_frames_one_read() {
        let mut splitter = LengthFieldSplitter::new(0, 1, 0, ByteOrder::Big, 64);
        let frames = splitter.push(&[2, 9, 9, 1, 7]).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &[2, 9, 9]);
        assert_eq!(&frames[1][..], &[1, 7]);
    }

    #[test]
    fn test_oversized_declaration_fails_closed() {
        let mut splitter = LengthFieldSplitter::new(0, 2, 0, ByteOrder::Big, 16);
        let result = splitter.push(&[0xFF, 0xFF]);
        assert!(matches!(result, Err(GatewayError::Framing(_))));
    }

    #[test]
    fn test_negative_total_fails_closed() {
        let mut splitter = LengthFieldSplitter::new(0, 1, -4, ByteOrder::Big, 16);
        let result = splitter.push(&[0x00, 0x00]);
        assert!(matches!(result, Err(GatewayError::Framing(_))));
    }
}
