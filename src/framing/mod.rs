//! Frame splitting: turning a per-connection byte stream into discrete frames.
//!
//! A [`FrameSplitter`] owns a growing buffer, emits complete frames in
//! arrival order and retains any partial tail for the next read. Splitters
//! are stateless beyond that buffer and are created once per connection.
//!
//! Error policy: if no frame boundary is found within the configured maximum
//! size the splitter fails closed ([`GatewayError::Framing`]) and the
//! connection is torn down. There is no resynchronization; one corrupt frame
//! must not cause silent permanent desync.

mod delimiter;
mod fixed;
mod length_field;

pub use delimiter::DelimiterSplitter;
pub use fixed::FixedLengthSplitter;
pub use length_field::LengthFieldSplitter;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default maximum frame size shared by the generic strategies.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024;

/// Byte order of multi-byte wire fields, configured per listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// Strategy turning a byte stream into complete protocol frames.
pub trait FrameSplitter: Send {
    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns the frames completed by this read, in arrival order; an empty
    /// vector means more data is needed. Returns an error only for framing
    /// violations, after which the splitter must not be reused.
    fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>>;
}

/// Declarative framing descriptor, one per protocol table entry.
///
/// Listener startup builds one splitter instance per connection from this.
#[derive(Debug, Clone)]
pub enum FramingPolicy {
    /// Frame ends at the earliest match among alternative delimiters.
    Delimiter {
        delimiters: Vec<Vec<u8>>,
        max_size: usize,
    },
    /// Frame length read from a field at `offset`, `width` bytes wide;
    /// total frame size = offset + width + value + adjustment.
    LengthField {
        offset: usize,
        width: usize,
        adjustment: i32,
        max_size: usize,
    },
    /// Every frame is exactly `size` bytes.
    Fixed { size: usize },
    /// Protocol-specific framing (magic header + length byte + trailer).
    Custom(fn() -> Box<dyn FrameSplitter>),
}

impl FramingPolicy {
    /// Delimiter policy with the default maximum size.
    pub fn delimited(delimiters: &[&[u8]]) -> Self {
        Self::Delimiter {
            delimiters: delimiters.iter().map(|d| d.to_vec()).collect(),
            max_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Build a fresh splitter for one connection.
    pub fn build(&self, byte_order: ByteOrder) -> Box<dyn FrameSplitter> {
        match self {
            Self::Delimiter {
                delimiters,
                max_size,
            } => Box::new(DelimiterSplitter::new(delimiters.clone(), *max_size)),
            Self::LengthField {
                offset,
                width,
                adjustment,
                max_size,
            } => Box::new(LengthFieldSplitter::new(
                *offset,
                *width,
                *adjustment,
                byte_order,
                *max_size,
            )),
            Self::Fixed { size } => Box::new(FixedLengthSplitter::new(*size)),
            Self::Custom(factory) => factory(),
        }
    }
}
