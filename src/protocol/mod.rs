//! Protocol decoding contract and the protocol implementations.
//!
//! A [`ProtocolDecoder`] is a stateful per-connection object invoked once per
//! complete frame, strictly in arrival order, never concurrently on one
//! session. Each call returns exactly one of: a position (forwarded to the
//! sink), a control signal (side effect only), or nothing (frame consumed).
//!
//! Decoders may write protocol frames back on the same connection through
//! the [`CommandLink`](crate::writer::CommandLink) they are handed; outbound
//! writes are fire-and-forget and never wait for the device to answer.

pub mod crc;
pub mod gt06;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::model::{DeviceId, Position};
use crate::writer::CommandLink;

/// Outcome of decoding one frame.
#[derive(Debug)]
pub enum Decoded {
    /// A normalized position record, ready for the sink.
    Position(Position),
    /// A side effect happened (login ack, command echo); no record.
    Signal(ControlSignal),
    /// Frame consumed with no action, e.g. a heartbeat.
    Nothing,
}

/// Control signals a decoder can surface to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// A login frame resolved a known device; the session is authenticated.
    LoginAccepted { device_id: DeviceId },
    /// A device-relayed echo of a server command was processed.
    CommandEcho,
}

/// Stateful per-connection protocol decoder.
///
/// Implementations own their session state (resolved device id, pending
/// pushes) and must treat device-lookup misses as non-fatal: an unknown
/// device never tears the connection down, it just never produces positions.
#[async_trait]
pub trait ProtocolDecoder: Send {
    /// Decode one complete frame, as produced by this protocol's splitter.
    ///
    /// A `Decode` error drops only the offending frame; the caller keeps the
    /// connection open and continues with the next frame.
    async fn decode(&mut self, frame: Bytes, link: &CommandLink) -> Result<Decoded>;
}
