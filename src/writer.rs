//! Per-connection outbound command writer.
//!
//! Decoders never touch the socket directly: each connection spawns one
//! writer task fed through an mpsc channel, and decoders hold a cheap
//! cloneable [`CommandLink`]. Sends are fire-and-forget: the pipeline never
//! waits for a device to acknowledge, and correlation happens when a later,
//! independently arriving frame is decoded.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Default outbound queue depth per connection.
pub const DEFAULT_COMMAND_QUEUE: usize = 64;

/// Handle for queueing fully encoded protocol frames to one connection.
#[derive(Clone)]
pub struct CommandLink {
    tx: Option<mpsc::Sender<Bytes>>,
}

impl CommandLink {
    /// A link that silently discards every frame.
    ///
    /// Used for transports with no reply path and in decoder unit tests.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// A link backed by a bare channel, for transports that handle their own
    /// writes (the UDP reply path sends each frame as one datagram).
    pub fn channel() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(DEFAULT_COMMAND_QUEUE);
        (Self { tx: Some(tx) }, rx)
    }

    /// Queue a frame for writing. Fire-and-forget: a full queue or a closed
    /// connection drops the frame with a warning instead of blocking decode.
    pub fn send(&self, frame: Bytes) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(err) = tx.try_send(frame) {
            tracing::warn!("dropping outbound frame: {}", err);
        }
    }
}

/// Spawn the writer task for one connection.
///
/// Returns the link decoders write through and the task handle; the task
/// ends cleanly once every link clone is dropped.
pub fn spawn_command_writer<W>(writer: W) -> (CommandLink, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(DEFAULT_COMMAND_QUEUE);
    let task = tokio::spawn(writer_loop(rx, writer));
    (CommandLink { tx: Some(tx) }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        writer.write_all(&frame).await?;
        writer.flush().await?;
    }
    Ok(())
}
