//! Listener lifecycle and the per-connection pipeline.
//!
//! A [`Gateway`] binds one socket per configured listener and runs each
//! connection through the same pipeline: read, split into frames, decode,
//! deliver positions to the sink. Each TCP connection owns a splitter, a
//! decoder and a writer task; UDP listeners keep one decoder per peer
//! address, with every datagram treated as one complete frame.
//!
//! Error policy per connection: a framing violation tears the connection
//! down, a decode error drops only the offending frame, a sink error is
//! logged and the pipeline keeps going.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::{GatewayConfig, ListenerConfig, Transport};
use crate::error::{GatewayError, Result};
use crate::protocol::{ControlSignal, Decoded, ProtocolDecoder};
use crate::registry::ProtocolRegistry;
use crate::sink::PositionSink;
use crate::writer::{spawn_command_writer, CommandLink};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// UDP peers silent for this long get their decoder state dropped.
const UDP_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

/// The running gateway: bound listeners plus the shared pipeline handles.
pub struct Gateway {
    registry: Arc<ProtocolRegistry>,
    sink: Arc<dyn PositionSink>,
    shutdown: watch::Sender<bool>,
    listeners: Vec<JoinHandle<()>>,
    addrs: Vec<SocketAddr>,
}

impl Gateway {
    pub fn new(registry: ProtocolRegistry, sink: Arc<dyn PositionSink>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry: Arc::new(registry),
            sink,
            shutdown,
            listeners: Vec::new(),
            addrs: Vec::new(),
        }
    }

    /// Bind every configured listener, failing fast on the first bad entry.
    pub async fn bind(&mut self, config: &GatewayConfig) -> Result<()> {
        for listener in &config.listeners {
            self.bind_listener(listener.clone()).await?;
        }
        Ok(())
    }

    /// Bind one listener and start serving it.
    pub async fn bind_listener(&mut self, config: ListenerConfig) -> Result<()> {
        if config.http_tunnel {
            return Err(GatewayError::Config(format!(
                "listener {}: http tunneling is not supported",
                config.bind_addr()
            )));
        }
        self.registry.get(&config.protocol)?;

        let registry = self.registry.clone();
        let sink = self.sink.clone();
        let shutdown = self.shutdown.subscribe();
        let handle = match config.transport {
            Transport::Tcp => {
                let listener = TcpListener::bind(config.bind_addr()).await?;
                let addr = listener.local_addr()?;
                info!(%addr, protocol = %config.protocol, "tcp listener up");
                self.addrs.push(addr);
                tokio::spawn(accept_loop(listener, config, registry, sink, shutdown))
            }
            Transport::Udp => {
                let socket = UdpSocket::bind(config.bind_addr()).await?;
                let addr = socket.local_addr()?;
                info!(%addr, protocol = %config.protocol, "udp listener up");
                self.addrs.push(addr);
                tokio::spawn(datagram_loop(socket, config, registry, sink, shutdown))
            }
        };
        self.listeners.push(handle);
        Ok(())
    }

    /// Bound socket addresses, in bind order. Useful with port 0.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Stop accepting, signal every open connection and wait for the
    /// listeners and their connection tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.listeners {
            let _ = handle.await;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: ListenerConfig,
    registry: Arc<ProtocolRegistry>,
    sink: Arc<dyn PositionSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, protocol = %config.protocol, "connection accepted");
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        config.clone(),
                        registry.clone(),
                        sink.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(error) => warn!(%error, "accept failed"),
            },
        }
    }
    // Connections see the same shutdown signal; wait for their in-flight
    // sink writes to land before the listener task returns.
    while connections.join_next().await.is_some() {}
    debug!(protocol = %config.protocol, "tcp listener stopped");
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: ListenerConfig,
    registry: Arc<ProtocolRegistry>,
    sink: Arc<dyn PositionSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    let entry = match registry.get(&config.protocol) {
        Ok(entry) => entry,
        Err(error) => {
            warn!(%error, "listener refers to an unregistered protocol");
            return;
        }
    };
    let mut splitter = entry.framing().build(config.byte_order);
    let mut decoder = entry.new_decoder();
    let (mut reader, writer) = stream.into_split();
    let (link, _writer_task) = spawn_command_writer(writer);

    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = tokio::select! {
            _ = shutdown.changed() => break,
            read = reader.read(&mut buffer) => read,
        };
        let count = match read {
            Ok(0) => break,
            Ok(count) => count,
            Err(error) => {
                debug!(%peer, %error, "read failed");
                break;
            }
        };
        let frames = match splitter.push(&buffer[..count]) {
            Ok(frames) => frames,
            Err(error) => {
                warn!(%peer, %error, "framing violation, closing connection");
                break;
            }
        };
        for frame in frames {
            process_frame(&mut *decoder, frame, &link, &sink, peer).await;
        }
    }
    debug!(%peer, "connection closed");
}

async fn datagram_loop(
    socket: UdpSocket,
    config: ListenerConfig,
    registry: Arc<ProtocolRegistry>,
    sink: Arc<dyn PositionSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    let entry = match registry.get(&config.protocol) {
        Ok(entry) => entry,
        Err(error) => {
            warn!(%error, "listener refers to an unregistered protocol");
            return;
        }
    };
    let socket = Arc::new(socket);
    let mut sessions: HashMap<SocketAddr, UdpSession> = HashMap::new();
    let mut last_sweep = Instant::now();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buffer) => received,
        };
        let (count, peer) = match received {
            Ok(pair) => pair,
            Err(error) => {
                warn!(%error, "recv failed");
                continue;
            }
        };
        if last_sweep.elapsed() >= UDP_SESSION_TIMEOUT {
            evict_idle_sessions(&mut sessions, UDP_SESSION_TIMEOUT);
            last_sweep = Instant::now();
        }
        let session = sessions.entry(peer).or_insert_with(|| {
            let (link, mut rx) = CommandLink::channel();
            let socket = socket.clone();
            tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    if let Err(error) = socket.send_to(&frame, peer).await {
                        warn!(%peer, %error, "udp reply failed");
                        break;
                    }
                }
            });
            UdpSession {
                decoder: entry.new_decoder(),
                link,
                last_seen: Instant::now(),
            }
        });
        session.last_seen = Instant::now();
        let frame = Bytes::copy_from_slice(&buffer[..count]);
        process_frame(session.decoder.as_mut(), frame, &session.link, &sink, peer).await;
    }
    debug!(protocol = %config.protocol, "udp listener stopped");
}

/// Decoder state for one UDP peer. Dropping it also drops the link, which
/// ends that peer's reply-forwarding task.
struct UdpSession {
    decoder: Box<dyn ProtocolDecoder>,
    link: CommandLink,
    last_seen: Instant,
}

fn evict_idle_sessions(sessions: &mut HashMap<SocketAddr, UdpSession>, timeout: Duration) {
    sessions.retain(|peer, session| {
        let keep = session.last_seen.elapsed() < timeout;
        if !keep {
            debug!(%peer, "udp session expired");
        }
        keep
    });
}

/// Decode one frame and deliver its outcome.
async fn process_frame(
    decoder: &mut dyn ProtocolDecoder,
    frame: Bytes,
    link: &CommandLink,
    sink: &Arc<dyn PositionSink>,
    peer: SocketAddr,
) {
    match decoder.decode(frame, link).await {
        Ok(Decoded::Position(position)) => {
            let device_id = position.device_id;
            match sink.insert(position).await {
                Ok(position_id) => {
                    if let Err(error) = sink.update_latest(device_id, position_id).await {
                        warn!(device_id, %error, "failed to update latest position");
                    }
                }
                Err(error) => warn!(device_id, %error, "failed to persist position"),
            }
        }
        Ok(Decoded::Signal(ControlSignal::LoginAccepted { device_id })) => {
            debug!(%peer, device_id, "session authenticated");
        }
        Ok(Decoded::Signal(ControlSignal::CommandEcho)) | Ok(Decoded::Nothing) => {}
        Err(error) => warn!(%peer, %error, "frame dropped"),
    }
}
