//! Connection handle. Owns the backend socket and drives the protocol.
//!
//! Exactly one timeline (the scheduler's tick) calls into a [`Connection`];
//! the only state it shares with other threads is the [`DiagnosticsStore`].
//! Socket failures never escape: every fault ends in a transition to
//! [`ConnectionState::Disconnected`] and the scheduler retries later.

use std::io;

use futures_util::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};

use crate::codec::{self, Frame, FrameBuffer, ProtocolError};
use crate::diagnostics::DiagnosticsStore;
use crate::notifier::ChangeNotifier;
use crate::protocol::{self, MessageType};
use crate::types::{ChangeReason, ClientConfig, ConnectionState, DiagnosticsChanged};

/// Stack buffer for a single non-blocking read.
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Frames handled per tick before yielding back to the scheduler.
const MAX_FRAMES_PER_TICK: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("write timed out")]
    WriteTimeout,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

struct Session {
    stream: TcpStream,
    frames: FrameBuffer,
    /// Last successful read or write; drives the keep-alive ping.
    last_traffic: Instant,
    /// A read returned EOF.
    peer_closed: bool,
}

impl Session {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            frames: FrameBuffer::new(),
            last_traffic: Instant::now(),
            peer_closed: false,
        }
    }
}

/// State-as-location: the socket only exists inside `Connected`.
enum Link {
    Disconnected,
    Connecting(JoinHandle<io::Result<TcpStream>>),
    Connected(Session),
}

pub struct Connection {
    link: Link,
    config: ClientConfig,
    store: DiagnosticsStore,
    notifier: ChangeNotifier,
    connect_attempts: u64,
}

impl Connection {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let notifier = ChangeNotifier::new(config.debounce());
        Self {
            link: Link::Disconnected,
            config,
            store: DiagnosticsStore::new(),
            notifier,
            connect_attempts: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shared handle to the diagnostics cache this connection fills.
    #[must_use]
    pub fn store(&self) -> &DiagnosticsStore {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticsChanged> {
        self.notifier.subscribe()
    }

    pub(crate) fn change_sender(&self) -> broadcast::Sender<DiagnosticsChanged> {
        self.notifier.sender()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self.link {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connecting(_) => ConnectionState::Connecting,
            Link::Connected(_) => ConnectionState::Connected,
        }
    }

    #[must_use]
    pub fn is_connecting(&self) -> bool {
        matches!(self.link, Link::Connecting(_))
    }

    /// Connected, and a non-blocking peek doesn't show the peer hung up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        let Link::Connected(session) = &self.link else {
            return false;
        };
        if session.peer_closed {
            return false;
        }
        let mut probe = [0u8; 1];
        // Readable with nothing to read means EOF.
        !matches!(
            session.stream.peek(&mut probe).now_or_never(),
            Some(Ok(0) | Err(_))
        )
    }

    /// Number of connects started over the lifetime of this handle.
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    /// Start connecting to `host:port` in the background.
    ///
    /// Any existing link is dropped first without telling the peer. The
    /// outcome is picked up by a later [`tick`](Self::tick). Must be called
    /// from within a Tokio runtime.
    pub fn connect(&mut self, host: &str, port: u16) {
        if !matches!(self.link, Link::Disconnected) {
            self.drop_link();
        }

        self.connect_attempts += 1;
        let addr = format!("{host}:{port}");
        let connect_timeout = self.config.connect_timeout();
        tracing::debug!(%addr, attempt = self.connect_attempts, "Connecting to debug server");

        let handle = tokio::spawn(async move {
            match timeout(connect_timeout, TcpStream::connect(addr)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timed out",
                )),
            }
        });
        self.link = Link::Connecting(handle);
    }

    /// Tear the link down, optionally telling the peer first.
    ///
    /// The cache is emptied; subscribers get one `Cleared` signal if it held
    /// anything. A failed goodbye is ignored since the socket is going away.
    pub async fn disconnect(&mut self, notify_peer: bool) {
        if notify_peer && self.is_connected() {
            let write_timeout = self.config.write_timeout();
            if let Link::Connected(session) = &mut self.link {
                let frame = codec::encode_message(MessageType::Disconnect);
                match timeout(write_timeout, session.stream.write_all(&frame)).await {
                    Ok(Ok(())) => tracing::debug!("Sent disconnect to debug server"),
                    Ok(Err(e)) => tracing::debug!("Disconnect notification failed: {e}"),
                    Err(_) => tracing::debug!("Disconnect notification timed out"),
                }
            }
        }
        self.drop_link();
    }

    fn drop_link(&mut self) {
        self.notifier.reset();
        if self.store.clear() {
            self.notifier.notify_now(ChangeReason::Cleared);
        }

        match std::mem::replace(&mut self.link, Link::Disconnected) {
            Link::Connected(session) => {
                tracing::info!(
                    buffered = session.frames.len(),
                    "Disconnected from debug server"
                );
            }
            Link::Connecting(handle) => {
                handle.abort();
                tracing::debug!("Abandoned pending connect");
            }
            Link::Disconnected => {}
        }
    }

    /// Write a bare frame of `message_type`.
    ///
    /// A failed write drops the connection without notifying the peer.
    pub async fn send(&mut self, message_type: MessageType) -> Result<(), ConnectionError> {
        let write_timeout = self.config.write_timeout();
        let Link::Connected(session) = &mut self.link else {
            return Err(ConnectionError::NotConnected);
        };

        let frame = codec::encode_message(message_type);
        let error = match timeout(write_timeout, session.stream.write_all(&frame)).await {
            Ok(Ok(())) => {
                session.last_traffic = Instant::now();
                tracing::trace!(?message_type, "Sent message");
                return Ok(());
            }
            Ok(Err(e)) => ConnectionError::Io(e),
            Err(_) => ConnectionError::WriteTimeout,
        };

        tracing::warn!(?message_type, "Send failed, dropping connection: {error}");
        self.disconnect(false).await;
        Err(error)
    }

    /// Advance the connection by one step.
    ///
    /// Resolves a pending connect, pings an idle peer, handles every complete
    /// frame that has arrived, and fires the debounced change signal.
    pub async fn tick(&mut self) {
        self.resolve_connect().await;
        if !matches!(self.link, Link::Connected(_)) {
            return;
        }

        if !self.is_connected() {
            tracing::info!("Debug server closed the connection");
            self.disconnect(false).await;
            return;
        }

        if self.keep_alive_due() && self.send(MessageType::PingAlive).await.is_err() {
            return;
        }

        match self.receive().await {
            Ok(frames) => {
                for frame in frames {
                    self.dispatch(frame).await;
                    if !matches!(self.link, Link::Connected(_)) {
                        return;
                    }
                }
            }
            Err(e) => {
                // After a framing error the stream position is unknown;
                // reconnecting is the only way to resynchronize.
                tracing::warn!("Dropping connection: {e}");
                self.disconnect(false).await;
                return;
            }
        }

        if !self.is_connected() {
            tracing::info!("Debug server closed the connection");
            self.disconnect(false).await;
            return;
        }

        self.notifier.poll();
    }

    async fn resolve_connect(&mut self) {
        let Link::Connecting(handle) = &mut self.link else {
            return;
        };
        if !handle.is_finished() {
            return;
        }

        let outcome = handle.await;
        match outcome {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Failed to set TCP_NODELAY: {e}");
                }
                tracing::info!(peer = ?stream.peer_addr().ok(), "Connected to debug server");
                self.link = Link::Connected(Session::new(stream));
            }
            Ok(Err(e)) => {
                tracing::debug!("Connect failed: {e}");
                self.link = Link::Disconnected;
            }
            Err(e) => {
                tracing::warn!("Connect task failed: {e}");
                self.link = Link::Disconnected;
            }
        }
    }

    fn keep_alive_due(&self) -> bool {
        match &self.link {
            Link::Connected(session) => session.last_traffic.elapsed() > self.config.keep_alive(),
            _ => false,
        }
    }

    /// Pull whatever the socket has buffered and split it into frames.
    async fn receive(&mut self) -> Result<Vec<Frame>, ConnectionError> {
        let read_poll = self.config.read_poll();
        let Link::Connected(session) = &mut self.link else {
            return Ok(Vec::new());
        };

        let mut frames = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_BYTES];

        loop {
            while frames.len() < MAX_FRAMES_PER_TICK {
                match session.frames.next_frame()? {
                    Some(frame) => frames.push(frame),
                    None => break,
                }
            }
            if frames.len() >= MAX_FRAMES_PER_TICK || session.peer_closed {
                break;
            }

            match timeout(read_poll, session.stream.readable()).await {
                Err(_) => break,
                Ok(result) => result?,
            }

            match session.stream.try_read(&mut chunk) {
                Ok(0) => session.peer_closed = true,
                Ok(n) => {
                    session.frames.push(&chunk[..n]);
                    session.last_traffic = Instant::now();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(frames)
    }

    async fn dispatch(&mut self, frame: Frame) {
        match frame.message_type() {
            Some(MessageType::PingAlive) => {
                tracing::trace!("Ping from debug server");
                // A failed echo already dropped the connection.
                let _ = self.send(MessageType::PingAlive).await;
            }
            Some(MessageType::Diagnostics) => match protocol::decode_diagnostics(frame.body()) {
                Ok(message) => {
                    tracing::debug!(
                        path = %message.file_path(),
                        count = message.diagnostics().len(),
                        "Diagnostics updated"
                    );
                    self.store.upsert(message);
                    self.notifier.mark_dirty();
                }
                Err(e) => {
                    // Frame boundaries are intact, so the stream is still usable.
                    tracing::warn!("Skipping malformed diagnostics frame: {e}");
                }
            },
            Some(MessageType::Disconnect) => {
                tracing::info!("Debug server requested disconnect");
                self.disconnect(false).await;
            }
            Some(other) => {
                tracing::trace!(message_type = ?other, "Ignoring unhandled message");
            }
            None => {
                tracing::debug!(type_byte = frame.type_byte(), "Ignoring unknown message type");
            }
        }
    }
}
