//! Message-oriented connection owned by one upload session.
//!
//! A [`Connection`] is the session's end of a pair of channels. The other
//! end, a [`Peer`], is serviced by the WebSocket pumps (see [`crate::ws`]) or
//! driven directly by tests and alternative transports.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use frontporch_protocol::ClientMessage;
use frontporch_transfer::Payload;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ConnectionError;

/// One outbound data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Frame payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<ClientMessage> for Frame {
    fn from(msg: ClientMessage) -> Self {
        Self::Text(msg.to_string())
    }
}

impl From<Payload> for Frame {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Binary(b) => Self::Binary(b),
            Payload::Text(t) => Self::Text(t),
        }
    }
}

/// Requests flowing from the session to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    /// Ask the transport to shut down. May be repeated.
    Close,
}

/// Notifications flowing from the transport to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A message from the server.
    Message(String),
    /// The transport failed. A [`Inbound::Closed`] follows.
    Error(String),
    /// The transport is closed.
    Closed,
}

/// Count of bytes handed to the transport but not yet written out.
pub(crate) type BufferedGauge = Arc<AtomicUsize>;

/// The session's end of a connection.
pub struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    buffered: BufferedGauge,
    binary_frames: bool,
    pumps: Vec<JoinHandle<()>>,
}

/// The transport's end of a connection.
pub struct Peer {
    pub(crate) outbound: mpsc::UnboundedReceiver<Outbound>,
    pub(crate) inbound: mpsc::UnboundedSender<Inbound>,
    pub(crate) buffered: BufferedGauge,
}

impl Connection {
    /// Creates a connected pair. `binary_frames` states whether the peer
    /// can carry binary frames.
    pub fn pair(binary_frames: bool) -> (Connection, Peer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));
        let connection = Connection {
            outbound: outbound_tx,
            inbound: inbound_rx,
            buffered: buffered.clone(),
            binary_frames,
            pumps: Vec::new(),
        };
        let peer = Peer {
            outbound: outbound_rx,
            inbound: inbound_tx,
            buffered,
        };
        (connection, peer)
    }

    /// Ties the lifetime of a transport task to this connection.
    pub(crate) fn attach(&mut self, pump: JoinHandle<()>) {
        self.pumps.push(pump);
    }

    /// Queues a frame. Never blocks; see [`Connection::buffered_amount`].
    pub fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        let len = frame.len();
        self.buffered.fetch_add(len, Ordering::AcqRel);
        if self.outbound.send(Outbound::Frame(frame)).is_err() {
            self.buffered.fetch_sub(len, Ordering::AcqRel);
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    /// Asks the transport to close. Safe to call repeatedly.
    pub fn request_close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Bytes queued but not yet written to the network.
    pub fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    pub(crate) fn gauge(&self) -> BufferedGauge {
        self.buffered.clone()
    }

    pub fn supports_binary(&self) -> bool {
        self.binary_frames
    }

    /// Waits for the next inbound notification.
    ///
    /// Returns [`Inbound::Closed`] forever once the peer is gone.
    pub async fn recv(&mut self) -> Inbound {
        self.inbound.recv().await.unwrap_or(Inbound::Closed)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

impl Peer {
    /// Takes the next request without marking it written.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Takes a queued request without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }

    /// Takes the next request and marks its bytes as written out.
    pub async fn recv_written(&mut self) -> Option<Outbound> {
        let next = self.outbound.recv().await;
        if let Some(Outbound::Frame(frame)) = &next {
            self.written(frame.len());
        }
        next
    }

    /// Marks `len` buffered bytes as written out.
    pub fn written(&self, len: usize) {
        let _ = self
            .buffered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| {
                Some(b.saturating_sub(len))
            });
    }

    /// Delivers a notification to the session. Returns `false` once the
    /// session's end is gone.
    pub fn deliver(&self, inbound: Inbound) -> bool {
        self.inbound.send(inbound).is_ok()
    }

    /// Bytes queued by the session and not yet marked written.
    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_tracks_buffered_bytes() {
        let (conn, mut peer) = Connection::pair(true);
        conn.send(Frame::Binary(vec![0; 100])).unwrap();
        conn.send(Frame::Text("abc".into())).unwrap();
        assert_eq!(conn.buffered_amount(), 103);

        assert_eq!(
            peer.recv_written().await,
            Some(Outbound::Frame(Frame::Binary(vec![0; 100])))
        );
        assert_eq!(conn.buffered_amount(), 3);

        assert!(matches!(peer.recv().await, Some(Outbound::Frame(_))));
        assert_eq!(peer.buffered(), 3);
        peer.written(3);
        assert_eq!(conn.buffered_amount(), 0);
    }

    #[tokio::test]
    async fn send_after_peer_dropped_fails() {
        let (conn, peer) = Connection::pair(true);
        drop(peer);
        let err = conn.send(Frame::Text("x".into())).unwrap_err();
        assert!(matches!(err, ConnectionError::Closed));
        assert_eq!(conn.buffered_amount(), 0);
        // Close requests never fail.
        conn.request_close();
    }

    #[tokio::test]
    async fn recv_reports_closed_when_peer_gone() {
        let (mut conn, peer) = Connection::pair(false);
        assert!(!conn.supports_binary());
        assert!(peer.deliver(Inbound::Message("Permitted".into())));
        drop(peer);
        assert_eq!(conn.recv().await, Inbound::Message("Permitted".into()));
        assert_eq!(conn.recv().await, Inbound::Closed);
        assert_eq!(conn.recv().await, Inbound::Closed);
    }

    #[tokio::test]
    async fn close_requests_are_forwarded() {
        let (conn, mut peer) = Connection::pair(true);
        conn.request_close();
        conn.request_close();
        assert_eq!(peer.try_recv(), Some(Outbound::Close));
        assert_eq!(peer.try_recv(), Some(Outbound::Close));
        assert_eq!(peer.try_recv(), None);
    }

    #[test]
    fn frames_from_messages_and_payloads() {
        assert_eq!(
            Frame::from(ClientMessage::FileFinish),
            Frame::Text("File Finish".into())
        );
        assert_eq!(
            Frame::from(Payload::Binary(vec![1, 2])),
            Frame::Binary(vec![1, 2])
        );
        assert_eq!(Frame::Text("AAAA".into()).len(), 4);
    }
}
