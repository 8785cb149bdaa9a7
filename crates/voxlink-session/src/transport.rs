//! Peer transport boundary.
//!
//! The wire-level WebRTC machinery (media encryption, codec handling, ICE
//! connectivity checks) lives behind [`PeerTransport`]; the session layer
//! only drives the negotiation surface, the media byte streams, the
//! out-of-band message channel, and a typed event stream. A channel-backed
//! loopback implementation is provided for tests and local development; a
//! real WebRTC binding plugs in behind [`TransportFactory`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use voxlink_core::candidate::ResolvedCandidate;
use voxlink_core::config::IceServerConfig;
use voxlink_core::error::{Result, VoxlinkError};

/// Lifecycle and side-channel notifications from the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    AppMessage(Value),
}

/// The local half of a completed offer/answer exchange.
#[derive(Debug, Clone)]
pub struct AnswerSdp {
    pub sdp: String,
    pub kind: String,
}

/// One negotiated peer connection.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Drive the handshake from the remote offer to a local answer. Blocking
    /// negotiation step; streaming has not started yet.
    async fn negotiate(&self, offer_sdp: &str, offer_type: &str) -> Result<AnswerSdp>;

    /// Apply a trickled connectivity candidate to the live handshake state.
    async fn add_remote_candidate(&self, candidate: &ResolvedCandidate) -> Result<()>;

    /// Take the transport's event stream. Single consumer — the session
    /// orchestrator; later calls return `None`.
    async fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>>;

    /// Next inbound audio chunk (16-bit LE PCM); `None` once the media
    /// channel is closed.
    async fn recv_audio(&self) -> Option<Vec<u8>>;

    /// Queue synthesized audio to the peer.
    async fn send_audio(&self, pcm: Vec<u8>) -> Result<()>;

    /// Push an out-of-band message on the side-channel.
    async fn send_app_message(&self, message: Value) -> Result<()>;

    /// Release media and side-channel resources. Idempotent.
    async fn close(&self);
}

/// Creates one transport per incoming offer.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, ice_servers: &[IceServerConfig]) -> Result<Arc<dyn PeerTransport>>;
}

// --- Loopback implementation ---

/// In-process transport: both halves are channel pairs. The server half
/// implements [`PeerTransport`]; the [`LoopbackClient`] half plays the
/// browser peer.
pub struct LoopbackTransport {
    events_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    audio_in: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    audio_out: mpsc::UnboundedSender<Vec<u8>>,
    messages_out: mpsc::UnboundedSender<Value>,
    applied_candidates: Mutex<Vec<ResolvedCandidate>>,
    closed: CancellationToken,
}

/// The peer half of a loopback transport.
pub struct LoopbackClient {
    events_tx: mpsc::Sender<TransportEvent>,
    /// Send microphone audio to the session.
    pub audio_tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Audio synthesized by the session.
    pub audio_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Side-channel messages mirrored by the session.
    pub messages_rx: mpsc::UnboundedReceiver<Value>,
}

impl LoopbackClient {
    /// Signal that the peer connection is up.
    pub async fn connect(&self) {
        let _ = self.events_tx.send(TransportEvent::Connected).await;
    }

    /// Signal an (possibly ungraceful) peer disconnect.
    pub async fn disconnect(&self) {
        let _ = self.events_tx.send(TransportEvent::Disconnected).await;
    }

    pub async fn send_message(&self, message: Value) {
        let _ = self.events_tx.send(TransportEvent::AppMessage(message)).await;
    }
}

impl LoopbackTransport {
    /// Build a connected transport/client pair.
    pub fn pair() -> (Arc<Self>, LoopbackClient) {
        let (events_tx, events_rx) = mpsc::channel(16);
        let (audio_in_tx, audio_in_rx) = mpsc::unbounded_channel();
        let (audio_out_tx, audio_out_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();

        let transport = Arc::new(Self {
            events_rx: Mutex::new(Some(events_rx)),
            audio_in: Mutex::new(audio_in_rx),
            audio_out: audio_out_tx,
            messages_out: messages_tx,
            applied_candidates: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
        });

        let client = LoopbackClient {
            events_tx,
            audio_tx: audio_in_tx,
            audio_rx: audio_out_rx,
            messages_rx,
        };

        (transport, client)
    }

    /// Candidates applied so far, in arrival order.
    pub async fn applied_candidates(&self) -> Vec<ResolvedCandidate> {
        self.applied_candidates.lock().await.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn negotiate(&self, offer_sdp: &str, offer_type: &str) -> Result<AnswerSdp> {
        if offer_sdp.trim().is_empty() {
            return Err(VoxlinkError::Negotiation("empty offer SDP".into()));
        }
        if offer_type != "offer" {
            return Err(VoxlinkError::Negotiation(format!(
                "unexpected description type `{offer_type}`"
            )));
        }
        Ok(AnswerSdp {
            sdp: "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=voxlink-loopback\r\nt=0 0\r\n".into(),
            kind: "answer".into(),
        })
    }

    async fn add_remote_candidate(&self, candidate: &ResolvedCandidate) -> Result<()> {
        if self.is_closed() {
            return Err(VoxlinkError::Transport("transport closed".into()));
        }
        self.applied_candidates.lock().await.push(candidate.clone());
        Ok(())
    }

    async fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.lock().await.take()
    }

    async fn recv_audio(&self) -> Option<Vec<u8>> {
        let mut audio_in = self.audio_in.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => None,
            chunk = audio_in.recv() => chunk,
        }
    }

    async fn send_audio(&self, pcm: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Err(VoxlinkError::Transport("transport closed".into()));
        }
        self.audio_out
            .send(pcm)
            .map_err(|_| VoxlinkError::Transport("media channel gone".into()))
    }

    async fn send_app_message(&self, message: Value) -> Result<()> {
        if self.is_closed() {
            return Err(VoxlinkError::Transport("transport closed".into()));
        }
        self.messages_out
            .send(message)
            .map_err(|_| VoxlinkError::Transport("side-channel gone".into()))
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

/// Factory producing loopback transports. Both halves of each pair are
/// handed out on a channel so tests can drive the peer side and inspect the
/// server side; [`detached`](Self::detached) drops them for wiring where no
/// in-process peer exists.
pub struct LoopbackTransportFactory {
    pairs_tx: mpsc::UnboundedSender<(Arc<LoopbackTransport>, LoopbackClient)>,
}

impl LoopbackTransportFactory {
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<(Arc<LoopbackTransport>, LoopbackClient)>,
    ) {
        let (pairs_tx, pairs_rx) = mpsc::unbounded_channel();
        (Self { pairs_tx }, pairs_rx)
    }

    pub fn detached() -> Self {
        let (pairs_tx, _) = mpsc::unbounded_channel();
        Self { pairs_tx }
    }
}

#[async_trait]
impl TransportFactory for LoopbackTransportFactory {
    async fn create(&self, _ice_servers: &[IceServerConfig]) -> Result<Arc<dyn PeerTransport>> {
        let (transport, client) = LoopbackTransport::pair();
        // Nobody listening for pairs is fine (detached mode).
        let _ = self.pairs_tx.send((transport.clone(), client));
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_negotiate_validates_offer() {
        let (transport, _client) = LoopbackTransport::pair();

        let answer = transport.negotiate("v=0", "offer").await.unwrap();
        assert_eq!(answer.kind, "answer");
        assert!(answer.sdp.starts_with("v=0"));

        assert!(matches!(
            transport.negotiate("", "offer").await,
            Err(VoxlinkError::Negotiation(_))
        ));
        assert!(matches!(
            transport.negotiate("v=0", "answer").await,
            Err(VoxlinkError::Negotiation(_))
        ));
    }

    #[tokio::test]
    async fn test_events_taken_once() {
        let (transport, client) = LoopbackTransport::pair();
        client.connect().await;

        let mut events = transport.take_events().await.unwrap();
        assert!(matches!(events.recv().await, Some(TransportEvent::Connected)));
        assert!(transport.take_events().await.is_none());
    }

    #[tokio::test]
    async fn test_audio_round_trip() {
        let (transport, mut client) = LoopbackTransport::pair();

        client.audio_tx.send(vec![1, 2, 3, 4]).unwrap();
        assert_eq!(transport.recv_audio().await, Some(vec![1, 2, 3, 4]));

        transport.send_audio(vec![9, 9]).await.unwrap();
        assert_eq!(client.audio_rx.recv().await, Some(vec![9, 9]));
    }

    #[tokio::test]
    async fn test_close_stops_io() {
        let (transport, mut client) = LoopbackTransport::pair();
        transport.close().await;

        assert!(transport.recv_audio().await.is_none());
        assert!(transport.send_audio(vec![0]).await.is_err());
        assert!(transport.send_app_message(json!({"type": "x"})).await.is_err());

        // No message reaches the peer after close.
        assert!(client.messages_rx.try_recv().is_err());
    }
}
