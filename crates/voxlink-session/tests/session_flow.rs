//! End-to-end session flow over the loopback transport with scripted
//! engines: negotiation, candidate attachment, greeting, transcription
//! ordering, and teardown.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{sleep, timeout};

use voxlink_core::candidate::CandidateDescriptor;
use voxlink_core::config::Config;
use voxlink_core::context::{ContextMessage, Role};
use voxlink_core::error::{Result, VoxlinkError};
use voxlink_engines::{
    EngineFactory, LanguageGeneration, SpeechToText, TextToSpeech, Transcript,
};
use voxlink_session::{
    LoopbackClient, LoopbackTransport, LoopbackTransportFactory, NegotiationService,
    SessionRegistry, SessionState,
};

const WAIT: Duration = Duration::from_secs(2);

/// Returns one scripted batch of transcripts per `feed` call.
struct ScriptedStt {
    batches: VecDeque<Vec<Transcript>>,
}

#[async_trait]
impl SpeechToText for ScriptedStt {
    async fn feed(&mut self, _pcm: &[u8]) -> Result<Vec<Transcript>> {
        Ok(self.batches.pop_front().unwrap_or_default())
    }

    async fn flush(&mut self) -> Result<Vec<Transcript>> {
        Ok(Vec::new())
    }
}

/// Echoes the last user message, or the greeting instruction when none
/// exists yet. Records every context snapshot it was called with.
struct ScriptedLlm {
    snapshots: Mutex<Vec<Vec<ContextMessage>>>,
}

#[async_trait]
impl LanguageGeneration for ScriptedLlm {
    async fn generate(&self, context: &[ContextMessage]) -> Result<String> {
        self.snapshots.lock().await.push(context.to_vec());
        let reply = context
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| format!("You said: {}", m.content))
            .unwrap_or_else(|| {
                context
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::System)
                    .map(|m| format!("Greeting per: {}", m.content))
                    .unwrap_or_default()
            });
        Ok(reply)
    }
}

/// Emits one fixed PCM chunk per reply.
struct ScriptedTts;

#[async_trait]
impl TextToSpeech for ScriptedTts {
    async fn synthesize(
        &self,
        _text: &str,
        chunk_tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<()> {
        let _ = chunk_tx.send(vec![0u8; 320]);
        Ok(())
    }
}

struct ScriptedEngines {
    stt_batches: Vec<Vec<Transcript>>,
    llm: Arc<ScriptedLlm>,
}

impl ScriptedEngines {
    fn new(stt_batches: Vec<Vec<Transcript>>) -> Self {
        Self {
            stt_batches,
            llm: Arc::new(ScriptedLlm {
                snapshots: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl EngineFactory for ScriptedEngines {
    fn speech_to_text(&self) -> Box<dyn SpeechToText> {
        Box::new(ScriptedStt {
            batches: self.stt_batches.clone().into(),
        })
    }

    fn language_generation(&self) -> Arc<dyn LanguageGeneration> {
        self.llm.clone()
    }

    fn text_to_speech(&self) -> Arc<dyn TextToSpeech> {
        Arc::new(ScriptedTts)
    }
}

fn final_transcript(text: &str) -> Transcript {
    Transcript {
        text: text.into(),
        is_final: Some(true),
    }
}

struct Harness {
    service: NegotiationService,
    registry: Arc<SessionRegistry>,
    llm: Arc<ScriptedLlm>,
    peers: mpsc::UnboundedReceiver<(Arc<LoopbackTransport>, LoopbackClient)>,
}

fn harness(stt_batches: Vec<Vec<Transcript>>) -> Harness {
    let registry = Arc::new(SessionRegistry::new());
    let (transports, peers) = LoopbackTransportFactory::new();
    let engines = Arc::new(ScriptedEngines::new(stt_batches));
    let llm = engines.llm.clone();
    let service = NegotiationService::new(
        registry.clone(),
        Arc::new(transports),
        engines,
        Arc::new(Config::default()),
    );
    Harness {
        service,
        registry,
        llm,
        peers,
    }
}

async fn next_message(client: &mut LoopbackClient) -> Value {
    timeout(WAIT, client.messages_rx.recv())
        .await
        .expect("timed out waiting for side-channel message")
        .expect("side-channel closed")
}

#[tokio::test]
async fn empty_offer_is_rejected_without_registration() {
    let h = harness(vec![]);
    let err = h.service.create_session("", "offer").await.unwrap_err();
    assert!(matches!(err, VoxlinkError::Negotiation(_)));
    assert!(h.registry.is_empty().await);
}

#[tokio::test]
async fn candidates_resolve_against_created_session() {
    let mut h = harness(vec![]);
    let answer = h.service.create_session("v=0", "offer").await.unwrap();
    assert_eq!(answer.answer_type, "answer");
    let (transport, _client) = h.peers.recv().await.unwrap();

    let batch = vec![
        CandidateDescriptor {
            candidate: "candidate:1 1 UDP 1 10.0.0.1 50000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        },
        // End-of-candidates marker: skipped.
        CandidateDescriptor {
            candidate: "".into(),
            sdp_mid: None,
            sdp_mline_index: None,
        },
        // No media line attribution: skipped.
        CandidateDescriptor {
            candidate: "candidate:2".into(),
            sdp_mid: None,
            sdp_mline_index: None,
        },
    ];
    h.service
        .attach_candidates(&answer.session_id, &batch)
        .await
        .unwrap();

    let session = h.registry.get(&answer.session_id).await.unwrap();
    let queue = session.candidate_queue().await;
    assert_eq!(queue.len(), 1);
    assert!(queue[0].candidate.starts_with("candidate:1"));

    // The surviving candidate was applied to the handshake state, not just
    // queued.
    let applied = transport.applied_candidates().await;
    assert_eq!(applied, queue);
}

#[tokio::test]
async fn unknown_session_id_is_reported() {
    let h = harness(vec![]);
    let err = h
        .service
        .attach_candidates("unknown-id", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, VoxlinkError::SessionNotFound(_)));
}

#[tokio::test]
async fn greeting_arrives_before_any_user_transcription() {
    let mut h = harness(vec![]);
    let answer = h.service.create_session("v=0", "offer").await.unwrap();
    let (_transport, mut client) = h.peers.recv().await.unwrap();

    h.service
        .start_session(&answer.session_id, Some("Alice".into()))
        .await
        .unwrap();
    client.connect().await;

    let first = next_message(&mut client).await;
    assert_eq!(first["type"], "text");
    assert_eq!(first["role"], "assistant");
    assert!(first["text"].as_str().unwrap().contains("Alice"));

    // The greeting is synthesized and sent back on the media channel.
    let audio = timeout(WAIT, client.audio_rx.recv()).await.unwrap();
    assert_eq!(audio.unwrap().len(), 320);
}

#[tokio::test]
async fn transcripts_and_replies_keep_pipeline_order() {
    let mut h = harness(vec![
        vec![final_transcript("first utterance")],
        vec![final_transcript("second utterance")],
    ]);
    let answer = h.service.create_session("v=0", "offer").await.unwrap();
    let (_transport, mut client) = h.peers.recv().await.unwrap();
    h.service
        .start_session(&answer.session_id, None)
        .await
        .unwrap();

    // No connect event: no greeting. Feed two audio chunks in order.
    client.audio_tx.send(vec![0u8; 640]).unwrap();
    let m1 = next_message(&mut client).await;
    assert_eq!(m1["type"], "transcription");
    assert_eq!(m1["role"], "user");
    assert_eq!(m1["text"], "first utterance");
    assert_eq!(m1["is_final"], true);

    let r1 = next_message(&mut client).await;
    assert_eq!(r1["type"], "text");
    assert_eq!(r1["text"], "You said: first utterance");
    timeout(WAIT, client.audio_rx.recv()).await.unwrap().unwrap();
    // Let the reply reach the assistant aggregator at the chain tail.
    sleep(Duration::from_millis(50)).await;

    client.audio_tx.send(vec![0u8; 640]).unwrap();
    let m2 = next_message(&mut client).await;
    assert_eq!(m2["text"], "second utterance");
    let r2 = next_message(&mut client).await;
    assert_eq!(r2["text"], "You said: second utterance");

    // Context order at the second generation call: each user entry precedes
    // the assistant entry generated in response to it.
    let snapshots = h.llm.snapshots.lock().await;
    let second = &snapshots[1];
    let tail: Vec<(Role, &str)> = second[2..]
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        tail,
        vec![
            (Role::User, "first utterance"),
            (Role::Assistant, "You said: first utterance"),
            (Role::User, "second utterance"),
        ]
    );
}

#[tokio::test]
async fn disconnect_closes_session_and_silences_side_channel() {
    let mut h = harness(vec![vec![final_transcript("hello")]]);
    let answer = h.service.create_session("v=0", "offer").await.unwrap();
    let (_transport, mut client) = h.peers.recv().await.unwrap();
    h.service
        .start_session(&answer.session_id, None)
        .await
        .unwrap();

    let session = h.registry.get(&answer.session_id).await.unwrap();
    assert_eq!(session.state().await, SessionState::Active);

    client.disconnect().await;

    // The registry entry disappears and the state machine lands in Closed.
    timeout(WAIT, async {
        while h.registry.get(&answer.session_id).await.is_some() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    timeout(WAIT, async {
        while session.state().await != SessionState::Closed {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Audio fed after close produces no further side-channel traffic.
    let _ = client.audio_tx.send(vec![0u8; 640]);
    sleep(Duration::from_millis(100)).await;
    assert!(client.messages_rx.try_recv().is_err());

    // Operations against the closed id fail as not-found.
    let err = h
        .service
        .attach_candidates(&answer.session_id, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, VoxlinkError::SessionNotFound(_)));
}

#[tokio::test]
async fn starting_a_session_twice_is_rejected() {
    let mut h = harness(vec![]);
    let answer = h.service.create_session("v=0", "offer").await.unwrap();
    let _peer = h.peers.recv().await.unwrap();

    h.service
        .start_session(&answer.session_id, None)
        .await
        .unwrap();
    let err = h
        .service
        .start_session(&answer.session_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, VoxlinkError::Negotiation(_)));
}
