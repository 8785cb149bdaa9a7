//! The concrete pipeline stages, in their fixed order:
//!
//! audio ingest → speech-to-text → tap(user) → context(user) →
//! language generation → tap(assistant) → text-to-speech → audio emit →
//! context(assistant).
//!
//! The assistant context aggregator sits after audio emit so generated text
//! is only recorded once it has been queued for synthesis; a synthesis
//! failure closes the session before the context drifts.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use voxlink_core::context::ConversationContext;
use voxlink_core::error::{Result, VoxlinkError};
use voxlink_core::frame::{AudioChunk, ControlSignal, Frame};
use voxlink_engines::{EngineFactory, LanguageGeneration, SpeechToText, TextToSpeech};

use crate::pipeline::{PipelineStage, next_frame, send_frame};
use crate::transport::PeerTransport;

/// Which side of the conversation a tap or aggregator observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    User,
    Assistant,
}

/// Build the full stage chain for one session.
pub fn build_stage_chain(
    transport: Arc<dyn PeerTransport>,
    engines: &dyn EngineFactory,
    context: Arc<Mutex<ConversationContext>>,
    assume_final: bool,
) -> Vec<Box<dyn PipelineStage>> {
    vec![
        Box::new(AudioIngest::new(transport.clone())),
        Box::new(SpeechToTextStage::new(engines.speech_to_text(), assume_final)),
        Box::new(MessageTap::new(StageRole::User, transport.clone())),
        Box::new(ContextAggregator::new(StageRole::User, context.clone())),
        Box::new(LanguageGenerationStage::new(
            engines.language_generation(),
            context.clone(),
        )),
        Box::new(MessageTap::new(StageRole::Assistant, transport.clone())),
        Box::new(TextToSpeechStage::new(engines.text_to_speech())),
        Box::new(AudioEmit::new(transport)),
        Box::new(ContextAggregator::new(StageRole::Assistant, context)),
    ]
}

// --- AudioIngest ---

/// Source of the forward path: turns transport audio into [`Frame::Audio`].
/// Frames injected at the pipeline head (control signals) are forwarded
/// ahead of it.
pub struct AudioIngest {
    transport: Arc<dyn PeerTransport>,
}

impl AudioIngest {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl PipelineStage for AudioIngest {
    fn name(&self) -> &'static str {
        "audio_ingest"
    }

    async fn run(
        self: Box<Self>,
        mut input: mpsc::Receiver<Frame>,
        output: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let transport = self.transport;
        let mut media_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                injected = input.recv() => match injected {
                    Some(frame) => {
                        if !send_frame(&output, frame, &cancel).await {
                            break;
                        }
                    }
                    // Head sender dropped: the orchestrator is gone.
                    None => break,
                },
                chunk = transport.recv_audio(), if media_open => match chunk {
                    Some(pcm) => {
                        let frame = Frame::Audio(AudioChunk::new(pcm));
                        if !send_frame(&output, frame, &cancel).await {
                            break;
                        }
                    }
                    None => {
                        debug!("Inbound media channel closed");
                        media_open = false;
                    }
                },
            }
        }
        Ok(())
    }
}

// --- SpeechToText ---

/// Feeds audio to the recognizer, emits transcription frames in recognition
/// order. Finality defaults to `assume_final` when the engine does not
/// report it.
pub struct SpeechToTextStage {
    engine: Box<dyn SpeechToText>,
    assume_final: bool,
}

impl SpeechToTextStage {
    pub fn new(engine: Box<dyn SpeechToText>, assume_final: bool) -> Self {
        Self {
            engine,
            assume_final,
        }
    }
}

#[async_trait]
impl PipelineStage for SpeechToTextStage {
    fn name(&self) -> &'static str {
        "speech_to_text"
    }

    async fn run(
        self: Box<Self>,
        mut input: mpsc::Receiver<Frame>,
        output: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut engine = self.engine;

        while let Some(frame) = next_frame(&mut input, &cancel).await {
            match frame {
                Frame::Audio(chunk) => {
                    let transcripts = engine
                        .feed(&chunk.pcm)
                        .await
                        .map_err(|e| VoxlinkError::stage("speech_to_text", e))?;
                    for transcript in transcripts {
                        let frame = Frame::Transcription {
                            text: transcript.text,
                            is_final: transcript.is_final.unwrap_or(self.assume_final),
                        };
                        if !send_frame(&output, frame, &cancel).await {
                            return Ok(());
                        }
                    }
                }
                other => {
                    if !send_frame(&output, other, &cancel).await {
                        return Ok(());
                    }
                }
            }
        }

        // Upstream finished: flush whatever the recognizer still buffers.
        // The session is already winding down, so a flush failure is logged
        // rather than escalated.
        match engine.flush().await {
            Ok(transcripts) => {
                for transcript in transcripts {
                    let frame = Frame::Transcription {
                        text: transcript.text,
                        is_final: transcript.is_final.unwrap_or(self.assume_final),
                    };
                    if !send_frame(&output, frame, &cancel).await {
                        break;
                    }
                }
            }
            Err(e) => warn!(%e, "Recognizer flush failed at end of stream"),
        }
        Ok(())
    }
}

// --- MessageTap ---

/// Mirrors text artifacts to the transport side-channel, then forwards the
/// tapped frame unchanged. Never drops, delays, or reorders it.
pub struct MessageTap {
    role: StageRole,
    transport: Arc<dyn PeerTransport>,
}

impl MessageTap {
    pub fn new(role: StageRole, transport: Arc<dyn PeerTransport>) -> Self {
        Self { role, transport }
    }
}

#[async_trait]
impl PipelineStage for MessageTap {
    fn name(&self) -> &'static str {
        match self.role {
            StageRole::User => "message_tap_user",
            StageRole::Assistant => "message_tap_assistant",
        }
    }

    async fn run(
        self: Box<Self>,
        mut input: mpsc::Receiver<Frame>,
        output: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Result<()> {
        while let Some(frame) = next_frame(&mut input, &cancel).await {
            let notification = match (&frame, self.role) {
                (Frame::Transcription { text, is_final }, StageRole::User) => Some(json!({
                    "type": "transcription",
                    "text": text,
                    "is_final": is_final,
                    "role": "user",
                })),
                (Frame::Generated { text }, StageRole::Assistant) => Some(json!({
                    "type": "text",
                    "text": text,
                    "role": "assistant",
                })),
                _ => None,
            };

            if let Some(message) = notification {
                // Side-channel trouble is not a transform failure; the
                // disconnect path will surface through transport events.
                if let Err(e) = self.transport.send_app_message(message).await {
                    warn!(%e, "Failed to mirror message on side-channel");
                }
            }

            if !send_frame(&output, frame, &cancel).await {
                break;
            }
        }
        Ok(())
    }
}

// --- ContextAggregator ---

/// Appends tapped text to the conversation context, preserving frame order,
/// and forwards the frame unchanged.
pub struct ContextAggregator {
    role: StageRole,
    context: Arc<Mutex<ConversationContext>>,
}

impl ContextAggregator {
    pub fn new(role: StageRole, context: Arc<Mutex<ConversationContext>>) -> Self {
        Self { role, context }
    }
}

#[async_trait]
impl PipelineStage for ContextAggregator {
    fn name(&self) -> &'static str {
        match self.role {
            StageRole::User => "context_user",
            StageRole::Assistant => "context_assistant",
        }
    }

    async fn run(
        self: Box<Self>,
        mut input: mpsc::Receiver<Frame>,
        output: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Result<()> {
        while let Some(frame) = next_frame(&mut input, &cancel).await {
            match (&frame, self.role) {
                (
                    Frame::Transcription {
                        text,
                        is_final: true,
                    },
                    StageRole::User,
                ) => {
                    self.context.lock().await.push_user(text.clone());
                }
                (Frame::Generated { text }, StageRole::Assistant) => {
                    self.context.lock().await.push_assistant(text.clone());
                }
                _ => {}
            }

            if !send_frame(&output, frame, &cancel).await {
                break;
            }
        }
        Ok(())
    }
}

// --- LanguageGeneration ---

/// Produces one reply per final user utterance, or on an explicit run
/// trigger (used once at session start for the greeting). Consumes the
/// frames that trigger it; partial transcriptions are dropped here — they
/// were already mirrored by the user tap and never enter the context.
pub struct LanguageGenerationStage {
    engine: Arc<dyn LanguageGeneration>,
    context: Arc<Mutex<ConversationContext>>,
}

impl LanguageGenerationStage {
    pub fn new(
        engine: Arc<dyn LanguageGeneration>,
        context: Arc<Mutex<ConversationContext>>,
    ) -> Self {
        Self { engine, context }
    }
}

#[async_trait]
impl PipelineStage for LanguageGenerationStage {
    fn name(&self) -> &'static str {
        "language_generation"
    }

    async fn run(
        self: Box<Self>,
        mut input: mpsc::Receiver<Frame>,
        output: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Result<()> {
        while let Some(frame) = next_frame(&mut input, &cancel).await {
            let generate = match frame {
                Frame::Transcription { is_final: true, .. } => true,
                Frame::Transcription { is_final: false, .. } => continue,
                Frame::Control(ControlSignal::RunLanguageGeneration) => true,
                other => {
                    if !send_frame(&output, other, &cancel).await {
                        return Ok(());
                    }
                    false
                }
            };

            if generate {
                let snapshot = self.context.lock().await.snapshot();
                let text = self
                    .engine
                    .generate(&snapshot)
                    .await
                    .map_err(|e| VoxlinkError::stage("language_generation", e))?;
                debug!(chars = text.len(), "Generated reply");
                if !send_frame(&output, Frame::Generated { text }, &cancel).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

// --- TextToSpeech ---

/// Synthesizes generated text into audio frames, emitting chunks in arrival
/// order, then forwards the text frame so the assistant aggregator records
/// it after it was queued for synthesis.
pub struct TextToSpeechStage {
    engine: Arc<dyn TextToSpeech>,
}

impl TextToSpeechStage {
    pub fn new(engine: Arc<dyn TextToSpeech>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl PipelineStage for TextToSpeechStage {
    fn name(&self) -> &'static str {
        "text_to_speech"
    }

    async fn run(
        self: Box<Self>,
        mut input: mpsc::Receiver<Frame>,
        output: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Result<()> {
        while let Some(frame) = next_frame(&mut input, &cancel).await {
            match frame {
                Frame::Generated { text } => {
                    let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();
                    let engine = self.engine.clone();
                    let synth_text = text.clone();
                    let mut synthesis = tokio::spawn(async move {
                        engine.synthesize(&synth_text, chunk_tx).await
                    });

                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                synthesis.abort();
                                return Ok(());
                            }
                            chunk = chunk_rx.recv() => match chunk {
                                Some(pcm) => {
                                    let frame = Frame::Audio(AudioChunk::new(pcm));
                                    if !send_frame(&output, frame, &cancel).await {
                                        synthesis.abort();
                                        return Ok(());
                                    }
                                }
                                None => break,
                            },
                        }
                    }

                    match synthesis.await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => return Err(VoxlinkError::stage("text_to_speech", e)),
                        Err(e) => return Err(VoxlinkError::stage("text_to_speech", e)),
                    }

                    if !send_frame(&output, Frame::Generated { text }, &cancel).await {
                        return Ok(());
                    }
                }
                other => {
                    if !send_frame(&output, other, &cancel).await {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

// --- AudioEmit ---

/// Terminal sink for audio: writes chunks to the transport's media channel.
/// Non-audio frames continue downstream.
pub struct AudioEmit {
    transport: Arc<dyn PeerTransport>,
}

impl AudioEmit {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl PipelineStage for AudioEmit {
    fn name(&self) -> &'static str {
        "audio_emit"
    }

    async fn run(
        self: Box<Self>,
        mut input: mpsc::Receiver<Frame>,
        output: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Result<()> {
        while let Some(frame) = next_frame(&mut input, &cancel).await {
            match frame {
                Frame::Audio(chunk) => {
                    self.transport
                        .send_audio(chunk.pcm)
                        .await
                        .map_err(|e| VoxlinkError::stage("audio_emit", e))?;
                }
                other => {
                    if !send_frame(&output, other, &cancel).await {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
