//! Frame model — the typed units that flow through a session pipeline.

/// A unit of data moving through the pipeline.
///
/// Frames are immutable once produced and handed off whole from one stage to
/// the next. Every stage matches exhaustively: variants a stage understands
/// are consumed or transformed, everything else is forwarded unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Raw audio, 16-bit little-endian PCM at 16kHz mono.
    Audio(AudioChunk),

    /// Recognized speech. `is_final` is forwarded verbatim from the engine,
    /// already defaulted by the speech-to-text stage when the engine did not
    /// report finality.
    Transcription { text: String, is_final: bool },

    /// One generated assistant reply.
    Generated { text: String },

    /// In-band control signal.
    Control(ControlSignal),
}

/// Raw PCM bytes produced by the transport or a synthesis engine.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub pcm: Vec<u8>,
}

impl AudioChunk {
    pub fn new(pcm: Vec<u8>) -> Self {
        Self { pcm }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Run language generation off the current context without waiting for a
    /// user utterance. Injected once at session start to produce the greeting.
    RunLanguageGeneration,
}
