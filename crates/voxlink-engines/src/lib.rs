//! Engine clients — the opaque external collaborators of the pipeline:
//! speech-to-text, language generation, and text-to-speech.

pub mod llm;
pub mod stt;
pub mod tts;
pub mod vad;

use std::sync::Arc;

use voxlink_core::config::Config;

pub use llm::{HttpLanguageGeneration, LanguageGeneration};
pub use stt::{HttpSpeechToText, SpeechToText, Transcript};
pub use tts::{HttpTextToSpeech, TextToSpeech};

/// Produces one engine set per session.
///
/// Speech-to-text is stateful (it buffers audio between calls), so every
/// session gets a fresh instance; generation and synthesis clients are
/// stateless and shared.
pub trait EngineFactory: Send + Sync {
    fn speech_to_text(&self) -> Box<dyn SpeechToText>;
    fn language_generation(&self) -> Arc<dyn LanguageGeneration>;
    fn text_to_speech(&self) -> Arc<dyn TextToSpeech>;
}

/// Factory wiring the HTTP engine implementations from config.
pub struct HttpEngineFactory {
    config: Arc<Config>,
    llm: Arc<HttpLanguageGeneration>,
    tts: Arc<HttpTextToSpeech>,
}

impl HttpEngineFactory {
    pub fn new(config: Arc<Config>) -> Self {
        let llm = Arc::new(HttpLanguageGeneration::new(
            config.llm.clone().unwrap_or_default(),
        ));
        let tts = Arc::new(HttpTextToSpeech::new(
            config.tts.clone().unwrap_or_default(),
        ));
        Self { config, llm, tts }
    }
}

impl EngineFactory for HttpEngineFactory {
    fn speech_to_text(&self) -> Box<dyn SpeechToText> {
        Box::new(HttpSpeechToText::new(
            self.config.stt.clone().unwrap_or_default(),
        ))
    }

    fn language_generation(&self) -> Arc<dyn LanguageGeneration> {
        self.llm.clone()
    }

    fn text_to_speech(&self) -> Arc<dyn TextToSpeech> {
        self.tts.clone()
    }
}
