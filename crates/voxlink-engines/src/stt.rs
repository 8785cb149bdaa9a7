//! Speech-to-text engine interface and HTTP implementation.

use async_trait::async_trait;
use tracing::debug;

use voxlink_core::config::SttConfig;
use voxlink_core::error::{Result, VoxlinkError};

use crate::vad::{EnergyVad, VadEvent};

/// A piece of recognized speech.
///
/// `is_final` is `None` when the engine does not report finality; the
/// pipeline fills in the configured default at the stage boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub is_final: Option<bool>,
}

/// Streaming speech recognizer. Fed PCM incrementally; returns zero or more
/// transcripts per call, in recognition order.
#[async_trait]
pub trait SpeechToText: Send {
    /// Feed raw 16-bit LE PCM (16kHz mono). Emission cadence is up to the
    /// engine — a call may return nothing, partials, or completed utterances.
    async fn feed(&mut self, pcm: &[u8]) -> Result<Vec<Transcript>>;

    /// Flush any buffered audio at end of stream.
    async fn flush(&mut self) -> Result<Vec<Transcript>>;
}

const SAMPLE_RATE: u32 = 16_000;
/// 20ms frames at 16kHz.
const FRAME_SAMPLES: usize = 320;
/// Leading audio kept while waiting for speech, so utterance onsets are not
/// clipped.
const PRE_ROLL_SAMPLES: usize = 8_000;

/// Batch recognizer over an OpenAI-compatible `/audio/transcriptions` API.
///
/// Audio is segmented into utterances with an energy VAD; each completed
/// utterance is wrapped in a WAV container and uploaded. Finality is never
/// reported by this API, so transcripts carry `is_final: None`.
pub struct HttpSpeechToText {
    config: SttConfig,
    client: reqwest::Client,
    vad: EnergyVad,
    /// Samples not yet grouped into a full VAD frame.
    pending: Vec<i16>,
    /// The utterance being accumulated (including pre-roll).
    utterance: Vec<i16>,
}

impl HttpSpeechToText {
    pub fn new(config: SttConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            vad: EnergyVad::default_16khz(),
            pending: Vec::new(),
            utterance: Vec::new(),
        }
    }

    async fn transcribe(&self, pcm: &[i16]) -> Result<String> {
        let api_key = self
            .config
            .resolve_api_key()
            .ok_or_else(|| VoxlinkError::Engine("No STT API key configured".into()))?;

        let wav_data = pcm_to_wav(pcm, SAMPLE_RATE, 1, 16);
        let url = provider_url(&self.config.provider);
        let model = self.config.model.as_deref().unwrap_or("whisper-1");

        debug!(url, model, wav_bytes = wav_data.len(), "Sending utterance for transcription");

        let part = reqwest::multipart::Part::bytes(wav_data)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoxlinkError::Engine(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .text("response_format", "text")
            .part("file", part);

        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoxlinkError::Engine(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(VoxlinkError::Engine(format!(
                "Transcription API error {status}: {body}"
            )));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| VoxlinkError::Engine(e.to_string()))?;
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn feed(&mut self, pcm: &[u8]) -> Result<Vec<Transcript>> {
        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        self.pending.extend_from_slice(&samples);

        let mut out = Vec::new();

        while self.pending.len() >= FRAME_SAMPLES {
            let frame: Vec<i16> = self.pending.drain(..FRAME_SAMPLES).collect();
            self.utterance.extend_from_slice(&frame);

            match self.vad.advance(&frame) {
                Some(VadEvent::SpeechEnded) => {
                    let pcm = std::mem::take(&mut self.utterance);
                    let text = self.transcribe(&pcm).await?;
                    if !text.is_empty() {
                        out.push(Transcript {
                            text,
                            is_final: None,
                        });
                    }
                }
                Some(VadEvent::SpeechStarted) | None => {
                    // Bound the pre-roll while nobody is speaking.
                    if !self.vad.is_active() && self.utterance.len() > PRE_ROLL_SAMPLES {
                        let excess = self.utterance.len() - PRE_ROLL_SAMPLES;
                        self.utterance.drain(..excess);
                    }
                }
            }
        }

        Ok(out)
    }

    async fn flush(&mut self) -> Result<Vec<Transcript>> {
        if !self.vad.is_active() {
            self.utterance.clear();
            return Ok(Vec::new());
        }

        self.utterance.extend_from_slice(&self.pending);
        self.pending.clear();
        self.vad.reset();

        let pcm = std::mem::take(&mut self.utterance);
        let text = self.transcribe(&pcm).await?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Transcript {
            text,
            is_final: None,
        }])
    }
}

/// Transcription endpoint for a given provider name.
pub fn provider_url(provider: &str) -> &'static str {
    match provider {
        "groq" => "https://api.groq.com/openai/v1/audio/transcriptions",
        _ => "https://api.openai.com/v1/audio/transcriptions",
    }
}

/// Wrap raw 16-bit PCM in a WAV container.
pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_len = pcm.len() * 2;
    let byte_rate = sample_rate * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;
    let file_size = 36 + data_len as u32;

    let mut wav = Vec::with_capacity(44 + data_len);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_len as u32).to_le_bytes());
    for &sample in pcm {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}
