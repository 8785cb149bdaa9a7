//! Streaming text-to-speech — forwards audio chunks as they arrive from the
//! provider.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use voxlink_core::config::TtsConfig;
use voxlink_core::error::{Result, VoxlinkError};

const DEFAULT_VOICE: &str = "Rachel";
const DEFAULT_MODEL: &str = "eleven_turbo_v2";

/// Synthesizes speech for one reply, streaming raw PCM 16-bit 16kHz mono
/// chunks through `chunk_tx` in arrival order.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str, chunk_tx: mpsc::UnboundedSender<Vec<u8>>)
        -> Result<()>;
}

pub struct HttpTextToSpeech {
    config: TtsConfig,
    client: reqwest::Client,
}

impl HttpTextToSpeech {
    pub fn new(config: TtsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn stream_url(&self) -> String {
        let voice = self.config.voice.as_deref().unwrap_or(DEFAULT_VOICE);
        format!("https://api.elevenlabs.io/v1/text-to-speech/{voice}/stream")
    }
}

#[async_trait]
impl TextToSpeech for HttpTextToSpeech {
    async fn synthesize(
        &self,
        text: &str,
        chunk_tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<()> {
        let api_key = self
            .config
            .resolve_api_key()
            .ok_or_else(|| VoxlinkError::Engine("No TTS API key configured".into()))?;

        let model = self.config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let url = self.stream_url();

        debug!(model, text_len = text.len(), "Starting TTS stream");

        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &api_key)
            .header("Content-Type", "application/json")
            .json(&json!({
                "text": text,
                "model_id": model,
                "output_format": "pcm_16000",
            }))
            .send()
            .await
            .map_err(|e| VoxlinkError::Engine(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(VoxlinkError::Engine(format!(
                "TTS API error {status}: {body}"
            )));
        }

        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| VoxlinkError::Engine(format!("TTS stream: {e}")))?;
            if chunk_tx.send(bytes.to_vec()).is_err() {
                debug!("TTS chunk receiver dropped, stopping stream");
                break;
            }
        }

        Ok(())
    }
}
