//! Configuration loading and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxlinkError};

/// Top-level Voxlink configuration, loaded from `voxlink.json5`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ice_servers: Option<Vec<IceServerConfig>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt: Option<SttConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<PersonaConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// One STUN/TURN entry handed to the transport and advertised to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SttConfig {
    /// "openai" or "groq" — both expose the same transcriptions API.
    #[serde(default = "default_stt_provider")]
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_stt_provider() -> String {
    "openai".into()
}

impl SttConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl LlmConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl TtsConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Persona content injected into the language-generation context. This is
/// configuration data, not core logic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting_instruction: Option<String>,
}

/// Bearer-token identity verification. Absent section means auth is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_key_env: Option<String>,
}

impl AuthConfig {
    pub fn resolve_service_key(&self) -> Option<String> {
        resolve_secret_field(&self.service_key, &self.service_key_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bounded capacity of the hand-off queue between adjacent stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,

    /// Finality assumed for transcriptions when the engine does not report
    /// it. This is policy, not an engine guarantee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assume_final: Option<bool>,
}

/// Resolve a secret: direct value first, then the named environment variable.
fn resolve_secret_field(direct: &Option<String>, env_name: &Option<String>) -> Option<String> {
    if let Some(value) = direct {
        if !value.is_empty() {
            return Some(value.clone());
        }
    }
    if let Some(name) = env_name {
        if let Ok(value) = std::env::var(name) {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");
    re.replace_all(input, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(VoxlinkError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config =
            json5::from_str(&substituted).map_err(|e| VoxlinkError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn host(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.host.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().and_then(|s| s.port).unwrap_or(7860)
    }

    /// Configured ICE servers, defaulting to a single public STUN entry.
    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        match &self.ice_servers {
            Some(servers) if !servers.is_empty() => servers.clone(),
            _ => vec![IceServerConfig {
                urls: "stun:stun.l.google.com:19302".to_string(),
                username: None,
                credential: None,
            }],
        }
    }

    pub fn persona_prompt(&self) -> String {
        self.persona
            .as_ref()
            .and_then(|p| p.system_prompt.clone())
            .unwrap_or_else(|| {
                "You are a helpful voice assistant. Keep answers concise; they will be spoken aloud."
                    .to_string()
            })
    }

    pub fn greeting_instruction(&self) -> String {
        self.persona
            .as_ref()
            .and_then(|p| p.greeting_instruction.clone())
            .unwrap_or_else(|| "Say hello and briefly introduce yourself.".to_string())
    }

    pub fn channel_capacity(&self) -> usize {
        self.pipeline
            .as_ref()
            .and_then(|p| p.channel_capacity)
            .unwrap_or(32)
    }

    pub fn assume_final(&self) -> bool {
        self.pipeline
            .as_ref()
            .and_then(|p| p.assume_final)
            .unwrap_or(true)
    }
}
