use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoxlinkError {
    #[error("Config error: {0}")]
    Config(String),

    /// The offer could not be turned into an answer. Surfaced to the
    /// negotiation caller; no session is created.
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// Operation against an unknown or already-closed session id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A pipeline stage could not produce output. Fatal to that session only.
    #[error("Stage `{stage}` failed: {message}")]
    Stage { stage: &'static str, message: String },

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VoxlinkError {
    /// Wrap any error as a stage failure, tagging it with the stage identity.
    pub fn stage(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Stage {
            stage,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VoxlinkError>;
