//! Classified failures for the narration pipeline.
//!
//! Every failure a narration attempt can hit is mapped onto one of these
//! kinds before it reaches the session layer. Classification is terminal:
//! nothing in the core retries, the user re-attempts explicitly.

use thiserror::Error;

/// Everything that can go wrong between pressing play and hearing audio.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NarrationError {
    #[error("no network path available")]
    Offline,

    #[error("no speech API credential configured")]
    KeyMissing,

    #[error("speech API credential was rejected by the service")]
    KeyInvalid,

    #[error("speech service rate or quota limit reached")]
    QuotaExceeded,

    #[error("network transport failure: {0}")]
    Network(String),

    #[error("speech service returned no audio payload")]
    EmptyResponse,

    #[error("malformed audio payload: {0}")]
    Decode(String),

    #[error("narration failed: {0}")]
    Unknown(String),
}

impl NarrationError {
    /// Classify an HTTP status returned by the speech service.
    pub fn from_http_status(status: u16, detail: &str) -> Self {
        match status {
            401 | 403 => NarrationError::KeyInvalid,
            429 => NarrationError::QuotaExceeded,
            _ => NarrationError::Unknown(format!("HTTP {status}: {detail}")),
        }
    }

    /// Credential problems stay visible until the user re-authenticates;
    /// everything else is shown transiently and auto-cleared.
    pub fn is_persistent(&self) -> bool {
        matches!(self, NarrationError::KeyMissing | NarrationError::KeyInvalid)
    }

    /// Stable label for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            NarrationError::Offline => "offline",
            NarrationError::KeyMissing => "key-missing",
            NarrationError::KeyInvalid => "key-invalid",
            NarrationError::QuotaExceeded => "quota-exceeded",
            NarrationError::Network(_) => "network",
            NarrationError::EmptyResponse => "empty-response",
            NarrationError::Decode(_) => "decode",
            NarrationError::Unknown(_) => "unknown",
        }
    }
}
