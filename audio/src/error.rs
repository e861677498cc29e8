use crate::client::Identity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("{backend} unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },
    #[error("{backend} connection lost")]
    ConnectionLost { backend: &'static str },
    #[error("{backend} query '{query}' timed out")]
    QueryTimeout {
        backend: &'static str,
        query: &'static str,
    },
    #[error("{backend} rejected {op} for {identity}")]
    Rejected {
        backend: &'static str,
        op: &'static str,
        identity: Identity,
    },
    #[error("no client with identity {0}")]
    UnknownClient(Identity),
    #[cfg(target_os = "linux")]
    #[error("ALSA mixer: {0}")]
    Alsa(#[from] alsa::Error),
    #[cfg(target_os = "linux")]
    #[error("PulseAudio: {0}")]
    Pulse(#[from] libpulse_binding::error::PAErr),
}

impl AudioError {
    pub fn unavailable(backend: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            backend,
            reason: reason.to_string(),
        }
    }
}
