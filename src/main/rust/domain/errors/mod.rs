use thiserror::Error;

use crate::domain::value_objects::PlaybackState;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid source locator: {0}")]
    InvalidLocator(String),

    #[error("Network failure while loading {manifest_url}: {reason}")]
    NetworkFatal { manifest_url: String, reason: String },

    #[error("Media failure while loading {manifest_url}: {reason}")]
    MediaFatal { manifest_url: String, reason: String },

    #[error("No HLS support for {manifest_url}: surface takes neither fed segments nor native HLS")]
    CapabilityMismatch { manifest_url: String },

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        state: PlaybackState,
        action: &'static str,
    },

    #[error("Invalid volume {0}: must be within [0, 1]")]
    InvalidVolume(f64),

    #[error("Playback rejected by surface: {0}")]
    PlaybackRejected(String),

    #[error("Fullscreen unavailable: {0}")]
    FullscreenUnavailable(String),

    #[error("Overlay not found: {0}")]
    OverlayNotFound(String),

    #[error("Invalid overlay: {0}")]
    InvalidOverlay(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid backoff multiplier: must be > 1.0")]
    InvalidBackoffMultiplier,

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Player service is not running")]
    PlayerUnavailable,
}

impl DomainError {
    /// Errors caused by the caller's input rather than by the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLocator(_)
                | Self::InvalidVolume(_)
                | Self::InvalidOverlay(_)
                | Self::InvalidSettings(_)
                | Self::InvalidBackoffMultiplier
        )
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
