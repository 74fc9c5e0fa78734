use std::fmt;

use serde::Serialize;

/// Player states (pure domain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No session attached to the surface
    #[default]
    Idle,
    /// Manifest requested, waiting for the first parse
    Connecting,
    /// Manifest parsed, surface holds media but is not playing
    Ready,
    Playing,
    Paused,
    /// Fatal failure, waiting for an operator retry
    Errored,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Ready => write!(f, "READY"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Errored => write!(f, "ERRORED"),
        }
    }
}

impl PlaybackState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Connecting => 1.0,
            Self::Ready => 2.0,
            Self::Playing => 3.0,
            Self::Paused => 4.0,
            Self::Errored => 5.0,
        }
    }

    /// Allowed transitions. Any attached state may fall back to Idle on teardown,
    /// Errored is never entered from Idle.
    pub fn can_transition_to(&self, next: PlaybackState) -> bool {
        use PlaybackState::*;

        match (self, next) {
            (Idle, Connecting) => true,
            (Connecting, Ready | Errored | Idle) => true,
            (Ready, Playing | Errored | Idle) => true,
            (Playing, Paused | Errored | Idle) => true,
            (Paused, Playing | Errored | Idle) => true,
            (Errored, Connecting | Idle) => true,
            _ => false,
        }
    }

    /// A session currently owns the surface
    pub fn is_attached(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Ready | Self::Playing | Self::Paused
        )
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Errored)
    }
}
