use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::errors::DomainError;

/// Category reported by the protocol client alongside an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Network,
    Media,
    Other,
}

/// Error event raised by a playback backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolError {
    pub kind: ErrorKind,
    pub details: String,
    pub fatal: bool,
}

impl ProtocolError {
    pub fn network(details: impl Into<String>, fatal: bool) -> Self {
        Self {
            kind: ErrorKind::Network,
            details: details.into(),
            fatal,
        }
    }

    pub fn media(details: impl Into<String>, fatal: bool) -> Self {
        Self {
            kind: ErrorKind::Media,
            details: details.into(),
            fatal,
        }
    }

    pub fn other(details: impl Into<String>, fatal: bool) -> Self {
        Self {
            kind: ErrorKind::Other,
            details: details.into(),
            fatal,
        }
    }

    /// Pure business rule: does this error end the session?
    pub fn classify(&self) -> ErrorClass {
        if !self.fatal {
            return ErrorClass::Recoverable;
        }

        match self.kind {
            ErrorKind::Network => ErrorClass::Fatal(FailureCause::Network),
            ErrorKind::Media => ErrorClass::Fatal(FailureCause::Media),
            ErrorKind::Other => ErrorClass::Fatal(FailureCause::Unclassified),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Recoverable,
    Fatal(FailureCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    Resolution,
    Network,
    Media,
    Unclassified,
    CapabilityMismatch,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolution => write!(f, "Invalid source locator"),
            Self::Network => write!(f, "Network error"),
            Self::Media => write!(f, "Media error"),
            Self::Unclassified => write!(f, "Playback error"),
            Self::CapabilityMismatch => write!(f, "HLS playback not supported"),
        }
    }
}

/// Diagnostic shown to the operator after a session could not continue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackFailure {
    pub cause: FailureCause,
    pub details: String,
    pub manifest_url: String,
    pub occurred_at: DateTime<Utc>,
}

impl PlaybackFailure {
    pub fn new(
        cause: FailureCause,
        details: impl Into<String>,
        manifest_url: impl Into<String>,
    ) -> Self {
        Self {
            cause,
            details: details.into(),
            manifest_url: manifest_url.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn message(&self) -> String {
        format!("{}: {} (manifest: {})", self.cause, self.details, self.manifest_url)
    }

    /// Retrying cannot help without an operator changing something
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.cause,
            FailureCause::CapabilityMismatch | FailureCause::Resolution
        )
    }

    pub fn to_domain_error(&self) -> DomainError {
        let manifest_url = self.manifest_url.clone();
        let reason = self.details.clone();
        match self.cause {
            FailureCause::Resolution => DomainError::InvalidLocator(manifest_url),
            FailureCause::Network => DomainError::NetworkFatal { manifest_url, reason },
            FailureCause::Media | FailureCause::Unclassified => {
                DomainError::MediaFatal { manifest_url, reason }
            }
            FailureCause::CapabilityMismatch => DomainError::CapabilityMismatch { manifest_url },
        }
    }
}

impl fmt::Display for PlaybackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
