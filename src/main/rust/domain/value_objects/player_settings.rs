use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, Result};

/// Upper bound on per-fetch retries
const MAX_RECONNECT_ATTEMPTS: u32 = 20;

/// Operator-facing player settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerSettings {
    pub source_locator: String,
    pub volume: f64,
    pub autoplay: bool,
    pub quality: String,
    /// Seconds of media kept buffered on the surface
    pub buffer_size: u32,
    pub reconnect_attempts: u32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            source_locator: String::new(),
            volume: 1.0,
            autoplay: true,
            quality: "auto".to_string(),
            buffer_size: 30,
            reconnect_attempts: 3,
        }
    }
}

impl PlayerSettings {
    pub fn validate(&self) -> Result<()> {
        validate_volume(self.volume).map_err(|_| {
            DomainError::InvalidSettings(format!("volume {} out of range", self.volume))
        })?;

        if self.buffer_size == 0 {
            return Err(DomainError::InvalidSettings(
                "bufferSize must be at least 1 second".to_string(),
            ));
        }

        if self.reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
            return Err(DomainError::InvalidSettings(format!(
                "reconnectAttempts cannot exceed {}",
                MAX_RECONNECT_ATTEMPTS
            )));
        }

        self.quality_preference()?;
        Ok(())
    }

    pub fn quality_preference(&self) -> Result<QualityPreference> {
        self.quality.parse()
    }

    /// Apply a partial update, returning the merged document
    pub fn merged(&self, patch: SettingsPatch) -> Self {
        Self {
            source_locator: patch
                .source_locator
                .unwrap_or_else(|| self.source_locator.clone()),
            volume: patch.volume.unwrap_or(self.volume),
            autoplay: patch.autoplay.unwrap_or(self.autoplay),
            quality: patch.quality.unwrap_or_else(|| self.quality.clone()),
            buffer_size: patch.buffer_size.unwrap_or(self.buffer_size),
            reconnect_attempts: patch.reconnect_attempts.unwrap_or(self.reconnect_attempts),
        }
    }
}

/// Partial settings update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub source_locator: Option<String>,
    pub volume: Option<f64>,
    pub autoplay: Option<bool>,
    pub quality: Option<String>,
    pub buffer_size: Option<u32>,
    pub reconnect_attempts: Option<u32>,
}

impl SettingsPatch {
    pub fn volume(volume: f64) -> Self {
        Self {
            volume: Some(volume),
            ..Self::default()
        }
    }
}

pub fn validate_volume(volume: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&volume) {
        return Err(DomainError::InvalidVolume(volume));
    }
    Ok(())
}

/// Variant selection rule for master playlists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityPreference {
    /// Highest bandwidth variant
    #[default]
    Auto,
    Lowest,
    /// Best variant whose height does not exceed the limit
    MaxHeight(u32),
}

impl FromStr for QualityPreference {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "auto" | "best" => Ok(Self::Auto),
            "worst" | "lowest" => Ok(Self::Lowest),
            other => other
                .trim_end_matches('p')
                .parse::<u32>()
                .ok()
                .filter(|height| *height > 0)
                .map(Self::MaxHeight)
                .ok_or_else(|| DomainError::InvalidSettings(format!("unknown quality '{}'", s))),
        }
    }
}
