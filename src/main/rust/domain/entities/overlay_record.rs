use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Text,
    Image,
    Logo,
}

/// Position as a percentage of the surface (0-100 on both axes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Size in pixels, not scaled by the surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OverlayKind,
    pub content: String,
    pub position: Position,
    pub size: Size,
    pub color: String,
    pub font_size: f64,
    pub opacity: f64,
    pub rotation: f64,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
}

impl OverlayRecord {
    /// Build a record from a draft; the store supplies id and creation time
    pub fn from_draft(draft: OverlayDraft, id: String, created_at: DateTime<Utc>) -> Result<Self> {
        let record = Self {
            id,
            kind: draft.kind,
            content: draft.content,
            position: draft.position.unwrap_or(Position { x: 10.0, y: 10.0 }),
            size: draft.size.unwrap_or(Size {
                width: 200.0,
                height: 50.0,
            }),
            color: draft.color.unwrap_or_else(|| "#ffffff".to_string()),
            font_size: draft.font_size.unwrap_or(24.0),
            opacity: draft.opacity.unwrap_or(1.0),
            rotation: draft.rotation.unwrap_or(0.0),
            visible: draft.visible.unwrap_or(true),
            created_at,
        };
        record.validate()?;
        Ok(record)
    }

    /// Produce the updated record; id and creation time never change
    pub fn patched(&self, patch: OverlayPatch) -> Result<Self> {
        let record = Self {
            id: self.id.clone(),
            kind: patch.kind.unwrap_or(self.kind),
            content: patch.content.unwrap_or_else(|| self.content.clone()),
            position: patch.position.unwrap_or(self.position),
            size: patch.size.unwrap_or(self.size),
            color: patch.color.unwrap_or_else(|| self.color.clone()),
            font_size: patch.font_size.unwrap_or(self.font_size),
            opacity: patch.opacity.unwrap_or(self.opacity),
            rotation: patch.rotation.unwrap_or(self.rotation),
            visible: patch.visible.unwrap_or(self.visible),
            created_at: self.created_at,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(invalid("content cannot be empty"));
        }

        let Position { x, y } = self.position;
        if !(0.0..=100.0).contains(&x) || !(0.0..=100.0).contains(&y) {
            return Err(invalid(format!(
                "position ({}, {}) must be within 0-100%",
                x, y
            )));
        }

        let Size { width, height } = self.size;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(invalid(format!(
                "size {}x{} must be positive",
                width, height
            )));
        }

        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(invalid(format!("opacity {} must be within 0-1", self.opacity)));
        }

        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err(invalid(format!("fontSize {} must be positive", self.font_size)));
        }

        if !self.rotation.is_finite() {
            return Err(invalid("rotation must be finite"));
        }

        if self.color.trim().is_empty() {
            return Err(invalid("color cannot be empty"));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> DomainError {
    DomainError::InvalidOverlay(reason.into())
}

/// Fields accepted when creating an overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayDraft {
    #[serde(rename = "type")]
    pub kind: OverlayKind,
    pub content: String,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub color: Option<String>,
    pub font_size: Option<f64>,
    pub opacity: Option<f64>,
    pub rotation: Option<f64>,
    pub visible: Option<bool>,
}

impl OverlayDraft {
    pub fn new(kind: OverlayKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            position: None,
            size: None,
            color: None,
            font_size: None,
            opacity: None,
            rotation: None,
            visible: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.size = Some(Size { width, height });
        self
    }
}

/// Partial overlay update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayPatch {
    #[serde(rename = "type")]
    pub kind: Option<OverlayKind>,
    pub content: Option<String>,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub color: Option<String>,
    pub font_size: Option<f64>,
    pub opacity: Option<f64>,
    pub rotation: Option<f64>,
    pub visible: Option<bool>,
}

impl OverlayPatch {
    pub fn visibility(visible: bool) -> Self {
        Self {
            visible: Some(visible),
            ..Self::default()
        }
    }
}
