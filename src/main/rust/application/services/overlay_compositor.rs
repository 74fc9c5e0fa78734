use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::entities::{OverlayKind, OverlayRecord};
use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::SurfaceGeometry;

/// Background drawn behind logo overlays
pub const LOGO_BACKGROUND: &str = "rgba(0, 0, 0, 0.6)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Loading,
    Loaded,
    /// Load failed; a placeholder box is drawn instead
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RenderedContent {
    #[serde(rename_all = "camelCase")]
    Text {
        text: String,
        color: String,
        font_size: f64,
    },
    Image {
        src: String,
        status: ImageStatus,
    },
    #[serde(rename_all = "camelCase")]
    Logo {
        text: String,
        color: String,
        font_size: f64,
        background: String,
    },
}

/// Screen transform of one visible overlay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedOverlay {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub opacity: f64,
    pub rotation: f64,
    /// 1 is the bottom-most overlay
    pub z_index: usize,
    pub content: RenderedContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedFrame {
    pub revision: u64,
    pub geometry: SurfaceGeometry,
    pub overlays: Vec<RenderedOverlay>,
}

/// A successful store mutation
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayChange {
    Created(OverlayRecord),
    Updated(OverlayRecord),
    Deleted(String),
}

/// Image reference that has not been checked yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub overlay_id: String,
    pub src: String,
}

/// Composes the overlay set over the surface.
///
/// Only mutations, geometry changes and image load results recompose;
/// [`OverlayCompositor::frame`] is a cached read.
pub struct OverlayCompositor {
    overlays: Vec<OverlayRecord>,
    geometry: SurfaceGeometry,
    images: HashMap<String, (String, ImageStatus)>,
    pending_images: Vec<ImageRequest>,
    frame: ComposedFrame,
    metrics: Arc<dyn MetricsReporter>,
}

impl OverlayCompositor {
    pub fn new(geometry: SurfaceGeometry, metrics: Arc<dyn MetricsReporter>) -> Self {
        Self {
            overlays: Vec::new(),
            geometry,
            images: HashMap::new(),
            pending_images: Vec::new(),
            frame: ComposedFrame {
                revision: 0,
                geometry,
                overlays: Vec::new(),
            },
            metrics,
        }
    }

    pub fn frame(&self) -> &ComposedFrame {
        &self.frame
    }

    pub fn revision(&self) -> u64 {
        self.frame.revision
    }

    pub fn geometry(&self) -> SurfaceGeometry {
        self.geometry
    }

    pub fn overlays(&self) -> &[OverlayRecord] {
        &self.overlays
    }

    /// Replace the whole set with a freshly listed one
    pub fn set_overlays(&mut self, overlays: Vec<OverlayRecord>) {
        self.overlays = overlays;
        self.recompose();
    }

    /// Returns false when the change did not affect the set.
    ///
    /// Only `Created` adds a record; an update for an id that is not in the
    /// set refers to a record already deleted and is dropped.
    pub fn apply_change(&mut self, change: OverlayChange) -> bool {
        match change {
            OverlayChange::Created(record) => {
                match self.overlays.iter_mut().find(|o| o.id == record.id) {
                    Some(existing) if *existing == record => return false,
                    Some(existing) => *existing = record,
                    None => self.overlays.push(record),
                }
            }
            OverlayChange::Updated(record) => {
                let Some(existing) = self.overlays.iter_mut().find(|o| o.id == record.id) else {
                    tracing::debug!(overlay_id = %record.id, "Ignoring update for unknown overlay");
                    return false;
                };
                if *existing == record {
                    return false;
                }
                *existing = record;
            }
            OverlayChange::Deleted(id) => {
                let before = self.overlays.len();
                self.overlays.retain(|o| o.id != id);
                if self.overlays.len() == before {
                    return false;
                }
                self.images.remove(&id);
            }
        }

        self.recompose();
        true
    }

    /// Layout change; identical geometry does not recompose
    pub fn set_geometry(&mut self, geometry: SurfaceGeometry) -> bool {
        if geometry == self.geometry {
            return false;
        }
        self.geometry = geometry;
        self.recompose();
        true
    }

    /// Outcome of an image check. Results for a source the overlay no longer
    /// shows are ignored.
    pub fn report_image_result(&mut self, overlay_id: &str, src: &str, loaded: bool) -> bool {
        let Some((current_src, status)) = self.images.get_mut(overlay_id) else {
            return false;
        };
        if current_src.as_str() != src {
            tracing::debug!(overlay_id, src, "Ignoring result for replaced image");
            return false;
        }

        let next = if loaded {
            ImageStatus::Loaded
        } else {
            tracing::warn!(overlay_id, src, "Image failed to load, showing placeholder");
            ImageStatus::Placeholder
        };
        if *status == next {
            return false;
        }
        *status = next;

        self.recompose();
        true
    }

    /// Images seen since the last call that still need a check
    pub fn take_image_requests(&mut self) -> Vec<ImageRequest> {
        std::mem::take(&mut self.pending_images)
    }

    fn recompose(&mut self) {
        self.track_images();

        let mut visible: Vec<&OverlayRecord> = self.overlays.iter().filter(|o| o.visible).collect();
        // Stable: equal timestamps keep store order
        visible.sort_by_key(|o| o.created_at);

        let overlays: Vec<RenderedOverlay> = visible
            .into_iter()
            .enumerate()
            .map(|(index, record)| self.render(record, index + 1))
            .collect();

        self.frame = ComposedFrame {
            revision: self.frame.revision + 1,
            geometry: self.geometry,
            overlays,
        };

        self.metrics.report_composition(self.frame.overlays.len());
        tracing::debug!(
            revision = self.frame.revision,
            rendered = self.frame.overlays.len(),
            width = self.geometry.width,
            height = self.geometry.height,
            "Overlays recomposed"
        );
    }

    fn render(&self, record: &OverlayRecord, z_index: usize) -> RenderedOverlay {
        let (x, y) = self.geometry.project(record.position.x, record.position.y);

        let content = match record.kind {
            OverlayKind::Text => RenderedContent::Text {
                text: record.content.clone(),
                color: record.color.clone(),
                font_size: record.font_size,
            },
            OverlayKind::Image => RenderedContent::Image {
                src: record.content.clone(),
                status: self
                    .images
                    .get(&record.id)
                    .map(|(_, status)| *status)
                    .unwrap_or(ImageStatus::Loading),
            },
            OverlayKind::Logo => RenderedContent::Logo {
                text: record.content.clone(),
                color: record.color.clone(),
                font_size: record.font_size,
                background: LOGO_BACKGROUND.to_string(),
            },
        };

        RenderedOverlay {
            id: record.id.clone(),
            x,
            y,
            width: record.size.width,
            height: record.size.height,
            opacity: record.opacity,
            rotation: record.rotation,
            z_index,
            content,
        }
    }

    /// Drop state for images that are gone, queue checks for new sources
    fn track_images(&mut self) {
        let overlays = &self.overlays;
        self.images.retain(|id, (src, _)| {
            overlays
                .iter()
                .any(|o| o.id == *id && o.kind == OverlayKind::Image && o.content == *src)
        });

        for record in overlays.iter().filter(|o| o.kind == OverlayKind::Image) {
            if self.images.contains_key(&record.id) {
                continue;
            }
            self.images
                .insert(record.id.clone(), (record.content.clone(), ImageStatus::Loading));
            self.pending_images.push(ImageRequest {
                overlay_id: record.id.clone(),
                src: record.content.clone(),
            });
        }
    }
}
