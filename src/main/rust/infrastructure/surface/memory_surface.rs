use std::collections::VecDeque;

use bytes::Bytes;

use crate::domain::errors::{DomainError, Result};
use crate::domain::events::{EventSink, SessionId};
use crate::domain::ports::{PlayError, PlayOrigin, PlaybackSurface, SurfaceCapabilities};
use crate::domain::value_objects::SurfaceGeometry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Detached,
    Feed { session: SessionId },
    Native { session: SessionId, manifest_url: String },
}

#[derive(Debug, Clone)]
struct BufferedSegment {
    sequence: u64,
    duration: f64,
    data: Bytes,
}

/// Headless playback surface.
///
/// Keeps fed segments in a bounded buffer and models the media-element
/// behaviour the controller depends on: autoplay policy, volume and mute,
/// fullscreen toggling and a single attachment slot.
#[derive(Debug)]
pub struct MemorySurface {
    capabilities: SurfaceCapabilities,
    autoplay_allowed: bool,
    windowed: SurfaceGeometry,
    fullscreen: Option<SurfaceGeometry>,
    is_fullscreen: bool,
    attachment: Attachment,
    native_sink: Option<EventSink>,
    buffer: VecDeque<BufferedSegment>,
    buffer_limit_secs: f64,
    attach_count: u64,
    paused: bool,
    volume: f64,
    muted: bool,
}

impl MemorySurface {
    pub fn new(geometry: SurfaceGeometry) -> Self {
        Self {
            capabilities: SurfaceCapabilities {
                segment_feed: true,
                native_hls: false,
            },
            autoplay_allowed: true,
            windowed: geometry,
            fullscreen: None,
            is_fullscreen: false,
            attachment: Attachment::Detached,
            native_sink: None,
            buffer: VecDeque::new(),
            buffer_limit_secs: 30.0,
            attach_count: 0,
            paused: true,
            volume: 1.0,
            muted: false,
        }
    }

    pub fn with_capabilities(mut self, capabilities: SurfaceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Unmuted autoplay policy; muted autoplay is always allowed
    pub fn with_autoplay(mut self, allowed: bool) -> Self {
        self.autoplay_allowed = allowed;
        self
    }

    pub fn with_fullscreen_geometry(mut self, geometry: SurfaceGeometry) -> Self {
        self.fullscreen = Some(geometry);
        self
    }

    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    /// Sessions currently holding the surface (0 or 1)
    pub fn active_attachments(&self) -> usize {
        usize::from(self.attachment != Attachment::Detached)
    }

    /// Total number of attach calls over the surface's lifetime
    pub fn attach_count(&self) -> u64 {
        self.attach_count
    }

    /// Sink handed over by a native attachment, used to report media events
    pub fn native_events(&self) -> Option<&EventSink> {
        self.native_sink.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    pub fn buffered_seconds(&self) -> f64 {
        self.buffer.iter().map(|s| s.duration).sum()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.iter().map(|s| s.data.len()).sum()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.buffer.back().map(|s| s.sequence)
    }

    fn claim(&mut self, attachment: Attachment) {
        if self.attachment != Attachment::Detached {
            tracing::warn!(previous = ?self.attachment, "Surface attached twice, replacing");
            self.detach();
        }
        self.attachment = attachment;
        self.attach_count += 1;
    }
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new(SurfaceGeometry::default())
    }
}

impl PlaybackSurface for MemorySurface {
    fn capabilities(&self) -> SurfaceCapabilities {
        self.capabilities
    }

    fn attach_feed(&mut self, session: SessionId, buffer_seconds: u32) {
        self.claim(Attachment::Feed { session });
        self.buffer_limit_secs = f64::from(buffer_seconds.max(1));
    }

    fn append_segment(&mut self, sequence: u64, duration: f64, data: Bytes) {
        if !matches!(self.attachment, Attachment::Feed { .. }) {
            tracing::debug!(sequence, "Dropping segment, no feed attached");
            return;
        }

        self.buffer.push_back(BufferedSegment {
            sequence,
            duration,
            data,
        });

        while self.buffer.len() > 1 && self.buffered_seconds() > self.buffer_limit_secs {
            self.buffer.pop_front();
        }
    }

    fn attach_source(&mut self, manifest_url: &str, sink: EventSink) {
        self.claim(Attachment::Native {
            session: sink.session(),
            manifest_url: manifest_url.to_string(),
        });
        self.native_sink = Some(sink);
    }

    fn detach(&mut self) {
        self.attachment = Attachment::Detached;
        self.native_sink = None;
        self.buffer.clear();
        self.paused = true;
    }

    fn play(&mut self, origin: PlayOrigin) -> std::result::Result<(), PlayError> {
        if self.attachment == Attachment::Detached {
            return Err(PlayError::Failed("no source attached".to_string()));
        }
        if origin == PlayOrigin::Autoplay && !self.autoplay_allowed && !self.muted {
            return Err(PlayError::AutoplayBlocked);
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Toggles between windowed and fullscreen layouts
    fn request_fullscreen(&mut self) -> Result<SurfaceGeometry> {
        if self.fullscreen.is_none() {
            return Err(DomainError::FullscreenUnavailable(
                "surface has no fullscreen layout".to_string(),
            ));
        }
        self.is_fullscreen = !self.is_fullscreen;
        Ok(self.geometry())
    }

    fn resize(&mut self, geometry: SurfaceGeometry) {
        self.windowed = geometry;
    }

    fn geometry(&self) -> SurfaceGeometry {
        match (self.is_fullscreen, self.fullscreen) {
            (true, Some(geometry)) => geometry,
            _ => self.windowed,
        }
    }
}
