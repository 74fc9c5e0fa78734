use bytes::Bytes;
use thiserror::Error;

use crate::domain::errors::Result;
use crate::domain::events::{EventSink, SessionId};
use crate::domain::value_objects::SurfaceGeometry;

/// What the surface can play on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceCapabilities {
    /// Accepts media segments pushed by the adaptive HLS client
    pub segment_feed: bool,
    /// Can load an HLS manifest itself
    pub native_hls: bool,
}

/// Who asked for playback; surfaces may refuse unattended autoplay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOrigin {
    Autoplay,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayError {
    #[error("autoplay blocked by surface policy")]
    AutoplayBlocked,

    #[error("{0}")]
    Failed(String),
}

/// Port for the video rendering target
pub trait PlaybackSurface: Send {
    /// Queried once per session start
    fn capabilities(&self) -> SurfaceCapabilities;

    /// Prepare to receive segments from the adaptive client
    fn attach_feed(&mut self, session: SessionId, buffer_seconds: u32);

    fn append_segment(&mut self, sequence: u64, duration: f64, data: Bytes);

    /// Hand the manifest to the surface's native HLS support; the surface
    /// reports progress through `sink`
    fn attach_source(&mut self, manifest_url: &str, sink: EventSink);

    /// Release whatever the current session attached
    fn detach(&mut self);

    fn play(&mut self, origin: PlayOrigin) -> std::result::Result<(), PlayError>;

    fn pause(&mut self);

    fn volume(&self) -> f64;

    fn set_volume(&mut self, volume: f64);

    fn is_muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    /// Returns the geometry after the layout change
    fn request_fullscreen(&mut self) -> Result<SurfaceGeometry>;

    /// Windowed layout change (viewer resized the player)
    fn resize(&mut self, geometry: SurfaceGeometry);

    fn geometry(&self) -> SurfaceGeometry;
}
