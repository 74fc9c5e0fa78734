pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    ComposedFrame, OverlayChange, OverlayCompositor, PlayerHandle, PlayerService, PlayerStatus,
    SessionController, SessionOptions,
};
pub use config::Config;
pub use domain::entities::{OverlayDraft, OverlayPatch, OverlayRecord, PlaybackLifecycle};
pub use domain::errors::{DomainError, Result};
pub use domain::ports::{MediaFetcher, MetricsReporter, PlaybackSurface, ProtocolClient};
pub use domain::services::EndpointResolver;
pub use domain::value_objects::{BackoffPolicy, PlaybackState, PlayerSettings, SurfaceGeometry};
pub use infrastructure::hls::{HlsProtocolClient, HttpFetcher};
pub use infrastructure::http::{api_routes, ApiContext};
pub use infrastructure::metrics::{serve_metrics, PrometheusReporter};
pub use infrastructure::storage::DocumentStore;
#[cfg(feature = "gstreamer")]
pub use infrastructure::surface::GStreamerSurface;
pub use infrastructure::surface::MemorySurface;
