mod media_fetcher;
mod metrics_reporter;
mod overlay_store;
mod playback_surface;
mod protocol_client;
mod settings_store;

pub use media_fetcher::{FetchError, MediaFetcher};
pub use metrics_reporter::{MetricsReporter, NoopMetrics};
pub use overlay_store::OverlayStore;
pub use playback_surface::{PlayError, PlayOrigin, PlaybackSurface, SurfaceCapabilities};
pub use protocol_client::{LoadRequest, ProtocolClient};
pub use settings_store::SettingsStore;
