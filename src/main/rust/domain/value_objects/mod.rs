mod backoff_policy;
mod playback_state;
mod player_settings;
mod protocol_error;
mod surface_geometry;

pub use backoff_policy::BackoffPolicy;
pub use playback_state::PlaybackState;
pub use player_settings::{validate_volume, PlayerSettings, QualityPreference, SettingsPatch};
pub use protocol_error::{ErrorClass, ErrorKind, FailureCause, PlaybackFailure, ProtocolError};
pub use surface_geometry::SurfaceGeometry;
