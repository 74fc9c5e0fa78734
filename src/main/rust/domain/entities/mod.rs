mod overlay_record;
mod playback_lifecycle;

pub use overlay_record::{OverlayDraft, OverlayKind, OverlayPatch, OverlayRecord, Position, Size};
pub use playback_lifecycle::{PlaybackLifecycle, StateTransition};
