mod overlay_compositor;
mod player_service;
mod session_controller;

pub use overlay_compositor::{
    ComposedFrame, ImageRequest, ImageStatus, OverlayChange, OverlayCompositor, RenderedContent,
    RenderedOverlay, LOGO_BACKGROUND,
};
pub use player_service::{PlayerCommand, PlayerHandle, PlayerService};
pub use session_controller::{
    BackendKind, EventOutcome, PlayerStatus, SessionController, SessionOptions,
};
