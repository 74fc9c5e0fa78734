#[cfg(feature = "gstreamer")]
mod gstreamer_surface;
mod memory_surface;

#[cfg(feature = "gstreamer")]
pub use gstreamer_surface::GStreamerSurface;
pub use memory_surface::{Attachment, MemorySurface};
