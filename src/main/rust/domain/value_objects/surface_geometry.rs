use serde::{Deserialize, Serialize};

/// Rendered pixel dimensions of the playback area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceGeometry {
    pub width: u32,
    pub height: u32,
}

impl SurfaceGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Map a percentage position (0-100) onto this surface
    pub fn project(&self, x_percent: f64, y_percent: f64) -> (f64, f64) {
        (
            x_percent / 100.0 * f64::from(self.width),
            y_percent / 100.0 * f64::from(self.height),
        )
    }
}

impl Default for SurfaceGeometry {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}
