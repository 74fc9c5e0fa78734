use async_trait::async_trait;

use crate::domain::entities::{OverlayDraft, OverlayPatch, OverlayRecord};
use crate::domain::errors::Result;

/// Port for overlay persistence (CRUD only)
#[async_trait]
pub trait OverlayStore: Send + Sync {
    /// All overlays in creation order
    async fn list(&self) -> Result<Vec<OverlayRecord>>;

    /// Store assigns id and creation time
    async fn create(&self, draft: OverlayDraft) -> Result<OverlayRecord>;

    async fn update(&self, id: &str, patch: OverlayPatch) -> Result<OverlayRecord>;

    async fn delete(&self, id: &str) -> Result<()>;
}
