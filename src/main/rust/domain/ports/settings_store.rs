use async_trait::async_trait;

use crate::domain::errors::Result;
use crate::domain::value_objects::{PlayerSettings, SettingsPatch};

/// Port for the player settings document
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self) -> Result<PlayerSettings>;

    /// Merge and persist a partial update
    async fn set(&self, patch: SettingsPatch) -> Result<PlayerSettings>;
}
