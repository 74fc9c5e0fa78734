use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entities::{OverlayDraft, OverlayPatch, OverlayRecord};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{OverlayStore, SettingsStore};
use crate::domain::value_objects::{PlayerSettings, SettingsPatch};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreDocument {
    overlays: Vec<OverlayRecord>,
    settings: PlayerSettings,
}

/// Overlay and settings store kept in memory, optionally mirrored to a JSON
/// file. A mutation only becomes visible once it has been written.
pub struct DocumentStore {
    document: RwLock<StoreDocument>,
    path: Option<PathBuf>,
}

impl DocumentStore {
    pub fn in_memory(settings: PlayerSettings) -> Self {
        Self {
            document: RwLock::new(StoreDocument {
                overlays: Vec::new(),
                settings,
            }),
            path: None,
        }
    }

    /// Load `path` if it exists, otherwise start from `defaults`
    pub async fn open(path: impl Into<PathBuf>, defaults: PlayerSettings) -> Result<Self> {
        let path = path.into();

        let document = match tokio::fs::read(&path).await {
            Ok(content) => serde_json::from_slice::<StoreDocument>(&content).map_err(|e| {
                DomainError::Storage(format!("{} is not a valid store: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Store file not found, starting empty");
                StoreDocument {
                    overlays: Vec::new(),
                    settings: defaults,
                }
            }
            Err(e) => {
                return Err(DomainError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::info!(
            path = %path.display(),
            overlays = document.overlays.len(),
            "Store loaded"
        );

        Ok(Self {
            document: RwLock::new(document),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self, document: &StoreDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_vec_pretty(document)
            .map_err(|e| DomainError::Storage(format!("failed to encode store: {}", e)))?;

        // Write then rename so a crash never leaves a truncated file
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, content).await.map_err(|e| {
            DomainError::Storage(format!("failed to write {}: {}", staging.display(), e))
        })?;
        tokio::fs::rename(&staging, path).await.map_err(|e| {
            DomainError::Storage(format!("failed to replace {}: {}", path.display(), e))
        })?;

        Ok(())
    }
}

#[async_trait]
impl OverlayStore for DocumentStore {
    async fn list(&self) -> Result<Vec<OverlayRecord>> {
        Ok(self.document.read().await.overlays.clone())
    }

    async fn create(&self, draft: OverlayDraft) -> Result<OverlayRecord> {
        let record = OverlayRecord::from_draft(draft, Uuid::new_v4().to_string(), Utc::now())?;

        let mut document = self.document.write().await;
        let mut next = document.clone();
        next.overlays.push(record.clone());
        self.persist(&next).await?;
        *document = next;

        tracing::info!(overlay_id = %record.id, kind = ?record.kind, "Overlay created");
        Ok(record)
    }

    async fn update(&self, id: &str, patch: OverlayPatch) -> Result<OverlayRecord> {
        let mut document = self.document.write().await;
        let index = document
            .overlays
            .iter()
            .position(|o| o.id == id)
            .ok_or_else(|| DomainError::OverlayNotFound(id.to_string()))?;

        let updated = document.overlays[index].patched(patch)?;
        let mut next = document.clone();
        next.overlays[index] = updated.clone();
        self.persist(&next).await?;
        *document = next;

        tracing::debug!(overlay_id = %id, "Overlay updated");
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut document = self.document.write().await;
        if !document.overlays.iter().any(|o| o.id == id) {
            return Err(DomainError::OverlayNotFound(id.to_string()));
        }

        let mut next = document.clone();
        next.overlays.retain(|o| o.id != id);
        self.persist(&next).await?;
        *document = next;

        tracing::info!(overlay_id = %id, "Overlay deleted");
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for DocumentStore {
    async fn get(&self) -> Result<PlayerSettings> {
        Ok(self.document.read().await.settings.clone())
    }

    async fn set(&self, patch: SettingsPatch) -> Result<PlayerSettings> {
        let mut document = self.document.write().await;
        let settings = document.settings.merged(patch);
        settings.validate()?;

        let mut next = document.clone();
        next.settings = settings.clone();
        self.persist(&next).await?;
        *document = next;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::OverlayKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_assigns_id_and_defaults() {
        let store = DocumentStore::in_memory(PlayerSettings::default());

        let record = store
            .create(OverlayDraft::new(OverlayKind::Text, "LIVE"))
            .await
            .unwrap();

        assert!(!record.id.is_empty());
        assert!(record.visible);
        assert_eq!(store.list().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_id() {
        let store = DocumentStore::in_memory(PlayerSettings::default());

        assert!(matches!(
            store.update("missing", OverlayPatch::visibility(false)).await,
            Err(DomainError::OverlayNotFound(_))
        ));
        assert!(matches!(
            store.delete("missing").await,
            Err(DomainError::OverlayNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_patch_leaves_record_untouched() {
        let store = DocumentStore::in_memory(PlayerSettings::default());
        let record = store
            .create(OverlayDraft::new(OverlayKind::Text, "LIVE"))
            .await
            .unwrap();

        let bad = OverlayPatch {
            opacity: Some(3.0),
            ..OverlayPatch::default()
        };
        assert!(matches!(
            store.update(&record.id, bad).await,
            Err(DomainError::InvalidOverlay(_))
        ));
        assert_eq!(store.list().await.unwrap()[0], record);
    }

    #[tokio::test]
    async fn test_settings_patch_is_validated() {
        let store = DocumentStore::in_memory(PlayerSettings::default());

        let updated = store.set(SettingsPatch::volume(0.4)).await.unwrap();
        assert_eq!(updated.volume, 0.4);

        assert!(store.set(SettingsPatch::volume(4.0)).await.is_err());
        assert_eq!(store.get().await.unwrap().volume, 0.4);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let store = DocumentStore::open(&path, PlayerSettings::default())
            .await
            .unwrap();
        let record = store
            .create(OverlayDraft::new(OverlayKind::Logo, "ACME").at(80.0, 5.0))
            .await
            .unwrap();
        store
            .set(SettingsPatch {
                source_locator: Some("rtsp://cam/live".to_string()),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();
        drop(store);

        let reopened = DocumentStore::open(&path, PlayerSettings::default())
            .await
            .unwrap();
        assert_eq!(reopened.list().await.unwrap(), vec![record]);
        assert_eq!(
            reopened.get().await.unwrap().source_locator,
            "rtsp://cam/live"
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(
            DocumentStore::open(&path, PlayerSettings::default()).await,
            Err(DomainError::Storage(_))
        ));
    }
}
