use log::{info, warn};
use soundhub_core::{
    build_path, validate_upload, ArcedStorage, AssetKind, UploadLimits, UploadedFile,
    ValidationError,
};

use crate::CatalogResult;

/// Writes validated uploads into storage and reclaims the ones nothing points to anymore.
#[derive(Clone)]
pub struct Files {
    storage: ArcedStorage,
    limits: UploadLimits,
}

impl Files {
    pub fn new(storage: ArcedStorage, limits: UploadLimits) -> Self {
        Self { storage, limits }
    }

    pub fn storage(&self) -> &ArcedStorage {
        &self.storage
    }

    /// Checks an upload without storing it
    pub fn validate(&self, kind: AssetKind, file: &UploadedFile) -> Result<(), ValidationError> {
        validate_upload(file, kind.upload_kind(), &self.limits)
    }

    /// Writes an already validated upload to its derived path, returning the path
    pub async fn store(
        &self,
        kind: AssetKind,
        owner_username: &str,
        entity_name: Option<&str>,
        file: &UploadedFile,
    ) -> CatalogResult<String> {
        let path = build_path(kind, owner_username, entity_name, &file.filename);
        self.storage.write(&path, file.content.clone()).await?;

        info!("Stored {} at {}", kind, path);
        Ok(path)
    }

    /// Deletes a stored file. A missing file is fine, and failures are only logged.
    pub async fn reclaim(&self, path: &str) {
        match self.storage.delete(path).await {
            Ok(true) => info!("Reclaimed {}", path),
            Ok(false) => {}
            Err(e) => warn!("Could not reclaim {}: {}", path, e),
        }
    }

    /// Reclaims a file that was replaced by a new one
    pub async fn reclaim_replaced(&self, old: Option<&str>, new: Option<&str>) {
        match (old, new) {
            (Some(old), Some(new)) if old != new => self.reclaim(old).await,
            _ => {}
        }
    }

    /// Cleans up a freshly stored file after the row referencing it failed to save.
    /// A file that overwrote the previous one in place is left alone.
    pub async fn discard(&self, new: Option<&str>, previous: Option<&str>) {
        match new {
            Some(new) if Some(new) != previous => self.reclaim(new).await,
            _ => {}
        }
    }
}
