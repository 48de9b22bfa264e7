use async_trait::async_trait;
use fable_traits::StoreError;
use fable_types::BookId;
use std::path::{Path, PathBuf};

/// Storage backend for finished book documents.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Take ownership of the file at `source` and return its stored location.
    ///
    /// Only returns once the stored file exists and is non-empty.
    async fn store(&self, book_id: BookId, source: &Path) -> Result<String, StoreError>;
}

/// Keeps documents as plain files in one directory. Locations are file paths.
pub struct FilesystemArtifactStorage {
    base_path: PathBuf,
}

impl FilesystemArtifactStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path).await.map_err(|e| {
            StoreError::Backend(format!(
                "Failed to create artifact directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl ArtifactStorage for FilesystemArtifactStorage {
    async fn store(&self, book_id: BookId, source: &Path) -> Result<String, StoreError> {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.pdf", book_id));
        let dest = self.base_path.join(file_name);

        if source != dest.as_path() {
            // Rename fails across filesystems; copy in that case.
            if tokio::fs::rename(source, &dest).await.is_err() {
                tokio::fs::copy(source, &dest).await.map_err(|e| {
                    StoreError::Backend(format!("Failed to copy {} to storage: {}", source.display(), e))
                })?;
                let _ = tokio::fs::remove_file(source).await;
            }
        }

        let size = tokio::fs::metadata(&dest).await?.len();
        if size == 0 {
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(StoreError::Backend(format!(
                "Stored document for book {} is empty",
                book_id
            )));
        }
        Ok(dest.to_string_lossy().into_owned())
    }
}
