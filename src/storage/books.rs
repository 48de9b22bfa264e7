use async_trait::async_trait;
use fable_traits::{BookStore, BookUpdate, StoreError};
use fable_types::{Book, BookId};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Book store keeping one JSON document per book under a directory.
///
/// Writes go to a temporary file that is renamed over the record, so a reader
/// never sees a half-written book. Updates are serialized by a store-wide lock.
pub struct FilesystemBookStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilesystemBookStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path).await.map_err(|e| {
            StoreError::Backend(format!(
                "Failed to create book directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, id: BookId) -> PathBuf {
        self.base_path.join(format!("{}.json", id))
    }

    async fn read(&self, id: BookId) -> Result<Option<Book>, StoreError> {
        let bytes = match tokio::fs::read(self.record_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("book {}: {}", id, e)))
    }

    async fn write(&self, book: &Book) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(book)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = self.record_path(book.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl BookStore for FilesystemBookStore {
    async fn find_by_id(&self, id: BookId) -> Result<Option<Book>, StoreError> {
        self.read(id).await
    }

    async fn save(&self, book: &Book) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(book).await
    }

    async fn update_fields(&self, id: BookId, update: BookUpdate) -> Result<Book, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut book = self.read(id).await?.ok_or(StoreError::NotFound(id))?;
        update.apply(&mut book)?;
        self.write(&book).await?;
        Ok(book)
    }
}
