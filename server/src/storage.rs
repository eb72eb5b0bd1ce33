use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use uuid::Uuid;

pub(crate) const THUMBNAIL_SUFFIX: &str = "_thmb";

#[derive(Debug)]
pub(crate) enum ImageStoreError {
    NotFound,
    Io(String),
}

/// File store for originals and derived images, one flat directory keyed
/// by plate id. Originals are `{id}.jpeg`, thumbnails `{id}_thmb.jpeg`,
/// so lookups never need an index.
#[derive(Clone)]
pub(crate) struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn original_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{id}.jpeg"))
    }

    pub fn derived_path(&self, id: Uuid, suffix: &str) -> PathBuf {
        self.root.join(derived_name(id, suffix))
    }

    pub async fn read_original(&self, id: Uuid) -> Result<Vec<u8>, ImageStoreError> {
        read_file(&self.original_path(id)).await
    }

    pub async fn write_original(&self, id: Uuid, bytes: &[u8]) -> Result<(), ImageStoreError> {
        tokio::fs::write(self.original_path(id), bytes)
            .await
            .map_err(io_error)
    }

    pub async fn write_derived(
        &self,
        id: Uuid,
        suffix: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ImageStoreError> {
        let path = self.derived_path(id, suffix);
        tokio::fs::write(&path, bytes).await.map_err(io_error)?;
        Ok(path)
    }

    /// Best-effort removal of every file belonging to a plate.
    pub async fn remove(&self, id: Uuid) {
        for path in [
            self.original_path(id),
            self.derived_path(id, THUMBNAIL_SUFFIX),
        ] {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                if err.kind() != ErrorKind::NotFound {
                    tracing::warn!(error = %err, path = %path.display(), "failed to remove image file");
                }
            }
        }
    }
}

pub(crate) fn derived_name(id: Uuid, suffix: &str) -> String {
    format!("{id}{suffix}.jpeg")
}

async fn read_file(path: &Path) -> Result<Vec<u8>, ImageStoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(ImageStoreError::NotFound),
        Err(err) => Err(ImageStoreError::Io(err.to_string())),
    }
}

fn io_error(err: std::io::Error) -> ImageStoreError {
    ImageStoreError::Io(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (ImageStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("plates");
        std::fs::create_dir_all(&root).unwrap();
        (ImageStore::new(root), dir)
    }

    #[tokio::test]
    async fn write_then_read_original() {
        let (store, _dir) = test_store();
        let id = Uuid::new_v4();
        store.write_original(id, b"jpeg bytes").await.unwrap();

        let bytes = store.read_original(id).await.unwrap();
        assert_eq!(bytes, b"jpeg bytes");
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let (store, _dir) = test_store();
        let result = store.read_original(Uuid::new_v4()).await;
        assert!(matches!(result, Err(ImageStoreError::NotFound)));
    }

    #[tokio::test]
    async fn derived_files_use_the_suffix_naming() {
        let (store, _dir) = test_store();
        let id = Uuid::new_v4();
        let path = store
            .write_derived(id, THUMBNAIL_SUFFIX, b"thumb")
            .await
            .unwrap();

        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some(format!("{id}_thmb.jpeg").as_str())
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"thumb");
    }

    #[tokio::test]
    async fn remove_clears_original_and_thumbnail() {
        let (store, _dir) = test_store();
        let id = Uuid::new_v4();
        store.write_original(id, b"original").await.unwrap();
        store
            .write_derived(id, THUMBNAIL_SUFFIX, b"thumb")
            .await
            .unwrap();

        store.remove(id).await;
        assert!(matches!(
            store.read_original(id).await,
            Err(ImageStoreError::NotFound)
        ));
        assert!(!store.derived_path(id, THUMBNAIL_SUFFIX).exists());

        // Removing an already-absent plate is fine.
        store.remove(id).await;
    }
}
