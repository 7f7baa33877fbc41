//! Local filesystem implementation of [`FileStorage`].

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use recognizer_core::{Error, FileStorage, Result};

/// Attachment files on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalFileStorage;

impl LocalFileStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        if tokio::fs::try_exists(to).await.unwrap_or(false) {
            return Err(Error::Storage(format!(
                "Refusing to overwrite existing file '{}'",
                to.display()
            )));
        }
        if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(from, to).await.map_err(|e| {
            Error::Storage(format!(
                "Failed to move '{}' to '{}': {}",
                from.display(),
                to.display(),
                e
            ))
        })?;
        debug!(from = %from.display(), to = %to.display(), "Moved file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_creates_parent_dir() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.pdf");
        std::fs::write(&from, b"%PDF-1.4").unwrap();
        let to = dir.path().join("sub").join("Smith - 2020 - Title.pdf");

        let storage = LocalFileStorage::new();
        storage.move_file(&from, &to).await.unwrap();

        assert!(!storage.exists(&from).await);
        assert!(storage.exists(&to).await);
        assert_eq!(std::fs::read(&to).unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_move_file_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.pdf");
        let to = dir.path().join("b.pdf");
        std::fs::write(&from, b"a").unwrap();
        std::fs::write(&to, b"b").unwrap();

        let err = LocalFileStorage::new()
            .move_file(&from, &to)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(std::fs::read(&from).unwrap(), b"a");
        assert_eq!(std::fs::read(&to).unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_move_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = LocalFileStorage::new()
            .move_file(&dir.path().join("missing.pdf"), &dir.path().join("x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
