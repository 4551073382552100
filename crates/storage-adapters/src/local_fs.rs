//! Local mirror of the media directories.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

use domains::{DomainError, LocalFiles, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMediaFiles;

#[async_trait]
impl LocalFiles for LocalMediaFiles {
    async fn remove_if_exists(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DomainError::internal(format!("{}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_a_file_and_tolerates_a_missing_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1700000000123.png");
        fs::write(&path, b"png").await.unwrap();

        LocalMediaFiles.remove_if_exists(&path).await.unwrap();
        assert!(!path.exists());

        LocalMediaFiles.remove_if_exists(&path).await.unwrap();
    }

    #[tokio::test]
    async fn refuses_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalMediaFiles.remove_if_exists(dir.path()).await.unwrap_err();
        assert!(err.is_internal());
        assert!(dir.path().exists());
    }
}
