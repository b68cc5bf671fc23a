use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

/// Where the wizard puts files the user gets to keep or edit.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;

    async fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", path))
    }
}

pub struct NativeStorage;

impl NativeStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for NativeStorage {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        if tokio::fs::try_exists(path).await? {
            if Path::new(path).is_dir() {
                tokio::fs::remove_dir_all(path).await?;
            } else {
                tokio::fs::remove_file(path).await?;
            }
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parent_dirs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("output").join("nested").join("story.pdf");
        let path_str = path.to_str().unwrap();
        let storage = NativeStorage::new();

        storage.write(path_str, b"%PDF-1.5").await?;
        assert!(storage.exists(path_str).await?);
        assert_eq!(storage.read(path_str).await?, b"%PDF-1.5");

        storage.delete(path_str).await?;
        assert!(!storage.exists(path_str).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_read_to_string_rejects_binary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bin");
        let path_str = path.to_str().unwrap();
        let storage = NativeStorage::new();

        storage.write(path_str, &[0xff, 0xfe, 0x00]).await?;
        assert!(storage.read_to_string(path_str).await.is_err());
        Ok(())
    }
}
