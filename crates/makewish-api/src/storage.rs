use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// On-disk bucket for item images.
///
/// Each upload is stored as a flat file `{dir}/{uuid}.{ext}` and served
/// read-only by the router.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes a new object and returns its file name.
    pub async fn save(&self, extension: &str, data: &[u8]) -> Result<String> {
        if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("Invalid file extension '{}'", extension);
        }

        let name = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.dir.join(&name);
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        info!("Stored {} ({} bytes)", name, data.len());
        Ok(name)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        if name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("Invalid object name '{}'", name);
        }
        match fs::remove_file(self.dir.join(name)).await {
            Ok(()) => {
                info!("Deleted {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Object {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("images")).await.unwrap();

        let name = storage.save("png", b"\x89PNG fake").await.unwrap();
        assert!(name.ends_with(".png"));
        let stored = fs::read(storage.dir().join(&name)).await.unwrap();
        assert_eq!(stored, b"\x89PNG fake");

        storage.delete(&name).await.unwrap();
        assert!(!storage.dir().join(&name).exists());
        // Deleting twice is fine.
        storage.delete(&name).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_tricks() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();
        assert!(storage.save("../png", b"x").await.is_err());
        assert!(storage.delete("../secret").await.is_err());
    }
}
