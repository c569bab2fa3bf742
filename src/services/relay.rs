use chrono::Utc;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::models::{StorageStats, StoredFile};
use crate::services::storage::{ObjectReader, StorageService};
use crate::utils::validation::{extension_hint, validate_stored_name};

pub struct Download {
    pub name: String,
    pub size: u64,
    pub reader: ObjectReader,
}

/// The relay contract: store, serve, count and expire files in one flat
/// directory. Holds no state of its own beyond the storage handle.
pub struct RelayService {
    storage: Arc<dyn StorageService>,
    base_url: String,
}

impl RelayService {
    pub fn new(storage: Arc<dyn StorageService>, base_url: impl Into<String>) -> Self {
        Self {
            storage,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        self.storage.root()
    }

    pub fn download_url(&self, name: &str) -> String {
        format!("{}/files/{}", self.base_url, name)
    }

    /// Stores `content` under a fresh UUID. `suggested_name` only contributes
    /// its extension.
    pub async fn upload<'a>(
        &self,
        suggested_name: Option<&str>,
        content: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StoredFile> {
        self.upload_with_prefix("", suggested_name, content).await
    }

    /// Same as [`upload`](Self::upload) with `prefix` put in front of the UUID.
    pub async fn upload_with_prefix<'a>(
        &self,
        prefix: &str,
        suggested_name: Option<&str>,
        content: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StoredFile> {
        let name = match extension_hint(suggested_name) {
            Some(ext) => format!("{}{}.{}", prefix, Uuid::new_v4(), ext),
            None => format!("{}{}", prefix, Uuid::new_v4()),
        };

        let size = self.storage.write_new(&name, content).await.map_err(|e| {
            tracing::warn!("Upload of {} failed: {}", name, e);
            RelayError::from(e)
        })?;

        tracing::info!(
            "📁 Uploaded: {} -> {} ({} bytes)",
            suggested_name.unwrap_or("<unnamed>"),
            name,
            size
        );

        Ok(StoredFile {
            download_url: self.download_url(&name),
            name,
            size_bytes: size,
            modified_at: Utc::now(),
        })
    }

    pub async fn upload_bytes(
        &self,
        suggested_name: Option<&str>,
        content: Vec<u8>,
    ) -> Result<StoredFile> {
        self.upload(suggested_name, Box::new(Cursor::new(content)))
            .await
    }

    pub async fn download(&self, name: &str) -> Result<Download> {
        validate_stored_name(name).map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

        let (reader, size) = self.storage.open(name).await?;
        tracing::info!("📤 Download: {} ({} bytes)", name, size);

        Ok(Download {
            name: name.to_string(),
            size,
            reader,
        })
    }

    pub async fn stats(&self) -> Result<StorageStats> {
        let entries = self.storage.list().await?;

        Ok(StorageStats {
            total_files: entries.len() as u64,
            total_bytes: entries.iter().map(|e| e.size).sum(),
        })
    }

    /// Deletes every file whose age strictly exceeds `max_age_secs`.
    /// Files removed by someone else in the meantime are not counted.
    pub async fn cleanup(&self, max_age_secs: u64) -> Result<u64> {
        self.cleanup_at(max_age_secs, SystemTime::now()).await
    }

    async fn cleanup_at(&self, max_age_secs: u64, now: SystemTime) -> Result<u64> {
        let max_age = Duration::from_secs(max_age_secs);
        let entries = self.storage.list().await?;
        let mut deleted: u64 = 0;

        for entry in entries {
            // Modification times in the future count as age zero
            let age = now.duration_since(entry.modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match self.storage.remove(&entry.name).await {
                Ok(true) => {
                    deleted += 1;
                    tracing::info!("🗑️ Deleted old file: {}", entry.name);
                }
                Ok(false) => {
                    tracing::debug!("{} already removed", entry.name);
                }
                Err(e) => {
                    tracing::warn!("Failed to delete {}: {}", entry.name, e);
                }
            }
        }

        if deleted > 0 {
            tracing::info!("Cleanup deleted {} files older than {}s", deleted, max_age_secs);
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileEntry;
    use crate::services::storage::{LocalStorageService, StorageError};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn relay() -> (TempDir, RelayService) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorageService::new(dir.path().to_path_buf()));
        (dir, RelayService::new(storage, "http://relay.test/"))
    }

    async fn read_all(download: Download) -> Vec<u8> {
        let mut reader = download.reader;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_upload_generates_name_and_url() {
        let (dir, relay) = relay();
        let stored = relay
            .upload_bytes(Some("../../photo.png"), b"png bytes".to_vec())
            .await
            .unwrap();

        assert!(stored.name.ends_with(".png"));
        let stem = stored.name.trim_end_matches(".png");
        assert!(Uuid::parse_str(stem).is_ok());
        assert_eq!(stored.size_bytes, 9);
        assert_eq!(
            stored.download_url,
            format!("http://relay.test/files/{}", stored.name)
        );
        assert!(dir.path().join(&stored.name).is_file());
    }

    #[tokio::test]
    async fn test_upload_with_prefix() {
        let (dir, relay) = relay();
        let stored = relay
            .upload_with_prefix("test_", Some("text.txt"), Box::new(Cursor::new(b"hi".to_vec())))
            .await
            .unwrap();

        let stem = stored
            .name
            .strip_prefix("test_")
            .and_then(|s| s.strip_suffix(".txt"))
            .unwrap();
        assert!(Uuid::parse_str(stem).is_ok());
        assert_eq!(std::fs::read(dir.path().join(&stored.name)).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_upload_without_name_has_no_extension() {
        let (_dir, relay) = relay();
        let stored = relay.upload_bytes(None, Vec::new()).await.unwrap();
        assert!(Uuid::parse_str(&stored.name).is_ok());
        assert_eq!(stored.size_bytes, 0);
    }

    #[tokio::test]
    async fn test_round_trip_including_empty() {
        let (_dir, relay) = relay();
        for content in [Vec::new(), b"x".to_vec(), vec![7u8; 200_000]] {
            let stored = relay.upload_bytes(Some("f.bin"), content.clone()).await.unwrap();
            let download = relay.download(&stored.name).await.unwrap();
            assert_eq!(download.size, content.len() as u64);
            assert_eq!(read_all(download).await, content);
        }
    }

    #[tokio::test]
    async fn test_download_errors() {
        let (_dir, relay) = relay();
        assert!(matches!(
            relay.download("nonexistent-name").await,
            Err(RelayError::NotFound(_))
        ));
        assert!(matches!(
            relay.download("../../etc/passwd").await,
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_counts_regular_files() {
        let (dir, relay) = relay();
        for _ in 0..10 {
            relay.upload_bytes(Some("a.dat"), vec![1u8; 100]).await.unwrap();
        }
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let stats = relay.stats().await.unwrap();
        assert_eq!(
            stats,
            StorageStats {
                total_files: 10,
                total_bytes: 1000
            }
        );
    }

    #[tokio::test]
    async fn test_cleanup_deletes_only_old_files() {
        let (dir, relay) = relay();
        let old = relay.upload_bytes(None, b"old".to_vec()).await.unwrap();
        let fresh = relay.upload_bytes(None, b"fresh".to_vec()).await.unwrap();

        let two_days_ago = SystemTime::now() - Duration::from_secs(2 * 86400);
        std::fs::File::options()
            .write(true)
            .open(dir.path().join(&old.name))
            .unwrap()
            .set_modified(two_days_ago)
            .unwrap();

        assert_eq!(relay.cleanup(86400).await.unwrap(), 1);
        assert!(!dir.path().join(&old.name).exists());
        assert!(dir.path().join(&fresh.name).exists());
        assert_eq!(relay.cleanup(86400).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_threshold_is_strict() {
        let (dir, relay) = relay();
        let stored = relay.upload_bytes(None, b"edge".to_vec()).await.unwrap();
        let modified = std::fs::metadata(dir.path().join(&stored.name))
            .unwrap()
            .modified()
            .unwrap();

        let exactly_at_limit = modified + Duration::from_secs(60);
        assert_eq!(relay.cleanup_at(60, exactly_at_limit).await.unwrap(), 0);

        let just_past = exactly_at_limit + Duration::from_millis(1);
        assert_eq!(relay.cleanup_at(60, just_past).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_get_unique_names() {
        let (_dir, relay) = relay();
        let relay = Arc::new(relay);

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let relay = relay.clone();
                tokio::spawn(async move {
                    relay
                        .upload_bytes(Some("same.txt"), b"same content".to_vec())
                        .await
                        .unwrap()
                        .name
                })
            })
            .collect();

        let mut names = HashSet::new();
        for handle in handles {
            assert!(names.insert(handle.await.unwrap()));
        }
        assert_eq!(relay.stats().await.unwrap().total_files, 32);
    }

    /// Lists a file that another cleanup already removed.
    struct RacingStorage {
        inner: LocalStorageService,
        stolen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StorageService for RacingStorage {
        fn root(&self) -> &Path {
            self.inner.root()
        }

        async fn write_new<'a>(
            &self,
            name: &str,
            reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        ) -> std::result::Result<u64, StorageError> {
            self.inner.write_new(name, reader).await
        }

        async fn open(&self, name: &str) -> std::result::Result<(ObjectReader, u64), StorageError> {
            self.inner.open(name).await
        }

        async fn list(&self) -> std::result::Result<Vec<FileEntry>, StorageError> {
            let entries = self.inner.list().await?;
            for name in self.stolen.lock().unwrap().iter() {
                std::fs::remove_file(self.inner.root().join(name)).unwrap();
            }
            Ok(entries)
        }

        async fn remove(&self, name: &str) -> std::result::Result<bool, StorageError> {
            self.inner.remove(name).await
        }
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_concurrent_deletion() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a"), b"a").unwrap();
        std::fs::write(dir.path().join("b"), b"b").unwrap();

        let storage = Arc::new(RacingStorage {
            inner: LocalStorageService::new(dir.path().to_path_buf()),
            stolen: Mutex::new(vec!["a".to_string()]),
        });
        let relay = RelayService::new(storage, "http://relay.test");

        let later = SystemTime::now() + Duration::from_secs(10);
        assert_eq!(relay.cleanup_at(0, later).await.unwrap(), 1);
        assert!(!dir.path().join("b").exists());
    }

    /// Refuses every write, like a full disk.
    struct FullDisk {
        root: std::path::PathBuf,
    }

    #[async_trait]
    impl StorageService for FullDisk {
        fn root(&self) -> &Path {
            &self.root
        }

        async fn write_new<'a>(
            &self,
            _name: &str,
            _reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        ) -> std::result::Result<u64, StorageError> {
            Err(StorageError::Io(std::io::Error::other("No space left on device")))
        }

        async fn open(&self, name: &str) -> std::result::Result<(ObjectReader, u64), StorageError> {
            Err(StorageError::NotFound(name.to_string()))
        }

        async fn list(&self) -> std::result::Result<Vec<FileEntry>, StorageError> {
            Ok(Vec::new())
        }

        async fn remove(&self, _name: &str) -> std::result::Result<bool, StorageError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_storage_failure() {
        let relay = RelayService::new(
            Arc::new(FullDisk {
                root: "/nonexistent".into(),
            }),
            "http://relay.test",
        );
        let err = relay.upload_bytes(Some("a.txt"), b"data".to_vec()).await.unwrap_err();
        assert!(matches!(err, RelayError::StorageFailure(_)));
    }
}
