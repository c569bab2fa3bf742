use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::models::FileEntry;
use crate::utils::validation::validate_stored_name;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    /// The upload body could not be read; nothing is wrong with the disk.
    #[error("Source stream error: {0}")]
    Source(io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Carried inside the source `io::Error` when the request body hits the
/// configured size limit mid-upload.
#[derive(Error, Debug)]
#[error("request body exceeds the size limit")]
pub struct BodyLimitExceeded;

pub type ObjectReader = Box<dyn AsyncRead + Unpin + Send>;

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Absolute path of the storage directory.
    fn root(&self) -> &Path;

    /// Writes `reader` to a new file called `name`. Fails rather than
    /// overwriting an existing entry, and leaves nothing behind on error.
    async fn write_new<'a>(
        &self,
        name: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<u64, StorageError>;

    async fn open(&self, name: &str) -> Result<(ObjectReader, u64), StorageError>;

    /// Regular files only; symlinks, directories and special files are skipped.
    async fn list(&self) -> Result<Vec<FileEntry>, StorageError>;

    /// Returns `false` when the file was already gone.
    async fn remove(&self, name: &str) -> Result<bool, StorageError>;
}

pub struct LocalStorageService {
    root: PathBuf,
}

impl LocalStorageService {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_stored_name(name).map_err(|_| StorageError::NotFound(name.to_string()))?;
        Ok(self.root.join(name))
    }
}

async fn copy_into<'a>(
    mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    file: &mut fs::File,
) -> Result<u64, StorageError> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total: u64 = 0;

    loop {
        let read = reader.read(&mut buffer).await.map_err(StorageError::Source)?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read]).await?;
        total += read as u64;
    }

    file.flush().await?;
    Ok(total)
}

#[async_trait]
impl StorageService for LocalStorageService {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn write_new<'a>(
        &self,
        name: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<u64, StorageError> {
        let path = self.path_for(name)?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        match copy_into(reader, &mut file).await {
            Ok(written) => Ok(written),
            Err(e) => {
                drop(file);
                if let Err(rm) = fs::remove_file(&path).await {
                    if rm.kind() != io::ErrorKind::NotFound {
                        tracing::error!(
                            "Failed to remove partial upload {}: {}",
                            path.display(),
                            rm
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn open(&self, name: &str) -> Result<(ObjectReader, u64), StorageError> {
        let path = self.path_for(name)?;
        let not_found = |e: io::Error| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::Io(e)
            }
        };

        let metadata = fs::symlink_metadata(&path).await.map_err(not_found)?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(name.to_string()));
        }

        let file = fs::File::open(&path).await.map_err(not_found)?;
        let len = file.metadata().await?.len();

        Ok((Box::new(file), len))
    }

    async fn list(&self) -> Result<Vec<FileEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            // Entries can vanish between readdir and stat under a concurrent cleanup
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !file_type.is_file() {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!("Skipping non UTF-8 entry in {}", self.root.display());
                continue;
            };

            entries.push(FileEntry {
                name,
                size: metadata.len(),
                modified: metadata.modified()?,
            });
        }

        Ok(entries)
    }

    async fn remove(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::TempDir;
    use tokio::io::ReadBuf;

    fn storage() -> (TempDir, LocalStorageService) {
        let dir = TempDir::new().unwrap();
        let service = LocalStorageService::new(dir.path().to_path_buf());
        (dir, service)
    }

    /// Yields some bytes, then fails like a dropped connection.
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "client went away",
                )));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_and_open() {
        let (_dir, storage) = storage();
        let written = storage
            .write_new("a.bin", Box::new(Cursor::new(b"hello".to_vec())))
            .await
            .unwrap();
        assert_eq!(written, 5);

        let (mut reader, len) = storage.open("a.bin").await.unwrap();
        assert_eq!(len, 5);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn test_write_new_refuses_to_overwrite() {
        let (_dir, storage) = storage();
        storage
            .write_new("dup", Box::new(Cursor::new(b"first".to_vec())))
            .await
            .unwrap();

        let err = storage
            .write_new("dup", Box::new(Cursor::new(b"second".to_vec())))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(ref e) if e.kind() == io::ErrorKind::AlreadyExists));

        let (mut reader, _) = storage.open("dup").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"first");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_file() {
        let (dir, storage) = storage();
        let err = storage
            .write_new("broken", Box::new(BrokenReader { sent: false }))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Source(_)));
        assert!(!dir.path().join("broken").exists());
    }

    #[tokio::test]
    async fn test_open_missing_and_invalid() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.open("missing").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.open("../escape").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_skips_directories() {
        let (dir, storage) = storage();
        std::fs::write(dir.path().join("one"), b"1").unwrap();
        std::fs::write(dir.path().join("two"), b"22").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let mut names: Vec<_> = storage
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.size))
            .collect();
        names.sort();
        assert_eq!(names, vec![("one".to_string(), 1), ("two".to_string(), 2)]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_are_not_files() {
        let (dir, storage) = storage();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("secret");
        std::fs::write(&target, b"outside").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("link")).unwrap();

        assert!(storage.list().await.unwrap().is_empty());
        assert!(matches!(
            storage.open("link").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_twice() {
        let (dir, storage) = storage();
        std::fs::write(dir.path().join("gone"), b"x").unwrap();

        assert!(storage.remove("gone").await.unwrap());
        assert!(!storage.remove("gone").await.unwrap());
    }
}
