//! Storage I/O for volume files and containers

use crate::error::{Result, VolchunkError};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// Trait for I/O operations against a storage root
#[async_trait]
pub trait IOManager: Send + Sync {
    /// Read data from a path
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write data to a path. Readers never observe a partially written file.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Check if a path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Names of the regular files directly under a directory
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Get the size of data at a path
    async fn size(&self, path: &str) -> Result<usize>;
}

/// File system I/O manager
pub struct FileSystemIOManager {
    base_path: PathBuf,
}

impl FileSystemIOManager {
    /// Create a new file system I/O manager
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the full path for a relative path
    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

#[async_trait]
impl IOManager for FileSystemIOManager {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let full_path = self.full_path(path);
        let data = fs::read(&full_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                VolchunkError::NotFound(full_path.display().to_string())
            }
            _ => VolchunkError::Io(e),
        })?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        // Create parent directories if they don't exist
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = full_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| VolchunkError::Configuration(format!("not a file path: {}", path)))?;
        let tmp_path = full_path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let written = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &full_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(VolchunkError::Io(e));
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(fs::try_exists(self.full_path(path)).await?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_path = self.full_path(prefix);
        let mut entries = Vec::new();

        if full_path.is_dir() {
            let mut read_dir = fs::read_dir(&full_path).await?;

            while let Some(entry) = read_dir.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    entries.push(name.to_string());
                }
            }
        }

        entries.sort();
        Ok(entries)
    }

    async fn size(&self, path: &str) -> Result<usize> {
        let metadata = fs::metadata(self.full_path(path)).await?;
        Ok(metadata.len() as usize)
    }
}

/// Bounded retries for transient I/O failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    async fn pause(&self, attempt: u32, path: &str, err: &VolchunkError) {
        warn!(path, attempt, error = %err, "transient I/O failure, retrying");
        tokio::time::sleep(self.backoff * attempt).await;
    }

    pub async fn read(&self, io: &dyn IOManager, path: &str) -> Result<Bytes> {
        let mut attempt = 1;
        loop {
            match io.read(path).await {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    self.pause(attempt, path, &e).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    pub async fn write(&self, io: &dyn IOManager, path: &str, data: &[u8]) -> Result<()> {
        let mut attempt = 1;
        loop {
            match io.write(path, data).await {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    self.pause(attempt, path, &e).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_system_io() {
        let temp_dir = TempDir::new().unwrap();
        let io = FileSystemIOManager::new(temp_dir.path());

        let data = b"volume bytes";
        io.write("img/case_00000.vck", data).await.unwrap();

        let read_data = io.read("img/case_00000.vck").await.unwrap();
        assert_eq!(&read_data[..], data);

        assert!(io.exists("img/case_00000.vck").await.unwrap());
        assert!(!io.exists("img/missing.vck").await.unwrap());
        assert_eq!(io.size("img/case_00000.vck").await.unwrap(), data.len());
        assert_eq!(io.list("img").await.unwrap(), vec!["case_00000.vck"]);
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let io = FileSystemIOManager::new(temp_dir.path());
        io.write("a.vck", b"one").await.unwrap();
        io.write("a.vck", b"two").await.unwrap();
        assert_eq!(io.list("").await.unwrap(), vec!["a.vck"]);
        assert_eq!(&io.read("a.vck").await.unwrap()[..], b"two");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let io = FileSystemIOManager::new(temp_dir.path());
        assert!(matches!(
            io.read("nope.nii.gz").await,
            Err(VolchunkError::NotFound(_))
        ));
    }

    /// Fails with a transient error a fixed number of times
    struct FlakyIO {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl IOManager for FlakyIO {
        async fn read(&self, _path: &str) -> Result<Bytes> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(VolchunkError::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "flaky",
                )))
            } else {
                Ok(Bytes::from_static(b"ok"))
            }
        }

        async fn write(&self, _path: &str, _data: &[u8]) -> Result<()> {
            Err(VolchunkError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "always",
            )))
        }

        async fn exists(&self, _path: &str) -> Result<bool> {
            Ok(true)
        }

        async fn list(&self, _prefix: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn size(&self, _path: &str) -> Result<usize> {
            Ok(2)
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let io = FlakyIO {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        assert_eq!(&policy.read(&io, "x").await.unwrap()[..], b"ok");
        assert_eq!(io.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let io = FlakyIO {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        assert!(policy.read(&io, "x").await.is_err());
        assert_eq!(io.calls.load(Ordering::SeqCst), 2);
        assert!(policy.write(&io, "x", b"").await.is_err());
    }
}
