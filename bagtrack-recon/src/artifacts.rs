//! Generated flight artifacts (reports, scanned manifest images)
//!
//! Artifacts live under `flights/{flight_id}/reports/` and
//! `flights/{flight_id}/manifests/`. They are removed best-effort when a
//! flight is deleted.

use async_trait::async_trait;
use bagtrack_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Artifact prefixes owned by a flight
pub fn flight_artifact_prefixes(flight_id: &str) -> [String; 2] {
    [
        format!("flights/{}/reports/", flight_id),
        format!("flights/{}/manifests/", flight_id),
    ]
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Delete everything under `prefix`; returns the number of files removed
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;
}

/// Artifacts stored as files below a root directory
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, prefix: &str) -> Result<PathBuf> {
        let relative = Path::new(prefix.trim_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || prefix.trim_matches('/').is_empty() {
            return Err(Error::InvalidInput(format!("Invalid artifact prefix: '{}'", prefix)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let dir = self.resolve(prefix)?;
        if !tokio::fs::try_exists(&dir).await? {
            debug!("No artifacts under {}", dir.display());
            return Ok(0);
        }

        let mut removed = 0;
        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    pending.push(entry.path());
                } else {
                    removed += 1;
                }
            }
        }

        tokio::fs::remove_dir_all(&dir).await?;
        debug!("Removed {} artifact(s) under {}", removed, dir.display());
        Ok(removed)
    }
}

/// Artifacts held in memory, keyed by path
#[derive(Default)]
pub struct MemoryArtifactStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: impl Into<String>, contents: Vec<u8>) {
        self.files.lock().await.insert(key.into(), contents);
    }

    pub async fn keys(&self) -> Vec<String> {
        self.files.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let mut files = self.files.lock().await;
        let before = files.len();
        files.retain(|key, _| !key.starts_with(prefix));
        Ok(before - files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fs_delete_prefix_removes_tree() {
        let temp = TempDir::new().unwrap();
        let reports = temp.path().join("flights/F1/reports/2025");
        std::fs::create_dir_all(&reports).unwrap();
        std::fs::write(reports.join("summary.pdf"), b"pdf").unwrap();
        std::fs::write(temp.path().join("flights/F1/reports/log.txt"), b"log").unwrap();

        let store = FsArtifactStore::new(temp.path());
        assert_eq!(store.delete_prefix("flights/F1/reports/").await.unwrap(), 2);
        assert!(!temp.path().join("flights/F1/reports").exists());
        assert_eq!(store.delete_prefix("flights/F1/reports/").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fs_rejects_parent_components() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());
        assert!(matches!(
            store.delete_prefix("flights/../../etc/").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(store.delete_prefix("/").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_delete_prefix_leaves_other_flights() {
        let store = MemoryArtifactStore::new();
        store.put("flights/F1/reports/a.pdf", vec![1]).await;
        store.put("flights/F1/manifests/b.jpg", vec![2]).await;
        store.put("flights/F10/reports/c.pdf", vec![3]).await;

        for prefix in flight_artifact_prefixes("F1") {
            store.delete_prefix(&prefix).await.unwrap();
        }
        assert_eq!(store.keys().await, vec!["flights/F10/reports/c.pdf".to_string()]);
    }
}
