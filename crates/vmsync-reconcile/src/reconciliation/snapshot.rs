//! Source inventory snapshot file.
//!
//! The last full source fetch is kept as a JSON array. A snapshot younger
//! than [`DEFAULT_MAX_AGE`] stands in for a live fetch. Writes merge into the
//! existing file by VM id: known entries are replaced in place, new ones
//! appended, none dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

use vmsync_connector::model::SourceVm;

/// How long a snapshot stays usable.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors reading or writing the snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed snapshot {}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// JSON file cache of the source inventory.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
    max_age: Duration,
}

impl SnapshotCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether the file exists and was written within the max age.
    pub async fn is_fresh(&self) -> bool {
        let modified = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.modified(),
            Err(_) => return false,
        };
        match modified.map(|m| SystemTime::now().duration_since(m)) {
            Ok(Ok(age)) => age < self.max_age,
            // Modification time in the future.
            Ok(Err(_)) => true,
            Err(_) => false,
        }
    }

    /// Read every record in the snapshot.
    pub async fn load(&self) -> Result<Vec<SourceVm>, SnapshotError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| self.io(e))?;
        let vms: Vec<SourceVm> =
            serde_json::from_slice(&bytes).map_err(|e| self.format(e))?;
        debug!(path = %self.path.display(), count = vms.len(), "Loaded snapshot");
        Ok(vms)
    }

    /// Merge `vms` into the snapshot and write it back.
    ///
    /// Returns the number of records in the written file.
    pub async fn store(&self, vms: &[SourceVm]) -> Result<usize, SnapshotError> {
        let mut merged = match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                serde_json::from_slice::<Vec<SourceVm>>(&bytes).map_err(|e| self.format(e))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(self.io(e)),
        };
        merge_by_id(&mut merged, vms);

        let body = serde_json::to_vec_pretty(&merged).map_err(|e| self.format(e))?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| self.io(e))?;
        info!(path = %self.path.display(), count = merged.len(), "Wrote snapshot");
        Ok(merged.len())
    }

    fn io(&self, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn format(&self, source: serde_json::Error) -> SnapshotError {
        SnapshotError::Format {
            path: self.path.clone(),
            source,
        }
    }
}

fn merge_by_id(existing: &mut Vec<SourceVm>, incoming: &[SourceVm]) {
    let mut positions: HashMap<String, usize> = existing
        .iter()
        .enumerate()
        .map(|(i, vm)| (vm.id.clone(), i))
        .collect();

    for vm in incoming {
        match positions.get(&vm.id) {
            Some(&i) => existing[i] = vm.clone(),
            None => {
                positions.insert(vm.id.clone(), existing.len());
                existing.push(vm.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(id: &str, name: &str) -> SourceVm {
        SourceVm::new(id, name)
    }

    #[test]
    fn test_merge_by_id() {
        let mut existing = vec![vm("a", "old-a"), vm("b", "b")];
        merge_by_id(&mut existing, &[vm("a", "new-a"), vm("c", "c")]);

        let names: Vec<_> = existing.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["new-a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path().join("vms.json"));
        assert!(!cache.is_fresh().await);
        assert!(matches!(cache.load().await, Err(SnapshotError::Io { .. })));
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path().join("vms.json"));

        let mut db1 = vm("5012-aaaa", "db1");
        db1.cluster = Some("Prod".into());
        assert_eq!(cache.store(&[db1.clone()]).await.unwrap(), 1);
        assert!(cache.is_fresh().await);

        let mut moved = db1.clone();
        moved.cluster = Some("Lab".into());
        assert_eq!(cache.store(&[moved, vm("vm-50", "lab1")]).await.unwrap(), 2);

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].cluster.as_deref(), Some("Lab"));
        assert_eq!(loaded[1].name, "lab1");
    }

    #[tokio::test]
    async fn test_old_snapshot_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vms.json");
        let cache = SnapshotCache::new(&path);
        cache.store(&[vm("a", "a")]).await.unwrap();

        let two_days_ago = SystemTime::now() - Duration::from_secs(2 * 24 * 60 * 60);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(two_days_ago)
            .unwrap();

        assert!(!cache.is_fresh().await);
        assert!(cache.with_max_age(Duration::from_secs(3 * 24 * 60 * 60)).is_fresh().await);
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vms.json");
        std::fs::write(&path, b"{not json").unwrap();

        let cache = SnapshotCache::new(path);
        assert!(matches!(cache.load().await, Err(SnapshotError::Format { .. })));
        assert!(matches!(
            cache.store(&[vm("a", "a")]).await,
            Err(SnapshotError::Format { .. })
        ));
    }
}
