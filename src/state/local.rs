//! Local file-based inventory store.
//!
//! The ledger lives in `{state_dir}/state.json` and the lock in
//! `{state_dir}/state.lock`.

use async_trait::async_trait;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, StateError, YoError};

use super::lock::{LOCK_LEASE_SECS, LockInfo, default_holder};
use super::store::InventoryStore;
use super::types::Inventory;

/// Ledger file name.
const STATE_FILE: &str = "state.json";

/// Lock file name.
const LOCK_FILE: &str = "state.lock";

/// Local file-based inventory store.
#[derive(Debug, Clone)]
pub struct LocalInventoryStore {
    base_dir: PathBuf,
    state_path: PathBuf,
    lock_path: PathBuf,
}

fn corrupted(message: String) -> YoError {
    YoError::State(StateError::Corrupted { message })
}

fn lock_failed(message: String) -> YoError {
    YoError::State(StateError::LockFailed { message })
}

impl LocalInventoryStore {
    /// Creates a store rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    /// Path of the ledger file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await?;
        }
        Ok(())
    }

    /// Writes `content` to `path` through `{path}.tmp` and a rename.
    async fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        self.ensure_dir().await?;
        let temp_path = sibling(path, "tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, path).await?;
        Ok(())
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        read_lock(&self.lock_path).await
    }

    async fn delete_lock_file(&self) -> Result<()> {
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(lock_failed(format!("Failed to delete lock file: {e}"))),
        }
    }

    /// Publishes a complete lock file only if none exists.
    ///
    /// The content is staged under a unique name and hard-linked into place,
    /// which fails atomically when the lock file is already there. Returns
    /// `false` in that case.
    async fn create_lock_file(&self, lock: &LockInfo) -> Result<bool> {
        self.ensure_dir().await?;
        let content = serde_json::to_string_pretty(lock)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;

        let staged = sibling(&self.lock_path, &lock.lock_id);
        fs::write(&staged, content)
            .await
            .map_err(|e| lock_failed(format!("Failed to stage lock file: {e}")))?;
        let linked = fs::hard_link(&staged, &self.lock_path).await;
        if let Err(e) = fs::remove_file(&staged).await {
            debug!("Failed to remove staged lock {}: {e}", staged.display());
        }

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(lock_failed(format!("Failed to create lock file: {e}"))),
        }
    }

    /// Moves an expired lock out of the way.
    ///
    /// If another process replaced `expired` with a live lock in the
    /// meantime, that lock is put back and reported as the holder.
    async fn remove_expired_lock(&self, expired: &LockInfo) -> Result<()> {
        let moved = sibling(&self.lock_path, &format!("stale-{}", Uuid::new_v4().simple()));
        match fs::rename(&self.lock_path, &moved).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(lock_failed(format!("Failed to move expired lock: {e}"))),
        }

        let displaced = read_lock(&moved).await;
        let result = match displaced {
            Ok(Some(live)) if live.lock_id != expired.lock_id => {
                if let Err(e) = fs::hard_link(&moved, &self.lock_path).await {
                    debug!("Could not restore lock of {}: {e}", live.holder);
                }
                Err(StateError::LockedByOther {
                    holder: live.holder,
                    since: live.acquired_at.to_rfc3339(),
                }
                .into())
            }
            _ => Ok(()),
        };
        if let Err(e) = fs::remove_file(&moved).await {
            debug!("Failed to remove {}: {e}", moved.display());
        }
        result
    }
}

/// `{path}.{suffix}` next to `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

async fn read_lock(path: &Path) -> Result<Option<LockInfo>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(lock_failed(format!("Failed to read lock file: {e}"))),
    };
    let lock_info = serde_json::from_str(&content)
        .map_err(|e| corrupted(format!("Failed to parse lock file: {e}")))?;
    Ok(Some(lock_info))
}

#[async_trait]
impl InventoryStore for LocalInventoryStore {
    async fn load(&self) -> Result<Option<Inventory>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        debug!("Loading inventory from: {}", self.state_path.display());
        let content = fs::read_to_string(&self.state_path)
            .await
            .map_err(|e| corrupted(format!("Failed to read state file: {e}")))?;
        let inventory = serde_json::from_str(&content)
            .map_err(|e| corrupted(format!("Failed to parse state file: {e}")))?;

        Ok(Some(inventory))
    }

    async fn save(&self, inventory: &Inventory) -> Result<()> {
        let content = serde_json::to_string_pretty(inventory)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;
        self.write_atomic(&self.state_path, &content).await?;
        info!("Saved inventory to: {}", self.state_path.display());
        Ok(())
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        let holder = if holder.is_empty() {
            default_holder()
        } else {
            holder.to_string()
        };
        let lock_info = LockInfo::new(&holder);

        // A second attempt follows the takeover of an expired lock.
        for _ in 0..2 {
            if self.create_lock_file(&lock_info).await? {
                debug!(
                    "Acquired state lock: {} (lease {LOCK_LEASE_SECS}s)",
                    lock_info.lock_id
                );
                return Ok(lock_info);
            }
            let Some(existing) = self.read_lock_file().await? else {
                continue;
            };
            if !existing.is_expired() {
                return Err(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
            warn!("Taking over expired lock held by {}", existing.holder);
            self.remove_expired_lock(&existing).await?;
        }

        Err(lock_failed(String::from(
            "lock file changed while acquiring; another apply is starting",
        )))
    }

    async fn renew_lock(&self, lock_id: &str) -> Result<LockInfo> {
        let mut lock_info = match self.read_lock_file().await? {
            Some(existing) if existing.lock_id == lock_id => existing,
            Some(existing) => {
                return Err(lock_failed(format!(
                    "lock {lock_id} was taken over by {}",
                    existing.holder
                )));
            }
            None => return Err(lock_failed(format!("lock {lock_id} is no longer held"))),
        };

        lock_info.renew();
        let content = serde_json::to_string_pretty(&lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;
        self.write_atomic(&self.lock_path, &content)
            .await
            .map_err(|e| lock_failed(format!("Failed to write lock file: {e}")))?;
        debug!("Renewed state lock {lock_id} until {}", lock_info.expires_at);
        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                debug!("Released state lock: {lock_id}");
            } else {
                warn!(
                    "Lock is now held by {} ({}); leaving it in place",
                    existing.holder, existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn force_unlock(&self) -> Result<Option<LockInfo>> {
        let existing = self.read_lock_file().await.unwrap_or(None);
        self.delete_lock_file().await?;
        Ok(existing)
    }

    async fn lock_info(&self) -> Result<Option<LockInfo>> {
        Ok(self.read_lock_file().await?.filter(|l| !l.is_expired()))
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::EntityKind;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalInventoryStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalInventoryStore::new(temp_dir.path().join(".yamlops"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut inventory = Inventory::new("dev");
        inventory.record(EntityKind::Zone, "hz");
        store.save(&inventory).await.expect("Failed to save");

        let loaded = store
            .load()
            .await
            .expect("Failed to load")
            .expect("Ledger should exist");
        assert_eq!(loaded.environment, "dev");
        assert!(loaded.zones.contains("hz"));
        assert!(!sibling(store.state_path(), "tmp").exists());
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();
        assert!(store.load().await.expect("Load should not fail").is_none());
    }

    #[tokio::test]
    async fn test_corrupted_ledger() {
        let (store, _temp) = create_test_store();
        std::fs::create_dir_all(store.state_path().parent().unwrap()).unwrap();
        std::fs::write(store.state_path(), "{not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, YoError::State(StateError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();

        let lock = store.acquire_lock("test-holder").await.expect("acquire");
        assert!(store.lock_info().await.unwrap().is_some());

        store.release_lock(&lock.lock_id).await.expect("release");
        assert!(store.lock_info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let (store, _temp) = create_test_store();

        let _lock = store.acquire_lock("holder-1").await.expect("first lock");
        let err = store.acquire_lock("holder-2").await.unwrap_err();
        assert!(matches!(
            err,
            YoError::State(StateError::LockedByOther { holder, .. }) if holder == "holder-1"
        ));
    }

    #[tokio::test]
    async fn test_release_with_wrong_id_keeps_lock() {
        let (store, _temp) = create_test_store();

        let _lock = store.acquire_lock("holder-1").await.unwrap();
        store.release_lock("someone-else").await.unwrap();
        assert!(store.lock_info().await.unwrap().is_some());

        let removed = store.force_unlock().await.unwrap();
        assert_eq!(removed.map(|l| l.holder), Some(String::from("holder-1")));
        assert!(store.lock_info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_lock_is_taken_over() {
        let (store, _temp) = create_test_store();

        let mut stale = LockInfo::new("crashed");
        stale.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
        store
            .write_atomic(&store.lock_path, &serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();

        let lock = store.acquire_lock("").await.expect("takeover");
        assert_ne!(lock.holder, "crashed");
        assert_eq!(store.lock_info().await.unwrap().map(|l| l.lock_id), Some(lock.lock_id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_has_one_winner() {
        let (store, _temp) = create_test_store();

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.acquire_lock(&format!("holder-{i}")).await })
            })
            .collect();

        let mut winners = Vec::new();
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(lock) => winners.push(lock),
                Err(e) => assert!(
                    matches!(e, YoError::State(StateError::LockedByOther { .. })),
                    "{e}"
                ),
            }
        }
        assert_eq!(winners.len(), 1);
        let held = store.lock_info().await.unwrap().unwrap();
        assert_eq!(held.lock_id, winners[0].lock_id);
    }

    #[tokio::test]
    async fn test_renew_extends_only_own_lock() {
        let (store, _temp) = create_test_store();

        let mut lock = store.acquire_lock("holder-1").await.unwrap();
        lock.expires_at = chrono::Utc::now() + chrono::Duration::seconds(5);
        store
            .write_atomic(&store.lock_path, &serde_json::to_string(&lock).unwrap())
            .await
            .unwrap();

        let renewed = store.renew_lock(&lock.lock_id).await.unwrap();
        assert!(renewed.expires_at > lock.expires_at);
        assert_eq!(store.lock_info().await.unwrap(), Some(renewed));

        let err = store.renew_lock("someone-else").await.unwrap_err();
        assert!(matches!(err, YoError::State(StateError::LockFailed { .. })));

        store.release_lock(&lock.lock_id).await.unwrap();
        assert!(store.renew_lock(&lock.lock_id).await.is_err());
    }
}
