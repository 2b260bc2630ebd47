//! Inventory store trait definition.

use async_trait::async_trait;

use crate::error::Result;

use super::lock::LockInfo;
use super::types::Inventory;

/// Storage backend for the inventory ledger and the workspace lock.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Loads the ledger.
    ///
    /// Returns `None` if no ledger exists yet.
    async fn load(&self) -> Result<Option<Inventory>>;

    /// Saves the ledger.
    async fn save(&self, inventory: &Inventory) -> Result<()>;

    /// Acquires the workspace lock.
    ///
    /// Creation is atomic: of two concurrent callers exactly one succeeds.
    /// An expired lock is taken over. An empty `holder` generates one.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Starts a new lease for the lock held under `lock_id`.
    ///
    /// Fails if the lock was released or taken over in the meantime.
    async fn renew_lock(&self, lock_id: &str) -> Result<LockInfo>;

    /// Releases the lock if it is still held under `lock_id`.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Removes the lock regardless of its holder.
    async fn force_unlock(&self) -> Result<Option<LockInfo>>;

    /// Gets current lock information if locked.
    async fn lock_info(&self) -> Result<Option<LockInfo>>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
