//! Observed state and the local inventory ledger.
//!
//! [`StateObserver`] probes servers and DNS providers to build the
//! [`DeploymentState`] a plan is computed against. Inventory kinds that have
//! no remote signal are remembered in the [`Inventory`] ledger persisted by
//! an [`InventoryStore`].

mod local;
mod lock;
mod observer;
mod store;
mod types;

pub use local::LocalInventoryStore;
pub use lock::{LOCK_LEASE_SECS, LOCK_RENEW_INTERVAL_SECS, LockInfo, default_holder};
pub use observer::StateObserver;
pub use store::InventoryStore;
pub use types::{
    ApplyHistoryEntry, CertificateRecord, DeploymentState, Inventory, ObservedResource, RecordKey,
    STATE_VERSION, SyncStatus,
};
