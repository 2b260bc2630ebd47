//! Workspace lock guarding apply runs.
//!
//! At most one apply mutates a workspace's ledger at a time. A lock carries a
//! lease: the running apply renews it every [`LOCK_RENEW_INTERVAL_SECS`], and
//! a lease that ran out (a crashed run) may be taken over.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lease length in seconds.
pub const LOCK_LEASE_SECS: i64 = 300;

/// How often a running apply renews its lease.
pub const LOCK_RENEW_INTERVAL_SECS: u64 = 60;

/// A held workspace lock, as stored in the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Identifier used to release or renew the lock.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// End of the current lease.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// A fresh lock for `holder` with a full lease.
    #[must_use]
    pub fn new(holder: &str) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + Duration::seconds(LOCK_LEASE_SECS),
        }
    }

    /// Starts a new full lease from now.
    pub fn renew(&mut self) {
        self.expires_at = Utc::now() + Duration::seconds(LOCK_LEASE_SECS);
    }

    /// Whether the lease ran out.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Seconds left on the lease, never negative.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// `{host}:{pid}:{short id}` for locks taken without an explicit holder.
#[must_use]
pub fn default_holder() -> String {
    let host = hostname::get()
        .map_or_else(|_| String::from("unknown-host"), |h| h.to_string_lossy().into_owned());
    let id = Uuid::new_v4().simple().to_string();
    format!("{host}:{}:{}", std::process::id(), &id[..8])
}
