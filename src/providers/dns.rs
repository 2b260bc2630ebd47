//! DNS provider capability and the per-ISP registry.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::DnsRecord;
use crate::error::{ProviderError, Result};

/// DNS API of one ISP account.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Lists the zones hosted by the account.
    async fn list_domains(&self) -> Result<Vec<String>>;

    /// Lists the records of a zone.
    async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>>;

    /// Creates a record.
    async fn create_record(&self, domain: &str, record: &DnsRecord) -> Result<()>;

    /// Updates the record with the same type and name.
    async fn update_record(&self, domain: &str, record: &DnsRecord) -> Result<()>;

    /// Deletes the record with the same type and name.
    async fn delete_record(&self, domain: &str, record: &DnsRecord) -> Result<()>;
}

/// DNS providers keyed by ISP name.
#[derive(Clone, Default)]
pub struct DnsProviders {
    by_isp: BTreeMap<String, Arc<dyn DnsProvider>>,
}

impl DnsProviders {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the provider answering for an ISP.
    pub fn register(&mut self, isp: impl Into<String>, provider: Arc<dyn DnsProvider>) {
        self.by_isp.insert(isp.into(), provider);
    }

    /// Returns the provider for an ISP.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotRegistered`] if none is registered.
    pub fn get(&self, isp: &str) -> Result<Arc<dyn DnsProvider>> {
        self.by_isp.get(isp).cloned().ok_or_else(|| {
            ProviderError::NotRegistered {
                isp: isp.to_string(),
            }
            .into()
        })
    }

    /// Returns true if a provider is registered for the ISP.
    #[must_use]
    pub fn contains(&self, isp: &str) -> bool {
        self.by_isp.contains_key(isp)
    }

    /// Returns true if no provider is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_isp.is_empty()
    }
}

impl fmt::Debug for DnsProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.by_isp.keys()).finish()
    }
}
