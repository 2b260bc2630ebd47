//! Certificate issuance capability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A certificate returned by the issuer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuedCertificate {
    /// Covered domain names.
    pub domains: Vec<String>,
    /// PEM-encoded certificate chain.
    pub certificate_pem: String,
    /// PEM-encoded private key.
    pub private_key_pem: String,
    /// Expiry time.
    pub not_after: DateTime<Utc>,
}

/// Obtains and renews certificates, e.g. through ACME DNS-01.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Obtains a new certificate for the domains.
    async fn obtain_certificate(&self, domains: &[String]) -> Result<IssuedCertificate>;

    /// Renews an existing certificate.
    async fn renew_certificate(&self, current: &IssuedCertificate) -> Result<IssuedCertificate>;
}

impl IssuedCertificate {
    /// Returns true when fewer than `days` days remain at `now`.
    #[must_use]
    pub fn expires_within(&self, days: u32, now: DateTime<Utc>) -> bool {
        self.not_after - now < chrono::Duration::days(i64::from(days))
    }
}
