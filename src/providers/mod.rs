//! Provider capabilities consumed by the engine.
//!
//! Concrete ISP SDK bindings and the ACME client live outside this crate;
//! they plug in by implementing [`DnsProvider`] and [`CertificateIssuer`].

mod certificate;
mod dns;

pub use certificate::{CertificateIssuer, IssuedCertificate};
pub use dns::{DnsProvider, DnsProviders};

#[cfg(test)]
pub(crate) use dns::fake;
