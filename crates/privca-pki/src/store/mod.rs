//! 存储接口
//!
//! The engine talks to persistence only through [`PkiStore`]. Every method
//! is a single atomic unit; multi-step writes (revoke, CRL issuance, cascade
//! delete) are never partially visible.

mod memory;

pub use memory::MemoryStore;
use time::OffsetDateTime;

use crate::{
    error::Result,
    types::{CaIdentity, CrlIssuance, CrlKind, IssuedCertificate, RevocationRecord},
};

/// A revocation together with the expiry of the certificate it covers
#[derive(Debug, Clone)]
pub struct RevokedEntry {
    pub record: RevocationRecord,
    pub certificate_valid_to: OffsetDateTime,
}

/// State handed to a CRL builder while the store holds its write lock
#[derive(Debug)]
pub struct CrlSnapshot<'a> {
    pub ca: &'a CaIdentity,
    /// Number the new CRL must carry
    pub crl_number: u64,
    pub revocations: Vec<RevokedEntry>,
    pub latest_full: Option<&'a CrlIssuance>,
    /// Highest revocation sequence committed so far
    pub revocation_watermark: u64,
}

/// Rows removed by a cascading CA delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    pub certificates: usize,
    pub revocations: usize,
    pub crls: usize,
}

/// 存储后端接口
pub trait PkiStore: Send + Sync {
    // ------------------------------------------------------------------------
    // CA identities
    // ------------------------------------------------------------------------

    /// Insert a new identity; an existing id is a `StoreError`
    fn insert_ca(&self, ca: CaIdentity) -> Result<()>;

    /// Replace an identity; an unknown id is `CANotFound`
    fn update_ca(&self, ca: CaIdentity) -> Result<()>;

    fn get_ca(&self, ca_id: &str) -> Result<Option<CaIdentity>>;

    fn list_cas(&self) -> Result<Vec<CaIdentity>>;

    /// Remove an identity with its certificates, revocations and CRLs
    fn delete_ca_cascade(&self, ca_id: &str) -> Result<CascadeSummary>;

    // ------------------------------------------------------------------------
    // Certificates
    // ------------------------------------------------------------------------

    /// Unique-serial insert; a duplicate serial is `SerialCollision`
    fn insert_certificate(&self, certificate: IssuedCertificate) -> Result<()>;

    fn get_certificate(&self, certificate_id: &str) -> Result<Option<IssuedCertificate>>;

    fn get_certificate_by_serial(&self, serial_number: &str) -> Result<Option<IssuedCertificate>>;

    fn list_certificates(&self, ca_id: &str) -> Result<Vec<IssuedCertificate>>;

    // ------------------------------------------------------------------------
    // Revocation
    // ------------------------------------------------------------------------

    /// Insert the record and flip the certificate to `Revoked`
    ///
    /// Assigns the record the next `sequence`, so a later CRL snapshot sees
    /// every lower sequence. Fails with `CertificateNotFound` or
    /// `AlreadyRevoked` without writing.
    fn revoke(&self, record: RevocationRecord) -> Result<RevocationRecord>;

    fn get_revocation(&self, serial_number: &str) -> Result<Option<RevocationRecord>>;

    fn list_revocations(&self, ca_id: &str) -> Result<Vec<RevocationRecord>>;

    // ------------------------------------------------------------------------
    // CRLs
    // ------------------------------------------------------------------------

    /// Allocate the next CRL number, build, and persist as one unit
    ///
    /// `build` runs under the write lock. If it fails, neither the counter
    /// nor the history changes.
    fn issue_crl(
        &self,
        ca_id: &str,
        build: &mut dyn FnMut(CrlSnapshot<'_>) -> Result<CrlIssuance>,
    ) -> Result<CrlIssuance>;

    fn get_crl(&self, ca_id: &str, crl_number: u64) -> Result<Option<CrlIssuance>>;

    /// Highest-numbered CRL, optionally of one kind
    fn latest_crl(&self, ca_id: &str, kind: Option<CrlKind>) -> Result<Option<CrlIssuance>>;
}
