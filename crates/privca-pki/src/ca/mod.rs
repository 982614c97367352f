//! 证书颁发机构（CA）生命周期
//!
//! An identity starts `Initializing` with a freshly generated key and CSR,
//! and becomes `Active` once it holds a CA certificate, either self-signed
//! or signed elsewhere and uploaded.

pub mod chain;
pub mod manager;

use spki::SubjectPublicKeyInfoOwned;

pub use chain::Chain;
pub use manager::{CaCertificateOptions, CaManager, InitializeCaOptions, InitializeCaRequest, InitializedCa};

/// Same algorithm and same key bits
pub(crate) fn same_public_key(a: &SubjectPublicKeyInfoOwned, b: &SubjectPublicKeyInfoOwned) -> bool {
    a.algorithm.oid == b.algorithm.oid && a.subject_public_key == b.subject_public_key
}
