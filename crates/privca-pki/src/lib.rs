//! privca PKI - 私有证书颁发机构引擎
//!
//! CA 生命周期、证书签发、撤销与 CRL、OCSP 响应以及证书链验证。
//! Persistence goes through [`store::PkiStore`], private keys through the
//! AES-256-GCM [`vault::Vault`], and every state change is reported to an
//! [`audit::AuditSink`].

pub mod audit;
pub mod ca;
pub mod cert;
pub mod config;
pub mod context;
pub mod csr;
pub mod error;
pub mod export;
pub mod issuance;
pub mod logging;
pub mod ocsp;
pub mod pki;
pub mod revocation;
pub mod store;
pub mod types;
pub mod validation;
pub mod vault;

// 重新导出常用类型
pub use audit::{AuditAction, AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use ca::{CaCertificateOptions, CaManager, Chain, InitializeCaOptions, InitializeCaRequest, InitializedCa};
pub use cert::{CertificateInfo, X509Certificate};
pub use config::{Environment, PkiConfig};
pub use context::PkiContext;
pub use csr::{create_csr, Csr};
pub use error::{PkiError, Result};
pub use export::{parse_pkcs12, CertificateExporter, ExportFormat, Pkcs12Contents};
pub use issuance::{IssuanceEngine, IssuanceRequest, IssuanceResult, SubjectSource};
pub use ocsp::{CertificateState, OcspResponder, OcspStatus};
pub use pki::Pki;
pub use revocation::{CrlEncoding, RevocationManager};
pub use store::{MemoryStore, PkiStore};
pub use types::{
    CaIdentity, CaStatus, CertificateStatus, CertificateType, CrlIssuance, CrlKind,
    IssuedCertificate, RevocationReason, RevocationRecord,
};
pub use validation::{ValidationOptions, ValidationReport, Validator};
pub use vault::Vault;

/// 预导入模块，包含最常用的类型和函数
pub mod prelude {
    pub use crate::{
        ca::{CaCertificateOptions, InitializeCaRequest},
        error::{PkiError, Result},
        issuance::IssuanceRequest,
        pki::Pki,
        types::{CertificateType, CrlKind, RevocationReason},
        validation::ValidationOptions,
    };
    pub use privca_key::KeySpec;
}
