use std::{fmt, str::FromStr};

use privca_key::KeySpec;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use x509_cert::ext::pkix::CrlReason;

use crate::error::{PkiError, Result};

/// CA 状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CaStatus {
    /// 已生成密钥，等待证书
    Initializing,
    /// 可签发
    Active,
    /// 已过期
    Expired,
}

/// 证书状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CertificateStatus {
    /// 有效
    Active,
    /// 已过期
    Expired,
    /// 已撤销
    Revoked,
}

/// 撤销原因（RFC 5280 §5.3.1）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RevocationReason {
    /// 未指定
    #[default]
    Unspecified,
    /// 密钥泄露
    KeyCompromise,
    /// CA密钥泄露
    #[serde(rename = "cACompromise")]
    CACompromise,
    /// 从属关系改变
    AffiliationChanged,
    /// 被取代
    Superseded,
    /// 停止操作
    CessationOfOperation,
    /// 证书暂停
    CertificateHold,
    /// 从CRL中移除
    #[serde(rename = "removeFromCRL")]
    RemoveFromCRL,
    /// 特权撤销
    PrivilegeWithdrawn,
    /// AA泄露
    #[serde(rename = "aACompromise")]
    AACompromise,
}

impl RevocationReason {
    const ALL: [Self; 10] = [
        Self::Unspecified,
        Self::KeyCompromise,
        Self::CACompromise,
        Self::AffiliationChanged,
        Self::Superseded,
        Self::CessationOfOperation,
        Self::CertificateHold,
        Self::RemoveFromCRL,
        Self::PrivilegeWithdrawn,
        Self::AACompromise,
    ];

    /// RFC 5280 name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::KeyCompromise => "keyCompromise",
            Self::CACompromise => "cACompromise",
            Self::AffiliationChanged => "affiliationChanged",
            Self::Superseded => "superseded",
            Self::CessationOfOperation => "cessationOfOperation",
            Self::CertificateHold => "certificateHold",
            Self::RemoveFromCRL => "removeFromCRL",
            Self::PrivilegeWithdrawn => "privilegeWithdrawn",
            Self::AACompromise => "aACompromise",
        }
    }

    /// reasonCode as carried in CRL entries and OCSP responses
    pub fn to_crl_reason(self) -> CrlReason {
        match self {
            Self::Unspecified => CrlReason::Unspecified,
            Self::KeyCompromise => CrlReason::KeyCompromise,
            Self::CACompromise => CrlReason::CaCompromise,
            Self::AffiliationChanged => CrlReason::AffiliationChanged,
            Self::Superseded => CrlReason::Superseded,
            Self::CessationOfOperation => CrlReason::CessationOfOperation,
            Self::CertificateHold => CrlReason::CertificateHold,
            Self::RemoveFromCRL => CrlReason::RemoveFromCRL,
            Self::PrivilegeWithdrawn => CrlReason::PrivilegeWithdrawn,
            Self::AACompromise => CrlReason::AaCompromise,
        }
    }

    pub fn from_crl_reason(reason: CrlReason) -> Self {
        match reason {
            CrlReason::Unspecified => Self::Unspecified,
            CrlReason::KeyCompromise => Self::KeyCompromise,
            CrlReason::CaCompromise => Self::CACompromise,
            CrlReason::AffiliationChanged => Self::AffiliationChanged,
            CrlReason::Superseded => Self::Superseded,
            CrlReason::CessationOfOperation => Self::CessationOfOperation,
            CrlReason::CertificateHold => Self::CertificateHold,
            CrlReason::RemoveFromCRL => Self::RemoveFromCRL,
            CrlReason::PrivilegeWithdrawn => Self::PrivilegeWithdrawn,
            CrlReason::AaCompromise => Self::AACompromise,
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationReason {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().replace(['_', '-', ' '], "");
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| PkiError::ValidationError(format!("Unknown revocation reason: {s}")))
    }
}

/// 证书类型，决定 keyUsage 与 extendedKeyUsage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CertificateType {
    /// TLS 服务端
    #[default]
    Server,
    /// TLS 客户端
    Client,
    /// 代码签名
    CodeSigning,
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Server => "server",
            Self::Client => "client",
            Self::CodeSigning => "code_signing",
        };
        f.write_str(name)
    }
}

/// AES-256-GCM 加密后的私钥
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub ciphertext: Vec<u8>,
    /// 12 字节随机 IV
    pub iv: Vec<u8>,
    /// 16 字节认证标签
    pub auth_tag: Vec<u8>,
}

impl fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedBlob")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("iv_len", &self.iv.len())
            .field("auth_tag_len", &self.auth_tag.len())
            .finish()
    }
}

/// 证书颁发机构身份
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaIdentity {
    pub id: String,
    pub name: String,
    /// RFC 4514 形式的主体名
    pub subject_dn: String,
    pub key_spec: KeySpec,
    pub status: CaStatus,
    pub encrypted_private_key: EncryptedBlob,
    /// 初始化时生成的 CSR
    pub csr_pem: Option<String>,
    pub certificate_pem: Option<String>,
    /// 证书链，叶子在前（包含本 CA 证书）
    pub certificate_chain_pem: Vec<String>,
    /// 最近一次签发的 CRL 编号，0 表示尚未签发
    pub crl_number: u64,
    pub crl_distribution_url: Option<String>,
    pub ocsp_url: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_from: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_to: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CaIdentity {
    /// Status with time-driven expiry applied
    pub fn observed_status(&self, now: OffsetDateTime) -> CaStatus {
        match (self.status, self.valid_to) {
            (CaStatus::Active, Some(valid_to)) if valid_to < now => CaStatus::Expired,
            (status, _) => status,
        }
    }

    /// Copy with the observed status written back
    pub fn observed(mut self, now: OffsetDateTime) -> Self {
        self.status = self.observed_status(now);
        self
    }

    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.observed_status(now) == CaStatus::Active
    }
}

/// 已签发证书
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCertificate {
    pub id: String,
    /// 32 位小写十六进制
    pub serial_number: String,
    /// SHA-256 指纹，冒号分隔的大写十六进制
    pub fingerprint: String,
    pub subject_dn: String,
    pub sans: Vec<String>,
    pub certificate_type: CertificateType,
    pub key_algorithm: String,
    pub status: CertificateStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_to: OffsetDateTime,
    pub certificate_pem: String,
    /// 仅当服务端生成密钥时存在
    pub encrypted_private_key: Option<EncryptedBlob>,
    pub ca_id: String,
    pub requested_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl IssuedCertificate {
    pub fn observed_status(&self, now: OffsetDateTime) -> CertificateStatus {
        match self.status {
            CertificateStatus::Active if self.valid_to < now => CertificateStatus::Expired,
            status => status,
        }
    }

    pub fn observed(mut self, now: OffsetDateTime) -> Self {
        self.status = self.observed_status(now);
        self
    }
}

/// 撤销记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevocationRecord {
    pub serial_number: String,
    pub certificate_id: String,
    pub ca_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub revocation_date: OffsetDateTime,
    pub reason: RevocationReason,
    pub revoked_by: String,
    /// Commit order, assigned by the store
    #[serde(default)]
    pub sequence: u64,
}

/// CRL 类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CrlKind {
    Full,
    Delta,
}

/// 一次 CRL 签发
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrlIssuance {
    pub crl_number: u64,
    pub ca_id: String,
    pub kind: CrlKind,
    /// 仅 Delta CRL 有
    pub base_crl_number: Option<u64>,
    pub crl_der: Vec<u8>,
    pub crl_pem: String,
    #[serde(with = "time::serde::rfc3339")]
    pub this_update: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub next_update: OffsetDateTime,
    pub entry_count: usize,
    /// Highest revocation sequence committed when this CRL was built
    #[serde(default)]
    pub revocation_watermark: u64,
}
