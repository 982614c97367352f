//! 证书类型策略

use const_oid::ObjectIdentifier;
use x509_cert::ext::pkix::{KeyUsage, KeyUsages};

use crate::{
    cert::extensions::{ID_KP_CLIENT_AUTH, ID_KP_CODE_SIGNING, ID_KP_SERVER_AUTH},
    types::CertificateType,
};

/// keyUsage 与 extendedKeyUsage 组合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsagePolicy {
    pub key_usage: KeyUsage,
    pub extended_key_usage: Vec<ObjectIdentifier>,
}

impl CertificateType {
    pub fn usage_policy(&self) -> UsagePolicy {
        let (key_usage, purpose) = match self {
            Self::Server => (
                KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment,
                ID_KP_SERVER_AUTH,
            ),
            Self::Client => (
                KeyUsages::DigitalSignature | KeyUsages::KeyAgreement,
                ID_KP_CLIENT_AUTH,
            ),
            Self::CodeSigning => (KeyUsages::DigitalSignature.into(), ID_KP_CODE_SIGNING),
        };
        UsagePolicy {
            key_usage: KeyUsage(key_usage),
            extended_key_usage: vec![purpose],
        }
    }
}
