use const_oid::ObjectIdentifier;
use privca_key::describe_spki;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use x509_cert::Certificate;

use super::{
    cert_utils::{
        certificate_der, der_to_pem, fingerprint_sha256, not_after, not_before, parse_certificate,
        serial_hex, spki_der, PEM_CERTIFICATE,
    },
    extensions::{
        read_basic_constraints, read_extended_key_usage, read_key_usage, read_subject_alt_names,
        ID_KP_CLIENT_AUTH, ID_KP_CODE_SIGNING, ID_KP_SERVER_AUTH,
    },
    name::dn_string,
};
use crate::error::Result;

/// 证书信息结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// 序列号，小写十六进制
    pub serial_number: String,
    /// 主体 DN
    pub subject: String,
    /// 颁发者 DN
    pub issuer: String,
    /// 生效时间
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    /// 过期时间
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    /// 公钥算法与长度，如 "RSA-2048"
    pub public_key: String,
    pub signature_algorithm: String,
    /// 证书用途
    pub key_usage: Vec<String>,
    /// 扩展密钥用途
    pub extended_key_usage: Vec<String>,
    pub subject_alt_names: Vec<String>,
    /// 是否为CA证书
    pub is_ca: bool,
    /// 证书链深度限制
    pub path_len_constraint: Option<u8>,
    /// SHA-256 指纹
    pub fingerprint: String,
}

impl CertificateInfo {
    pub fn from_certificate(cert: &Certificate) -> Result<Self> {
        let tbs = &cert.tbs_certificate;
        let basic_constraints = read_basic_constraints(cert)?.map(|(_, bc)| bc);

        let key_usage = read_key_usage(cert)?
            .map(|usage| {
                [
                    (usage.digital_signature(), "digitalSignature"),
                    (usage.non_repudiation(), "nonRepudiation"),
                    (usage.key_encipherment(), "keyEncipherment"),
                    (usage.data_encipherment(), "dataEncipherment"),
                    (usage.key_agreement(), "keyAgreement"),
                    (usage.key_cert_sign(), "keyCertSign"),
                    (usage.crl_sign(), "cRLSign"),
                ]
                .into_iter()
                .filter(|(set, _)| *set)
                .map(|(_, name)| name.to_string())
                .collect()
            })
            .unwrap_or_default();

        let public_key = describe_spki(&spki_der(cert)?)
            .map(|spec| spec.to_string())
            .unwrap_or_else(|_| tbs.subject_public_key_info.algorithm.oid.to_string());

        Ok(Self {
            serial_number: serial_hex(&tbs.serial_number),
            subject: dn_string(&tbs.subject),
            issuer: dn_string(&tbs.issuer),
            not_before: not_before(cert)?,
            not_after: not_after(cert)?,
            public_key,
            signature_algorithm: privca_key::signature_algorithm_name(
                &cert.signature_algorithm.oid,
            ),
            key_usage,
            extended_key_usage: read_extended_key_usage(cert)?
                .iter()
                .map(eku_name)
                .collect(),
            subject_alt_names: read_subject_alt_names(cert)?,
            is_ca: basic_constraints.as_ref().is_some_and(|bc| bc.ca),
            path_len_constraint: basic_constraints.and_then(|bc| bc.path_len_constraint),
            fingerprint: fingerprint_sha256(&certificate_der(cert)?),
        })
    }

    /// 检查证书是否在有效期内
    pub fn is_valid_at(&self, time: OffsetDateTime) -> bool {
        time >= self.not_before && time <= self.not_after
    }

    /// 检查证书当前是否有效
    pub fn is_currently_valid(&self) -> bool {
        self.is_valid_at(OffsetDateTime::now_utc())
    }

    /// 获取证书剩余有效天数
    pub fn days_until_expiry(&self) -> i64 {
        (self.not_after - OffsetDateTime::now_utc()).whole_days()
    }
}

fn eku_name(oid: &ObjectIdentifier) -> String {
    [
        (ID_KP_SERVER_AUTH, "serverAuth"),
        (ID_KP_CLIENT_AUTH, "clientAuth"),
        (ID_KP_CODE_SIGNING, "codeSigning"),
    ]
    .into_iter()
    .find(|(known, _)| known == oid)
    .map(|(_, name)| name.to_string())
    .unwrap_or_else(|| oid.to_string())
}

/// X.509 证书包装结构
#[derive(Debug, Clone)]
pub struct X509Certificate {
    /// 证书DER格式数据
    pub der_data: Vec<u8>,
    pub certificate: Certificate,
    /// 证书信息
    pub info: CertificateInfo,
}

impl X509Certificate {
    /// 导入证书（PEM或DER格式）
    pub fn import(cert_data: &[u8]) -> Result<Self> {
        Self::from_certificate(parse_certificate(cert_data)?)
    }

    pub fn from_certificate(certificate: Certificate) -> Result<Self> {
        Ok(Self {
            der_data: certificate_der(&certificate)?,
            info: CertificateInfo::from_certificate(&certificate)?,
            certificate,
        })
    }

    pub fn to_pem(&self) -> String {
        der_to_pem(PEM_CERTIFICATE, &self.der_data)
    }
}
