//! 证书链管理
//!
//! Stored chains are leaf first: the CA's own certificate, then its issuer,
//! up towards the root.

use std::collections::HashSet;

use spki::SubjectPublicKeyInfoOwned;
use x509_cert::Certificate;

use super::same_public_key;
use crate::{
    cert::{
        cert_utils::{certificate_der, der_to_pem, is_self_issued, parse_certificate_der, PEM_CERTIFICATE},
        extensions::read_basic_constraints,
    },
    error::{PkiError, Result},
};

/// 证书链
#[derive(Debug, Clone)]
pub struct Chain {
    /// 证书链 (从本 CA 证书到根证书)
    certificates: Vec<Certificate>,
}

impl Chain {
    /// Order submitted certificates into a stored chain
    ///
    /// Blocks are deduplicated by DER. The primary is the block carrying
    /// `ca_key`; failing that, the first block with cA=true. The rest follow
    /// issuer links from the primary, and anything unlinked is appended in
    /// submission order.
    pub fn normalize(blocks: Vec<Vec<u8>>, ca_key: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut remaining = Vec::new();
        for der in blocks {
            if seen.insert(der.clone()) {
                let cert = parse_certificate_der(&der)
                    .map_err(|e| PkiError::ValidationError(format!("Chain entry is not X.509: {e}")))?;
                remaining.push(cert);
            }
        }

        let primary = match remaining
            .iter()
            .position(|cert| same_public_key(&cert.tbs_certificate.subject_public_key_info, ca_key))
        {
            Some(index) => index,
            None => remaining
                .iter()
                .position(|cert| {
                    matches!(read_basic_constraints(cert), Ok(Some((_, bc))) if bc.ca)
                })
                .ok_or_else(|| {
                    PkiError::ValidationError("Chain contains no CA certificate".to_string())
                })?,
        };

        let mut certificates = vec![remaining.remove(primary)];
        loop {
            let Some(current) = certificates.last() else { break };
            if is_self_issued(current) {
                break;
            }
            let issuer = &current.tbs_certificate.issuer;
            match remaining
                .iter()
                .position(|cert| &cert.tbs_certificate.subject == issuer)
            {
                Some(index) => certificates.push(remaining.remove(index)),
                None => break,
            }
        }
        certificates.extend(remaining);

        Ok(Self { certificates })
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// 证书链长度
    pub fn length(&self) -> usize {
        self.certificates.len()
    }

    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificates.first()
    }

    /// Whether the chain ends in a self-issued certificate
    pub fn reaches_root(&self) -> bool {
        self.certificates.last().is_some_and(is_self_issued)
    }

    /// One PEM string per certificate, leaf first
    pub fn to_pem_list(&self) -> Result<Vec<String>> {
        self.certificates
            .iter()
            .map(|cert| Ok(der_to_pem(PEM_CERTIFICATE, &certificate_der(cert)?)))
            .collect()
    }
}
