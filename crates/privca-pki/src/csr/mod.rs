//! Certificate Signing Request (CSR) module
//!
//! Creates, parses and verifies PKCS#10 requests for RSA, ECDSA and Ed25519
//! keys. CAs produce one at initialization; issuance accepts one in place of
//! inline subject parameters.

use const_oid::{db::rfc5280, AssociatedOid};
use der::{asn1::BitString, Decode, Encode};
use privca_key::{describe_spki, Key, KeySign, KeySpec, SigningKey};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::{
    attr::Attribute,
    ext::{
        pkix::{name::GeneralName, SubjectAltName},
        Extension,
    },
    name::Name,
    request::{CertReq, CertReqInfo, ExtensionReq, Version},
};

use crate::{
    cert::{
        cert_utils::{der_to_pem, PEM_CERTIFICATE_REQUEST},
        extensions::decode_extension,
        name::dn_string,
    },
    error::{PkiError, Result},
};

/// Certificate Signing Request
#[derive(Debug, Clone)]
pub struct Csr {
    inner: CertReq,
}

/// Build an unsigned CertReqInfo from subject and public key
///
/// Non-empty `extensions` are carried as a PKCS#9 extensionRequest attribute.
pub fn build_unsigned(
    subject: Name,
    spki_der: &[u8],
    extensions: Vec<Extension>,
) -> Result<CertReqInfo> {
    let public_key = SubjectPublicKeyInfoOwned::from_der(spki_der)
        .map_err(|e| PkiError::ParseError(format!("Failed to parse SPKI: {e}")))?;

    let mut attributes = der::asn1::SetOfVec::new();
    if !extensions.is_empty() {
        let attribute = Attribute::try_from(ExtensionReq(extensions))?;
        attributes.insert(attribute)?;
    }

    Ok(CertReqInfo {
        version: Version::V1,
        subject,
        public_key,
        attributes,
    })
}

/// Create and sign a CSR with `key` (build_unsigned, sign, assemble)
pub fn create_csr(key: &dyn SigningKey, subject: Name, extensions: Vec<Extension>) -> Result<Csr> {
    let spki_der = key.spki_der()?;
    let info = build_unsigned(subject, &spki_der, extensions)?;

    let info_der = info
        .to_der()
        .map_err(|e| PkiError::EncodingError(format!("Failed to encode CertReqInfo: {e}")))?;
    let signature = key
        .sign(&info_der)
        .map_err(|e| PkiError::SigningError(format!("Failed to sign CSR: {e}")))?;

    Csr::assemble(info, key.signature_algorithm_id(), &signature)
}

impl Csr {
    /// Assemble a complete CSR from CertReqInfo and signature
    pub fn assemble(
        info: CertReqInfo,
        algorithm: AlgorithmIdentifierOwned,
        signature: &[u8],
    ) -> Result<Self> {
        let inner = CertReq {
            info,
            algorithm,
            signature: BitString::from_bytes(signature)?,
        };
        Ok(Self { inner })
    }

    /// Parse CSR from PEM format
    pub fn from_pem(pem_text: &str) -> Result<Self> {
        let block = pem::parse(pem_text.trim())
            .map_err(|e| PkiError::ParseError(format!("Failed to parse CSR PEM: {e}")))?;

        if block.tag() != PEM_CERTIFICATE_REQUEST && block.tag() != "NEW CERTIFICATE REQUEST" {
            return Err(PkiError::ParseError(format!(
                "Invalid PEM tag {}, expected CERTIFICATE REQUEST",
                block.tag()
            )));
        }

        Self::from_der(block.contents())
    }

    /// Parse CSR from DER format
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der)
            .map_err(|e| PkiError::ParseError(format!("Failed to parse CSR DER: {e}")))?;
        Ok(Self { inner })
    }

    pub fn to_pem(&self) -> Result<String> {
        Ok(der_to_pem(PEM_CERTIFICATE_REQUEST, &self.to_der()?))
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| PkiError::EncodingError(format!("Failed to encode CSR: {e}")))
    }

    pub fn subject(&self) -> &Name {
        &self.inner.info.subject
    }

    pub fn subject_dn(&self) -> String {
        dn_string(&self.inner.info.subject)
    }

    pub fn public_key(&self) -> &SubjectPublicKeyInfoOwned {
        &self.inner.info.public_key
    }

    pub fn spki_der(&self) -> Result<Vec<u8>> {
        self.inner
            .info
            .public_key
            .to_der()
            .map_err(|e| PkiError::EncodingError(format!("Failed to encode SPKI: {e}")))
    }

    /// Algorithm and size of the requested key
    pub fn key_spec(&self) -> Result<KeySpec> {
        Ok(describe_spki(&self.spki_der()?)?)
    }

    /// Verify the self-signature with the enclosed public key
    pub fn verify_signature(&self) -> Result<()> {
        let info_der = self.inner.info.to_der().map_err(|e| {
            PkiError::EncodingError(format!("Failed to encode info for verification: {e}"))
        })?;
        let signature = self
            .inner
            .signature
            .as_bytes()
            .ok_or_else(|| PkiError::ValidationError("CSR signature has unused bits".to_string()))?;

        let verified = privca_key::verify_signature(
            &self.spki_der()?,
            &self.inner.algorithm.oid,
            &info_der,
            signature,
        )
        .map_err(|e| PkiError::ValidationError(format!("CSR signature not verifiable: {e}")))?;

        if verified {
            Ok(())
        } else {
            Err(PkiError::ValidationError(
                "CSR signature verification failed".to_string(),
            ))
        }
    }

    /// Extensions from the extensionRequest attribute
    pub fn requested_extensions(&self) -> Result<Vec<Extension>> {
        let mut extensions = Vec::new();
        for attribute in self.inner.info.attributes.iter() {
            if attribute.oid != ExtensionReq::OID {
                continue;
            }
            for value in attribute.values.iter() {
                let requested = ExtensionReq::from_der(&value.to_der()?)
                    .map_err(|e| PkiError::ParseError(format!("Malformed extensionRequest: {e}")))?;
                extensions.extend(requested.0);
            }
        }
        Ok(extensions)
    }

    /// Subject alternative names asked for in the request
    pub fn requested_sans(&self) -> Result<Vec<GeneralName>> {
        let extensions = self.requested_extensions()?;
        let san = decode_extension::<SubjectAltName>(
            Some(extensions.as_slice()),
            rfc5280::ID_CE_SUBJECT_ALT_NAME,
        )?;
        Ok(san.map(|(_, san)| san.0).unwrap_or_default())
    }
}
