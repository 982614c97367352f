//! X.509 v3 extension builders and readers

use std::net::IpAddr;

use const_oid::{db::rfc5280, ObjectIdentifier};
use der::{
    asn1::{Ia5String, OctetString},
    DecodeOwned, Encode,
};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::{
    ext::{
        pkix::{
            certpolicy::PolicyInformation,
            crl::dp::DistributionPoint,
            name::{DistributionPointName, GeneralName},
            AccessDescription, AuthorityInfoAccessSyntax, AuthorityKeyIdentifier,
            BasicConstraints, CertificatePolicies, CrlDistributionPoints, CrlReason,
            ExtendedKeyUsage, IssuingDistributionPoint, KeyUsage, SubjectAltName,
            SubjectKeyIdentifier,
        },
        Extension,
    },
    Certificate,
};

use crate::error::{PkiError, Result};

pub const ID_KP_SERVER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");
pub const ID_KP_CLIENT_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2");
pub const ID_KP_CODE_SIGNING: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.3");
pub const ID_AD_OCSP: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");
pub const ANY_POLICY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.32.0");
pub const ID_CE_ISSUING_DISTRIBUTION_POINT: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.5.29.28");

// ============================================================================
// Builders
// ============================================================================

fn encode<T: Encode>(extn_id: ObjectIdentifier, critical: bool, value: &T) -> Result<Extension> {
    let der = value
        .to_der()
        .map_err(|e| PkiError::EncodingError(format!("Failed to encode extension {extn_id}: {e}")))?;
    Ok(Extension {
        extn_id,
        critical,
        extn_value: OctetString::new(der)?,
    })
}

fn uri(url: &str) -> Result<GeneralName> {
    let value = Ia5String::new(url)
        .map_err(|e| PkiError::ValidationError(format!("URL '{url}' is not IA5: {e}")))?;
    Ok(GeneralName::UniformResourceIdentifier(value))
}

/// basicConstraints, always critical
pub fn basic_constraints(ca: bool, path_len: Option<u8>) -> Result<Extension> {
    let value = BasicConstraints {
        ca,
        path_len_constraint: if ca { path_len } else { None },
    };
    encode(rfc5280::ID_CE_BASIC_CONSTRAINTS, true, &value)
}

/// keyUsage, always critical
pub fn key_usage(usage: KeyUsage) -> Result<Extension> {
    encode(rfc5280::ID_CE_KEY_USAGE, true, &usage)
}

pub fn extended_key_usage(purposes: Vec<ObjectIdentifier>) -> Result<Extension> {
    encode(rfc5280::ID_CE_EXT_KEY_USAGE, false, &ExtendedKeyUsage(purposes))
}

/// Key identifier: SHA-1 over the subjectPublicKey bits (RFC 5280 §4.2.1.2 method 1)
pub fn key_identifier(spki: &SubjectPublicKeyInfoOwned) -> Vec<u8> {
    privca_crypto::sha1(spki.subject_public_key.raw_bytes()).to_vec()
}

pub fn subject_key_identifier(key_id: &[u8]) -> Result<Extension> {
    let value = SubjectKeyIdentifier(OctetString::new(key_id)?);
    encode(rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER, false, &value)
}

pub fn authority_key_identifier(key_id: &[u8]) -> Result<Extension> {
    let value = AuthorityKeyIdentifier {
        key_identifier: Some(OctetString::new(key_id)?),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    };
    encode(rfc5280::ID_CE_AUTHORITY_KEY_IDENTIFIER, false, &value)
}

pub fn crl_distribution_points(url: &str) -> Result<Extension> {
    let value = CrlDistributionPoints(vec![DistributionPoint {
        distribution_point: Some(DistributionPointName::FullName(vec![uri(url)?])),
        reasons: None,
        crl_issuer: None,
    }]);
    encode(rfc5280::ID_CE_CRL_DISTRIBUTION_POINTS, false, &value)
}

pub fn authority_info_access_ocsp(url: &str) -> Result<Extension> {
    let value = AuthorityInfoAccessSyntax(vec![AccessDescription {
        access_method: ID_AD_OCSP,
        access_location: uri(url)?,
    }]);
    encode(rfc5280::ID_PE_AUTHORITY_INFO_ACCESS, false, &value)
}

/// certificatePolicies; an empty list means anyPolicy
pub fn certificate_policies(policies: &[ObjectIdentifier]) -> Result<Extension> {
    let oids = if policies.is_empty() {
        vec![ANY_POLICY]
    } else {
        policies.to_vec()
    };
    let value = CertificatePolicies(
        oids.into_iter()
            .map(|policy_identifier| PolicyInformation {
                policy_identifier,
                policy_qualifiers: None,
            })
            .collect(),
    );
    encode(rfc5280::ID_CE_CERTIFICATE_POLICIES, false, &value)
}

pub fn subject_alt_name(names: Vec<GeneralName>) -> Result<Extension> {
    encode(rfc5280::ID_CE_SUBJECT_ALT_NAME, false, &SubjectAltName(names))
}

pub fn crl_number(number: u64) -> Result<Extension> {
    encode(rfc5280::ID_CE_CRL_NUMBER, false, &number)
}

/// deltaCRLIndicator, always critical
pub fn delta_crl_indicator(base_crl_number: u64) -> Result<Extension> {
    encode(rfc5280::ID_CE_DELTA_CRL_INDICATOR, true, &base_crl_number)
}

pub fn crl_reason(reason: CrlReason) -> Result<Extension> {
    encode(rfc5280::ID_CE_CRL_REASONS, false, &reason)
}

/// issuingDistributionPoint, always critical
pub fn issuing_distribution_point(url: Option<&str>) -> Result<Extension> {
    let distribution_point = url
        .map(|url| uri(url).map(|name| DistributionPointName::FullName(vec![name])))
        .transpose()?;
    let value = IssuingDistributionPoint {
        distribution_point,
        only_contains_user_certs: false,
        only_contains_ca_certs: false,
        only_some_reasons: None,
        indirect_crl: false,
        only_contains_attribute_certs: false,
    };
    encode(ID_CE_ISSUING_DISTRIBUTION_POINT, true, &value)
}

// ============================================================================
// Subject Alternative Names
// ============================================================================

/// Parse one SAN entry
///
/// Accepts `DNS:`, `IP:`, `email:` and `URI:` prefixes. Without a prefix
/// the kind is inferred: IP literal, then `://` for URI, then `@` for
/// email, otherwise a DNS name.
pub fn parse_san(entry: &str) -> Result<GeneralName> {
    let entry = entry.trim();
    let prefixed = entry.split_once(':').and_then(|(kind, value)| {
        let kind = kind.to_ascii_lowercase();
        matches!(kind.as_str(), "dns" | "ip" | "email" | "uri").then(|| (kind, value.trim()))
    });
    let (kind, value) = match prefixed {
        Some(prefixed) => prefixed,
        _ if entry.parse::<IpAddr>().is_ok() => ("ip".to_string(), entry),
        _ if entry.contains("://") => ("uri".to_string(), entry),
        _ if entry.contains('@') => ("email".to_string(), entry),
        _ => ("dns".to_string(), entry),
    };

    let invalid = |reason: &str| PkiError::ValidationError(format!("Invalid SAN '{entry}': {reason}"));
    let ia5 = |value: &str| Ia5String::new(value).map_err(|_| invalid("not ASCII"));

    match kind.as_str() {
        "ip" => {
            let ip: IpAddr = value.parse().map_err(|_| invalid("not an IP address"))?;
            let octets = match ip {
                IpAddr::V4(v4) => v4.octets().to_vec(),
                IpAddr::V6(v6) => v6.octets().to_vec(),
            };
            Ok(GeneralName::IpAddress(OctetString::new(octets)?))
        }
        "email" => {
            let (local, domain) = value.split_once('@').ok_or_else(|| invalid("missing '@'"))?;
            if local.is_empty() || !is_dns_name(domain) {
                return Err(invalid("malformed address"));
            }
            Ok(GeneralName::Rfc822Name(ia5(value)?))
        }
        "uri" => {
            if !value.contains("://") || value.chars().any(char::is_whitespace) {
                return Err(invalid("malformed URI"));
            }
            Ok(GeneralName::UniformResourceIdentifier(ia5(value)?))
        }
        _ => {
            if !is_dns_name(value) {
                return Err(invalid("malformed DNS name"));
            }
            Ok(GeneralName::DnsName(ia5(value)?))
        }
    }
}

fn is_dns_name(name: &str) -> bool {
    let name = name.strip_prefix("*.").unwrap_or(name);
    !name.is_empty()
        && name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Render a SAN the way `parse_san` accepts it
pub fn general_name_string(name: &GeneralName) -> Option<String> {
    match name {
        GeneralName::DnsName(v) => Some(format!("DNS:{v}")),
        GeneralName::Rfc822Name(v) => Some(format!("email:{v}")),
        GeneralName::UniformResourceIdentifier(v) => Some(format!("URI:{v}")),
        GeneralName::IpAddress(v) => {
            let bytes = v.as_bytes();
            let ip = match bytes.len() {
                4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
                16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
                _ => None,
            }?;
            Some(format!("IP:{ip}"))
        }
        _ => None,
    }
}

// ============================================================================
// Readers
// ============================================================================

pub fn find_extension<'a>(
    extensions: Option<&'a [Extension]>,
    oid: ObjectIdentifier,
) -> Option<&'a Extension> {
    extensions?.iter().find(|ext| ext.extn_id == oid)
}

/// Decode an extension value, returning its criticality alongside
pub fn decode_extension<T: DecodeOwned>(
    extensions: Option<&[Extension]>,
    oid: ObjectIdentifier,
) -> Result<Option<(bool, T)>> {
    let Some(ext) = find_extension(extensions, oid) else {
        return Ok(None);
    };
    let value = T::from_der(ext.extn_value.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("Malformed extension {oid}: {e}")))?;
    Ok(Some((ext.critical, value)))
}

fn cert_extensions(cert: &Certificate) -> Option<&[Extension]> {
    cert.tbs_certificate.extensions.as_deref()
}

pub fn read_basic_constraints(cert: &Certificate) -> Result<Option<(bool, BasicConstraints)>> {
    decode_extension(cert_extensions(cert), rfc5280::ID_CE_BASIC_CONSTRAINTS)
}

pub fn read_key_usage(cert: &Certificate) -> Result<Option<KeyUsage>> {
    Ok(decode_extension::<KeyUsage>(cert_extensions(cert), rfc5280::ID_CE_KEY_USAGE)?
        .map(|(_, usage)| usage))
}

pub fn read_extended_key_usage(cert: &Certificate) -> Result<Vec<ObjectIdentifier>> {
    Ok(
        decode_extension::<ExtendedKeyUsage>(cert_extensions(cert), rfc5280::ID_CE_EXT_KEY_USAGE)?
            .map(|(_, eku)| eku.0)
            .unwrap_or_default(),
    )
}

pub fn read_subject_key_identifier(cert: &Certificate) -> Result<Option<Vec<u8>>> {
    Ok(decode_extension::<SubjectKeyIdentifier>(
        cert_extensions(cert),
        rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER,
    )?
    .map(|(_, ski)| ski.0.as_bytes().to_vec()))
}

pub fn read_subject_alt_names(cert: &Certificate) -> Result<Vec<String>> {
    Ok(
        decode_extension::<SubjectAltName>(cert_extensions(cert), rfc5280::ID_CE_SUBJECT_ALT_NAME)?
            .map(|(_, san)| san.0.iter().filter_map(general_name_string).collect())
            .unwrap_or_default(),
    )
}
