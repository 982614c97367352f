use std::time::Duration;

use der::{
    asn1::{GeneralizedTime, UtcTime},
    Decode, Encode,
};
use time::OffsetDateTime;
use x509_cert::{serial_number::SerialNumber, time::Time, Certificate};

use crate::error::{PkiError, Result};

pub const PEM_CERTIFICATE: &str = "CERTIFICATE";
pub const PEM_X509_CRL: &str = "X509 CRL";
pub const PEM_CERTIFICATE_REQUEST: &str = "CERTIFICATE REQUEST";

/// 解析证书（PEM或DER格式）
pub fn parse_certificate(cert_data: &[u8]) -> Result<Certificate> {
    let trimmed = cert_data.trim_ascii_start();
    if trimmed.starts_with(b"-----BEGIN") {
        let text = std::str::from_utf8(trimmed)
            .map_err(|e| PkiError::ParseError(format!("PEM is not UTF-8: {e}")))?;
        return parse_certificate_pem(text);
    }
    parse_certificate_der(cert_data)
}

/// 解析DER格式证书
pub fn parse_certificate_der(der: &[u8]) -> Result<Certificate> {
    Certificate::from_der(der)
        .map_err(|e| PkiError::ParseError(format!("Failed to parse certificate DER: {e}")))
}

/// 解析PEM格式证书，只取第一个证书块
pub fn parse_certificate_pem(pem_text: &str) -> Result<Certificate> {
    let der = pem_blocks(pem_text)?
        .into_iter()
        .next()
        .ok_or_else(|| PkiError::ParseError("No CERTIFICATE block found".to_string()))?;
    parse_certificate_der(&der)
}

/// All `CERTIFICATE` blocks in a PEM bundle, in order, as DER
pub fn pem_blocks(pem_text: &str) -> Result<Vec<Vec<u8>>> {
    let blocks = pem::parse_many(pem_text)
        .map_err(|e| PkiError::ParseError(format!("Failed to parse PEM: {e}")))?;
    Ok(blocks
        .into_iter()
        .filter(|block| block.tag() == PEM_CERTIFICATE)
        .map(|block| block.into_contents())
        .collect())
}

pub fn der_to_pem(tag: &str, der: &[u8]) -> String {
    pem::encode(&pem::Pem::new(tag, der.to_vec()))
}

pub fn certificate_der(cert: &Certificate) -> Result<Vec<u8>> {
    cert.to_der()
        .map_err(|e| PkiError::EncodingError(format!("Failed to encode certificate: {e}")))
}

pub fn certificate_to_pem(cert: &Certificate) -> Result<String> {
    Ok(der_to_pem(PEM_CERTIFICATE, &certificate_der(cert)?))
}

/// SHA-256 over the DER, as colon-separated uppercase pairs
pub fn fingerprint_sha256(der: &[u8]) -> String {
    privca_crypto::sha256(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

// ============================================================================
// Serial numbers
// ============================================================================

pub const SERIAL_LEN: usize = 16;

/// 16 random bytes; the top bit is cleared and the first byte is nonzero so
/// the DER INTEGER stays positive and exactly 16 octets long
pub fn generate_serial() -> Result<SerialNumber> {
    let mut bytes = [0u8; SERIAL_LEN];
    getrandom::fill(&mut bytes)
        .map_err(|e| PkiError::InternalError(format!("Failed to generate serial number: {e}")))?;
    bytes[0] = (bytes[0] & 0x7F).max(1);
    SerialNumber::new(&bytes)
        .map_err(|e| PkiError::InternalError(format!("Invalid serial number: {e}")))
}

/// Lowercase hex without the sign padding
pub fn serial_hex(serial: &SerialNumber) -> String {
    serial_bytes_hex(serial.as_bytes())
}

pub fn serial_bytes_hex(bytes: &[u8]) -> String {
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len().saturating_sub(1));
    hex::encode(&bytes[start..])
}

/// Parse a stored serial back into its X.509 form
pub fn serial_from_hex(serial: &str) -> Result<SerialNumber> {
    let bytes = hex::decode(serial.trim())
        .map_err(|e| PkiError::ValidationError(format!("Serial '{serial}' is not hex: {e}")))?;
    SerialNumber::new(&bytes)
        .map_err(|e| PkiError::ValidationError(format!("Serial '{serial}' is invalid: {e}")))
}

/// Normalize user input so lookups match the stored form
///
/// Colons and whitespace are dropped, case is folded, and leading zero
/// octets are stripped the same way [`serial_hex`] strips them.
pub fn normalize_serial(serial: &str) -> String {
    let mut cleaned: String = serial
        .trim()
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.len() % 2 == 1 {
        cleaned.insert(0, '0');
    }
    while cleaned.len() > 2 && cleaned.starts_with("00") {
        cleaned.drain(..2);
    }
    cleaned
}

// ============================================================================
// Time conversion
// ============================================================================

fn unix_duration(at: OffsetDateTime) -> Result<Duration> {
    let secs = u64::try_from(at.unix_timestamp())
        .map_err(|_| PkiError::ValidationError(format!("Time {at} is before 1970")))?;
    Ok(Duration::from_secs(secs))
}

/// RFC 5280 §4.1.2.5: UTCTime through 2049, GeneralizedTime after
pub fn to_x509_time(at: OffsetDateTime) -> Result<Time> {
    let duration = unix_duration(at)?;
    let time = if at.year() < 2050 {
        Time::UtcTime(UtcTime::from_unix_duration(duration)?)
    } else {
        Time::GeneralTime(GeneralizedTime::from_unix_duration(duration)?)
    };
    Ok(time)
}

pub fn to_generalized_time(at: OffsetDateTime) -> Result<GeneralizedTime> {
    Ok(GeneralizedTime::from_unix_duration(unix_duration(at)?)?)
}

pub fn from_unix_duration(duration: Duration) -> Result<OffsetDateTime> {
    let secs = i64::try_from(duration.as_secs())
        .map_err(|_| PkiError::ParseError("Time out of range".to_string()))?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| PkiError::ParseError(format!("Time out of range: {e}")))
}

pub fn from_x509_time(time: &Time) -> Result<OffsetDateTime> {
    from_unix_duration(time.to_unix_duration())
}

/// `not_before` plus `days`; an end the calendar cannot hold is a `ValidationError`
pub fn validity_end(not_before: OffsetDateTime, days: u32) -> Result<OffsetDateTime> {
    not_before
        .checked_add(time::Duration::days(i64::from(days)))
        .ok_or_else(|| {
            PkiError::ValidationError(format!("A validity of {days} days ends past year 9999"))
        })
}

/// Truncate to whole seconds, as encoded in certificates
pub fn whole_seconds(at: OffsetDateTime) -> OffsetDateTime {
    at.replace_nanosecond(0).unwrap_or(at)
}

// ============================================================================
// Certificate helpers
// ============================================================================

pub fn spki_der(cert: &Certificate) -> Result<Vec<u8>> {
    cert.tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| PkiError::EncodingError(format!("Failed to encode SPKI: {e}")))
}

pub fn not_before(cert: &Certificate) -> Result<OffsetDateTime> {
    from_x509_time(&cert.tbs_certificate.validity.not_before)
}

pub fn not_after(cert: &Certificate) -> Result<OffsetDateTime> {
    from_x509_time(&cert.tbs_certificate.validity.not_after)
}

/// Subject and issuer names are equal
pub fn is_self_issued(cert: &Certificate) -> bool {
    cert.tbs_certificate.subject == cert.tbs_certificate.issuer
}

/// Check `cert`'s signature against an issuer public key
///
/// Weak or unsupported algorithms surface as errors, a bad signature as `Ok(false)`.
pub fn verify_issued_by(cert: &Certificate, issuer_spki_der: &[u8]) -> Result<bool> {
    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| PkiError::EncodingError(format!("Failed to encode TBS: {e}")))?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or_else(|| PkiError::ParseError("Signature has unused bits".to_string()))?;
    Ok(privca_key::verify_signature(
        issuer_spki_der,
        &cert.signature_algorithm.oid,
        &tbs,
        signature,
    )?)
}
