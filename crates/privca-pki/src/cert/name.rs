//! Distinguished names

use std::str::FromStr;

use const_oid::db::rfc4519;
use der::{
    asn1::{Ia5StringRef, PrintableStringRef, Utf8StringRef},
    Tag, Tagged,
};
use x509_cert::{attr::AttributeTypeAndValue, name::Name};

use crate::error::{PkiError, Result};

/// Parse an RFC 4514 string such as `CN=Root CA,O=Example,C=US`
///
/// The common name is required.
pub fn parse_dn(dn: &str) -> Result<Name> {
    let trimmed = dn.trim();
    if trimmed.is_empty() {
        return Err(PkiError::ValidationError(
            "Subject DN must not be empty".to_string(),
        ));
    }

    let name = Name::from_str(trimmed)
        .map_err(|e| PkiError::ValidationError(format!("Invalid subject DN '{trimmed}': {e}")))?;

    match common_name(&name) {
        Some(cn) if !cn.trim().is_empty() => Ok(name),
        _ => Err(PkiError::ValidationError(format!(
            "Subject DN '{trimmed}' has no CN"
        ))),
    }
}

/// First CN attribute, if any
pub fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == rfc4519::CN)
        .and_then(attribute_value)
}

/// RFC 4514 rendering
pub fn dn_string(name: &Name) -> String {
    name.to_string()
}

fn attribute_value(atv: &AttributeTypeAndValue) -> Option<String> {
    let value = &atv.value;
    let text = match value.tag() {
        Tag::Utf8String => Utf8StringRef::try_from(value).ok()?.as_str().to_string(),
        Tag::PrintableString => PrintableStringRef::try_from(value).ok()?.as_str().to_string(),
        Tag::Ia5String => Ia5StringRef::try_from(value).ok()?.as_str().to_string(),
        _ => return None,
    };
    Some(text)
}
