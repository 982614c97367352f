use std::{fmt, str::FromStr};

use privca_crypto::{asymmetric::rsa::SUPPORTED_KEY_SIZES, EcCurve};
use serde::{Deserialize, Serialize};

use super::Algorithm;
use crate::error::{Error, Result};

/// Key algorithm together with its size or curve
///
/// Serialized as a compact string: `RSA-2048`, `ECDSA-P-384`, `Ed25519`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeySpec {
    Rsa { bits: usize },
    Ecdsa { curve: EcCurve },
    Ed25519,
}

impl Default for KeySpec {
    fn default() -> Self {
        Self::Rsa { bits: 2048 }
    }
}

impl KeySpec {
    /// Build a spec from an algorithm name and an optional size or curve
    ///
    /// RSA defaults to 2048 bits and ECDSA to P-256 when the second
    /// argument is empty.
    pub fn parse(algorithm: &str, size_or_curve: &str) -> Result<Self> {
        let size_or_curve = size_or_curve.trim();
        match algorithm.trim().to_ascii_lowercase().as_str() {
            "rsa" => {
                let bits = if size_or_curve.is_empty() {
                    2048
                } else {
                    size_or_curve.parse::<usize>().map_err(|_| {
                        Error::UnsupportedAlgorithm(format!("RSA key size '{size_or_curve}'"))
                    })?
                };
                Self::rsa(bits)
            }
            "ecdsa" | "ec" => {
                if size_or_curve.is_empty() {
                    return Ok(Self::Ecdsa { curve: EcCurve::P256 });
                }
                let curve = EcCurve::from_name(size_or_curve).ok_or_else(|| {
                    Error::UnsupportedAlgorithm(format!("ECDSA curve '{size_or_curve}'"))
                })?;
                Ok(Self::Ecdsa { curve })
            }
            "ed25519" => Ok(Self::Ed25519),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn rsa(bits: usize) -> Result<Self> {
        if !SUPPORTED_KEY_SIZES.contains(&bits) {
            return Err(Error::UnsupportedAlgorithm(format!("RSA key size {bits}")));
        }
        Ok(Self::Rsa { bits })
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Rsa { .. } => Algorithm::Rsa,
            Self::Ecdsa { .. } => Algorithm::Ecdsa,
            Self::Ed25519 => Algorithm::Ed25519,
        }
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa { bits } => write!(f, "RSA-{bits}"),
            Self::Ecdsa { curve } => write!(f, "ECDSA-{curve}"),
            Self::Ed25519 => f.write_str("Ed25519"),
        }
    }
}

impl FromStr for KeySpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('-') {
            Some((algorithm, rest)) => Self::parse(algorithm, rest),
            None => Self::parse(s, ""),
        }
    }
}

impl TryFrom<String> for KeySpec {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<KeySpec> for String {
    fn from(value: KeySpec) -> Self {
        value.to_string()
    }
}
