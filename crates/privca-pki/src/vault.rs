//! 密钥保管
//!
//! Generates key pairs and seals private keys at rest with AES-256-GCM
//! under a single process-wide master key.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use privca_crypto::{
    derive_key32,
    symmetric::aes::{KEY_LEN, NONCE_LEN, TAG_LEN},
    Aes,
};
use privca_key::{
    error::Error as KeyError, generate_key_pair, load_signing_key_from_pkcs8_pem,
    GeneratedKeyPair, KeySpec, SigningKey,
};
use zeroize::Zeroizing;

use crate::{
    config::PkiConfig,
    error::{PkiError, Result},
    types::EncryptedBlob,
};

const VAULT_AAD: &[u8] = b"privca-vault-v1";
const FALLBACK_IKM: &[u8] = b"privca-development-master-key";
const FALLBACK_SALT: &[u8] = b"privca-vault";
const FALLBACK_INFO: &[u8] = b"aes-256-gcm master key";

/// 私钥加密保管
pub struct Vault {
    cipher: Aes,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").finish_non_exhaustive()
    }
}

impl Vault {
    /// Build a vault from an explicit 32-byte master key
    pub fn new(master_key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes::new(master_key),
        }
    }

    /// Resolve the master key from configuration
    ///
    /// Order: `vault.master_key`, then the variable named by
    /// `vault.master_key_env`. Staging and production fail closed when
    /// neither is set; other environments derive a fixed fallback key.
    pub fn from_config(config: &PkiConfig) -> Result<Self> {
        let encoded = config.vault.master_key.clone().or_else(|| {
            config
                .vault
                .master_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
                .filter(|value| !value.trim().is_empty())
        });

        let master_key = match encoded {
            Some(encoded) => Self::decode_master_key(&encoded)?,
            None if config.environment.is_production_like() => {
                tracing::error!(environment = %config.environment, "No vault master key configured");
                return Err(PkiError::ConfigurationError(format!(
                    "A vault master key is required in {}",
                    config.environment
                )));
            }
            None => {
                tracing::warn!(
                    environment = %config.environment,
                    "No vault master key configured, using derived development key"
                );
                let key = derive_key32(FALLBACK_IKM, FALLBACK_SALT, FALLBACK_INFO)
                    .map_err(|e| PkiError::ConfigurationError(format!("Key derivation failed: {e}")))?;
                Zeroizing::new(key)
            }
        };

        Ok(Self::new(&master_key))
    }

    fn decode_master_key(encoded: &str) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let bytes = Zeroizing::new(STANDARD.decode(encoded.trim()).map_err(|e| {
            PkiError::ConfigurationError(format!("Master key is not valid base64: {e}"))
        })?);
        if bytes.len() != KEY_LEN {
            return Err(PkiError::ConfigurationError(format!(
                "Master key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&bytes);
        Ok(key)
    }

    /// Generate a key pair as PKCS#8 and SPKI PEM
    pub fn generate_key_pair(&self, spec: KeySpec) -> Result<GeneratedKeyPair> {
        generate_key_pair(spec).map_err(|e| match e {
            KeyError::UnsupportedAlgorithm(msg) => PkiError::UnsupportedAlgorithm(msg),
            other => PkiError::KeyGenerationError(other.to_string()),
        })
    }

    /// Seal a PEM private key
    pub fn encrypt(&self, plaintext_pem: &str) -> Result<EncryptedBlob> {
        let sealed = self
            .cipher
            .seal(plaintext_pem.as_bytes(), VAULT_AAD)
            .map_err(|e| PkiError::InternalError(format!("Private key encryption failed: {e}")))?;

        Ok(EncryptedBlob {
            ciphertext: sealed.ciphertext,
            iv: sealed.nonce.to_vec(),
            auth_tag: sealed.tag.to_vec(),
        })
    }

    /// Open a sealed private key
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Zeroizing<String>> {
        let nonce: [u8; NONCE_LEN] = blob.iv.as_slice().try_into().map_err(|_| {
            PkiError::DecryptionFailed(format!("IV must be {NONCE_LEN} bytes, got {}", blob.iv.len()))
        })?;
        let tag: [u8; TAG_LEN] = blob.auth_tag.as_slice().try_into().map_err(|_| {
            PkiError::DecryptionFailed(format!(
                "Auth tag must be {TAG_LEN} bytes, got {}",
                blob.auth_tag.len()
            ))
        })?;

        let plaintext = self
            .cipher
            .open(&blob.ciphertext, &nonce, &tag, VAULT_AAD)
            .map_err(|_| {
                tracing::warn!(
                    ciphertext_len = blob.ciphertext.len(),
                    "Private key authentication failed"
                );
                PkiError::DecryptionFailed("authentication failed".to_string())
            })?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| PkiError::DecryptionFailed("plaintext is not UTF-8".to_string()))
    }

    /// Decrypt a sealed key and load it for signing
    pub fn signing_key(&self, blob: &EncryptedBlob) -> Result<Box<dyn SigningKey>> {
        let pem = self.decrypt(blob)?;
        load_signing_key_from_pkcs8_pem(&pem)
            .map_err(|e| PkiError::DecryptionFailed(format!("Stored key does not load: {e}")))
    }
}
