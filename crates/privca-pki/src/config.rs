//! 引擎配置
//!
//! TOML file sections with defaults, plus two environment overrides:
//! `PRIVCA_ENVIRONMENT` and `PRIVCA_MASTER_KEY`.

use std::{fmt, path::Path, str::FromStr};

use privca_crypto::asymmetric::rsa::SUPPORTED_KEY_SIZES;
use privca_key::KeySpec;
use serde::{Deserialize, Serialize};

use crate::error::{PkiError, Result};

pub const ENV_ENVIRONMENT: &str = "PRIVCA_ENVIRONMENT";
pub const ENV_MASTER_KEY: &str = "PRIVCA_MASTER_KEY";

/// 运行环境
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    /// Environments that must never fall back to a derived master key
    pub fn is_production_like(&self) -> bool {
        matches!(self, Self::Staging | Self::Production)
    }
}

impl FromStr for Environment {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(PkiError::ConfigurationError(format!(
                "Unknown environment: {other}"
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Staging => "staging",
            Self::Production => "production",
        };
        f.write_str(name)
    }
}

/// 密钥保管配置
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VaultConfig {
    /// base64 编码的 32 字节主密钥
    pub master_key: Option<String>,
    /// 读取主密钥的环境变量名
    pub master_key_env: Option<String>,
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .field("master_key_env", &self.master_key_env)
            .finish()
    }
}

/// CA 默认配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaSettings {
    /// 自签根证书有效期（天）
    pub default_validity_days: u32,
    pub default_key: KeySpec,
    /// CRL 分发地址前缀，CA id 拼接在后
    pub crl_distribution_base_url: Option<String>,
    pub ocsp_url: Option<String>,
    /// 根证书 pathLenConstraint
    pub path_len: Option<u8>,
}

impl Default for CaSettings {
    fn default() -> Self {
        Self {
            default_validity_days: 3650,
            default_key: KeySpec::default(),
            crl_distribution_base_url: None,
            ocsp_url: None,
            path_len: None,
        }
    }
}

/// 签发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuanceSettings {
    pub default_validity_days: u32,
    /// 序列号冲突时的最大尝试次数
    pub max_serial_attempts: u32,
    /// 证书策略 OID，空表示 anyPolicy
    pub policy_oids: Vec<String>,
}

impl Default for IssuanceSettings {
    fn default() -> Self {
        Self {
            default_validity_days: 365,
            max_serial_attempts: 5,
            policy_oids: Vec::new(),
        }
    }
}

/// CRL 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrlSettings {
    pub next_update_hours: u32,
    /// 证书过期后仍保留在完整 CRL 中的天数
    pub retention_days: u32,
}

impl Default for CrlSettings {
    fn default() -> Self {
        Self {
            next_update_hours: 24,
            retention_days: 0,
        }
    }
}

/// OCSP 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcspSettings {
    pub next_update_hours: u32,
}

impl Default for OcspSettings {
    fn default() -> Self {
        Self {
            next_update_hours: 1,
        }
    }
}

/// 证书链校验配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub cache_ttl_seconds: u64,
    pub cache_capacity: usize,
    pub max_chain_depth: usize,
    pub min_rsa_bits: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 300,
            cache_capacity: 1024,
            max_chain_depth: 5,
            min_rsa_bits: 2048,
        }
    }
}

/// 顶层配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PkiConfig {
    pub environment: Environment,
    pub vault: VaultConfig,
    pub ca: CaSettings,
    pub issuance: IssuanceSettings,
    pub crl: CrlSettings,
    pub ocsp: OcspSettings,
    pub validation: ValidationSettings,
}

impl PkiConfig {
    /// Load from a TOML file, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PkiError::ConfigurationError(format!("Failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without touching the environment
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| PkiError::ConfigurationError(format!("Invalid configuration: {e}")))
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(environment) = std::env::var(ENV_ENVIRONMENT) {
            self.environment = environment.parse()?;
        }
        if let Ok(master_key) = std::env::var(ENV_MASTER_KEY) {
            if !master_key.trim().is_empty() {
                self.vault.master_key = Some(master_key);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let zero_checks = [
            (self.ca.default_validity_days == 0, "ca.default_validity_days"),
            (
                self.issuance.default_validity_days == 0,
                "issuance.default_validity_days",
            ),
            (
                self.issuance.max_serial_attempts == 0,
                "issuance.max_serial_attempts",
            ),
            (self.crl.next_update_hours == 0, "crl.next_update_hours"),
            (self.ocsp.next_update_hours == 0, "ocsp.next_update_hours"),
            (
                self.validation.cache_ttl_seconds == 0,
                "validation.cache_ttl_seconds",
            ),
            (
                self.validation.cache_capacity == 0,
                "validation.cache_capacity",
            ),
            (
                self.validation.max_chain_depth == 0,
                "validation.max_chain_depth",
            ),
        ];
        if let Some((_, name)) = zero_checks.iter().find(|(is_zero, _)| *is_zero) {
            return Err(PkiError::ConfigurationError(format!(
                "{name} must be greater than zero"
            )));
        }

        if let KeySpec::Rsa { bits } = self.ca.default_key {
            if !SUPPORTED_KEY_SIZES.contains(&bits) {
                return Err(PkiError::ConfigurationError(format!(
                    "ca.default_key: unsupported RSA size {bits}"
                )));
            }
        }
        if self.validation.min_rsa_bits < 1024 {
            return Err(PkiError::ConfigurationError(
                "validation.min_rsa_bits must be at least 1024".to_string(),
            ));
        }

        for oid in &self.issuance.policy_oids {
            const_oid::ObjectIdentifier::new(oid).map_err(|e| {
                PkiError::ConfigurationError(format!("issuance.policy_oids: {oid}: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use privca_crypto::EcCurve;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PkiConfig::default();
        config.validate().unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.crl.next_update_hours, 24);
        assert_eq!(config.validation.max_chain_depth, 5);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
environment = "test"

[ca]
default_validity_days = 730
default_key = "ECDSA-P-384"
crl_distribution_base_url = "http://pki.example.com/crl"

[crl]
next_update_hours = 12

[issuance]
policy_oids = ["1.3.6.1.4.1.99999.1"]
"#
        )
        .unwrap();

        let config = PkiConfig::from_toml_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.ca.default_validity_days, 730);
        assert_eq!(config.ca.default_key, KeySpec::Ecdsa { curve: EcCurve::P384 });
        assert_eq!(config.crl.next_update_hours, 12);
        assert_eq!(config.ocsp.next_update_hours, 1);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = PkiConfig::default();
        config.crl.next_update_hours = 0;
        assert!(matches!(
            config.validate(),
            Err(PkiError::ConfigurationError(msg)) if msg.contains("crl.next_update_hours")
        ));
    }

    #[test]
    fn test_bad_key_spec_rejected() {
        assert!(PkiConfig::from_toml_str("[ca]\ndefault_key = \"RSA-1024\"\n").is_err());
    }

    #[test]
    fn test_bad_policy_oid_rejected() {
        let mut config = PkiConfig::default();
        config.issuance.policy_oids = vec!["not-an-oid".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_master_key() {
        let mut config = PkiConfig::default();
        config.vault.master_key = Some("c2VjcmV0".to_string());
        assert!(!format!("{config:?}").contains("c2VjcmV0"));
    }
}
