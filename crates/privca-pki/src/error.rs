use thiserror::Error;

use crate::ocsp::OcspStatus;

/// PKI模块的错误类型
#[derive(Error, Debug)]
pub enum PkiError {
    /// 输入或策略校验失败
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// CA 未处于 Active 状态
    #[error("CA not active: {0}")]
    CANotActive(String),

    /// CA 未找到
    #[error("CA not found: {0}")]
    CANotFound(String),

    /// 证书未找到
    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    /// CRL 未找到
    #[error("CRL not found: {0}")]
    CrlNotFound(String),

    /// 证书已撤销
    #[error("Certificate already revoked: {0}")]
    AlreadyRevoked(String),

    /// 序列号冲突
    #[error("Serial number collision: {0}")]
    SerialCollision(String),

    /// 不支持的算法或参数
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// 密钥生成错误
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// 签名错误
    #[error("Signing error: {0}")]
    SigningError(String),

    /// 私钥解密失败
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// OCSP 请求格式错误
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// 暂时无法处理
    #[error("Try later: {0}")]
    TryLater(String),

    /// 存储相关错误
    #[error("Store error: {0}")]
    StoreError(String),

    /// 解析错误
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 编码/解码错误
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// 导出错误
    #[error("Export error: {0}")]
    ExportError(String),

    /// 审计错误
    #[error("Audit error: {0}")]
    AuditError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PkiError {
    /// OCSP response status a failure maps onto
    pub fn ocsp_status(&self) -> OcspStatus {
        match self {
            Self::MalformedRequest(_) | Self::ParseError(_) => OcspStatus::MalformedRequest,
            Self::TryLater(_) | Self::CANotActive(_) | Self::CANotFound(_) => OcspStatus::TryLater,
            _ => OcspStatus::InternalError,
        }
    }

    /// Whether the caller, not the engine, is at fault
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::CANotActive(_)
                | Self::CANotFound(_)
                | Self::CertificateNotFound(_)
                | Self::CrlNotFound(_)
                | Self::AlreadyRevoked(_)
                | Self::UnsupportedAlgorithm(_)
                | Self::MalformedRequest(_)
                | Self::ParseError(_)
        )
    }
}

impl From<privca_key::error::Error> for PkiError {
    fn from(e: privca_key::error::Error) -> Self {
        use privca_key::error::Error as KeyError;
        match e {
            KeyError::UnsupportedAlgorithm(msg) => Self::UnsupportedAlgorithm(msg),
            KeyError::SignatureError(msg) => Self::SigningError(msg),
            KeyError::KeyError(msg) => Self::KeyGenerationError(msg),
            KeyError::EncodingError(msg) => Self::EncodingError(msg),
            KeyError::ExportError(msg) => Self::ExportError(msg),
            other => Self::InternalError(other.to_string()),
        }
    }
}

impl From<der::Error> for PkiError {
    fn from(e: der::Error) -> Self {
        Self::EncodingError(e.to_string())
    }
}

/// Result类型别名
pub type Result<T> = std::result::Result<T, PkiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocsp_status_mapping() {
        assert_eq!(
            PkiError::MalformedRequest("x".into()).ocsp_status(),
            OcspStatus::MalformedRequest
        );
        assert_eq!(PkiError::TryLater("x".into()).ocsp_status(), OcspStatus::TryLater);
        assert_eq!(
            PkiError::DecryptionFailed("x".into()).ocsp_status(),
            OcspStatus::InternalError
        );
    }

    #[test]
    fn test_user_errors() {
        assert!(PkiError::AlreadyRevoked("01".into()).is_user_error());
        assert!(PkiError::ValidationError("bad".into()).is_user_error());
        assert!(!PkiError::SigningError("hsm".into()).is_user_error());
        assert!(!PkiError::StoreError("disk".into()).is_user_error());
    }

    #[test]
    fn test_key_error_conversion() {
        let err: PkiError = privca_key::error::Error::UnsupportedAlgorithm("DSA".into()).into();
        assert!(matches!(err, PkiError::UnsupportedAlgorithm(_)));
    }
}
