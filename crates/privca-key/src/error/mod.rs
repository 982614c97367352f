use thiserror::Error;

/// Key模块的错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 密钥相关错误
    #[error("Key error: {0}")]
    KeyError(String),

    /// 不支持的算法或参数
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// 签名相关错误
    #[error("Signature error: {0}")]
    SignatureError(String),

    /// 导出错误
    #[error("Export error: {0}")]
    ExportError(String),

    /// 导入错误
    #[error("Import error: {0}")]
    ImportError(String),

    /// 编码/解码错误
    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] privca_crypto::error::Error),
}

/// Result类型别名
pub type Result<T> = std::result::Result<T, Error>;
