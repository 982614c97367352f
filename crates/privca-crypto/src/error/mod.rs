use thiserror::Error;

/// Crypto模块的错误类型
#[derive(Error, Debug)]
pub enum Error {
    #[error("Getrandom error: {0}")]
    GetrandomError(String),

    #[error("PKCS8 error: {0}")]
    Pkcs8Error(#[from] pkcs8::Error),

    #[error("SPKI error: {0}")]
    SpkiError(#[from] pkcs8::spki::Error),

    #[error("Ed25519 error: {0}")]
    Ed25519Error(#[from] ed25519_dalek::ed25519::Error),

    #[error("DER error: {0}")]
    DerError(#[from] pkcs8::der::Error),

    /// RSA 密钥长度不受支持
    #[error("Unsupported RSA key size: {0} bits")]
    UnsupportedKeySize(usize),

    /// 椭圆曲线不受支持
    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    /// AEAD 加解密失败
    #[error("AEAD error: {0}")]
    AeadError(String),

    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

/// Result类型别名
pub type Result<T> = std::result::Result<T, Error>;
