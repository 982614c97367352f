//! # privca - 私有证书颁发机构
//!
//! ## 模块
//!
//! - `privca_crypto` - 基础加密原语
//! - `privca_key` - 签名密钥与算法
//! - `privca_pki` - CA、签发、撤销、OCSP 与验证

// Re-export all sub-crates
pub use privca_crypto;
pub use privca_key;
pub use privca_pki;
