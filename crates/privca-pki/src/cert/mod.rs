pub mod builder;
pub mod cert_utils;
pub mod extensions;
pub mod name;
pub mod types;

// 重新导出常用类型和函数
pub use builder::{assemble, build_unsigned, sign_certificate, sign_der, CertificateParams};
pub use cert_utils::{
    certificate_to_pem, fingerprint_sha256, generate_serial, parse_certificate, pem_blocks,
    serial_hex, verify_issued_by,
};
pub use name::{common_name, parse_dn};
pub use types::{CertificateInfo, X509Certificate};
