//! Properties of issued certificates.

mod common;

use common::{TestPki, P256};
use privca_pki::{
    cert::{
        cert_utils::{not_after, parse_certificate_pem},
        extensions::{read_basic_constraints, read_extended_key_usage, ID_KP_SERVER_AUTH},
    },
    prelude::*,
};
use proptest::prelude::*;

#[test]
fn test_rsa_server_certificate_shape() {
    let env = TestPki::new();
    let root = env.root("Shape Root");
    let issued = env
        .pki
        .issuance()
        .issue_certificate(
            IssuanceRequest::generated("CN=test.example.com", KeySpec::Rsa { bits: 2048 }, CertificateType::Server)
                .with_validity_days(365),
            &root,
            "tester",
        )
        .unwrap();

    assert_eq!(issued.serial_number.len(), 32);
    assert!(issued.serial_number.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(issued.fingerprint.len(), 95);
    assert_eq!(issued.fingerprint.split(':').count(), 32);
    assert!(issued.certificate_pem.contains("-----BEGIN CERTIFICATE-----"));
    assert!(issued.private_key_pem.is_some());

    let cert = parse_certificate_pem(&issued.certificate_pem).unwrap();
    let (_, constraints) = read_basic_constraints(&cert).unwrap().unwrap();
    assert!(!constraints.ca);
    assert_eq!(read_extended_key_usage(&cert).unwrap(), vec![ID_KP_SERVER_AUTH]);

    let record = env.pki.issuance().get_certificate(&issued.certificate_id).unwrap();
    assert_eq!(record.key_algorithm, "RSA-2048");
    assert!(record.encrypted_private_key.is_some());
}

#[test]
fn test_validity_beyond_ca_is_rejected() {
    let env = TestPki::new();
    let root = env.root("Bounded Root");
    let err = env
        .pki
        .issuance()
        .issue_certificate(
            IssuanceRequest::generated("CN=long.example.com", P256, CertificateType::Client)
                .with_validity_days(3651),
            &root,
            "tester",
        )
        .unwrap_err();
    assert!(matches!(err, PkiError::ValidationError(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_issued_within_ca_validity(days in 1u32..3600) {
        let env = TestPki::new();
        let root = env.root("Prop Root");
        let issued = env
            .pki
            .issuance()
            .issue_certificate(
                IssuanceRequest::generated("CN=prop.example.com", P256, CertificateType::Server)
                    .with_validity_days(days),
                &root,
                "tester",
            )
            .unwrap();

        let ca = env.ca(&root);
        let leaf = parse_certificate_pem(&issued.certificate_pem).unwrap();
        prop_assert!(not_after(&leaf).unwrap() <= ca.valid_to.unwrap());
        let serials: Vec<_> = env
            .pki
            .issuance()
            .list_certificates(&root)
            .unwrap()
            .into_iter()
            .map(|c| c.serial_number)
            .collect();
        prop_assert_eq!(serials, vec![issued.serial_number]);
    }
}
