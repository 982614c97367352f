//! CRL numbering under concurrency, and CRL distribution.

mod common;

use common::TestPki;
use const_oid::db::rfc5280;
use der::Decode;
use privca_pki::{
    cert::extensions::decode_extension, prelude::*, revocation::parse_crl, CrlEncoding,
};

const THREADS: usize = 50;

#[test]
fn test_concurrent_crl_numbers_are_distinct() {
    let env = TestPki::new();
    let root = env.root("Concurrent Root");
    let issued = env.issue_server(&root, "busy.example.com");
    env.pki
        .revocation()
        .revoke_certificate(&issued.serial_number, RevocationReason::Unspecified, "ops")
        .unwrap();

    let mut numbers: Vec<u64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let revocation = env.pki.revocation();
                let root = root.as_str();
                scope.spawn(move || {
                    revocation
                        .generate_crl(root, CrlKind::Full, "worker")
                        .unwrap()
                        .crl_number
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    numbers.sort_unstable();
    let expected: Vec<u64> = (1..=THREADS as u64).collect();
    assert_eq!(numbers, expected);
    assert_eq!(env.ca(&root).crl_number, THREADS as u64);

    // each stored CRL carries the number it was recorded under
    let revocation = env.pki.revocation();
    for number in [1, 25, THREADS as u64] {
        let issuance = revocation.get_crl(&root, number).unwrap();
        let list = parse_crl(&issuance.crl_der).unwrap();
        let (_, encoded) = decode_extension::<u64>(
            list.tbs_cert_list.crl_extensions.as_deref(),
            rfc5280::ID_CE_CRL_NUMBER,
        )
        .unwrap()
        .unwrap();
        assert_eq!(encoded, number);
    }
}

#[test]
fn test_crl_distribution_formats() {
    let env = TestPki::new();
    let root = env.root("Distribution Root");
    let revocation = env.pki.revocation();
    let first = revocation.generate_crl(&root, CrlKind::Full, "ops").unwrap();
    revocation.generate_crl(&root, CrlKind::Full, "ops").unwrap();

    let pem = revocation.crl_bytes(&root, None, CrlEncoding::Pem).unwrap();
    assert!(String::from_utf8(pem).unwrap().starts_with("-----BEGIN X509 CRL-----"));

    let der = revocation.crl_bytes(&root, Some(1), CrlEncoding::Der).unwrap();
    assert_eq!(der, first.crl_der);
    let list = x509_cert::crl::CertificateList::from_der(&der).unwrap();
    assert!(list.tbs_cert_list.revoked_certificates.is_none());
    assert!(list.tbs_cert_list.next_update.is_some());
}
