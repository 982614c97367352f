//! OCSP responder over the wire format.

mod common;

use common::TestPki;
use privca_pki::{
    cert::cert_utils::parse_certificate_pem,
    ocsp::{build_ocsp_request, decode_ocsp_response, OcspResponseInfo},
    prelude::*,
    CertificateState, OcspStatus,
};
use x509_cert::Certificate;

fn issuer(env: &TestPki, ca_id: &str) -> Certificate {
    parse_certificate_pem(&env.ca(ca_id).certificate_pem.unwrap()).unwrap()
}

fn ask(env: &TestPki, request: &[u8]) -> OcspResponseInfo {
    decode_ocsp_response(&env.pki.ocsp().handle_ocsp_request(request)).unwrap()
}

#[test]
fn test_revoked_key_compromise() {
    let env = TestPki::new();
    let root = env.root("OCSP Root");
    let issued = env.issue_server(&root, "compromised.example.com");
    env.pki
        .revocation()
        .revoke_certificate(&issued.serial_number, RevocationReason::KeyCompromise, "ops")
        .unwrap();

    let request = build_ocsp_request(&issuer(&env, &root), &issued.serial_number, Some(b"nonce")).unwrap();
    let info = ask(&env, &request);
    assert_eq!(info.status, OcspStatus::Successful);
    assert_eq!(info.signature_verified, Some(true));
    match info.responses[0].state {
        CertificateState::Revoked { reason, .. } => {
            assert_eq!(reason, Some(RevocationReason::KeyCompromise))
        }
        other => panic!("expected revoked, got {other:?}"),
    }
    assert!(info.nonce.is_some());
}

#[test]
fn test_good_certificate() {
    let env = TestPki::new();
    let root = env.root("OCSP Root");
    let issued = env.issue_server(&root, "fine.example.com");
    let request = build_ocsp_request(&issuer(&env, &root), &issued.serial_number, None).unwrap();
    assert_eq!(ask(&env, &request).responses[0].state, CertificateState::Good);
}

#[test]
fn test_unknown_serial() {
    let env = TestPki::new();
    let root = env.root("OCSP Root");
    let request = build_ocsp_request(&issuer(&env, &root), "5eed5eed5eed5eed", None).unwrap();
    let info = ask(&env, &request);
    assert_eq!(info.status, OcspStatus::Successful);
    assert_eq!(info.responses[0].state, CertificateState::Unknown);
}

#[test]
fn test_no_active_ca_is_try_later() {
    let other = TestPki::new();
    let root = other.root("Elsewhere Root");
    let request = build_ocsp_request(&issuer(&other, &root), "01", None).unwrap();

    let env = TestPki::new();
    let info = ask(&env, &request);
    assert_eq!(info.status, OcspStatus::TryLater);
    assert!(info.responses.is_empty());
}

#[test]
fn test_garbage_is_malformed() {
    let env = TestPki::new();
    env.root("OCSP Root");
    for garbage in [&b""[..], b"\x00\x01\x02", b"GET / HTTP/1.1\r\n"] {
        assert_eq!(ask(&env, garbage).status, OcspStatus::MalformedRequest);
    }
}
