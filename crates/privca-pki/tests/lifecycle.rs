//! End-to-end CA lifecycle: root, intermediate, issuance, revocation, persistence.

mod common;

use std::sync::Arc;

use common::{TestPki, P256};
use privca_pki::{
    cert::{
        cert_utils::{not_after, parse_certificate_pem, pem_blocks},
        extensions::{read_basic_constraints, read_key_usage},
    },
    prelude::*,
    store::MemoryStore,
    AuditAction, CaStatus, CertificateStatus, MemoryAuditSink, OcspStatus, Vault,
};

#[test]
fn test_root_to_revocation() {
    let env = TestPki::new();
    let root = env.root("Lifecycle Root");
    let ca = env.ca(&root);
    assert_eq!(ca.status, CaStatus::Active);
    assert_eq!(ca.certificate_chain_pem.len(), 1);

    let issued = env.issue_server(&root, "app.example.com");
    let record = env.pki.issuance().get_certificate(&issued.certificate_id).unwrap();
    assert_eq!(record.status, CertificateStatus::Active);
    assert_eq!(record.sans, vec!["DNS:app.example.com".to_string()]);

    let report = env
        .pki
        .validator()
        .validate_certificate(&issued.certificate_pem, &ValidationOptions::default(), "auditor")
        .unwrap();
    assert!(report.is_valid, "issues: {:?}", report.issues);

    env.pki
        .revocation()
        .revoke_certificate(&issued.serial_number, RevocationReason::Superseded, "ops")
        .unwrap();
    let crl = env.pki.revocation().generate_crl(&root, CrlKind::Full, "ops").unwrap();
    assert_eq!(crl.crl_number, 1);
    assert_eq!(crl.entry_count, 1);

    // revocation state reaches the validator through a different cache key
    let fresh = ValidationOptions {
        check_revocation: true,
        intermediates: vec![ca.certificate_pem.clone().unwrap()],
    };
    let report = env
        .pki
        .validator()
        .validate_certificate(&issued.certificate_pem, &fresh, "auditor")
        .unwrap();
    assert!(report.revoked);
    assert!(!report.is_valid);

    let actions = env.audit.actions();
    for expected in [
        AuditAction::CaInitialized,
        AuditAction::CaSelfSigned,
        AuditAction::CertificateIssued,
        AuditAction::CertificateValidated,
        AuditAction::CertificateRevoked,
        AuditAction::CrlGenerated,
    ] {
        assert!(actions.contains(&expected), "missing {expected:?}");
    }

    let summary = env.pki.ca_manager().delete_ca(&root, "admin").unwrap();
    assert_eq!(summary.certificates, 1);
    assert_eq!(summary.revocations, 1);
    assert_eq!(summary.crls, 1);
    assert!(env.pki.issuance().get_certificate(&issued.certificate_id).is_err());
}

#[test]
fn test_intermediate_ca_chain() {
    let env = TestPki::new();
    let root = env.root("Chain Root");
    let manager = env.pki.ca_manager();

    let sub = manager
        .initialize_ca(
            InitializeCaRequest::new("issuing", "CN=Chain Issuing CA").with_key_spec(P256),
            "admin",
        )
        .unwrap();
    let sub_pem = manager
        .sign_intermediate(&root, &sub.csr_pem, CaCertificateOptions::with_validity_days(1825), "admin")
        .unwrap();
    let root_pem = env.ca(&root).certificate_pem.unwrap();
    let uploaded = manager
        .upload_certificate(&sub.ca_id, &sub_pem, Some(&root_pem), "admin")
        .unwrap();
    assert_eq!(uploaded.status, CaStatus::Active);
    assert_eq!(uploaded.certificate_chain_pem.len(), 2);
    assert_eq!(manager.chain(&sub.ca_id).unwrap()[1], root_pem);

    let leaf = env.issue_server(&sub.ca_id, "deep.example.com");
    let leaf_cert = parse_certificate_pem(&leaf.certificate_pem).unwrap();
    let sub_cert = parse_certificate_pem(&sub_pem).unwrap();
    assert!(not_after(&leaf_cert).unwrap() <= not_after(&sub_cert).unwrap());

    let bundle = env.pki.exporter().chain_bundle(&leaf.certificate_id).unwrap();
    assert_eq!(pem_blocks(&bundle).unwrap().len(), 3);

    let report = env
        .pki
        .validator()
        .validate_certificate(&leaf.certificate_pem, &ValidationOptions::default(), "auditor")
        .unwrap();
    assert!(report.is_valid, "issues: {:?}", report.issues);
    assert_eq!(report.chain_info[1].subject, "CN=Chain Issuing CA");
}

#[test]
fn test_active_ca_certificates_are_ca_certificates() {
    let env = TestPki::new();
    let root = env.root("Profile Root");
    let manager = env.pki.ca_manager();
    let sub = manager
        .initialize_ca(InitializeCaRequest::new("sub", "CN=Profile Sub").with_key_spec(P256), "admin")
        .unwrap();
    let sub_pem = manager
        .sign_intermediate(&root, &sub.csr_pem, CaCertificateOptions::default(), "admin")
        .unwrap();
    let root_pem = env.ca(&root).certificate_pem.unwrap();
    manager
        .upload_certificate(&sub.ca_id, &sub_pem, Some(&root_pem), "admin")
        .unwrap();

    for ca in manager.list_cas().unwrap() {
        assert_eq!(ca.status, CaStatus::Active);
        let cert = parse_certificate_pem(ca.certificate_pem.as_deref().unwrap()).unwrap();
        let (critical, constraints) = read_basic_constraints(&cert).unwrap().unwrap();
        assert!(critical);
        assert!(constraints.ca);
        assert!(read_key_usage(&cert).unwrap().unwrap().key_cert_sign());
    }
}

#[test]
fn test_upload_non_ca_certificate_rejected() {
    let env = TestPki::new();
    let root = env.root("Upload Root");
    let leaf = env.issue_server(&root, "not-a-ca.example.com");

    let manager = env.pki.ca_manager();
    let pending = manager
        .initialize_ca(InitializeCaRequest::new("pending", "CN=Pending CA").with_key_spec(P256), "admin")
        .unwrap();
    let err = manager
        .upload_certificate(&pending.ca_id, &leaf.certificate_pem, None, "admin")
        .unwrap_err();
    assert!(matches!(err, PkiError::ValidationError(_)));
    assert_eq!(env.ca(&pending.ca_id).status, CaStatus::Initializing);
    assert!(env.ca(&pending.ca_id).certificate_pem.is_none());
}

#[test]
fn test_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let env = TestPki::new();
    let root = env.root("Snapshot Root");
    let issued = env.issue_server(&root, "persist.example.com");
    env.pki
        .revocation()
        .revoke_certificate(&issued.serial_number, RevocationReason::KeyCompromise, "ops")
        .unwrap();
    env.pki.revocation().generate_crl(&root, CrlKind::Full, "ops").unwrap();
    env.store.save_snapshot(&path).unwrap();

    let restored = Arc::new(MemoryStore::load_snapshot(&path).unwrap());
    let pki = Pki::from_parts(
        restored,
        Arc::new(Vault::new(&[42u8; 32])),
        Arc::new(MemoryAuditSink::new()),
        privca_pki::PkiConfig::default(),
    );
    assert_eq!(pki.ca_manager().get_ca(&root).unwrap().crl_number, 1);
    assert_eq!(
        pki.revocation().get_revocation(&issued.serial_number).unwrap().unwrap().reason,
        RevocationReason::KeyCompromise
    );

    // the restored engine can still sign with the CA key
    let next = pki.revocation().generate_crl(&root, CrlKind::Full, "ops").unwrap();
    assert_eq!(next.crl_number, 2);

    let root_cert = parse_certificate_pem(&pki.ca_manager().get_ca(&root).unwrap().certificate_pem.unwrap()).unwrap();
    let request = privca_pki::ocsp::build_ocsp_request(&root_cert, &issued.serial_number, None).unwrap();
    let info = privca_pki::ocsp::decode_ocsp_response(&pki.ocsp().handle_ocsp_request(&request)).unwrap();
    assert_eq!(info.status, OcspStatus::Successful);
}
