//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use privca_pki::{
    prelude::*, store::MemoryStore, CaIdentity, IssuanceResult, MemoryAuditSink, PkiConfig, Vault,
};

pub const P256: KeySpec = KeySpec::Ecdsa {
    curve: privca_key::EcCurve::P256,
};

/// Engine over an in-memory store, with handles on store and audit events
pub struct TestPki {
    pub pki: Pki,
    pub store: Arc<MemoryStore>,
    pub audit: Arc<MemoryAuditSink>,
}

impl TestPki {
    pub fn new() -> Self {
        Self::with_config(PkiConfig::default())
    }

    pub fn with_config(config: PkiConfig) -> Self {
        let _ = privca_pki::logging::init_tracing("warn");
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let pki = Pki::from_parts(
            store.clone(),
            Arc::new(Vault::new(&[42u8; 32])),
            audit.clone(),
            config,
        );
        Self { pki, store, audit }
    }

    /// Initialize and self-sign a ten-year P-256 root
    pub fn root(&self, name: &str) -> String {
        let manager = self.pki.ca_manager();
        let init = manager
            .initialize_ca(
                InitializeCaRequest::new(name, format!("CN={name},O=privca tests")).with_key_spec(P256),
                "admin",
            )
            .unwrap();
        manager
            .self_sign(&init.ca_id, CaCertificateOptions::with_validity_days(3650), "admin")
            .unwrap();
        init.ca_id
    }

    pub fn ca(&self, ca_id: &str) -> CaIdentity {
        self.pki.ca_manager().get_ca(ca_id).unwrap()
    }

    pub fn issue_server(&self, ca_id: &str, cn: &str) -> IssuanceResult {
        self.pki
            .issuance()
            .issue_certificate(
                IssuanceRequest::generated(format!("CN={cn}"), P256, CertificateType::Server)
                    .with_sans([cn.to_string()]),
                ca_id,
                "tester",
            )
            .unwrap()
    }
}
