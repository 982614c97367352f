use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{CascadeSummary, CrlSnapshot, PkiStore, RevokedEntry};
use crate::{
    error::{PkiError, Result},
    types::{
        CaIdentity, CertificateStatus, CrlIssuance, CrlKind, IssuedCertificate, RevocationRecord,
    },
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    cas: BTreeMap<String, CaIdentity>,
    certificates: HashMap<String, IssuedCertificate>,
    /// serial → certificate id
    serial_index: HashMap<String, String>,
    /// serial → record
    revocations: HashMap<String, RevocationRecord>,
    /// ca id → history, ascending by number
    crls: HashMap<String, Vec<CrlIssuance>>,
    /// last revocation sequence handed out
    #[serde(default)]
    revocation_sequence: u64,
}

/// 内存存储后端
///
/// One `RwLock` guards all tables, so every trait method is atomic and
/// readers see whole snapshots.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the full store as JSON, replacing `path` atomically
    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = {
            let data = self.data.read();
            serde_json::to_vec(&*data)?
        };
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), "Store snapshot written");
        Ok(())
    }

    /// Load a store written by [`MemoryStore::save_snapshot`]
    pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read(path.as_ref())?;
        let data: StoreData = serde_json::from_slice(&raw)
            .map_err(|e| PkiError::StoreError(format!("Corrupt store snapshot: {e}")))?;
        Ok(Self {
            data: RwLock::new(data),
        })
    }
}

impl PkiStore for MemoryStore {
    fn insert_ca(&self, ca: CaIdentity) -> Result<()> {
        let mut data = self.data.write();
        if data.cas.contains_key(&ca.id) {
            return Err(PkiError::StoreError(format!("CA {} already exists", ca.id)));
        }
        data.cas.insert(ca.id.clone(), ca);
        Ok(())
    }

    fn update_ca(&self, ca: CaIdentity) -> Result<()> {
        let mut data = self.data.write();
        match data.cas.get_mut(&ca.id) {
            Some(slot) => {
                *slot = ca;
                Ok(())
            }
            None => Err(PkiError::CANotFound(ca.id)),
        }
    }

    fn get_ca(&self, ca_id: &str) -> Result<Option<CaIdentity>> {
        Ok(self.data.read().cas.get(ca_id).cloned())
    }

    fn list_cas(&self) -> Result<Vec<CaIdentity>> {
        let mut cas: Vec<_> = self.data.read().cas.values().cloned().collect();
        cas.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(cas)
    }

    fn delete_ca_cascade(&self, ca_id: &str) -> Result<CascadeSummary> {
        let mut data = self.data.write();
        if data.cas.remove(ca_id).is_none() {
            return Err(PkiError::CANotFound(ca_id.to_string()));
        }

        let doomed: Vec<(String, String)> = data
            .certificates
            .values()
            .filter(|cert| cert.ca_id == ca_id)
            .map(|cert| (cert.id.clone(), cert.serial_number.clone()))
            .collect();
        for (id, serial) in &doomed {
            data.certificates.remove(id);
            data.serial_index.remove(serial);
        }

        let before = data.revocations.len();
        data.revocations.retain(|_, record| record.ca_id != ca_id);
        let revocations = before - data.revocations.len();

        let crls = data.crls.remove(ca_id).map(|history| history.len()).unwrap_or(0);

        Ok(CascadeSummary {
            certificates: doomed.len(),
            revocations,
            crls,
        })
    }

    fn insert_certificate(&self, certificate: IssuedCertificate) -> Result<()> {
        let mut data = self.data.write();
        if data.serial_index.contains_key(&certificate.serial_number) {
            return Err(PkiError::SerialCollision(certificate.serial_number));
        }
        if !data.cas.contains_key(&certificate.ca_id) {
            return Err(PkiError::CANotFound(certificate.ca_id));
        }
        data.serial_index
            .insert(certificate.serial_number.clone(), certificate.id.clone());
        data.certificates.insert(certificate.id.clone(), certificate);
        Ok(())
    }

    fn get_certificate(&self, certificate_id: &str) -> Result<Option<IssuedCertificate>> {
        Ok(self.data.read().certificates.get(certificate_id).cloned())
    }

    fn get_certificate_by_serial(&self, serial_number: &str) -> Result<Option<IssuedCertificate>> {
        let data = self.data.read();
        Ok(data
            .serial_index
            .get(serial_number)
            .and_then(|id| data.certificates.get(id))
            .cloned())
    }

    fn list_certificates(&self, ca_id: &str) -> Result<Vec<IssuedCertificate>> {
        let mut certs: Vec<_> = self
            .data
            .read()
            .certificates
            .values()
            .filter(|cert| cert.ca_id == ca_id)
            .cloned()
            .collect();
        certs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(certs)
    }

    fn revoke(&self, mut record: RevocationRecord) -> Result<RevocationRecord> {
        let mut data = self.data.write();
        if data.revocations.contains_key(&record.serial_number) {
            return Err(PkiError::AlreadyRevoked(record.serial_number));
        }
        let certificate_id = data
            .serial_index
            .get(&record.serial_number)
            .cloned()
            .ok_or_else(|| PkiError::CertificateNotFound(record.serial_number.clone()))?;

        let certificate = data
            .certificates
            .get_mut(&certificate_id)
            .ok_or_else(|| PkiError::StoreError(format!("Dangling serial index {certificate_id}")))?;
        certificate.status = CertificateStatus::Revoked;

        data.revocation_sequence += 1;
        record.sequence = data.revocation_sequence;
        data.revocations.insert(record.serial_number.clone(), record.clone());
        Ok(record)
    }

    fn get_revocation(&self, serial_number: &str) -> Result<Option<RevocationRecord>> {
        Ok(self.data.read().revocations.get(serial_number).cloned())
    }

    fn list_revocations(&self, ca_id: &str) -> Result<Vec<RevocationRecord>> {
        let mut records: Vec<_> = self
            .data
            .read()
            .revocations
            .values()
            .filter(|record| record.ca_id == ca_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.revocation_date
                .cmp(&b.revocation_date)
                .then_with(|| a.serial_number.cmp(&b.serial_number))
        });
        Ok(records)
    }

    fn issue_crl(
        &self,
        ca_id: &str,
        build: &mut dyn FnMut(CrlSnapshot<'_>) -> Result<CrlIssuance>,
    ) -> Result<CrlIssuance> {
        let mut data = self.data.write();
        let mut ca = data
            .cas
            .get(ca_id)
            .cloned()
            .ok_or_else(|| PkiError::CANotFound(ca_id.to_string()))?;
        let crl_number = ca
            .crl_number
            .checked_add(1)
            .ok_or_else(|| PkiError::InternalError(format!("CRL number exhausted for {ca_id}")))?;

        let issuance = {
            let mut revocations: Vec<RevokedEntry> = data
                .revocations
                .values()
                .filter(|record| record.ca_id == ca_id)
                .map(|record| RevokedEntry {
                    certificate_valid_to: data
                        .certificates
                        .get(&record.certificate_id)
                        .map(|cert| cert.valid_to)
                        .unwrap_or(record.revocation_date),
                    record: record.clone(),
                })
                .collect();
            revocations.sort_by_key(|entry| entry.record.sequence);
            let latest_full = data
                .crls
                .get(ca_id)
                .and_then(|history| history.iter().rev().find(|crl| crl.kind == CrlKind::Full));

            build(CrlSnapshot {
                ca: &ca,
                crl_number,
                revocations,
                latest_full,
                revocation_watermark: data.revocation_sequence,
            })?
        };

        if issuance.crl_number != crl_number || issuance.ca_id != ca_id {
            return Err(PkiError::InternalError(format!(
                "CRL builder returned number {} for {}, expected {crl_number} for {ca_id}",
                issuance.crl_number, issuance.ca_id
            )));
        }

        ca.crl_number = crl_number;
        ca.updated_at = OffsetDateTime::now_utc();
        data.cas.insert(ca.id.clone(), ca);
        data.crls
            .entry(ca_id.to_string())
            .or_default()
            .push(issuance.clone());
        Ok(issuance)
    }

    fn get_crl(&self, ca_id: &str, crl_number: u64) -> Result<Option<CrlIssuance>> {
        Ok(self
            .data
            .read()
            .crls
            .get(ca_id)
            .and_then(|history| history.iter().find(|crl| crl.crl_number == crl_number))
            .cloned())
    }

    fn latest_crl(&self, ca_id: &str, kind: Option<CrlKind>) -> Result<Option<CrlIssuance>> {
        Ok(self
            .data
            .read()
            .crls
            .get(ca_id)
            .and_then(|history| {
                history
                    .iter()
                    .rev()
                    .find(|crl| kind.map_or(true, |kind| crl.kind == kind))
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use privca_key::KeySpec;
    use time::Duration;

    use super::*;
    use crate::types::{CaStatus, CertificateType, EncryptedBlob, RevocationReason};

    fn sample_ca(id: &str) -> CaIdentity {
        let now = OffsetDateTime::now_utc();
        CaIdentity {
            id: id.to_string(),
            name: format!("{id} CA"),
            subject_dn: format!("CN={id}"),
            key_spec: KeySpec::Ed25519,
            status: CaStatus::Active,
            encrypted_private_key: EncryptedBlob {
                ciphertext: vec![1, 2, 3],
                iv: vec![0; 12],
                auth_tag: vec![0; 16],
            },
            csr_pem: None,
            certificate_pem: None,
            certificate_chain_pem: Vec::new(),
            crl_number: 0,
            crl_distribution_url: None,
            ocsp_url: None,
            valid_from: Some(now),
            valid_to: Some(now + Duration::days(365)),
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_cert(ca_id: &str, serial: &str) -> IssuedCertificate {
        let now = OffsetDateTime::now_utc();
        IssuedCertificate {
            id: format!("cert-{serial}"),
            serial_number: serial.to_string(),
            fingerprint: String::new(),
            subject_dn: "CN=leaf".to_string(),
            sans: Vec::new(),
            certificate_type: CertificateType::Server,
            key_algorithm: "Ed25519".to_string(),
            status: CertificateStatus::Active,
            valid_from: now,
            valid_to: now + Duration::days(30),
            certificate_pem: String::new(),
            encrypted_private_key: None,
            ca_id: ca_id.to_string(),
            requested_by: "tester".to_string(),
            created_at: now,
        }
    }

    fn record(ca_id: &str, serial: &str) -> RevocationRecord {
        RevocationRecord {
            serial_number: serial.to_string(),
            certificate_id: format!("cert-{serial}"),
            ca_id: ca_id.to_string(),
            revocation_date: OffsetDateTime::now_utc(),
            reason: RevocationReason::KeyCompromise,
            revoked_by: "tester".to_string(),
            sequence: 0,
        }
    }

    fn stub_crl(snapshot: &CrlSnapshot<'_>, kind: CrlKind) -> CrlIssuance {
        let now = OffsetDateTime::now_utc();
        CrlIssuance {
            crl_number: snapshot.crl_number,
            ca_id: snapshot.ca.id.clone(),
            kind,
            base_crl_number: snapshot.latest_full.map(|crl| crl.crl_number),
            crl_der: Vec::new(),
            crl_pem: String::new(),
            this_update: now,
            next_update: now + Duration::hours(24),
            entry_count: snapshot.revocations.len(),
            revocation_watermark: snapshot.revocation_watermark,
        }
    }

    #[test]
    fn test_serial_collision() {
        let store = MemoryStore::new();
        store.insert_ca(sample_ca("a")).unwrap();
        store.insert_certificate(sample_cert("a", "01")).unwrap();

        let mut dup = sample_cert("a", "01");
        dup.id = "other".to_string();
        assert!(matches!(
            store.insert_certificate(dup),
            Err(PkiError::SerialCollision(_))
        ));
        assert!(store.get_certificate("other").unwrap().is_none());
    }

    #[test]
    fn test_double_revoke_keeps_one_record() {
        let store = MemoryStore::new();
        store.insert_ca(sample_ca("a")).unwrap();
        store.insert_certificate(sample_cert("a", "01")).unwrap();

        let revoked = store.revoke(record("a", "01")).unwrap();
        assert_eq!(revoked.sequence, 1);
        assert_eq!(
            store.get_certificate_by_serial("01").unwrap().unwrap().status,
            CertificateStatus::Revoked
        );
        assert!(matches!(
            store.revoke(record("a", "01")),
            Err(PkiError::AlreadyRevoked(_))
        ));
        assert_eq!(store.list_revocations("a").unwrap().len(), 1);
        assert!(matches!(
            store.revoke(record("a", "ff")),
            Err(PkiError::CertificateNotFound(_))
        ));
    }

    #[test]
    fn test_failed_crl_build_leaves_no_trace() {
        let store = MemoryStore::new();
        store.insert_ca(sample_ca("a")).unwrap();

        let err = store
            .issue_crl("a", &mut |_| Err(PkiError::SigningError("boom".into())))
            .unwrap_err();
        assert!(matches!(err, PkiError::SigningError(_)));
        assert_eq!(store.get_ca("a").unwrap().unwrap().crl_number, 0);
        assert!(store.latest_crl("a", None).unwrap().is_none());

        let crl = store
            .issue_crl("a", &mut |snapshot| Ok(stub_crl(&snapshot, CrlKind::Full)))
            .unwrap();
        assert_eq!(crl.crl_number, 1);
        assert_eq!(store.get_ca("a").unwrap().unwrap().crl_number, 1);
    }

    #[test]
    fn test_latest_full_is_visible_to_builder() {
        let store = MemoryStore::new();
        store.insert_ca(sample_ca("a")).unwrap();
        store
            .issue_crl("a", &mut |snapshot| Ok(stub_crl(&snapshot, CrlKind::Full)))
            .unwrap();
        let delta = store
            .issue_crl("a", &mut |snapshot| Ok(stub_crl(&snapshot, CrlKind::Delta)))
            .unwrap();
        assert_eq!(delta.base_crl_number, Some(1));
        assert_eq!(store.latest_crl("a", Some(CrlKind::Full)).unwrap().unwrap().crl_number, 1);
        assert_eq!(store.latest_crl("a", None).unwrap().unwrap().crl_number, 2);
        assert!(store.get_crl("a", 2).unwrap().is_some());
    }

    #[test]
    fn test_cascade_delete() {
        let store = MemoryStore::new();
        store.insert_ca(sample_ca("a")).unwrap();
        store.insert_ca(sample_ca("b")).unwrap();
        store.insert_certificate(sample_cert("a", "01")).unwrap();
        store.insert_certificate(sample_cert("a", "02")).unwrap();
        store.insert_certificate(sample_cert("b", "03")).unwrap();
        store.revoke(record("a", "01")).unwrap();
        store
            .issue_crl("a", &mut |snapshot| Ok(stub_crl(&snapshot, CrlKind::Full)))
            .unwrap();

        let summary = store.delete_ca_cascade("a").unwrap();
        assert_eq!(
            summary,
            CascadeSummary {
                certificates: 2,
                revocations: 1,
                crls: 1
            }
        );
        assert!(store.get_certificate_by_serial("01").unwrap().is_none());
        assert!(store.get_certificate_by_serial("03").unwrap().is_some());
        assert!(matches!(
            store.delete_ca_cascade("a"),
            Err(PkiError::CANotFound(_))
        ));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = MemoryStore::new();
        store.insert_ca(sample_ca("a")).unwrap();
        store.insert_certificate(sample_cert("a", "01")).unwrap();
        store.save_snapshot(&path).unwrap();

        let loaded = MemoryStore::load_snapshot(&path).unwrap();
        assert_eq!(loaded.list_cas().unwrap().len(), 1);
        assert!(loaded.get_certificate_by_serial("01").unwrap().is_some());
    }
}
