use std::collections::{BTreeMap, btree_map::Iter};

use x509_cert::{Certificate, crl::CertificateList, request::CertReq};

use crate::key::StoredKey;

/// KeyStoreEntry holds whatever is stored under one alias
#[derive(Debug, Clone, Default)]
pub struct KeyStoreEntry {
    pub(crate) certificate: Option<Certificate>,
    pub(crate) crl: Option<CertificateList>,
    pub(crate) request: Option<CertReq>,
    pub(crate) key: Option<StoredKey>,
}

impl KeyStoreEntry {
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    pub fn crl(&self) -> Option<&CertificateList> {
        self.crl.as_ref()
    }

    pub fn request(&self) -> Option<&CertReq> {
        self.request.as_ref()
    }

    pub fn key(&self) -> Option<&StoredKey> {
        self.key.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.certificate.is_none() && self.crl.is_none() && self.request.is_none() && self.key.is_none()
    }
}

/// Alias-indexed repository of certificates, CRLs, certification requests and keys.
///
/// Setters are additive: storing one kind of object under an alias never removes another kind.
/// Implementations are driven by a single owner; concurrent mutation of the same alias is the caller's concern.
pub trait KeyStore {
    fn aliases(&self) -> Vec<String>;
    fn contains_alias(&self, alias: &str) -> bool;
    fn get_certificate(&self, alias: &str) -> Option<Certificate>;
    fn get_crl(&self, alias: &str) -> Option<CertificateList>;
    fn get_request(&self, alias: &str) -> Option<CertReq>;
    fn get_key(&self, alias: &str) -> Option<StoredKey>;
    fn set_certificate(&mut self, alias: &str, certificate: Certificate);
    fn set_crl(&mut self, alias: &str, crl: CertificateList);
    fn set_request(&mut self, alias: &str, request: CertReq);
    fn set_key(&mut self, alias: &str, key: StoredKey);
    fn get_all_certificates(&self) -> Vec<Certificate>;
    fn get_all_crls(&self) -> Vec<CertificateList>;
    fn delete_entry(&mut self, alias: &str) -> bool;
}

/// Keystore entries iterator
pub struct Entries<'a> {
    iter: Iter<'a, String, KeyStoreEntry>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (&'a String, &'a KeyStoreEntry);

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// In-memory [KeyStore] ordered by alias
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    entries: BTreeMap<String, KeyStoreEntry>,
}

impl MemoryKeyStore {
    /// Create new empty keystore
    pub fn new() -> Self {
        Self::default()
    }

    /// Get entries iterator
    pub fn entries(&self) -> Entries<'_> {
        let iter = self.entries.iter();
        Entries { iter }
    }

    /// Get an entry for a given alias
    pub fn entry(&self, alias: &str) -> Option<&KeyStoreEntry> {
        self.entries.get(alias)
    }

    /// Get entries count in the keystore
    pub fn entries_count(&self) -> usize {
        self.entries.len()
    }

    fn entry_mut(&mut self, alias: &str) -> &mut KeyStoreEntry {
        self.entries.entry(alias.to_owned()).or_default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn aliases(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn contains_alias(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    fn get_certificate(&self, alias: &str) -> Option<Certificate> {
        self.entry(alias).and_then(|e| e.certificate.clone())
    }

    fn get_crl(&self, alias: &str) -> Option<CertificateList> {
        self.entry(alias).and_then(|e| e.crl.clone())
    }

    fn get_request(&self, alias: &str) -> Option<CertReq> {
        self.entry(alias).and_then(|e| e.request.clone())
    }

    fn get_key(&self, alias: &str) -> Option<StoredKey> {
        self.entry(alias).and_then(|e| e.key.clone())
    }

    fn set_certificate(&mut self, alias: &str, certificate: Certificate) {
        self.entry_mut(alias).certificate = Some(certificate);
    }

    fn set_crl(&mut self, alias: &str, crl: CertificateList) {
        self.entry_mut(alias).crl = Some(crl);
    }

    fn set_request(&mut self, alias: &str, request: CertReq) {
        self.entry_mut(alias).request = Some(request);
    }

    fn set_key(&mut self, alias: &str, key: StoredKey) {
        self.entry_mut(alias).key = Some(key);
    }

    fn get_all_certificates(&self) -> Vec<Certificate> {
        self.entries.values().filter_map(|e| e.certificate.clone()).collect()
    }

    fn get_all_crls(&self) -> Vec<CertificateList> {
        self.entries.values().filter_map(|e| e.crl.clone()).collect()
    }

    fn delete_entry(&mut self, alias: &str) -> bool {
        self.entries.remove(alias).is_some()
    }
}
