//!
//! Certification path building and validation
//!
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use x509_cert::{Certificate, crl::CertificateList, ext::pkix::name::GeneralName};

use crate::{
    Result,
    cert::CertificateExt,
    engine::Pkix,
    error::Error,
    keystore::KeyStore,
    provider::CryptoProvider,
    selector::{Selector, select_certificates, select_crls},
    serial::Serial,
};

/// Why path building stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEnd {
    /// The last certificate is self-signed
    SelfSigned,
    /// No issuer of the last certificate was found
    IssuerNotFound,
    /// The issuer of the last certificate was found but is revoked
    IssuerRevoked,
}

/// Certification path ordered from the leaf to the root
#[derive(Debug, Clone)]
pub struct CertPath {
    pub certificates: Vec<Certificate>,
    pub end: PathEnd,
}

impl CertPath {
    pub fn is_complete(&self) -> bool {
        self.end == PathEnd::SelfSigned
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

/// Selector for the issuer of a certificate valid at `date`: issuer name, refined by the authority key identifier
pub fn issuer_selector(cert: &Certificate, date: DateTime<Utc>) -> Result<Selector> {
    let mut selector = Selector::new().subject(cert.tbs_certificate.issuer.clone()).date(date);

    if let Some(aki) = cert.authority_key_identifier()? {
        if let Some(key_id) = aki.key_identifier {
            selector = selector.subject_key_identifier(key_id.as_bytes());
        }
        if let Some(name) = aki.authority_cert_issuer.iter().flatten().find_map(|n| match n {
            GeneralName::DirectoryName(name) => Some(name.clone()),
            _ => None,
        }) {
            selector = selector.issuer(name);
        }
        if let Some(serial) = aki.authority_cert_serial_number {
            selector = selector.serial_number(&serial);
        }
    }
    Ok(selector)
}

/// A certificate is revoked when a CRL of its issuer, issued before `date`, lists its serial number
pub fn is_revoked<'a, I>(cert: &Certificate, crl_pool: I, date: DateTime<Utc>) -> bool
where
    I: IntoIterator<Item = &'a CertificateList>,
{
    let selector = Selector::new().issuer(cert.tbs_certificate.issuer.clone()).date(date);
    let serial = cert.serial();

    select_crls(crl_pool, &selector).into_iter().any(|crl| {
        crl.tbs_cert_list
            .revoked_certificates
            .iter()
            .flatten()
            .any(|entry| Serial::from(&entry.serial_number).compare(&serial).is_eq())
    })
}

/// Walk the issuer chain of `cert` through `cert_pool`, stopping at a self-signed certificate,
/// a missing issuer or a revoked issuer.
pub fn build_cert_path(
    cert: &Certificate,
    cert_pool: &[Certificate],
    crl_pool: &[CertificateList],
    date: DateTime<Utc>,
) -> Result<CertPath> {
    let mut certificates = vec![cert.clone()];

    loop {
        let Some(current) = certificates.last() else {
            return Err(Error::MissingField("certificate"));
        };
        if current.is_self_signed() {
            return Ok(CertPath {
                certificates,
                end: PathEnd::SelfSigned,
            });
        }

        let selector = issuer_selector(current, date)?;
        let issuer = select_certificates(cert_pool, &selector)
            .into_iter()
            .next()
            .filter(|issuer| !certificates.contains(issuer));

        match issuer {
            Some(issuer) if is_revoked(issuer, crl_pool, date) => {
                log::warn!("Issuer {} is revoked", issuer.tbs_certificate.subject);
                return Ok(CertPath {
                    certificates,
                    end: PathEnd::IssuerRevoked,
                });
            }
            Some(issuer) => certificates.push(issuer.clone()),
            None => {
                log::debug!("Issuer {} not found", current.tbs_certificate.issuer);
                return Ok(CertPath {
                    certificates,
                    end: PathEnd::IssuerNotFound,
                });
            }
        }
    }
}

impl<P: CryptoProvider, S: KeyStore> Pkix<P, S> {
    /// Build the path of a certificate over the given pool plus the stored certificates and CRLs
    pub fn build_cert_path(
        &self,
        cert: &Certificate,
        cert_pool: &[Certificate],
        date: Option<DateTime<Utc>>,
    ) -> Result<CertPath> {
        let mut pool = cert_pool.to_vec();
        pool.extend(self.store.get_all_certificates());
        let crls = self.store.get_all_crls();
        build_cert_path(cert, &pool, &crls, date.unwrap_or_else(Utc::now))
    }

    /// Revocation status of a certificate against the stored CRLs
    pub fn is_revoked(&self, cert: &Certificate, date: Option<DateTime<Utc>>) -> bool {
        is_revoked(cert, &self.store.get_all_crls(), date.unwrap_or_else(Utc::now))
    }

    /// Validate a certificate given alone or with its chain, leaf first.
    ///
    /// The path must contain a certificate held by the key store. Every signature of the path is verified,
    /// a self-signed terminal certificate against itself. Returns the path.
    pub async fn validate_certificate(
        &self,
        chain: &[Certificate],
        date: Option<DateTime<Utc>>,
    ) -> Result<Vec<Certificate>> {
        let cert = chain.first().ok_or(Error::MissingField("certificate"))?;
        let path = self.build_cert_path(cert, &chain[1..], date)?;

        let trusted = self.store.get_all_certificates();
        let anchor = path
            .certificates
            .iter()
            .rev()
            .find(|c| trusted.iter().any(|t| t.matches_issuer_and_serial(&c.issuer_and_serial())))
            .ok_or(Error::TrustAnchorNotFound)?;
        log::debug!("Trust anchor: {}", anchor.tbs_certificate.subject);

        let pairs = path.certificates.iter().enumerate().filter_map(|(i, child)| {
            match path.certificates.get(i + 1) {
                Some(issuer) => Some((child, issuer)),
                None if child.is_self_signed() => Some((child, child)),
                None => None,
            }
        });
        try_join_all(pairs.map(|(child, issuer)| self.verify_certificate_signature(child, issuer))).await?;

        Ok(path.certificates)
    }
}
