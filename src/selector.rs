use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use x509_cert::{Certificate, crl::CertificateList, name::Name};

use crate::{cert::CertificateExt, name::names_equal, serial::Serial, time::from_time};

/// Conjunctive match criteria for certificates and CRLs. Absent fields never constrain the match.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    pub issuer: Option<Name>,
    pub serial_number: Option<Serial>,
    pub subject_key_identifier: Option<Vec<u8>>,
    pub subject: Option<Name>,
    pub date: Option<DateTime<Utc>>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issuer(mut self, issuer: Name) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn serial_number<S: Into<Serial>>(mut self, serial: S) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn subject_key_identifier<K: Into<Vec<u8>>>(mut self, ski: K) -> Self {
        self.subject_key_identifier = Some(ski.into());
        self
    }

    pub fn subject(mut self, subject: Name) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }
}

/// Length first, then lexicographic byte order
pub fn compare_buffers(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

pub fn match_certificate(cert: &Certificate, selector: &Selector) -> bool {
    let tbs = &cert.tbs_certificate;

    if let Some(ref issuer) = selector.issuer
        && !names_equal(&tbs.issuer, issuer)
    {
        return false;
    }
    if let Some(ref serial) = selector.serial_number
        && !cert.serial().compare(serial).is_eq()
    {
        return false;
    }
    if let Some(ref ski) = selector.subject_key_identifier {
        match cert.subject_key_identifier() {
            Ok(Some(own)) if compare_buffers(&own, ski).is_eq() => {}
            _ => return false,
        }
    }
    if let Some(ref subject) = selector.subject
        && !names_equal(&tbs.subject, subject)
    {
        return false;
    }
    if let Some(date) = selector.date
        && !(cert.not_before() < date && date < cert.not_after())
    {
        return false;
    }
    true
}

/// Only the issuer and date criteria apply to a CRL
pub fn match_crl(crl: &CertificateList, selector: &Selector) -> bool {
    let tbs = &crl.tbs_cert_list;

    if let Some(ref issuer) = selector.issuer
        && !names_equal(&tbs.issuer, issuer)
    {
        return false;
    }
    if let Some(date) = selector.date
        && from_time(&tbs.this_update) >= date
    {
        return false;
    }
    true
}

pub fn select_certificates<'a, I>(certs: I, selector: &Selector) -> Vec<&'a Certificate>
where
    I: IntoIterator<Item = &'a Certificate>,
{
    certs.into_iter().filter(|c| match_certificate(c, selector)).collect()
}

pub fn select_crls<'a, I>(crls: I, selector: &Selector) -> Vec<&'a CertificateList>
where
    I: IntoIterator<Item = &'a CertificateList>,
{
    crls.into_iter().filter(|c| match_crl(c, selector)).collect()
}
