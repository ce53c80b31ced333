//!
//! Incremental CRL issuance
//!
use chrono::{DateTime, Utc};
use der::{
    Encode,
    asn1::{BitString, Uint},
};
use x509_cert::{
    certificate::Version,
    crl::{CertificateList, RevokedCert, TbsCertList},
    ext::{
        Extensions,
        pkix::{CrlNumber, CrlReason},
    },
    name::Name,
};

use crate::{
    Result,
    cert::{CertificateExt, find_extension, set_extension, to_extension},
    engine::Pkix,
    error::Error,
    issuer::authority_key_identifier,
    keystore::KeyStore,
    name::names_equal,
    provider::CryptoProvider,
    serial::{Serial, number_inc},
    time::{add_years, to_time, today},
};

const DEFAULT_NEXT_UPDATE_YEARS: u32 = 25;

/// Certificate to add to a revocation list
#[derive(Debug, Clone)]
pub struct Revocation {
    pub serial_number: Serial,
    /// Defaults to today
    pub revocation_date: Option<DateTime<Utc>>,
    /// Defaults to [CrlReason::Unspecified]
    pub reason: Option<CrlReason>,
}

impl Revocation {
    pub fn new<S: Into<Serial>>(serial_number: S) -> Self {
        Self {
            serial_number: serial_number.into(),
            revocation_date: None,
            reason: None,
        }
    }

    pub fn revocation_date(mut self, date: DateTime<Utc>) -> Self {
        self.revocation_date = Some(date);
        self
    }

    pub fn reason(mut self, reason: CrlReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Requested changes to a CRL
#[derive(Debug, Clone, Default)]
pub struct CrlPrototype {
    /// Must equal the issuer certificate's subject when given
    pub issuer: Option<Name>,
    pub this_update: Option<DateTime<Utc>>,
    pub next_update: Option<DateTime<Utc>>,
    pub crl_number: Option<Serial>,
    pub revocations: Vec<Revocation>,
}

impl CrlPrototype {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(mut self, revocation: Revocation) -> Self {
        self.revocations.push(revocation);
        self
    }

    pub fn this_update(mut self, date: DateTime<Utc>) -> Self {
        self.this_update = Some(date);
        self
    }

    pub fn next_update(mut self, date: DateTime<Utc>) -> Self {
        self.next_update = Some(date);
        self
    }

    pub fn crl_number<S: Into<Serial>>(mut self, number: S) -> Self {
        self.crl_number = Some(number.into());
        self
    }
}

fn crl_number(value: &Serial) -> Result<CrlNumber> {
    Ok(CrlNumber(Uint::new(&value.to_bytes()?)?))
}

impl<P: CryptoProvider, S: KeyStore> Pkix<P, S> {
    /// Add revocations to the CRL of the certificate under `issuer_alias`, creating the list if needed.
    /// The signed list is stored under `issuer_alias`.
    pub async fn update_crl(
        &mut self,
        proto: &CrlPrototype,
        issuer_alias: &str,
        password: Option<&str>,
    ) -> Result<CertificateList> {
        let issuer = self.certificate(issuer_alias)?;
        if !issuer.key_usage()?.is_some_and(|usage| usage.crl_sign()) {
            return Err(Error::KeyUsageNotPermitted("cRLSign"));
        }

        let issuer_name = issuer.tbs_certificate.subject.clone();
        if let Some(ref name) = proto.issuer
            && !names_equal(name, &issuer_name)
        {
            return Err(Error::IssuerMismatch);
        }

        let previous = self.store.get_crl(issuer_alias).or_else(|| {
            self.store
                .get_all_crls()
                .into_iter()
                .find(|crl| names_equal(&crl.tbs_cert_list.issuer, &issuer_name))
        });

        let this_update = proto.this_update.unwrap_or_else(today);
        if issuer.not_before() > this_update {
            return Err(Error::IssuerNotYetValid);
        }
        if issuer.not_after() < this_update {
            return Err(Error::IssuerExpired);
        }
        let next_update = proto
            .next_update
            .unwrap_or_else(|| add_years(this_update, DEFAULT_NEXT_UPDATE_YEARS));

        let mut revoked = previous
            .as_ref()
            .and_then(|crl| crl.tbs_cert_list.revoked_certificates.clone())
            .unwrap_or_default();
        for revocation in proto.revocations.iter() {
            let reason = revocation.reason.unwrap_or(CrlReason::Unspecified);
            revoked.push(RevokedCert {
                serial_number: revocation.serial_number.to_serial_number()?,
                revocation_date: to_time(revocation.revocation_date.unwrap_or_else(today))?,
                crl_entry_extensions: Some(vec![to_extension(&reason, false)?]),
            });
        }

        let previous_extensions = previous.as_ref().and_then(|crl| crl.tbs_cert_list.crl_extensions.clone());
        let number = match (&proto.crl_number, previous_extensions.as_ref()) {
            (Some(number), _) => crl_number(number)?,
            (None, Some(extensions)) => match find_extension::<CrlNumber>(Some(extensions))? {
                Some(CrlNumber(current)) => {
                    crl_number(&Serial::Hex(number_inc(&Serial::from(current.as_bytes()).to_hex())))?
                }
                None => crl_number(&Serial::Int(0))?,
            },
            (None, None) => crl_number(&Serial::Int(0))?,
        };

        let mut extensions: Extensions = previous_extensions.unwrap_or_default();
        set_extension(&mut extensions, to_extension(&authority_key_identifier(&issuer)?, false)?);
        set_extension(&mut extensions, to_extension(&number, false)?);

        let tbs = TbsCertList {
            version: Version::V2,
            signature: self.profile.signature.clone(),
            issuer: issuer_name,
            this_update: to_time(this_update)?,
            next_update: Some(to_time(next_update)?),
            revoked_certificates: if revoked.is_empty() { None } else { Some(revoked) },
            crl_extensions: Some(extensions),
        };

        let key = self.retrieve_private(issuer_alias, password).await?;
        let signature = self.provider.sign(&tbs.signature, &key, &tbs.to_der()?).await?;
        let crl = CertificateList {
            signature_algorithm: tbs.signature.clone(),
            tbs_cert_list: tbs,
            signature: BitString::from_bytes(&signature)?,
        };
        log::info!(
            "Updated CRL of {} with {} new revocations",
            crl.tbs_cert_list.issuer,
            proto.revocations.len()
        );

        self.store.set_crl(issuer_alias, crl.clone());
        Ok(crl)
    }
}
