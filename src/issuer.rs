//!
//! Self-signed certificates, certification requests and certificates issued from requests
//!
use chrono::{DateTime, Utc};
use der::{
    Any, Decode, Encode,
    asn1::{BitString, OctetString, SetOfVec},
    oid::AssociatedOid,
};
use x509_cert::{
    Certificate, TbsCertificate,
    attr::Attribute,
    certificate::Version,
    ext::{
        Extensions,
        pkix::{
            AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectKeyIdentifier,
            name::GeneralName,
        },
    },
    name::Name,
    request::{CertReq, CertReqInfo, ExtensionReq, Version as RequestVersion},
    time::Validity,
};

use crate::{
    Result,
    cert::{CertificateExt, find_extension, requested_extensions, set_extension, to_extension},
    engine::Pkix,
    error::Error,
    key::Key,
    keystore::KeyStore,
    name::names_equal,
    oid,
    provider::CryptoProvider,
    serial::{Serial, number_inc},
    time::{add_years, to_time, today},
};

const DEFAULT_VALIDITY_YEARS: u32 = 25;

/// Requested content of a new certificate or certification request. Unset fields take defaults.
#[derive(Debug, Clone, Default)]
pub struct CertificatePrototype {
    pub subject: Option<Name>,
    pub serial_number: Option<Serial>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    /// Extensions that replace the defaults with the same id
    pub extensions: Extensions,
}

impl CertificatePrototype {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: Name) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn serial_number<S: Into<Serial>>(mut self, serial: S) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn not_before(mut self, date: DateTime<Utc>) -> Self {
        self.not_before = Some(date);
        self
    }

    pub fn not_after(mut self, date: DateTime<Utc>) -> Self {
        self.not_after = Some(date);
        self
    }

    /// Add an extension, replacing a previous one with the same id
    pub fn extension<T>(mut self, value: &T, critical: bool) -> Result<Self>
    where
        T: AssociatedOid + Encode,
    {
        set_extension(&mut self.extensions, to_extension(value, critical)?);
        Ok(self)
    }
}

fn ca_key_usage() -> KeyUsage {
    KeyUsage(
        KeyUsages::DigitalSignature
            | KeyUsages::NonRepudiation
            | KeyUsages::KeyEncipherment
            | KeyUsages::DataEncipherment
            | KeyUsages::KeyAgreement
            | KeyUsages::KeyCertSign
            | KeyUsages::CRLSign,
    )
}

fn end_entity_key_usage() -> KeyUsage {
    KeyUsage(
        KeyUsages::DigitalSignature
            | KeyUsages::NonRepudiation
            | KeyUsages::KeyEncipherment
            | KeyUsages::DataEncipherment
            | KeyUsages::KeyAgreement,
    )
}

fn request_key_usage() -> KeyUsage {
    KeyUsage(
        KeyUsages::DigitalSignature
            | KeyUsages::NonRepudiation
            | KeyUsages::DataEncipherment
            | KeyUsages::KeyAgreement,
    )
}

fn ca_ext_key_usage() -> ExtendedKeyUsage {
    ExtendedKeyUsage(vec![
        oid::KP_SERVER_AUTH_OID,
        oid::KP_CLIENT_AUTH_OID,
        oid::KP_CODE_SIGNING_OID,
        oid::KP_EMAIL_PROTECTION_OID,
        oid::KP_IPSEC_END_SYSTEM_OID,
        oid::KP_IPSEC_TUNNEL_OID,
        oid::KP_IPSEC_USER_OID,
        oid::KP_TIME_STAMPING_OID,
        oid::KP_OCSP_SIGNING_OID,
    ])
}

fn end_entity_ext_key_usage() -> ExtendedKeyUsage {
    ExtendedKeyUsage(vec![oid::KP_CLIENT_AUTH_OID, oid::KP_EMAIL_PROTECTION_OID])
}

/// Authority key identifier pointing at `issuer`: its key identifier, the name it was issued under and its serial
pub(crate) fn authority_key_identifier(issuer: &Certificate) -> Result<AuthorityKeyIdentifier> {
    Ok(AuthorityKeyIdentifier {
        key_identifier: issuer.subject_key_identifier()?.map(OctetString::new).transpose()?,
        authority_cert_issuer: Some(vec![GeneralName::DirectoryName(issuer.tbs_certificate.issuer.clone())]),
        authority_cert_serial_number: Some(issuer.tbs_certificate.serial_number.clone()),
    })
}

impl<P: CryptoProvider, S: KeyStore> Pkix<P, S> {
    /// Generate a key pair and a self-signed certificate for it, both stored under `alias`.
    /// The private key is password protected when a password is given.
    pub async fn create_certificate(
        &mut self,
        proto: &CertificatePrototype,
        alias: &str,
        password: Option<&str>,
    ) -> Result<Certificate> {
        let subject = proto.subject.clone().ok_or(Error::MissingField("subject"))?;
        let pair = self.provider.generate_key_pair(&self.profile.generation).await?;
        let key_id = self.key_identifier(&pair.public_key).await?;

        let serial_number = proto.serial_number.clone().unwrap_or(Serial::Int(1)).to_serial_number()?;
        let not_before = proto.not_before.unwrap_or_else(today);
        let not_after = proto
            .not_after
            .unwrap_or_else(|| add_years(not_before, DEFAULT_VALIDITY_YEARS));

        let mut extensions = Extensions::new();
        set_extension(&mut extensions, to_extension(&ca_key_usage(), true)?);
        set_extension(
            &mut extensions,
            to_extension(
                &BasicConstraints {
                    ca: true,
                    path_len_constraint: None,
                },
                true,
            )?,
        );
        set_extension(&mut extensions, to_extension(&ca_ext_key_usage(), false)?);
        set_extension(
            &mut extensions,
            to_extension(&SubjectKeyIdentifier(OctetString::new(key_id.clone())?), false)?,
        );
        let aki = AuthorityKeyIdentifier {
            key_identifier: Some(OctetString::new(key_id)?),
            authority_cert_issuer: Some(vec![GeneralName::DirectoryName(subject.clone())]),
            authority_cert_serial_number: Some(serial_number.clone()),
        };
        set_extension(&mut extensions, to_extension(&aki, false)?);
        for ext in proto.extensions.iter() {
            set_extension(&mut extensions, ext.clone());
        }

        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number,
            signature: self.profile.signature.clone(),
            issuer: subject.clone(),
            validity: Validity {
                not_before: to_time(not_before)?,
                not_after: to_time(not_after)?,
            },
            subject,
            subject_public_key_info: pair.public_key,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        };

        let cert = self.sign_certificate(tbs, &pair.private_key).await?;
        log::info!("Created self-signed certificate {}", cert.tbs_certificate.subject);

        self.store_key(Key::Private(pair.private_key), alias, password).await?;
        self.store.set_certificate(alias, cert.clone());
        Ok(cert)
    }

    /// Generate a key pair and a self-signed certification request, both stored under `alias`
    pub async fn create_request(
        &mut self,
        proto: &CertificatePrototype,
        alias: &str,
        password: Option<&str>,
    ) -> Result<CertReq> {
        let subject = proto.subject.clone().ok_or(Error::MissingField("subject"))?;
        let pair = self.provider.generate_key_pair(&self.profile.generation).await?;
        let key_id = self.key_identifier(&pair.public_key).await?;

        let mut extensions = Extensions::new();
        set_extension(&mut extensions, to_extension(&request_key_usage(), true)?);
        set_extension(&mut extensions, to_extension(&end_entity_ext_key_usage(), false)?);
        set_extension(
            &mut extensions,
            to_extension(&SubjectKeyIdentifier(OctetString::new(key_id)?), false)?,
        );
        for ext in proto.extensions.iter() {
            set_extension(&mut extensions, ext.clone());
        }

        let mut attributes = SetOfVec::new();
        attributes.insert(Attribute {
            oid: oid::EXTENSION_REQUEST_OID,
            values: SetOfVec::from_iter([Any::from_der(&ExtensionReq(extensions).to_der()?)?])?,
        })?;

        let info = CertReqInfo {
            version: RequestVersion::V1,
            subject,
            public_key: pair.public_key,
            attributes,
        };
        let signature = self
            .provider
            .sign(&self.profile.signature, &pair.private_key, &info.to_der()?)
            .await?;
        let request = CertReq {
            info,
            algorithm: self.profile.signature.clone(),
            signature: BitString::from_bytes(&signature)?,
        };

        self.store_key(Key::Private(pair.private_key), alias, password).await?;
        self.store.set_request(alias, request.clone());
        Ok(request)
    }

    /// Next serial number for a certificate issued under `issuer`: one above the largest stored one
    fn next_serial(&self, issuer: &Name) -> String {
        let max = self
            .store
            .get_all_certificates()
            .iter()
            .filter(|c| names_equal(&c.tbs_certificate.issuer, issuer))
            .map(|c| c.serial())
            .max_by(|a, b| a.compare(b));
        match max {
            Some(max) => number_inc(&max.to_hex()),
            None => "0x1".to_owned(),
        }
    }

    /// Issue a certificate for the request stored under `req_alias`, signed by the key under `issuer_alias`.
    /// The certificate is stored under `req_alias`.
    pub async fn issue_certificate(
        &mut self,
        proto: &CertificatePrototype,
        req_alias: &str,
        issuer_alias: &str,
        password: Option<&str>,
    ) -> Result<Certificate> {
        let request = self
            .store
            .get_request(req_alias)
            .ok_or_else(|| Error::RequestNotFound(req_alias.to_owned()))?;
        self.verify_request_signature(&request).await?;

        let issuer = self.certificate(issuer_alias)?;
        if let Some(usage) = issuer.key_usage()?
            && !usage.key_cert_sign()
        {
            return Err(Error::KeyUsageNotPermitted("keyCertSign"));
        }

        let not_before = proto.not_before.unwrap_or_else(today);
        if issuer.not_before() > not_before {
            return Err(Error::IssuerNotYetValid);
        }
        if issuer.not_after() < not_before {
            return Err(Error::IssuerExpired);
        }
        let not_after = proto.not_after.unwrap_or_else(|| issuer.not_after());

        let issuer_name = issuer.tbs_certificate.subject.clone();
        let serial_number = match proto.serial_number {
            Some(ref serial) => serial.to_serial_number()?,
            None => Serial::Hex(self.next_serial(&issuer_name)).to_serial_number()?,
        };

        let mut extensions = Extensions::new();
        set_extension(&mut extensions, to_extension(&end_entity_key_usage(), true)?);
        set_extension(&mut extensions, to_extension(&end_entity_ext_key_usage(), false)?);
        for ext in requested_extensions(&request)? {
            set_extension(&mut extensions, ext);
        }
        for ext in proto.extensions.iter() {
            set_extension(&mut extensions, ext.clone());
        }

        if !extensions.iter().any(|ext| ext.extn_id == BasicConstraints::OID) {
            let ca = find_extension::<KeyUsage>(Some(&extensions))?.is_some_and(|u| u.key_cert_sign());
            let path_len_constraint = match issuer.basic_constraints()?.and_then(|c| c.path_len_constraint) {
                Some(len) if ca => Some(len.saturating_add(1)),
                None if ca => Some(0),
                _ => None,
            };
            let constraints = BasicConstraints {
                ca,
                path_len_constraint,
            };
            set_extension(&mut extensions, to_extension(&constraints, true)?);
        }

        let key_id = self.key_identifier(&request.info.public_key).await?;
        set_extension(
            &mut extensions,
            to_extension(&SubjectKeyIdentifier(OctetString::new(key_id)?), false)?,
        );
        set_extension(&mut extensions, to_extension(&authority_key_identifier(&issuer)?, false)?);

        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number,
            signature: self.profile.signature.clone(),
            issuer: issuer_name,
            validity: Validity {
                not_before: to_time(not_before)?,
                not_after: to_time(not_after)?,
            },
            subject: request.info.subject.clone(),
            subject_public_key_info: request.info.public_key.clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        };

        let key = self.retrieve_private(issuer_alias, password).await?;
        let cert = self.sign_certificate(tbs, &key).await?;
        log::info!(
            "Issued certificate {} with serial {}",
            cert.tbs_certificate.subject,
            cert.serial()
        );

        self.store.set_certificate(req_alias, cert.clone());
        Ok(cert)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use futures::executor::block_on;
    use sha2::Digest;

    use super::*;
    use crate::{keystore::MemoryKeyStore, profile::ProviderProfile, software::SoftwareProvider};

    #[test]
    fn test_self_signed_defaults() {
        let mut pkix = Pkix::new(SoftwareProvider::new(), MemoryKeyStore::new())
            .with_profile(ProviderProfile::ecdsa_256().with_iterations(16));
        let proto = CertificatePrototype::new().subject(Name::from_str("CN=Root CA,O=Test").unwrap());

        let cert = block_on(pkix.create_certificate(&proto, "root", None)).unwrap();

        assert!(cert.is_self_signed());
        assert!(cert.serial().compare(&Serial::Int(1)).is_eq());
        assert!(cert.key_usage().unwrap().unwrap().key_cert_sign());
        assert!(cert.basic_constraints().unwrap().unwrap().ca);
        assert_eq!(cert.ext_key_usage().unwrap().unwrap().0.len(), 9);

        let ski = cert.subject_key_identifier().unwrap().unwrap();
        let spki = cert.tbs_certificate.subject_public_key_info.to_der().unwrap();
        assert_eq!(ski, sha2::Sha256::digest(&spki)[..20].to_vec());
        let aki = cert.authority_key_identifier().unwrap().unwrap();
        assert_eq!(aki.key_identifier.unwrap().as_bytes(), ski.as_slice());

        assert_eq!(cert.not_after(), add_years(cert.not_before(), 25));
        assert!(pkix.store().get_key("root").is_some());
        assert!(pkix.store().get_certificate("root").is_some());
    }

    #[test]
    fn test_missing_subject() {
        let mut pkix = Pkix::new(SoftwareProvider::new(), MemoryKeyStore::new());
        let err = block_on(pkix.create_certificate(&CertificatePrototype::new(), "root", None)).unwrap_err();
        assert!(matches!(err, Error::MissingField("subject")));
        assert!(!pkix.store().contains_alias("root"));
    }
}
