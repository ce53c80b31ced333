use chrono::{DateTime, Utc};
use cms::cert::IssuerAndSerialNumber;
use der::{Decode, DecodeOwned, Encode, asn1::OctetString, oid::AssociatedOid};
use x509_cert::{
    Certificate,
    crl::CertificateList,
    ext::{
        Extension, Extensions,
        pkix::{AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier},
    },
    request::{CertReq, ExtensionReq},
};

use crate::{Result, name::names_equal, oid, serial::Serial, time::from_time};

/// Find and decode an extension by its associated OID
pub(crate) fn find_extension<T>(extensions: Option<&Extensions>) -> Result<Option<T>>
where
    T: AssociatedOid + DecodeOwned,
{
    match extensions.and_then(|e| e.iter().find(|e| e.extn_id == T::OID)) {
        Some(ext) => Ok(Some(T::from_der(ext.extn_value.as_bytes())?)),
        None => Ok(None),
    }
}

/// Encode an extension value
pub(crate) fn to_extension<T>(value: &T, critical: bool) -> Result<Extension>
where
    T: AssociatedOid + Encode,
{
    Ok(Extension {
        extn_id: T::OID,
        critical,
        extn_value: OctetString::new(value.to_der()?)?,
    })
}

/// Insert or replace the extension with the same id
pub(crate) fn set_extension(extensions: &mut Extensions, ext: Extension) {
    match extensions.iter_mut().find(|e| e.extn_id == ext.extn_id) {
        Some(existing) => *existing = ext,
        None => extensions.push(ext),
    }
}

/// Extension accessors and derived properties of an X.509 certificate
pub trait CertificateExt {
    fn subject_key_identifier(&self) -> Result<Option<Vec<u8>>>;
    fn authority_key_identifier(&self) -> Result<Option<AuthorityKeyIdentifier>>;
    fn key_usage(&self) -> Result<Option<KeyUsage>>;
    fn basic_constraints(&self) -> Result<Option<BasicConstraints>>;
    fn ext_key_usage(&self) -> Result<Option<ExtendedKeyUsage>>;
    /// DER encoding of the to-be-signed part
    fn tbs_der(&self) -> Result<Vec<u8>>;
    fn is_self_signed(&self) -> bool;
    fn serial(&self) -> Serial;
    fn not_before(&self) -> DateTime<Utc>;
    fn not_after(&self) -> DateTime<Utc>;
    fn issuer_and_serial(&self) -> IssuerAndSerialNumber;
    fn matches_issuer_and_serial(&self, id: &IssuerAndSerialNumber) -> bool;
}

impl CertificateExt for Certificate {
    fn subject_key_identifier(&self) -> Result<Option<Vec<u8>>> {
        Ok(find_extension::<SubjectKeyIdentifier>(self.tbs_certificate.extensions.as_ref())?
            .map(|ski| ski.0.as_bytes().to_vec()))
    }

    fn authority_key_identifier(&self) -> Result<Option<AuthorityKeyIdentifier>> {
        find_extension(self.tbs_certificate.extensions.as_ref())
    }

    fn key_usage(&self) -> Result<Option<KeyUsage>> {
        find_extension(self.tbs_certificate.extensions.as_ref())
    }

    fn basic_constraints(&self) -> Result<Option<BasicConstraints>> {
        find_extension(self.tbs_certificate.extensions.as_ref())
    }

    fn ext_key_usage(&self) -> Result<Option<ExtendedKeyUsage>> {
        find_extension(self.tbs_certificate.extensions.as_ref())
    }

    fn tbs_der(&self) -> Result<Vec<u8>> {
        Ok(self.tbs_certificate.to_der()?)
    }

    fn is_self_signed(&self) -> bool {
        names_equal(&self.tbs_certificate.subject, &self.tbs_certificate.issuer)
    }

    fn serial(&self) -> Serial {
        Serial::from(&self.tbs_certificate.serial_number)
    }

    fn not_before(&self) -> DateTime<Utc> {
        from_time(&self.tbs_certificate.validity.not_before)
    }

    fn not_after(&self) -> DateTime<Utc> {
        from_time(&self.tbs_certificate.validity.not_after)
    }

    fn issuer_and_serial(&self) -> IssuerAndSerialNumber {
        IssuerAndSerialNumber {
            issuer: self.tbs_certificate.issuer.clone(),
            serial_number: self.tbs_certificate.serial_number.clone(),
        }
    }

    fn matches_issuer_and_serial(&self, id: &IssuerAndSerialNumber) -> bool {
        names_equal(&self.tbs_certificate.issuer, &id.issuer)
            && self.serial().compare(&Serial::from(&id.serial_number)).is_eq()
    }
}

/// DER encoding of the to-be-signed part of a CRL
pub(crate) fn crl_tbs_der(crl: &CertificateList) -> Result<Vec<u8>> {
    Ok(crl.tbs_cert_list.to_der()?)
}

/// Extensions carried by the `extensionRequest` attribute of a certification request
pub(crate) fn requested_extensions(request: &CertReq) -> Result<Extensions> {
    let mut result = Extensions::new();
    for attr in request.info.attributes.iter() {
        if attr.oid == oid::EXTENSION_REQUEST_OID {
            for value in attr.values.iter() {
                let req = ExtensionReq::from_der(&value.to_der()?)?;
                result.extend(req.0);
            }
        }
    }
    Ok(result)
}
