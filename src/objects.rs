//!
//! Import and export of certificates, CRLs and certification requests
//!
use chrono::Utc;
use cms::{
    cert::CertificateChoices,
    content_info::{CmsVersion, ContentInfo},
    revocation::{RevocationInfoChoice, RevocationInfoChoices},
    signed_data::{CertificateSet, EncapsulatedContentInfo, SignedData, SignerInfos},
};
use der::{Any, Decode, Encode, asn1::SetOfVec};
use x509_cert::{
    Certificate,
    crl::CertificateList,
    ext::pkix::AuthorityKeyIdentifier,
    request::CertReq,
};

use crate::{
    Result,
    cert::{CertificateExt, find_extension},
    codec,
    engine::Pkix,
    error::Error,
    input::{CERTIFICATE_LABEL, CRL_LABEL, Encoded, Input, PKCS7_LABEL, REQUEST_LABEL},
    keystore::KeyStore,
    oid,
    path::issuer_selector,
    pfx::ExportOptions,
    provider::CryptoProvider,
    selector::{Selector, select_certificates},
};

/// Certificate and CRL export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExportFormat {
    /// The bare X.509 structure
    #[default]
    X509,
    /// Certificates-only signed data
    P7c,
    /// Single entry PKCS#12 without password
    P12,
}

/// Certificates-only signed data carrying the given certificates and CRLs
fn certs_only(certificates: Vec<Certificate>, crls: Vec<CertificateList>) -> Result<ContentInfo> {
    let certificates = SetOfVec::try_from(
        certificates
            .into_iter()
            .map(CertificateChoices::Certificate)
            .collect::<Vec<_>>(),
    )?;
    let crls = SetOfVec::try_from(crls.into_iter().map(RevocationInfoChoice::Crl).collect::<Vec<_>>())?;

    let signed = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::new(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: oid::CONTENT_TYPE_DATA_OID,
            econtent: None,
        },
        certificates: if certificates.is_empty() { None } else { Some(CertificateSet(certificates)) },
        crls: if crls.is_empty() { None } else { Some(RevocationInfoChoices(crls)) },
        signer_infos: SignerInfos(SetOfVec::new()),
    };

    Ok(ContentInfo {
        content_type: oid::CONTENT_TYPE_SIGNED_DATA_OID,
        content: Any::from_der(&signed.to_der()?)?,
    })
}

impl<P: CryptoProvider, S: KeyStore> Pkix<P, S> {
    /// Store a certificate under the alias.
    ///
    /// The signature is checked against the issuer when the issuer is held by the key store,
    /// a self-signed certificate against itself.
    pub async fn import_certificate(&mut self, alias: &str, input: Input<Certificate>) -> Result<Certificate> {
        let cert = input.resolve()?;

        if cert.is_self_signed() {
            self.verify_certificate_signature(&cert, &cert).await?;
        } else {
            let selector = issuer_selector(&cert, Utc::now())?;
            let stored = self.store.get_all_certificates();
            match select_certificates(&stored, &selector).first() {
                Some(issuer) => self.verify_certificate_signature(&cert, issuer).await?,
                None => log::debug!("Issuer of {} not in the key store", cert.tbs_certificate.subject),
            }
        }

        self.store.set_certificate(alias, cert.clone());
        Ok(cert)
    }

    /// Store a CRL under the alias, checking its signature when the issuer is held by the key store
    pub async fn import_crl(&mut self, alias: &str, input: Input<CertificateList>) -> Result<CertificateList> {
        let crl = input.resolve()?;

        let mut selector = Selector::new()
            .subject(crl.tbs_cert_list.issuer.clone())
            .date(Utc::now());
        if let Some(aki) = find_extension::<AuthorityKeyIdentifier>(crl.tbs_cert_list.crl_extensions.as_ref())?
            && let Some(key_id) = aki.key_identifier
        {
            selector = selector.subject_key_identifier(key_id.as_bytes());
        }

        let stored = self.store.get_all_certificates();
        match select_certificates(&stored, &selector).first() {
            Some(issuer) => self.verify_crl_signature(&crl, issuer).await?,
            None => log::debug!("Issuer of CRL {} not in the key store", crl.tbs_cert_list.issuer),
        }

        self.store.set_crl(alias, crl.clone());
        Ok(crl)
    }

    /// Store a certification request under the alias after checking its self-signature
    pub async fn import_request(&mut self, alias: &str, input: Input<CertReq>) -> Result<CertReq> {
        let request = input.resolve()?;
        self.verify_request_signature(&request).await?;
        self.store.set_request(alias, request.clone());
        Ok(request)
    }

    pub fn export_request(&self, alias: &str) -> Result<Encoded> {
        let request = self
            .store
            .get_request(alias)
            .ok_or_else(|| Error::RequestNotFound(alias.to_owned()))?;
        Encoded::encode(self.format, REQUEST_LABEL, &request)
    }

    pub async fn export_certificate(&self, alias: &str, format: ExportFormat) -> Result<Encoded> {
        let cert = self.certificate(alias)?;
        match format {
            ExportFormat::X509 => Encoded::encode(self.format, CERTIFICATE_LABEL, &cert),
            ExportFormat::P7c => Encoded::encode(self.format, PKCS7_LABEL, &certs_only(vec![cert], Vec::new())?),
            ExportFormat::P12 => {
                let bag = codec::certificate_to_safe_bag(&cert, alias)?;
                self.build_pfx(vec![bag], None, &ExportOptions::default()).await
            }
        }
    }

    pub async fn export_crl(&self, alias: &str, format: ExportFormat) -> Result<Encoded> {
        let crl = self
            .store
            .get_crl(alias)
            .ok_or_else(|| Error::CrlNotFound(alias.to_owned()))?;
        match format {
            ExportFormat::X509 => Encoded::encode(self.format, CRL_LABEL, &crl),
            ExportFormat::P7c => Encoded::encode(self.format, PKCS7_LABEL, &certs_only(Vec::new(), vec![crl])?),
            ExportFormat::P12 => {
                let bag = codec::crl_to_safe_bag(&crl, alias)?;
                self.build_pfx(vec![bag], None, &ExportOptions::default()).await
            }
        }
    }
}

/// Certificates and CRLs carried by certificates-only signed data
pub fn parse_certs_only(data: &[u8]) -> Result<(Vec<Certificate>, Vec<CertificateList>)> {
    let info = ContentInfo::from_der(&crate::input::unarmor(data))?;
    if info.content_type != oid::CONTENT_TYPE_SIGNED_DATA_OID {
        return Err(Error::UnsupportedContentType(info.content_type));
    }
    let signed = SignedData::from_der(&info.content.to_der()?)?;

    let certificates = signed
        .certificates
        .iter()
        .flat_map(|set| set.0.iter())
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => Some(cert.clone()),
            _ => None,
        })
        .collect();
    let crls = signed
        .crls
        .iter()
        .flat_map(|set| set.0.iter())
        .filter_map(|choice| match choice {
            RevocationInfoChoice::Crl(crl) => Some(crl.clone()),
            _ => None,
        })
        .collect();

    Ok((certificates, crls))
}
