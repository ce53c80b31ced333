use chrono::Utc;
use cms::{
    cert::{CertificateChoices, IssuerAndSerialNumber, x509::attr::Attribute},
    content_info::{CmsVersion, ContentInfo},
    digested_data::DigestedData,
    signed_data::{
        CertificateSet, EncapsulatedContentInfo, SignedAttributes, SignedData, SignerIdentifier, SignerInfo,
        SignerInfos,
    },
};
use der::{
    Any, Decode, Encode,
    asn1::{ObjectIdentifier, OctetString, SetOfVec},
};
use futures::future::try_join_all;
use x509_cert::Certificate;

use super::{CmsContent, Extracted, econtent, econtent_octets};
use crate::{
    Result,
    cert::CertificateExt,
    engine::Pkix,
    error::Error,
    input::{CMS_LABEL, Encoded},
    keystore::KeyStore,
    oid,
    provider::CryptoProvider,
    time::to_time,
};

/// Signing options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignMode {
    /// Leave the content out of the signed data
    Detached,
    /// Sign content type, message digest and signing time attributes instead of the content
    Attrs,
    /// Embed the signer's certification path
    CertPath,
}

fn attribute<T: Encode>(oid: ObjectIdentifier, value: &T) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![Any::from_der(&value.to_der()?)?])?,
    })
}

fn signed_attributes(content_type: ObjectIdentifier, digest: &[u8]) -> Result<SignedAttributes> {
    let mut attrs = SignedAttributes::new();
    attrs.insert(attribute(oid::CONTENT_TYPE_ATTR_OID, &content_type)?)?;
    attrs.insert(attribute(oid::MESSAGE_DIGEST_ATTR_OID, &OctetString::new(digest)?)?)?;
    attrs.insert(attribute(oid::SIGNING_TIME_ATTR_OID, &to_time(Utc::now())?)?)?;
    Ok(attrs)
}

fn message_digest(attrs: &SignedAttributes) -> Result<Vec<u8>> {
    let value = attrs
        .iter()
        .find(|a| a.oid == oid::MESSAGE_DIGEST_ATTR_OID)
        .and_then(|a| a.values.get(0))
        .ok_or(Error::MissingField("messageDigest"))?;
    Ok(OctetString::from_der(&value.to_der()?)?.into_bytes())
}

fn sid_matches(sid: &SignerIdentifier, cert: &Certificate) -> bool {
    match sid {
        SignerIdentifier::IssuerAndSerialNumber(id) => cert.matches_issuer_and_serial(id),
        SignerIdentifier::SubjectKeyIdentifier(ski) => {
            matches!(cert.subject_key_identifier(), Ok(Some(own)) if own == ski.0.as_bytes())
        }
    }
}

fn describe_sid(sid: &SignerIdentifier) -> String {
    match sid {
        SignerIdentifier::IssuerAndSerialNumber(id) => {
            format!("{} {}", id.issuer, hex::encode(id.serial_number.as_bytes()))
        }
        SignerIdentifier::SubjectKeyIdentifier(ski) => hex::encode(ski.0.as_bytes()),
    }
}

impl<P: CryptoProvider, S: KeyStore> Pkix<P, S> {
    /// Sign data with the key and certificate stored under `alias`.
    ///
    /// Signed data input gets one more signer; any other input becomes the encapsulated content
    /// of a new signed data.
    pub async fn sign_data(
        &self,
        data: &[u8],
        modes: &[SignMode],
        alias: &str,
        password: Option<&str>,
    ) -> Result<Encoded> {
        let cert = self.certificate(alias)?;
        let key = self.retrieve_private(alias, password).await?;

        let (mut signed, payload) = match CmsContent::from_bytes(data)? {
            CmsContent::Signed(signed) => {
                let payload = match signed.encap_content_info.econtent {
                    Some(ref content) => econtent_octets(content)?,
                    None => return Err(Error::MissingField("eContent")),
                };
                (signed, payload)
            }
            content => {
                let econtent_type = content.content_type();
                let payload = content.payload()?;
                let signed = SignedData {
                    version: if econtent_type == oid::CONTENT_TYPE_DATA_OID {
                        CmsVersion::V1
                    } else {
                        CmsVersion::V3
                    },
                    digest_algorithms: SetOfVec::new(),
                    encap_content_info: EncapsulatedContentInfo {
                        econtent_type,
                        econtent: Some(econtent(&payload)?),
                    },
                    certificates: None,
                    crls: None,
                    signer_infos: SignerInfos(SetOfVec::new()),
                };
                (signed, payload)
            }
        };

        let digest_alg = self.profile.digest.clone();
        let signed_attrs = if modes.contains(&SignMode::Attrs) {
            let digest = self.provider.digest(&digest_alg, &payload).await?;
            Some(signed_attributes(signed.encap_content_info.econtent_type, &digest)?)
        } else {
            None
        };
        let to_sign = match signed_attrs {
            Some(ref attrs) => attrs.to_der()?,
            None => payload,
        };
        let signature = self.provider.sign(&self.profile.signature, &key, &to_sign).await?;

        let signer = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: cert.tbs_certificate.issuer.clone(),
                serial_number: cert.tbs_certificate.serial_number.clone(),
            }),
            digest_alg: digest_alg.clone(),
            signed_attrs,
            signature_algorithm: self.profile.signature.clone(),
            signature: OctetString::new(signature)?,
            unsigned_attrs: None,
        };

        if !signed.digest_algorithms.iter().any(|alg| *alg == digest_alg) {
            signed.digest_algorithms.insert(digest_alg)?;
        }
        signed.signer_infos.0.insert(signer)?;

        if modes.contains(&SignMode::CertPath) {
            let path = self.build_cert_path(&cert, &[], None)?;
            let certificates = signed
                .certificates
                .get_or_insert_with(|| CertificateSet(SetOfVec::new()));
            for cert in path.certificates {
                let choice = CertificateChoices::Certificate(cert);
                if !certificates.0.iter().any(|c| *c == choice) {
                    certificates.0.insert(choice)?;
                }
            }
        }

        if modes.contains(&SignMode::Detached) {
            signed.encap_content_info.econtent = None;
        }

        log::debug!("Signed {} with {}", signed.encap_content_info.econtent_type, alias);

        let info = ContentInfo {
            content_type: oid::CONTENT_TYPE_SIGNED_DATA_OID,
            content: Any::from_der(&signed.to_der()?)?,
        };
        Encoded::encode(self.format, CMS_LABEL, &info)
    }

    /// Wrap data as digested data with the profile digest
    pub async fn digest_data(&self, data: &[u8]) -> Result<Encoded> {
        let content = CmsContent::from_bytes(data)?;
        let payload = content.payload()?;
        let digest = self.provider.digest(&self.profile.digest, &payload).await?;

        let digested = DigestedData {
            version: CmsVersion::V0,
            digest_alg: self.profile.digest.clone(),
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: content.content_type(),
                econtent: Some(econtent(&payload)?),
            },
            digest: OctetString::new(digest)?,
        };

        let info = ContentInfo {
            content_type: oid::CONTENT_TYPE_DIGESTED_DATA_OID,
            content: Any::from_der(&digested.to_der()?)?,
        };
        Encoded::encode(self.format, CMS_LABEL, &info)
    }

    /// Verify signed or digested data. `detached` supplies the content of a detached signature.
    pub async fn verify_data(&self, data: &[u8], detached: Option<&[u8]>) -> Result<Extracted> {
        match CmsContent::from_bytes(data)? {
            CmsContent::Signed(signed) => self.verify_signed(&signed, detached).await,
            CmsContent::Digested(digested) => self.verify_digested(&digested).await,
            other => Err(Error::UnsupportedContentType(other.content_type())),
        }
    }

    pub(crate) async fn verify_digested(&self, digested: &DigestedData) -> Result<Extracted> {
        let content = digested
            .encap_content_info
            .econtent
            .as_ref()
            .ok_or(Error::MissingField("eContent"))?;
        let payload = econtent_octets(content)?;

        let digest = self.provider.digest(&digested.digest_alg, &payload).await?;
        if digest != digested.digest.as_bytes() {
            return Err(Error::DigestMismatch);
        }

        Ok(Extracted {
            content_type: digested.encap_content_info.econtent_type,
            content: payload,
        })
    }

    /// Every signer must verify. Signers are resolved and verified concurrently.
    pub(crate) async fn verify_signed(&self, signed: &SignedData, detached: Option<&[u8]>) -> Result<Extracted> {
        let payload = match (&signed.encap_content_info.econtent, detached) {
            (Some(content), _) => econtent_octets(content)?,
            (None, Some(detached)) => detached.to_vec(),
            (None, None) => return Err(Error::MissingField("eContent")),
        };

        if signed.signer_infos.0.is_empty() {
            return Err(Error::MissingField("signerInfos"));
        }

        let embedded: Vec<Certificate> = signed
            .certificates
            .iter()
            .flat_map(|set| set.0.iter())
            .filter_map(|choice| match choice {
                CertificateChoices::Certificate(cert) => Some(cert.clone()),
                _ => None,
            })
            .collect();

        try_join_all(
            signed
                .signer_infos
                .0
                .iter()
                .map(|signer| self.verify_signer(signer, &payload, &embedded)),
        )
        .await?;

        Ok(Extracted {
            content_type: signed.encap_content_info.econtent_type,
            content: payload,
        })
    }

    /// Signer certificate held by the key store, or an embedded one validated up to a stored certificate
    async fn signer_certificate(&self, sid: &SignerIdentifier, embedded: &[Certificate]) -> Result<Certificate> {
        if let Some(cert) = self
            .store
            .get_all_certificates()
            .into_iter()
            .find(|c| sid_matches(sid, c))
        {
            return Ok(cert);
        }

        let cert = embedded
            .iter()
            .find(|c| sid_matches(sid, c))
            .ok_or_else(|| Error::CertificateNotFound(describe_sid(sid)))?;

        let mut chain = vec![cert.clone()];
        chain.extend(embedded.iter().filter(|c| *c != cert).cloned());
        self.validate_certificate(&chain, None).await?;

        Ok(cert.clone())
    }

    async fn verify_signer(&self, signer: &SignerInfo, payload: &[u8], embedded: &[Certificate]) -> Result<()> {
        let cert = self.signer_certificate(&signer.sid, embedded).await?;

        let signed_data = match signer.signed_attrs {
            Some(ref attrs) => attrs.to_der()?,
            None => payload.to_vec(),
        };
        let valid = self
            .provider
            .verify(
                &signer.signature_algorithm,
                &cert.tbs_certificate.subject_public_key_info,
                signer.signature.as_bytes(),
                &signed_data,
            )
            .await?;
        if !valid {
            return Err(Error::SignatureInvalid);
        }

        if let Some(ref attrs) = signer.signed_attrs {
            let digest = self.provider.digest(&signer.digest_alg, payload).await?;
            if message_digest(attrs)? != digest {
                return Err(Error::DigestMismatch);
            }
        }

        log::debug!("Verified signer {}", cert.tbs_certificate.subject);
        Ok(())
    }
}
