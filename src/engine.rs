use der::{Encode, asn1::BitString};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::{Certificate, TbsCertificate, crl::CertificateList, request::CertReq};

use crate::{
    Result,
    cert::CertificateExt,
    error::Error,
    input::OutputFormat,
    key::PrivateKey,
    keystore::{KeyStore, MemoryKeyStore},
    profile::ProviderProfile,
    provider::CryptoProvider,
};

const DEFAULT_MAX_NESTING_DEPTH: usize = 16;

/// PKIX engine: certification paths, certificate and CRL issuance, CMS messages and PKCS#12 stores.
///
/// The engine owns a [CryptoProvider] for every primitive, a [KeyStore] with the objects it operates on
/// and a [ProviderProfile] naming the algorithms it uses for new objects.
pub struct Pkix<P: CryptoProvider, S: KeyStore = MemoryKeyStore> {
    pub(crate) provider: P,
    pub(crate) store: S,
    pub(crate) profile: ProviderProfile,
    pub(crate) format: OutputFormat,
    pub(crate) max_nesting_depth: usize,
}

impl<P: CryptoProvider, S: KeyStore> Pkix<P, S> {
    /// Create an engine with the `ECDSA-256` profile and DER output
    pub fn new(provider: P, store: S) -> Self {
        Self {
            provider,
            store,
            profile: ProviderProfile::ecdsa_256(),
            format: OutputFormat::default(),
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }

    /// Set output encoding of export operations. Default is [OutputFormat::Der]
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the maximum number of nested envelopes unwrapped by `extract_data`. Default is 16
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_profile(mut self, profile: ProviderProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Certificate stored under the alias
    pub(crate) fn certificate(&self, alias: &str) -> Result<Certificate> {
        self.store
            .get_certificate(alias)
            .ok_or_else(|| Error::CertificateNotFound(alias.to_owned()))
    }

    /// Key identifier of a public key: leading 20 bytes of the profile digest over the encoded SPKI
    pub(crate) async fn key_identifier(&self, spki: &SubjectPublicKeyInfoOwned) -> Result<Vec<u8>> {
        let mut digest = self.provider.digest(&self.profile.digest, &spki.to_der()?).await?;
        digest.truncate(20);
        Ok(digest)
    }

    pub(crate) async fn sign_certificate(&self, tbs: TbsCertificate, key: &PrivateKey) -> Result<Certificate> {
        let signature = self.provider.sign(&tbs.signature, key, &tbs.to_der()?).await?;
        Ok(Certificate {
            signature_algorithm: tbs.signature.clone(),
            tbs_certificate: tbs,
            signature: BitString::from_bytes(&signature)?,
        })
    }

    /// Verify the signature of `cert` with the public key of `issuer`
    pub(crate) async fn verify_certificate_signature(&self, cert: &Certificate, issuer: &Certificate) -> Result<()> {
        let valid = self
            .provider
            .verify(
                &cert.signature_algorithm,
                &issuer.tbs_certificate.subject_public_key_info,
                cert.signature.raw_bytes(),
                &cert.tbs_der()?,
            )
            .await?;
        if valid { Ok(()) } else { Err(Error::SignatureInvalid) }
    }

    pub(crate) async fn verify_crl_signature(&self, crl: &CertificateList, issuer: &Certificate) -> Result<()> {
        let valid = self
            .provider
            .verify(
                &crl.signature_algorithm,
                &issuer.tbs_certificate.subject_public_key_info,
                crl.signature.raw_bytes(),
                &crate::cert::crl_tbs_der(crl)?,
            )
            .await?;
        if valid { Ok(()) } else { Err(Error::SignatureInvalid) }
    }

    /// Verify the self-signature of a certification request
    pub(crate) async fn verify_request_signature(&self, request: &CertReq) -> Result<()> {
        let valid = self
            .provider
            .verify(
                &request.algorithm,
                &request.info.public_key,
                request.signature.raw_bytes(),
                &request.info.to_der()?,
            )
            .await?;
        if valid { Ok(()) } else { Err(Error::SignatureInvalid) }
    }
}
