//!
//! PKCS#12 import and export of the key store
//!
use std::collections::BTreeMap;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use cms::{
    content_info::{CmsVersion, ContentInfo},
    encrypted_data::EncryptedData,
    signed_data::SignedData,
};
use der::{Any, Decode, Encode, asn1::OctetString};
use pkcs12::{
    authenticated_safe::AuthenticatedSafe,
    digest_info::DigestInfo,
    mac_data::MacData,
    pfx::{Pfx, Version},
    safe_bag::{SafeBag, SafeContents},
};
use spki::AlgorithmIdentifierOwned;

use crate::{
    Result,
    codec::{self, BagItem, ParsedBag},
    engine::Pkix,
    error::Error,
    input::{Encoded, PKCS12_LABEL, unarmor},
    key::{Key, StoredKey},
    keystore::KeyStore,
    oid,
    provider::{CryptoProvider, Derivation},
};

/// Protection of the exported safe contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExportMode {
    /// Plain safe contents, integrity by MAC only. Keys are still individually encrypted when a password is given.
    #[default]
    Mac,
    /// Safe contents encrypted with PBES2 under the store password
    Encrypt,
}

/// MAC algorithm to use when creating the PKCS#12 file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum MacAlgorithm {
    HmacSha1,
    HmacSha256,
}

impl MacAlgorithm {
    fn digest_oid(&self) -> der::asn1::ObjectIdentifier {
        match self {
            MacAlgorithm::HmacSha1 => oid::SHA1_OID,
            MacAlgorithm::HmacSha256 => oid::SHA256_OID,
        }
    }

    fn output_len(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha1 => 20,
            MacAlgorithm::HmacSha256 => 32,
        }
    }
}

/// PKCS#12 export options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    mode: ExportMode,
    mac_algorithm: MacAlgorithm,
    mac_iterations: i32,
    encryption_iterations: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            mode: ExportMode::Mac,
            mac_algorithm: MacAlgorithm::HmacSha256,
            mac_iterations: 10000,
            encryption_iterations: 10000,
        }
    }
}

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set export mode. Default is [ExportMode::Mac]
    pub fn mode(mut self, mode: ExportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set MAC algorithm. Default is [MacAlgorithm::HmacSha256]
    pub fn mac_algorithm(mut self, algorithm: MacAlgorithm) -> Self {
        self.mac_algorithm = algorithm;
        self
    }

    /// Set MAC iterations. Default is 10000
    pub fn mac_iterations(mut self, iterations: i32) -> Self {
        self.mac_iterations = iterations;
        self
    }

    /// Set encryption iterations. Default is 10000
    pub fn encryption_iterations(mut self, iterations: u32) -> Self {
        self.encryption_iterations = iterations;
        self
    }
}

fn mac_digest_len(algorithm: &AlgorithmIdentifierOwned) -> Result<usize> {
    match algorithm.oid {
        oid::SHA1_OID => Ok(MacAlgorithm::HmacSha1.output_len()),
        oid::SHA256_OID => Ok(MacAlgorithm::HmacSha256.output_len()),
        other => Err(Error::UnsupportedAlgorithm(other)),
    }
}

impl<P: CryptoProvider, S: KeyStore> Pkix<P, S> {
    fn random_alias(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.provider.random(12))
    }

    async fn verify_pfx_mac(&self, mac_data: &MacData, password: &str, data: &[u8]) -> Result<()> {
        let digest = &mac_data.mac.algorithm;
        let key = self
            .provider
            .derive_key(
                Derivation::Pkcs12Mac {
                    password,
                    salt: mac_data.mac_salt.as_bytes(),
                    iterations: mac_data.iterations,
                    digest: digest.oid,
                },
                mac_digest_len(digest)?,
            )
            .await?;
        self.provider
            .verify_mac(digest, &key, data, mac_data.mac.digest.as_bytes())
            .await?;
        log::debug!("PKCS#12 MAC verified");
        Ok(())
    }

    async fn compute_pfx_mac(&self, data: &[u8], options: &ExportOptions, password: &str) -> Result<MacData> {
        let algorithm = options.mac_algorithm;
        let digest = AlgorithmIdentifierOwned {
            oid: algorithm.digest_oid(),
            parameters: None,
        };
        let salt = self.provider.random(algorithm.output_len());
        let key = self
            .provider
            .derive_key(
                Derivation::Pkcs12Mac {
                    password,
                    salt: &salt,
                    iterations: options.mac_iterations,
                    digest: digest.oid,
                },
                algorithm.output_len(),
            )
            .await?;
        let mac = self.provider.mac(&digest, &key, data).await?;

        Ok(MacData {
            mac: DigestInfo {
                algorithm: digest,
                digest: OctetString::new(mac)?,
            },
            mac_salt: OctetString::new(salt)?,
            iterations: options.mac_iterations,
        })
    }

    /// Bags of one authenticated safe element
    async fn open_safe(&self, safe: &ContentInfo, password: Option<&str>) -> Result<Vec<ParsedBag>> {
        let data = match safe.content_type {
            oid::CONTENT_TYPE_DATA_OID => OctetString::from_der(&safe.content.to_der()?)?.into_bytes(),
            oid::CONTENT_TYPE_ENCRYPTED_DATA_OID => {
                let encrypted = EncryptedData::from_der(&safe.content.to_der()?)?;
                if encrypted.version != CmsVersion::V0 {
                    return Err(Error::InvalidVersion);
                }
                let password = password.ok_or(Error::PasswordRequired)?;
                let info = &encrypted.enc_content_info;
                match info.encrypted_content {
                    Some(ref content) => {
                        self.pbes2_decrypt(&info.content_enc_alg, password, content.as_bytes())
                            .await?
                    }
                    None => return Ok(Vec::new()),
                }
            }
            other => return Err(Error::UnsupportedContentType(other)),
        };
        codec::parse_bags(SafeContents::from_der(&data)?, 0)
    }

    /// Import a PKCS#12 store, DER or PEM, into the key store.
    ///
    /// With a password the MAC is mandatory and must verify. Nothing is stored unless every bag decodes.
    /// Returns the aliases of the imported entries.
    pub async fn import_key_store(&mut self, input: &[u8], password: Option<&str>) -> Result<Vec<String>> {
        let pfx = Pfx::from_der(&unarmor(input))?;
        if pfx.version != Version::V3 {
            return Err(Error::InvalidVersion);
        }

        match (password, pfx.mac_data.as_ref()) {
            (Some(password), Some(mac_data)) => {
                self.verify_pfx_mac(mac_data, password, pfx.auth_safe.content.value())
                    .await?
            }
            (Some(_), None) => return Err(Error::MissingField("macData")),
            (None, Some(_)) => return Err(Error::PasswordRequired),
            (None, None) => {}
        }

        let content = match pfx.auth_safe.content_type {
            oid::CONTENT_TYPE_DATA_OID => OctetString::from_der(&pfx.auth_safe.content.to_der()?)?.into_bytes(),
            oid::CONTENT_TYPE_SIGNED_DATA_OID => {
                let signed = SignedData::from_der(&pfx.auth_safe.content.to_der()?)?;
                self.verify_signed(&signed, None).await?.content
            }
            other => return Err(Error::UnsupportedContentType(other)),
        };

        let safes = AuthenticatedSafe::from_der(&content)?;
        let mut parsed = Vec::new();
        for safe in safes.iter() {
            parsed.extend(self.open_safe(safe, password).await?);
        }

        // bags sharing a localKeyId share the alias of the one carrying a friendlyName
        let mut linked: BTreeMap<Vec<u8>, String> = parsed
            .iter()
            .filter_map(|bag| Some((bag.local_key_id.clone()?, bag.friendly_name.clone()?)))
            .collect();

        let mut aliases: Vec<String> = Vec::new();
        for bag in parsed {
            let alias = match (bag.friendly_name, bag.local_key_id) {
                (Some(name), _) => name,
                (None, Some(id)) => linked.entry(id).or_insert_with(|| self.random_alias()).clone(),
                (None, None) => self.random_alias(),
            };

            match bag.item {
                BagItem::Key(key) => self.store.set_key(&alias, key),
                BagItem::Certificate(cert) => self.store.set_certificate(&alias, cert),
                BagItem::Crl(crl) => self.store.set_crl(&alias, crl),
            }
            if !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }

        log::info!("Imported {} key store entries", aliases.len());
        Ok(aliases)
    }

    /// Bags for every certificate, CRL and key of the store
    async fn export_bags(&self, password: Option<&str>, options: &ExportOptions) -> Result<Vec<SafeBag>> {
        let mut bags = Vec::new();

        for alias in self.store.aliases() {
            if let Some(cert) = self.store.get_certificate(&alias) {
                bags.push(codec::certificate_to_safe_bag(&cert, &alias)?);
            }
            if let Some(crl) = self.store.get_crl(&alias) {
                bags.push(codec::crl_to_safe_bag(&crl, &alias)?);
            }
            match (self.store.get_key(&alias), password) {
                (Some(StoredKey::Private(key)), Some(password)) => {
                    let info = self
                        .protect_key(&Key::Private(key), password, options.encryption_iterations)
                        .await?;
                    bags.push(codec::encrypted_key_to_safe_bag(&info, &alias)?);
                }
                (Some(StoredKey::Private(key)), None) => bags.push(codec::private_key_to_safe_bag(&key, &alias)?),
                (Some(StoredKey::Secret(secret)), Some(password)) => {
                    let key = Key::Secret(secret);
                    let info = self.protect_key(&key, password, options.encryption_iterations).await?;
                    bags.push(codec::secret_to_safe_bag(&key, Some(&info), &alias)?);
                }
                (Some(StoredKey::Secret(secret)), None) => {
                    bags.push(codec::secret_to_safe_bag(&Key::Secret(secret), None, &alias)?)
                }
                (Some(StoredKey::Encrypted(info)), _) => bags.push(codec::encrypted_key_to_safe_bag(&info, &alias)?),
                (None, _) => {}
            }
        }

        Ok(bags)
    }

    /// Assemble a PFX around the bags. Without a password no MAC is computed.
    pub(crate) async fn build_pfx(
        &self,
        bags: Vec<SafeBag>,
        password: Option<&str>,
        options: &ExportOptions,
    ) -> Result<Encoded> {
        let safe = match (options.mode, password) {
            (ExportMode::Encrypt, Some(password)) => {
                let (algorithm, encrypted) = self
                    .pbes2_encrypt(password, options.encryption_iterations, &bags.to_der()?)
                    .await?;
                codec::encrypted_to_content_info(algorithm, encrypted)?
            }
            (ExportMode::Encrypt, None) => return Err(Error::PasswordRequired),
            (ExportMode::Mac, _) => codec::data_to_content_info(&bags)?,
        };

        let safes = OctetString::new(vec![safe].to_der()?)?;
        let auth_safe = ContentInfo {
            content_type: oid::CONTENT_TYPE_DATA_OID,
            content: Any::from_der(&safes.to_der()?)?,
        };

        let mac_data = match password {
            Some(password) => Some(
                self.compute_pfx_mac(auth_safe.content.value(), options, password)
                    .await?,
            ),
            None => None,
        };

        let pfx = Pfx {
            version: Version::V3,
            auth_safe,
            mac_data,
        };
        Encoded::encode(self.format, PKCS12_LABEL, &pfx)
    }

    /// Export the whole key store as PKCS#12
    pub async fn export_key_store(&self, password: Option<&str>, options: &ExportOptions) -> Result<Encoded> {
        let bags = self.export_bags(password, options).await?;
        log::info!("Exporting {} bags", bags.len());
        self.build_pfx(bags, password, options).await
    }
}
