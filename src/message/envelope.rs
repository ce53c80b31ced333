use cms::{
    content_info::{CmsVersion, ContentInfo},
    encrypted_data::EncryptedData,
    enveloped_data::{
        EncryptedContentInfo, EnvelopedData, KekIdentifier, KekRecipientInfo, KeyAgreeRecipientIdentifier,
        KeyAgreeRecipientInfo, KeyTransRecipientInfo, OriginatorIdentifierOrKey, OriginatorPublicKey,
        PasswordRecipientInfo, RecipientEncryptedKey, RecipientIdentifier, RecipientInfo, RecipientInfos,
    },
};
use der::{
    Any, Decode, DecodeOwned, Encode, Sequence,
    asn1::{ObjectIdentifier, OctetString, SetOfVec, Utf8StringRef},
};
use futures::future::try_join_all;
use pkcs12::pbe_params::Pbkdf2Params;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::Certificate;

use super::{CmsContent, Extracted};
use crate::{
    Result,
    cert::CertificateExt,
    engine::Pkix,
    error::Error,
    input::{CMS_LABEL, Encoded},
    key::PrivateKey,
    keycodec::{cipher_for_key_len, cipher_key_len, with_iv},
    keystore::KeyStore,
    oid,
    provider::{CryptoProvider, Derivation},
};

const UKM_LEN: usize = 8;
const IV_LEN: usize = 16;

/// Key management mode of [Pkix::encrypt_data]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeMode {
    /// ECDH between an originator key and each recipient certificate
    KeyAgree,
    /// Content key transported to each recipient certificate
    KeyTrans,
    /// Content key wrapped with a stored secret key
    Kek,
    /// Content key wrapped with a password derived key
    PbKek,
    /// Content encrypted directly with a stored secret key
    KeyMan,
    /// Content encrypted with PBES2
    Pbes,
}

/// Recipients of an envelope. Which variant applies depends on the [EnvelopeMode].
#[derive(Debug, Clone, Copy)]
pub enum Recipients<'a> {
    /// Aliases of recipient certificates (`KeyAgree`, `KeyTrans`)
    Certificates(&'a [&'a str]),
    /// Alias of a stored secret key (`Kek`, `KeyMan`)
    SecretKey { alias: &'a str, password: Option<&'a str> },
    /// `PbKek`, `Pbes`
    Password(&'a str),
}

/// Sender key pair used for agreement instead of an ephemeral one
#[derive(Debug, Clone, Copy)]
pub struct Originator<'a> {
    pub alias: &'a str,
    pub password: Option<&'a str>,
}

/// ECC-CMS-SharedInfo, the X9.63 KDF input of RFC 5753
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct EccCmsSharedInfo {
    key_info: AlgorithmIdentifierOwned,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    entity_u_info: Option<OctetString>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT")]
    supp_pub_info: OctetString,
}

/// Parameters of an EC key transport recipient: the originator public key travels with the wrapped key
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct TransportParameters {
    originator_key: SubjectPublicKeyInfoOwned,
    ukm: OctetString,
    key_wrap: AlgorithmIdentifierOwned,
}

fn wrap_key_len(algorithm: &AlgorithmIdentifierOwned) -> Result<usize> {
    match algorithm.oid {
        oid::AES_128_WRAP_OID => Ok(16),
        oid::AES_192_WRAP_OID => Ok(24),
        oid::AES_256_WRAP_OID => Ok(32),
        other => Err(Error::UnsupportedAlgorithm(other)),
    }
}

fn wrap_for_key_len(len: usize) -> Result<AlgorithmIdentifierOwned> {
    let oid = match len {
        16 => oid::AES_128_WRAP_OID,
        24 => oid::AES_192_WRAP_OID,
        32 => oid::AES_256_WRAP_OID,
        _ => return Err(Error::InvalidLength),
    };
    Ok(AlgorithmIdentifierOwned { oid, parameters: None })
}

fn decode_params<T: DecodeOwned>(algorithm: &AlgorithmIdentifierOwned) -> Result<T> {
    let params = algorithm.parameters.as_ref().ok_or(Error::InvalidParameters)?;
    Ok(T::from_der(&params.to_der()?)?)
}

fn rid_matches(rid: &RecipientIdentifier, cert: &Certificate) -> bool {
    match rid {
        RecipientIdentifier::IssuerAndSerialNumber(id) => cert.matches_issuer_and_serial(id),
        RecipientIdentifier::SubjectKeyIdentifier(ski) => {
            matches!(cert.subject_key_identifier(), Ok(Some(own)) if own == ski.0.as_bytes())
        }
    }
}

fn kari_rid_matches(rid: &KeyAgreeRecipientIdentifier, cert: &Certificate) -> bool {
    match rid {
        KeyAgreeRecipientIdentifier::IssuerAndSerialNumber(id) => cert.matches_issuer_and_serial(id),
        KeyAgreeRecipientIdentifier::RKeyId(key_id) => {
            matches!(cert.subject_key_identifier(), Ok(Some(own)) if own == key_id.subject_key_identifier.0.as_bytes())
        }
    }
}

/// Recipient info addressed to the holder of `cert` or of the key encryption key `kek_id`
fn matches_recipient(info: &RecipientInfo, cert: Option<&Certificate>, kek_id: Option<&[u8]>) -> bool {
    match info {
        RecipientInfo::Ktri(ktri) => cert.is_some_and(|c| rid_matches(&ktri.rid, c)),
        RecipientInfo::Kari(kari) => {
            cert.is_some_and(|c| kari.recipient_enc_keys.iter().any(|k| kari_rid_matches(&k.rid, c)))
        }
        RecipientInfo::Kekri(kekri) => kek_id.is_some_and(|id| kekri.kek_id.kek_identifier.as_bytes() == id),
        RecipientInfo::Pwri(_) | RecipientInfo::Ori(_) => false,
    }
}

fn envelope_version(infos: &[RecipientInfo]) -> CmsVersion {
    if infos
        .iter()
        .any(|i| matches!(i, RecipientInfo::Pwri(_) | RecipientInfo::Ori(_)))
    {
        CmsVersion::V3
    } else if infos.iter().any(|i| !matches!(i, RecipientInfo::Ktri(_))) {
        CmsVersion::V2
    } else {
        CmsVersion::V0
    }
}

fn encrypted_data(
    content_type: ObjectIdentifier,
    algorithm: AlgorithmIdentifierOwned,
    encrypted: Vec<u8>,
) -> Result<ContentInfo> {
    let encrypted_data = EncryptedData {
        version: CmsVersion::V0,
        enc_content_info: EncryptedContentInfo {
            content_type,
            content_enc_alg: algorithm,
            encrypted_content: Some(OctetString::new(encrypted)?),
        },
        unprotected_attrs: None,
    };
    Ok(ContentInfo {
        content_type: oid::CONTENT_TYPE_ENCRYPTED_DATA_OID,
        content: Any::from_der(&encrypted_data.to_der()?)?,
    })
}

impl<P: CryptoProvider, S: KeyStore> Pkix<P, S> {
    /// Encrypt data for the given recipients.
    ///
    /// `KeyMan` and `Pbes` produce encrypted data. The other modes produce enveloped data with a fresh
    /// AES content key, wrapped once per recipient.
    pub async fn encrypt_data(
        &self,
        data: &[u8],
        mode: EnvelopeMode,
        recipients: Recipients<'_>,
        originator: Option<Originator<'_>>,
    ) -> Result<Encoded> {
        let content = CmsContent::from_bytes(data)?;
        let content_type = content.content_type();
        let payload = content.payload()?;

        let info = match (mode, recipients) {
            (EnvelopeMode::KeyMan, Recipients::SecretKey { alias, password }) => {
                let secret = self.retrieve_secret(alias, password).await?;
                let algorithm = with_iv(&cipher_for_key_len(secret.key_len())?, &self.provider.random(IV_LEN))?;
                let encrypted = self.provider.encrypt(&algorithm, secret.key(), &payload).await?;
                encrypted_data(content_type, algorithm, encrypted)?
            }
            (EnvelopeMode::Pbes, Recipients::Password(password)) => {
                let (algorithm, encrypted) = self
                    .pbes2_encrypt(password, self.profile.pbkdf2_iterations, &payload)
                    .await?;
                encrypted_data(content_type, algorithm, encrypted)?
            }
            (EnvelopeMode::KeyMan, _) => return Err(Error::InvalidRecipient("keyman requires a secret key")),
            (EnvelopeMode::Pbes, _) => return Err(Error::InvalidRecipient("pbes requires a password")),
            (mode, recipients) => {
                let cek = self.provider.random(cipher_key_len(&self.profile.encryption)?);
                let algorithm = with_iv(&self.profile.encryption, &self.provider.random(IV_LEN))?;
                let encrypted = self.provider.encrypt(&algorithm, &cek, &payload).await?;

                let infos = self.recipient_infos(mode, recipients, originator, &cek).await?;
                let enveloped = EnvelopedData {
                    version: envelope_version(&infos),
                    originator_info: None,
                    recip_infos: RecipientInfos(SetOfVec::try_from(infos)?),
                    encrypted_content: EncryptedContentInfo {
                        content_type,
                        content_enc_alg: algorithm,
                        encrypted_content: Some(OctetString::new(encrypted)?),
                    },
                    unprotected_attrs: None,
                };
                ContentInfo {
                    content_type: oid::CONTENT_TYPE_ENVELOPED_DATA_OID,
                    content: Any::from_der(&enveloped.to_der()?)?,
                }
            }
        };

        Encoded::encode(self.format, CMS_LABEL, &info)
    }

    async fn recipient_infos(
        &self,
        mode: EnvelopeMode,
        recipients: Recipients<'_>,
        originator: Option<Originator<'_>>,
        cek: &[u8],
    ) -> Result<Vec<RecipientInfo>> {
        match (mode, recipients) {
            (EnvelopeMode::KeyAgree | EnvelopeMode::KeyTrans, Recipients::Certificates(aliases)) => {
                if aliases.is_empty() {
                    return Err(Error::InvalidRecipient("no recipient certificate"));
                }
                try_join_all(aliases.iter().map(|alias| async move {
                    if mode == EnvelopeMode::KeyAgree {
                        self.key_agree_recipient(alias, originator, cek).await
                    } else {
                        self.key_trans_recipient(alias, originator, cek).await
                    }
                }))
                .await
            }
            (EnvelopeMode::Kek, Recipients::SecretKey { alias, password }) => {
                Ok(vec![self.kek_recipient(alias, password, cek).await?])
            }
            (EnvelopeMode::PbKek, Recipients::Password(password)) => {
                Ok(vec![self.password_recipient(password, cek).await?])
            }
            (EnvelopeMode::KeyAgree | EnvelopeMode::KeyTrans, _) => {
                Err(Error::InvalidRecipient("key agreement and transport require certificates"))
            }
            (EnvelopeMode::Kek, _) => Err(Error::InvalidRecipient("kek requires a secret key")),
            (EnvelopeMode::PbKek, _) => Err(Error::InvalidRecipient("pbkek requires a password")),
            (EnvelopeMode::KeyMan | EnvelopeMode::Pbes, _) => {
                Err(Error::InvalidRecipient("mode does not use recipient infos"))
            }
        }
    }

    /// Originator key pair: the stored sender key, else an ephemeral one
    async fn originator_key(&self, originator: Option<Originator<'_>>) -> Result<(PrivateKey, SubjectPublicKeyInfoOwned)> {
        match originator {
            Some(originator) => {
                let cert = self.certificate(originator.alias)?;
                let key = self.retrieve_private(originator.alias, originator.password).await?;
                Ok((key, cert.tbs_certificate.subject_public_key_info))
            }
            None => {
                let pair = self.provider.generate_key_pair(&self.profile.generation).await?;
                Ok((pair.private_key, pair.public_key))
            }
        }
    }

    /// Key encryption key agreed between `private_key` and `public_key` for the wrap algorithm
    async fn agreement_kek(
        &self,
        private_key: &PrivateKey,
        public_key: &SubjectPublicKeyInfoOwned,
        wrap: &AlgorithmIdentifierOwned,
        ukm: &[u8],
    ) -> Result<Vec<u8>> {
        let kek_len = wrap_key_len(wrap)?;
        let shared_info = EccCmsSharedInfo {
            key_info: wrap.clone(),
            entity_u_info: if ukm.is_empty() { None } else { Some(OctetString::new(ukm)?) },
            supp_pub_info: OctetString::new(((kek_len * 8) as u32).to_be_bytes())?,
        };
        self.provider
            .derive_key(
                Derivation::Agreement {
                    private_key,
                    public_key,
                    shared_info: &shared_info.to_der()?,
                },
                kek_len,
            )
            .await
    }

    async fn key_agree_recipient(
        &self,
        alias: &str,
        originator: Option<Originator<'_>>,
        cek: &[u8],
    ) -> Result<RecipientInfo> {
        let cert = self.certificate(alias)?;
        let (private_key, originator_key) = self.originator_key(originator).await?;
        let ukm = self.provider.random(UKM_LEN);
        let wrap = self.profile.wrapping.clone();

        let kek = self
            .agreement_kek(&private_key, &cert.tbs_certificate.subject_public_key_info, &wrap, &ukm)
            .await?;
        let enc_key = self.provider.wrap_key(&wrap, &kek, cek).await?;

        Ok(RecipientInfo::Kari(KeyAgreeRecipientInfo {
            version: CmsVersion::V3,
            originator: OriginatorIdentifierOrKey::OriginatorKey(OriginatorPublicKey {
                algorithm: originator_key.algorithm,
                public_key: originator_key.subject_public_key,
            }),
            ukm: Some(OctetString::new(ukm)?),
            key_enc_alg: AlgorithmIdentifierOwned {
                oid: self.profile.agreement.oid,
                parameters: Some(Any::from_der(&wrap.to_der()?)?),
            },
            recipient_enc_keys: vec![RecipientEncryptedKey {
                rid: KeyAgreeRecipientIdentifier::IssuerAndSerialNumber(cert.issuer_and_serial()),
                enc_key: OctetString::new(enc_key)?,
            }],
        }))
    }

    async fn key_trans_recipient(
        &self,
        alias: &str,
        originator: Option<Originator<'_>>,
        cek: &[u8],
    ) -> Result<RecipientInfo> {
        let cert = self.certificate(alias)?;
        let recipient_key = &cert.tbs_certificate.subject_public_key_info;
        if recipient_key.algorithm.oid != oid::EC_PUBLIC_KEY_OID {
            return Err(Error::UnsupportedAlgorithm(recipient_key.algorithm.oid));
        }

        let (private_key, originator_key) = self.originator_key(originator).await?;
        let ukm = self.provider.random(UKM_LEN);
        let wrap = self.profile.wrapping.clone();

        let kek = self.agreement_kek(&private_key, recipient_key, &wrap, &ukm).await?;
        let enc_key = self.provider.wrap_key(&wrap, &kek, cek).await?;

        let params = TransportParameters {
            originator_key,
            ukm: OctetString::new(ukm)?,
            key_wrap: wrap,
        };

        Ok(RecipientInfo::Ktri(KeyTransRecipientInfo {
            version: CmsVersion::V0,
            rid: RecipientIdentifier::IssuerAndSerialNumber(cert.issuer_and_serial()),
            key_enc_alg: AlgorithmIdentifierOwned {
                oid: oid::EC_PUBLIC_KEY_OID,
                parameters: Some(Any::from_der(&params.to_der()?)?),
            },
            enc_key: OctetString::new(enc_key)?,
        }))
    }

    /// Identifier of a key encryption key: the SKI of the certificate under the alias, else the alias itself
    fn kek_identifier(&self, alias: &str) -> Result<Vec<u8>> {
        if let Some(cert) = self.store.get_certificate(alias)
            && let Some(ski) = cert.subject_key_identifier()?
        {
            return Ok(ski);
        }
        Ok(Utf8StringRef::new(alias)?.to_der()?)
    }

    async fn kek_recipient(&self, alias: &str, password: Option<&str>, cek: &[u8]) -> Result<RecipientInfo> {
        let secret = self.retrieve_secret(alias, password).await?;
        let wrap = wrap_for_key_len(secret.key_len())?;
        let encrypted_key = self.provider.wrap_key(&wrap, secret.key(), cek).await?;

        Ok(RecipientInfo::Kekri(KekRecipientInfo {
            version: CmsVersion::V4,
            kek_id: KekIdentifier {
                kek_identifier: OctetString::new(self.kek_identifier(alias)?)?,
                date: None,
                other: None,
            },
            key_enc_alg: wrap,
            encrypted_key: OctetString::new(encrypted_key)?,
        }))
    }

    async fn password_recipient(&self, password: &str, cek: &[u8]) -> Result<RecipientInfo> {
        let kdf_params = Pbkdf2Params {
            salt: OctetString::new(self.provider.random(UKM_LEN))?,
            iteration_count: self.profile.pbkdf2_iterations,
            key_length: None,
            prf: self.profile.pbkdf2_prf.clone(),
        };
        let wrap = self.profile.wrapping.clone();
        let kek = self
            .provider
            .derive_key(
                Derivation::Pbkdf2 {
                    password,
                    params: &kdf_params,
                },
                wrap_key_len(&wrap)?,
            )
            .await?;
        let enc_key = self.provider.wrap_key(&wrap, &kek, cek).await?;

        Ok(RecipientInfo::Pwri(PasswordRecipientInfo {
            version: CmsVersion::V0,
            key_derivation_alg: Some(AlgorithmIdentifierOwned {
                oid: oid::PBKDF2_OID,
                parameters: Some(Any::from_der(&kdf_params.to_der()?)?),
            }),
            key_enc_alg: wrap,
            enc_key: OctetString::new(enc_key)?,
        }))
    }

    /// Decrypt enveloped or encrypted data.
    ///
    /// For enveloped data the recipient is the certificate or secret key under `alias`. A password recipient is
    /// used when none is addressed to the alias. When no recipient info matches, the error lists the store
    /// aliases that would.
    pub async fn decrypt_data(&self, data: &[u8], alias: Option<&str>, password: Option<&str>) -> Result<Extracted> {
        match CmsContent::from_bytes(data)? {
            CmsContent::Enveloped(enveloped) => self.decrypt_enveloped(&enveloped, alias, password).await,
            CmsContent::Encrypted(encrypted) => self.decrypt_encrypted(&encrypted, alias, password).await,
            other => Err(Error::UnsupportedContentType(other.content_type())),
        }
    }

    pub(crate) async fn decrypt_enveloped(
        &self,
        enveloped: &EnvelopedData,
        alias: Option<&str>,
        password: Option<&str>,
    ) -> Result<Extracted> {
        let cek = self.recover_content_key(&enveloped.recip_infos, alias, password).await?;

        let info = &enveloped.encrypted_content;
        let encrypted = info
            .encrypted_content
            .as_ref()
            .ok_or(Error::MissingField("encryptedContent"))?;
        let content = self
            .provider
            .decrypt(&info.content_enc_alg, &cek, encrypted.as_bytes())
            .await?;

        Ok(Extracted {
            content_type: info.content_type,
            content,
        })
    }

    pub(crate) async fn decrypt_encrypted(
        &self,
        encrypted: &EncryptedData,
        alias: Option<&str>,
        password: Option<&str>,
    ) -> Result<Extracted> {
        let info = &encrypted.enc_content_info;
        let data = info
            .encrypted_content
            .as_ref()
            .ok_or(Error::MissingField("encryptedContent"))?;

        let content = if info.content_enc_alg.oid == oid::PBES2_OID {
            let password = password.ok_or(Error::PasswordRequired)?;
            self.pbes2_decrypt(&info.content_enc_alg, password, data.as_bytes()).await?
        } else {
            let alias = alias.ok_or(Error::AliasRequired)?;
            let secret = self.retrieve_secret(alias, password).await?;
            self.provider
                .decrypt(&info.content_enc_alg, secret.key(), data.as_bytes())
                .await?
        };

        Ok(Extracted {
            content_type: info.content_type,
            content,
        })
    }

    /// Store aliases holding a key that one of the recipient infos is addressed to
    fn recipient_aliases(&self, infos: &RecipientInfos) -> Vec<String> {
        self.store
            .aliases()
            .into_iter()
            .filter(|alias| self.store.get_key(alias).is_some())
            .filter(|alias| {
                let cert = self.store.get_certificate(alias);
                let kek_id = self.kek_identifier(alias).ok();
                infos
                    .0
                    .iter()
                    .any(|info| matches_recipient(info, cert.as_ref(), kek_id.as_deref()))
            })
            .collect()
    }

    async fn recover_content_key(
        &self,
        infos: &RecipientInfos,
        alias: Option<&str>,
        password: Option<&str>,
    ) -> Result<Vec<u8>> {
        let cert = alias.and_then(|alias| self.store.get_certificate(alias));
        let kek_id = match alias {
            Some(alias) => Some(self.kek_identifier(alias)?),
            None => None,
        };

        // a password recipient serves when nothing is addressed to the alias
        let matched = infos
            .0
            .iter()
            .find(|info| matches_recipient(info, cert.as_ref(), kek_id.as_deref()))
            .or_else(|| {
                password.and_then(|_| infos.0.iter().find(|info| matches!(info, RecipientInfo::Pwri(_))))
            });

        let Some(info) = matched else {
            let aliases = self.recipient_aliases(infos);
            log::debug!("No matching recipient, candidates: {aliases:?}");
            return Err(if aliases.is_empty() {
                Error::NoRecipient
            } else {
                Error::RecipientKeyRequired(aliases)
            });
        };

        match info {
            RecipientInfo::Ktri(ktri) => {
                let alias = alias.ok_or(Error::AliasRequired)?;
                if ktri.key_enc_alg.oid != oid::EC_PUBLIC_KEY_OID {
                    return Err(Error::UnsupportedAlgorithm(ktri.key_enc_alg.oid));
                }
                let params: TransportParameters = decode_params(&ktri.key_enc_alg)?;
                let key = self.retrieve_private(alias, password).await?;
                let kek = self
                    .agreement_kek(&key, &params.originator_key, &params.key_wrap, params.ukm.as_bytes())
                    .await?;
                log::debug!("Unwrapping content key for transport recipient {alias}");
                self.provider
                    .unwrap_key(&params.key_wrap, &kek, ktri.enc_key.as_bytes())
                    .await
            }
            RecipientInfo::Kari(kari) => {
                let alias = alias.ok_or(Error::AliasRequired)?;
                let cert = cert.as_ref().ok_or_else(|| Error::CertificateNotFound(alias.to_owned()))?;
                let encrypted_key = kari
                    .recipient_enc_keys
                    .iter()
                    .find(|k| kari_rid_matches(&k.rid, cert))
                    .ok_or(Error::NoRecipient)?;

                let wrap: AlgorithmIdentifierOwned = decode_params(&kari.key_enc_alg)?;
                let originator_key = self.originator_public_key(&kari.originator)?;
                let ukm = kari.ukm.as_ref().map(|ukm| ukm.as_bytes()).unwrap_or_default();

                let key = self.retrieve_private(alias, password).await?;
                let kek = self.agreement_kek(&key, &originator_key, &wrap, ukm).await?;
                log::debug!("Unwrapping content key for agreement recipient {alias}");
                self.provider
                    .unwrap_key(&wrap, &kek, encrypted_key.enc_key.as_bytes())
                    .await
            }
            RecipientInfo::Kekri(kekri) => {
                let alias = alias.ok_or(Error::AliasRequired)?;
                let secret = self.retrieve_secret(alias, password).await?;
                log::debug!("Unwrapping content key with secret {alias}");
                self.provider
                    .unwrap_key(&kekri.key_enc_alg, secret.key(), kekri.encrypted_key.as_bytes())
                    .await
            }
            RecipientInfo::Pwri(pwri) => {
                let password = password.ok_or(Error::PasswordRequired)?;
                let derivation = pwri
                    .key_derivation_alg
                    .as_ref()
                    .ok_or(Error::MissingField("keyDerivationAlgorithm"))?;
                if derivation.oid != oid::PBKDF2_OID {
                    return Err(Error::UnsupportedAlgorithm(derivation.oid));
                }
                let kdf_params: Pbkdf2Params = decode_params(derivation)?;
                let kek = self
                    .provider
                    .derive_key(
                        Derivation::Pbkdf2 {
                            password,
                            params: &kdf_params,
                        },
                        wrap_key_len(&pwri.key_enc_alg)?,
                    )
                    .await?;
                log::debug!("Unwrapping content key with password");
                self.provider
                    .unwrap_key(&pwri.key_enc_alg, &kek, pwri.enc_key.as_bytes())
                    .await
            }
            RecipientInfo::Ori(_) => Err(Error::NoRecipient),
        }
    }

    /// Public key of a key agreement originator, given inline or by reference to a stored certificate
    fn originator_public_key(&self, originator: &OriginatorIdentifierOrKey) -> Result<SubjectPublicKeyInfoOwned> {
        let stored = self.store.get_all_certificates();
        let cert = match originator {
            OriginatorIdentifierOrKey::OriginatorKey(key) => {
                return Ok(SubjectPublicKeyInfoOwned {
                    algorithm: key.algorithm.clone(),
                    subject_public_key: key.public_key.clone(),
                });
            }
            OriginatorIdentifierOrKey::IssuerAndSerialNumber(id) => {
                stored.into_iter().find(|c| c.matches_issuer_and_serial(id))
            }
            OriginatorIdentifierOrKey::SubjectKeyIdentifier(ski) => stored
                .into_iter()
                .find(|c| matches!(c.subject_key_identifier(), Ok(Some(own)) if own == ski.0.as_bytes())),
        };
        cert.map(|c| c.tbs_certificate.subject_public_key_info)
            .ok_or_else(|| Error::CertificateNotFound("originator".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_lengths() {
        for len in [16, 24, 32] {
            assert_eq!(wrap_key_len(&wrap_for_key_len(len).unwrap()).unwrap(), len);
        }
        assert!(wrap_for_key_len(20).is_err());
    }

    #[test]
    fn test_envelope_version() {
        let kek = RecipientInfo::Kekri(KekRecipientInfo {
            version: CmsVersion::V4,
            kek_id: KekIdentifier {
                kek_identifier: OctetString::new(vec![1]).unwrap(),
                date: None,
                other: None,
            },
            key_enc_alg: wrap_for_key_len(32).unwrap(),
            encrypted_key: OctetString::new(vec![0; 40]).unwrap(),
        });
        assert_eq!(envelope_version(&[]), CmsVersion::V0);
        assert_eq!(envelope_version(&[kek]), CmsVersion::V2);
    }
}
