//!
//! Password protection of stored keys (PBES2 with PBKDF2) and PKCS#8 import/export
//!
use der::{Any, Decode, Encode, asn1::OctetString};
use pkcs8::PrivateKeyInfo;
use pkcs12::pbe_params::{EncryptedPrivateKeyInfo, Pbes2Params, Pbkdf2Params};
use spki::{AlgorithmIdentifierOwned, AlgorithmIdentifierRef};

use crate::{
    Result,
    engine::Pkix,
    error::Error,
    input::{ENCRYPTED_PRIVATE_KEY_LABEL, Encoded, PRIVATE_KEY_LABEL, unarmor},
    key::{Key, PrivateKey, StoredKey},
    keystore::KeyStore,
    oid,
    provider::{CryptoProvider, Derivation},
    secret::{Secret, SecretKeyType},
};

/// Key export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// Plaintext PKCS#8
    P8,
    /// Password encrypted PKCS#8
    P8e,
}

/// Key length in bytes of an AES-CBC content encryption algorithm
pub(crate) fn cipher_key_len(algorithm: &AlgorithmIdentifierOwned) -> Result<usize> {
    match algorithm.oid {
        oid::AES_128_CBC_OID => Ok(16),
        oid::AES_192_CBC_OID => Ok(24),
        oid::AES_256_CBC_OID => Ok(32),
        other => Err(Error::UnsupportedAlgorithm(other)),
    }
}

/// AES-CBC algorithm matching a raw key length
pub(crate) fn cipher_for_key_len(len: usize) -> Result<AlgorithmIdentifierOwned> {
    let oid = match len {
        16 => oid::AES_128_CBC_OID,
        24 => oid::AES_192_CBC_OID,
        32 => oid::AES_256_CBC_OID,
        _ => return Err(Error::InvalidLength),
    };
    Ok(AlgorithmIdentifierOwned { oid, parameters: None })
}

/// Attach an IV to a cipher algorithm identifier
pub(crate) fn with_iv(algorithm: &AlgorithmIdentifierOwned, iv: &[u8]) -> Result<AlgorithmIdentifierOwned> {
    Ok(AlgorithmIdentifierOwned {
        oid: algorithm.oid,
        parameters: Some(Any::from_der(&OctetString::new(iv)?.to_der()?)?),
    })
}

/// Plaintext key as stored inside encrypted containers. Secrets travel as a PKCS#8 structure keyed by their type.
pub(crate) fn encode_key(key: &Key) -> Result<Vec<u8>> {
    match key {
        Key::Private(key) => Ok(key.as_der().to_vec()),
        Key::Secret(secret) => {
            let algorithm = AlgorithmIdentifierRef {
                oid: secret.key_type().to_oid(),
                parameters: None,
            };
            Ok(PrivateKeyInfo::new(algorithm, secret.key()).to_der()?)
        }
    }
}

/// Decode plaintext key material: PKCS#8 first, raw secret bytes otherwise
pub(crate) fn decode_key(data: &[u8]) -> Result<Key> {
    match PrivateKeyInfo::from_der(data) {
        Ok(info) => match SecretKeyType::from_oid(&info.algorithm.oid) {
            SecretKeyType::Unknown(_) => Ok(Key::Private(PrivateKey::from_der(data)?)),
            key_type => Ok(Key::Secret(Secret::new(key_type, info.private_key.to_vec()))),
        },
        Err(_) => Ok(Key::Secret(Secret::new(SecretKeyType::Aes, data.to_vec()))),
    }
}

impl<P: CryptoProvider, S: KeyStore> Pkix<P, S> {
    /// Encrypt with PBES2: PBKDF2 over a fresh 32-byte salt, profile cipher with a fresh IV
    pub(crate) async fn pbes2_encrypt(
        &self,
        password: &str,
        iterations: u32,
        data: &[u8],
    ) -> Result<(AlgorithmIdentifierOwned, Vec<u8>)> {
        let kdf_params = Pbkdf2Params {
            salt: OctetString::new(self.provider.random(32))?,
            iteration_count: iterations,
            key_length: None,
            prf: self.profile.pbkdf2_prf.clone(),
        };
        let key_len = cipher_key_len(&self.profile.encryption)?;
        let key = self
            .provider
            .derive_key(
                Derivation::Pbkdf2 {
                    password,
                    params: &kdf_params,
                },
                key_len,
            )
            .await?;

        let encryption = with_iv(&self.profile.encryption, &self.provider.random(16))?;
        let encrypted = self.provider.encrypt(&encryption, &key, data).await?;

        let params = Pbes2Params {
            kdf: AlgorithmIdentifierOwned {
                oid: oid::PBKDF2_OID,
                parameters: Some(Any::from_der(&kdf_params.to_der()?)?),
            },
            encryption,
        };

        Ok((
            AlgorithmIdentifierOwned {
                oid: oid::PBES2_OID,
                parameters: Some(Any::from_der(&params.to_der()?)?),
            },
            encrypted,
        ))
    }

    pub(crate) async fn pbes2_decrypt(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        password: &str,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        if algorithm.oid != oid::PBES2_OID {
            return Err(Error::UnsupportedAlgorithm(algorithm.oid));
        }
        let params = algorithm.parameters.as_ref().ok_or(Error::InvalidParameters)?;
        let params = Pbes2Params::from_der(&params.to_der()?)?;

        if params.kdf.oid != oid::PBKDF2_OID {
            return Err(Error::UnsupportedAlgorithm(params.kdf.oid));
        }
        let kdf_params = params.kdf.parameters.as_ref().ok_or(Error::InvalidParameters)?;
        let kdf_params = Pbkdf2Params::from_der(&kdf_params.to_der()?)?;

        let key_len = match kdf_params.key_length {
            Some(len) => len as usize,
            None => cipher_key_len(&params.encryption)?,
        };
        let key = self
            .provider
            .derive_key(
                Derivation::Pbkdf2 {
                    password,
                    params: &kdf_params,
                },
                key_len,
            )
            .await?;

        self.provider.decrypt(&params.encryption, &key, data).await
    }

    /// Retrieve a plaintext key. Encrypted keys require the password.
    pub async fn retrieve(&self, alias: &str, password: Option<&str>) -> Result<Key> {
        match self.store.get_key(alias) {
            Some(StoredKey::Private(key)) => Ok(Key::Private(key)),
            Some(StoredKey::Secret(secret)) => Ok(Key::Secret(secret)),
            Some(StoredKey::Encrypted(info)) => {
                let password = password.ok_or(Error::PasswordRequired)?;
                let plain = self
                    .pbes2_decrypt(&info.encryption_algorithm, password, info.encrypted_data.as_bytes())
                    .await?;
                decode_key(&plain)
            }
            None => Err(Error::KeyNotFound(alias.to_owned())),
        }
    }

    pub(crate) async fn retrieve_private(&self, alias: &str, password: Option<&str>) -> Result<PrivateKey> {
        self.retrieve(alias, password).await?.into_private()
    }

    pub(crate) async fn retrieve_secret(&self, alias: &str, password: Option<&str>) -> Result<Secret> {
        self.retrieve(alias, password).await?.into_secret()
    }

    pub(crate) async fn protect_key(
        &self,
        key: &Key,
        password: &str,
        iterations: u32,
    ) -> Result<EncryptedPrivateKeyInfo> {
        let (encryption_algorithm, encrypted) = self.pbes2_encrypt(password, iterations, &encode_key(key)?).await?;
        Ok(EncryptedPrivateKeyInfo {
            encryption_algorithm,
            encrypted_data: OctetString::new(encrypted)?,
        })
    }

    /// Store a key, password protected when a password is given
    pub async fn store_key(&mut self, key: Key, alias: &str, password: Option<&str>) -> Result<()> {
        let stored = match password {
            Some(password) => {
                StoredKey::Encrypted(self.protect_key(&key, password, self.profile.pbkdf2_iterations).await?)
            }
            None => StoredKey::from(key),
        };
        self.store.set_key(alias, stored);
        Ok(())
    }

    /// Import a PKCS#8 or encrypted PKCS#8 key, DER or PEM.
    ///
    /// A plaintext key is protected with the password if one is given. An encrypted key must decrypt
    /// with the password and is stored as-is.
    pub async fn import_key(&mut self, alias: &str, input: &[u8], password: Option<&str>) -> Result<()> {
        let der = unarmor(input);

        if let Ok(info) = EncryptedPrivateKeyInfo::from_der(&der) {
            let password = password.ok_or(Error::PasswordRequired)?;
            let plain = self
                .pbes2_decrypt(&info.encryption_algorithm, password, info.encrypted_data.as_bytes())
                .await?;
            decode_key(&plain)?;
            self.store.set_key(alias, StoredKey::Encrypted(info));
            return Ok(());
        }

        let key = Key::Private(PrivateKey::from_der(&der)?);
        self.store_key(key, alias, password).await
    }

    /// Export the key under the alias as plaintext (`P8`) or password encrypted (`P8e`) PKCS#8
    pub async fn export_key(&self, alias: &str, format: KeyFormat, password: Option<&str>) -> Result<Encoded> {
        match format {
            KeyFormat::P8 => {
                let key = self.retrieve(alias, password).await?;
                Encoded::new(self.format, PRIVATE_KEY_LABEL, encode_key(&key)?)
            }
            KeyFormat::P8e => {
                let password = password.ok_or(Error::PasswordRequired)?;
                let info = match self.store.get_key(alias) {
                    Some(StoredKey::Encrypted(info)) => info,
                    Some(_) => {
                        let key = self.retrieve(alias, None).await?;
                        self.protect_key(&key, password, self.profile.pbkdf2_iterations).await?
                    }
                    None => return Err(Error::KeyNotFound(alias.to_owned())),
                };
                Encoded::encode(self.format, ENCRYPTED_PRIVATE_KEY_LABEL, &info)
            }
        }
    }

    /// Generate a secret key and store it under the alias. `len` defaults to the key type's natural length.
    pub async fn generate_secret(
        &mut self,
        alias: &str,
        key_type: SecretKeyType,
        len: Option<usize>,
        password: Option<&str>,
    ) -> Result<Secret> {
        let len = len.or(key_type.default_len()).ok_or(Error::InvalidLength)?;
        let secret = self.provider.generate_secret(key_type, len).await?;
        self.store_key(Key::Secret(secret.clone()), alias, password).await?;
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::{keystore::MemoryKeyStore, software::SoftwareProvider};

    const PASSWORD: &str = "changeit";

    fn engine() -> Pkix<SoftwareProvider> {
        Pkix::new(SoftwareProvider::new(), MemoryKeyStore::new())
            .with_profile(crate::profile::ProviderProfile::ecdsa_256().with_iterations(16))
    }

    #[test]
    fn test_secret_roundtrip() {
        let mut pkix = engine();
        let secret = block_on(pkix.generate_secret("kek", SecretKeyType::Aes256Cbc, None, Some(PASSWORD))).unwrap();

        assert!(pkix.store().get_key("kek").unwrap().is_encrypted());
        assert!(matches!(block_on(pkix.retrieve("kek", None)), Err(Error::PasswordRequired)));

        let key = block_on(pkix.retrieve("kek", Some(PASSWORD))).unwrap();
        assert_eq!(key, Key::Secret(secret));
        assert!(block_on(pkix.retrieve("kek", Some("wrong"))).is_err());
    }

    #[test]
    fn test_decode_key_fallback() {
        let raw = vec![0x42u8; 16];
        assert_eq!(decode_key(&raw).unwrap(), Key::Secret(Secret::new(SecretKeyType::Aes, raw)));

        let secret = Key::Secret(Secret::new(SecretKeyType::HmacSha256, vec![1u8; 32]));
        assert_eq!(decode_key(&encode_key(&secret).unwrap()).unwrap(), secret);
    }

    #[test]
    fn test_missing_key() {
        let pkix = engine();
        assert!(matches!(block_on(pkix.retrieve("none", None)), Err(Error::KeyNotFound(_))));
    }
}
