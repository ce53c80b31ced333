use std::fmt;

use der::{Decode, oid::ObjectIdentifier};
use pkcs8::PrivateKeyInfo;
use pkcs12::pbe_params::EncryptedPrivateKeyInfo;
use spki::SubjectPublicKeyInfoOwned;

use crate::{Result, error::Error, secret::Secret};

/// PKCS#8 private key wrapper
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pub(crate) data: Vec<u8>,
    pub(crate) oid: ObjectIdentifier,
}

impl PrivateKey {
    /// Parses a PKCS#8 private key encoded in DER format and constructs a new instance of the struct.
    pub fn from_der(data: &[u8]) -> Result<Self> {
        let info = PrivateKeyInfo::from_der(data).map_err(|_| Error::InvalidPrivateKey)?;
        Ok(Self {
            data: data.to_vec(),
            oid: info.algorithm.oid,
        })
    }

    /// Returns a reference to the private key data in PKCS#8 DER-encoded format.
    pub fn as_der(&self) -> &[u8] {
        &self.data
    }

    /// Returns an ObjectIdentifier of the key algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        self.oid
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("data", &"<PKCS#8>")
            .field("oid", &self.oid)
            .finish()
    }
}

/// Generated asymmetric key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub public_key: SubjectPublicKeyInfoOwned,
}

/// Key material as held by a key store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredKey {
    Private(PrivateKey),
    Secret(Secret),
    /// Password protected PKCS#8 or secret key (PBES2)
    Encrypted(EncryptedPrivateKeyInfo),
}

impl StoredKey {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, StoredKey::Encrypted(_))
    }
}

/// Plaintext key material after retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Private(PrivateKey),
    Secret(Secret),
}

impl Key {
    pub fn into_private(self) -> Result<PrivateKey> {
        match self {
            Key::Private(key) => Ok(key),
            Key::Secret(_) => Err(Error::InvalidPrivateKey),
        }
    }

    pub fn into_secret(self) -> Result<Secret> {
        match self {
            Key::Secret(secret) => Ok(secret),
            Key::Private(_) => Err(Error::InvalidParameters),
        }
    }
}

impl From<Key> for StoredKey {
    fn from(key: Key) -> Self {
        match key {
            Key::Private(key) => StoredKey::Private(key),
            Key::Secret(secret) => StoredKey::Secret(secret),
        }
    }
}
