use std::fmt;

use der::oid::ObjectIdentifier;

use crate::{
    Result,
    error::Error,
    oid::{AES_128_CBC_OID, AES_192_CBC_OID, AES_256_CBC_OID, AES_GROUP_KEY_OID, HMAC_SHA1_OID, HMAC_SHA256_OID},
};

/// Symmetric key material with its algorithm
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    pub(crate) key_type: SecretKeyType,
    pub(crate) key: Vec<u8>,
}

impl Secret {
    pub fn new(key_type: SecretKeyType, key: Vec<u8>) -> Self {
        Self { key_type, key }
    }

    /// Get secret key data
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn key_type(&self) -> SecretKeyType {
        self.key_type
    }

    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    pub fn builder(key_type: SecretKeyType) -> SecretBuilder {
        SecretBuilder::new(key_type)
    }
}

pub struct SecretBuilder {
    key_type: SecretKeyType,
    key: Option<Vec<u8>>,
    key_len: Option<usize>,
}

impl SecretBuilder {
    pub fn new(key_type: SecretKeyType) -> Self {
        SecretBuilder {
            key_type,
            key: None,
            key_len: None,
        }
    }

    pub fn with_length(&mut self, len: usize) -> &mut Self {
        self.key_len = Some(len);
        self
    }

    pub fn with_key(&mut self, key: Vec<u8>) -> &mut Self {
        self.key = Some(key);
        self
    }

    /// The key must be given and match the requested length, if any.
    /// Fresh key material comes from [crate::CryptoProvider::generate_secret].
    pub fn build(&mut self) -> Result<Secret> {
        let key = self.key.take().ok_or(Error::MissingField("key"))?;
        if self.key_len.is_some_and(|len| len != key.len()) {
            return Err(Error::InvalidLength);
        }

        Ok(Secret {
            key_type: self.key_type,
            key,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKeyType {
    Aes,
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    HmacSha1,
    HmacSha256,
    Unknown(ObjectIdentifier),
}

impl SecretKeyType {
    pub fn from_oid(oid: &ObjectIdentifier) -> Self {
        match *oid {
            AES_GROUP_KEY_OID => SecretKeyType::Aes,
            AES_128_CBC_OID => SecretKeyType::Aes128Cbc,
            AES_192_CBC_OID => SecretKeyType::Aes192Cbc,
            AES_256_CBC_OID => SecretKeyType::Aes256Cbc,
            HMAC_SHA1_OID => SecretKeyType::HmacSha1,
            HMAC_SHA256_OID => SecretKeyType::HmacSha256,
            _ => SecretKeyType::Unknown(*oid),
        }
    }

    pub fn to_oid(&self) -> ObjectIdentifier {
        match self {
            SecretKeyType::Aes => AES_GROUP_KEY_OID,
            SecretKeyType::Aes128Cbc => AES_128_CBC_OID,
            SecretKeyType::Aes192Cbc => AES_192_CBC_OID,
            SecretKeyType::Aes256Cbc => AES_256_CBC_OID,
            SecretKeyType::HmacSha1 => HMAC_SHA1_OID,
            SecretKeyType::HmacSha256 => HMAC_SHA256_OID,
            SecretKeyType::Unknown(oid) => *oid,
        }
    }

    /// returns default key length in bytes
    pub(crate) fn default_len(&self) -> Option<usize> {
        match self {
            SecretKeyType::Aes128Cbc => Some(16),
            SecretKeyType::Aes192Cbc => Some(24),
            SecretKeyType::Aes256Cbc => Some(32),
            SecretKeyType::HmacSha1 => Some(20),
            SecretKeyType::HmacSha256 => Some(32),
            _ => None,
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("key_type", &self.key_type)
            .field("key", &"<KEY>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::oid::*;
    use crate::secret::{Secret, SecretKeyType};
    use der::oid::ObjectIdentifier;

    #[test]
    fn test_from_oid() {
        assert_eq!(SecretKeyType::Aes, SecretKeyType::from_oid(&AES_GROUP_KEY_OID));
        assert_eq!(SecretKeyType::Aes128Cbc, SecretKeyType::from_oid(&AES_128_CBC_OID));
        assert_eq!(SecretKeyType::Aes256Cbc, SecretKeyType::from_oid(&AES_256_CBC_OID));
        assert_eq!(SecretKeyType::HmacSha256, SecretKeyType::from_oid(&HMAC_SHA256_OID));

        let dummy_oid = ObjectIdentifier::new_unwrap("1.2.3.4.5.6.7");
        assert_eq!(SecretKeyType::Unknown(dummy_oid), SecretKeyType::from_oid(&dummy_oid));
        assert_eq!(SecretKeyType::Unknown(dummy_oid).to_oid(), dummy_oid);
    }

    #[test]
    fn test_secret_builder_with_length() {
        let secret = Secret::builder(SecretKeyType::Aes).with_length(16).with_key(vec![1u8; 16]).build().unwrap();
        assert_eq!(secret.key_type(), SecretKeyType::Aes);
        assert_eq!(secret.key_len(), 16);

        let err = Secret::builder(SecretKeyType::Aes).with_length(24).with_key(vec![1u8; 16]).build();
        assert!(matches!(err, Err(Error::InvalidLength)));
    }

    #[test]
    fn test_secret_builder_with_missing_key() {
        let err = Secret::builder(SecretKeyType::Aes256Cbc).build();
        assert!(matches!(err, Err(Error::MissingField("key"))));
    }

    #[test]
    fn test_secret_builder_with_val() {
        let key_val = vec![17u8; 32];
        let secret = Secret::builder(SecretKeyType::Aes).with_key(key_val.clone()).build().unwrap();
        assert_eq!(secret.key_len(), 32);
        assert_eq!(key_val, secret.key());
    }
}
