//!
//! Cryptographic primitive provider interface
//!
use der::oid::ObjectIdentifier;
use pkcs12::pbe_params::Pbkdf2Params;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::{
    Result,
    key::{KeyPair, PrivateKey},
    secret::{Secret, SecretKeyType},
};

/// Key derivation request
#[derive(Debug, Clone, Copy)]
pub enum Derivation<'a> {
    /// PBKDF2 as parameterized inside PBES2 or a password recipient
    Pbkdf2 {
        password: &'a str,
        params: &'a Pbkdf2Params,
    },
    /// PKCS#12 appendix B derivation of a MAC key
    Pkcs12Mac {
        password: &'a str,
        salt: &'a [u8],
        iterations: i32,
        digest: ObjectIdentifier,
    },
    /// Static-ephemeral or static-static ECDH followed by the X9.63 KDF over `shared_info`
    Agreement {
        private_key: &'a PrivateKey,
        public_key: &'a SubjectPublicKeyInfoOwned,
        shared_info: &'a [u8],
    },
}

/// Asynchronous cryptographic primitives, parameterized by algorithm identifiers.
///
/// Every operation may suspend (e.g. hardware backed keys). Futures are not required to be `Send`.
#[allow(async_fn_in_trait)]
pub trait CryptoProvider {
    /// Secure random bytes
    fn random(&self, len: usize) -> Vec<u8>;

    async fn generate_key_pair(&self, algorithm: &AlgorithmIdentifierOwned) -> Result<KeyPair>;

    async fn generate_secret(&self, key_type: SecretKeyType, len: usize) -> Result<Secret>;

    async fn digest(&self, algorithm: &AlgorithmIdentifierOwned, data: &[u8]) -> Result<Vec<u8>>;

    async fn sign(&self, algorithm: &AlgorithmIdentifierOwned, key: &PrivateKey, data: &[u8]) -> Result<Vec<u8>>;

    /// `Ok(false)` for a well-formed key and a signature that does not verify
    async fn verify(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        key: &SubjectPublicKeyInfoOwned,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool>;

    async fn derive_key(&self, derivation: Derivation<'_>, len: usize) -> Result<Vec<u8>>;

    /// `algorithm` carries the IV in its parameters
    async fn encrypt(&self, algorithm: &AlgorithmIdentifierOwned, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    async fn decrypt(&self, algorithm: &AlgorithmIdentifierOwned, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    async fn wrap_key(&self, algorithm: &AlgorithmIdentifierOwned, kek: &[u8], key: &[u8]) -> Result<Vec<u8>>;

    async fn unwrap_key(&self, algorithm: &AlgorithmIdentifierOwned, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>>;

    async fn mac(&self, algorithm: &AlgorithmIdentifierOwned, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    /// Constant-time check of a MAC value
    async fn verify_mac(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        key: &[u8],
        data: &[u8],
        expected: &[u8],
    ) -> Result<()>;
}
