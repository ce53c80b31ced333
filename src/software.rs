//!
//! [CryptoProvider] implementation on top of RustCrypto primitives
//!
use aes::{Aes128, Aes192, Aes256};
use aes_kw::Kek;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use der::{
    Decode, Encode,
    asn1::{BitString, ObjectIdentifier, OctetString},
};
use hmac::{Mac, digest::Digest};
use p256::{
    PublicKey, SecretKey,
    ecdsa::{
        Signature, SigningKey, VerifyingKey,
        signature::{Signer, Verifier},
    },
    elliptic_curve::sec1::ToEncodedPoint,
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
};
use pkcs12::kdf;
use rand::RngCore;
use sha1::Sha1;
use sha2::Sha256;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::{
    Result,
    error::Error,
    key::{KeyPair, PrivateKey},
    oid,
    provider::{CryptoProvider, Derivation},
    secret::{Secret, SecretKeyType},
};

/// Software provider: P-256 ECDSA/ECDH, SHA-1/SHA-256, HMAC, PBKDF2, AES-CBC and AES key wrap
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareProvider;

impl SoftwareProvider {
    pub fn new() -> Self {
        Self
    }
}

fn p256_secret(key: &PrivateKey) -> Result<SecretKey> {
    SecretKey::from_pkcs8_der(key.as_der()).map_err(|_| Error::InvalidPrivateKey)
}

fn p256_public(key: &SubjectPublicKeyInfoOwned) -> Result<PublicKey> {
    if key.algorithm.oid != oid::EC_PUBLIC_KEY_OID {
        return Err(Error::UnsupportedAlgorithm(key.algorithm.oid));
    }
    PublicKey::from_sec1_bytes(key.subject_public_key.raw_bytes()).map_err(|_| Error::InvalidPublicKey)
}

fn curve_of(algorithm: &AlgorithmIdentifierOwned) -> Result<ObjectIdentifier> {
    let params = algorithm.parameters.as_ref().ok_or(Error::InvalidParameters)?;
    Ok(ObjectIdentifier::from_der(&params.to_der()?)?)
}

fn iv_of(algorithm: &AlgorithmIdentifierOwned) -> Result<Vec<u8>> {
    let params = algorithm.parameters.as_ref().ok_or(Error::InvalidParameters)?;
    Ok(OctetString::from_der(&params.to_der()?)?.into_bytes())
}

/// ANSI X9.63 KDF with SHA-256
fn x963_kdf(secret: &[u8], shared_info: &[u8], len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    ansi_x963_kdf::derive_key_into::<sha2_x963::Sha256>(secret, shared_info, &mut out).map_err(|_| Error::InvalidLength)?;
    Ok(out)
}

impl CryptoProvider for SoftwareProvider {
    fn random(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        rand::rng().fill_bytes(&mut buf);
        buf
    }

    async fn generate_key_pair(&self, algorithm: &AlgorithmIdentifierOwned) -> Result<KeyPair> {
        if algorithm.oid != oid::EC_PUBLIC_KEY_OID {
            return Err(Error::UnsupportedAlgorithm(algorithm.oid));
        }
        let curve = curve_of(algorithm)?;
        if curve != oid::SECP256R1_OID {
            return Err(Error::UnsupportedAlgorithm(curve));
        }

        // a random scalar is out of range with negligible probability
        let secret = loop {
            if let Ok(secret) = SecretKey::from_slice(&self.random(32)) {
                break secret;
            }
        };

        let document = secret.to_pkcs8_der().map_err(|_| Error::InvalidPrivateKey)?;
        let private_key = PrivateKey::from_der(document.as_bytes())?;
        let point = secret.public_key().to_encoded_point(false);

        Ok(KeyPair {
            private_key,
            public_key: SubjectPublicKeyInfoOwned {
                algorithm: algorithm.clone(),
                subject_public_key: BitString::from_bytes(point.as_bytes())?,
            },
        })
    }

    async fn generate_secret(&self, key_type: SecretKeyType, len: usize) -> Result<Secret> {
        Secret::builder(key_type).with_key(self.random(len)).build()
    }

    async fn digest(&self, algorithm: &AlgorithmIdentifierOwned, data: &[u8]) -> Result<Vec<u8>> {
        match algorithm.oid {
            oid::SHA1_OID => Ok(Sha1::digest(data).to_vec()),
            oid::SHA256_OID => Ok(Sha256::digest(data).to_vec()),
            other => Err(Error::UnsupportedAlgorithm(other)),
        }
    }

    async fn sign(&self, algorithm: &AlgorithmIdentifierOwned, key: &PrivateKey, data: &[u8]) -> Result<Vec<u8>> {
        match algorithm.oid {
            oid::ECDSA_WITH_SHA256_OID => {
                let signing_key = SigningKey::from(p256_secret(key)?);
                let signature: Signature = signing_key.sign(data);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            other => Err(Error::UnsupportedAlgorithm(other)),
        }
    }

    async fn verify(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        key: &SubjectPublicKeyInfoOwned,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool> {
        match algorithm.oid {
            oid::ECDSA_WITH_SHA256_OID => {
                let verifying_key = VerifyingKey::from(p256_public(key)?);
                match Signature::from_der(signature) {
                    Ok(signature) => Ok(verifying_key.verify(data, &signature).is_ok()),
                    Err(_) => Ok(false),
                }
            }
            other => Err(Error::UnsupportedAlgorithm(other)),
        }
    }

    async fn derive_key(&self, derivation: Derivation<'_>, len: usize) -> Result<Vec<u8>> {
        match derivation {
            Derivation::Pbkdf2 { password, params } => {
                let mut out = vec![0u8; len];
                let salt = params.salt.as_bytes();
                match params.prf.oid {
                    oid::HMAC_SHA1_OID => {
                        pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, params.iteration_count, &mut out)
                    }
                    oid::HMAC_SHA256_OID => {
                        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, params.iteration_count, &mut out)
                    }
                    other => return Err(Error::UnsupportedAlgorithm(other)),
                }
                Ok(out)
            }
            Derivation::Pkcs12Mac {
                password,
                salt,
                iterations,
                digest,
            } => match digest {
                oid::SHA1_OID => Ok(kdf::derive_key_utf8::<Sha1>(
                    password,
                    salt,
                    kdf::Pkcs12KeyType::Mac,
                    iterations,
                    len,
                )?),
                oid::SHA256_OID => Ok(kdf::derive_key_utf8::<Sha256>(
                    password,
                    salt,
                    kdf::Pkcs12KeyType::Mac,
                    iterations,
                    len,
                )?),
                other => Err(Error::UnsupportedAlgorithm(other)),
            },
            Derivation::Agreement {
                private_key,
                public_key,
                shared_info,
            } => {
                let secret = p256_secret(private_key)?;
                let public = p256_public(public_key)?;
                let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                x963_kdf(shared.raw_secret_bytes(), shared_info, len)
            }
        }
    }

    async fn encrypt(&self, algorithm: &AlgorithmIdentifierOwned, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let iv = iv_of(algorithm)?;
        match algorithm.oid {
            oid::AES_128_CBC_OID => Ok(cbc::Encryptor::<Aes128>::new_from_slices(key, &iv)
                .map_err(|_| Error::InvalidLength)?
                .encrypt_padded_vec_mut::<Pkcs7>(data)),
            oid::AES_192_CBC_OID => Ok(cbc::Encryptor::<Aes192>::new_from_slices(key, &iv)
                .map_err(|_| Error::InvalidLength)?
                .encrypt_padded_vec_mut::<Pkcs7>(data)),
            oid::AES_256_CBC_OID => Ok(cbc::Encryptor::<Aes256>::new_from_slices(key, &iv)
                .map_err(|_| Error::InvalidLength)?
                .encrypt_padded_vec_mut::<Pkcs7>(data)),
            other => Err(Error::UnsupportedAlgorithm(other)),
        }
    }

    async fn decrypt(&self, algorithm: &AlgorithmIdentifierOwned, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let iv = iv_of(algorithm)?;
        match algorithm.oid {
            oid::AES_128_CBC_OID => cbc::Decryptor::<Aes128>::new_from_slices(key, &iv)
                .map_err(|_| Error::InvalidLength)?
                .decrypt_padded_vec_mut::<Pkcs7>(data)
                .map_err(|_| Error::UnpadError),
            oid::AES_192_CBC_OID => cbc::Decryptor::<Aes192>::new_from_slices(key, &iv)
                .map_err(|_| Error::InvalidLength)?
                .decrypt_padded_vec_mut::<Pkcs7>(data)
                .map_err(|_| Error::UnpadError),
            oid::AES_256_CBC_OID => cbc::Decryptor::<Aes256>::new_from_slices(key, &iv)
                .map_err(|_| Error::InvalidLength)?
                .decrypt_padded_vec_mut::<Pkcs7>(data)
                .map_err(|_| Error::UnpadError),
            other => Err(Error::UnsupportedAlgorithm(other)),
        }
    }

    async fn wrap_key(&self, algorithm: &AlgorithmIdentifierOwned, kek: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let wrapped = match algorithm.oid {
            oid::AES_128_WRAP_OID => Kek::<Aes128>::try_from(kek)
                .map_err(|_| Error::InvalidLength)?
                .wrap_vec(key),
            oid::AES_192_WRAP_OID => Kek::<Aes192>::try_from(kek)
                .map_err(|_| Error::InvalidLength)?
                .wrap_vec(key),
            oid::AES_256_WRAP_OID => Kek::<Aes256>::try_from(kek)
                .map_err(|_| Error::InvalidLength)?
                .wrap_vec(key),
            other => return Err(Error::UnsupportedAlgorithm(other)),
        };
        wrapped.map_err(|_| Error::InvalidLength)
    }

    async fn unwrap_key(&self, algorithm: &AlgorithmIdentifierOwned, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
        let unwrapped = match algorithm.oid {
            oid::AES_128_WRAP_OID => Kek::<Aes128>::try_from(kek)
                .map_err(|_| Error::InvalidLength)?
                .unwrap_vec(wrapped),
            oid::AES_192_WRAP_OID => Kek::<Aes192>::try_from(kek)
                .map_err(|_| Error::InvalidLength)?
                .unwrap_vec(wrapped),
            oid::AES_256_WRAP_OID => Kek::<Aes256>::try_from(kek)
                .map_err(|_| Error::InvalidLength)?
                .unwrap_vec(wrapped),
            other => return Err(Error::UnsupportedAlgorithm(other)),
        };
        unwrapped.map_err(|_| Error::UnwrapError)
    }

    async fn mac(&self, algorithm: &AlgorithmIdentifierOwned, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match algorithm.oid {
            oid::HMAC_SHA1_OID | oid::SHA1_OID => {
                let mut hmac = hmac::Hmac::<Sha1>::new_from_slice(key).map_err(|_| Error::InvalidLength)?;
                hmac.update(data);
                Ok(hmac.finalize().into_bytes().to_vec())
            }
            oid::HMAC_SHA256_OID | oid::SHA256_OID => {
                let mut hmac = hmac::Hmac::<Sha256>::new_from_slice(key).map_err(|_| Error::InvalidLength)?;
                hmac.update(data);
                Ok(hmac.finalize().into_bytes().to_vec())
            }
            other => Err(Error::UnsupportedAlgorithm(other)),
        }
    }

    async fn verify_mac(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        key: &[u8],
        data: &[u8],
        expected: &[u8],
    ) -> Result<()> {
        match algorithm.oid {
            oid::HMAC_SHA1_OID | oid::SHA1_OID => {
                let mut hmac = hmac::Hmac::<Sha1>::new_from_slice(key).map_err(|_| Error::InvalidLength)?;
                hmac.update(data);
                Ok(hmac.verify_slice(expected)?)
            }
            oid::HMAC_SHA256_OID | oid::SHA256_OID => {
                let mut hmac = hmac::Hmac::<Sha256>::new_from_slice(key).map_err(|_| Error::InvalidLength)?;
                hmac.update(data);
                Ok(hmac.verify_slice(expected)?)
            }
            other => Err(Error::UnsupportedAlgorithm(other)),
        }
    }
}
