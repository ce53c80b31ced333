//!
//! Named algorithm catalogs used by the engine
//!
use der::{Any, asn1::ObjectIdentifier};
use spki::AlgorithmIdentifierOwned;

use crate::{Result, error::Error, oid};

/// Named bundle of algorithm identifiers the engine hands to the crypto provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub name: String,
    /// Key pair generation (algorithm and curve)
    pub generation: AlgorithmIdentifierOwned,
    pub signature: AlgorithmIdentifierOwned,
    pub digest: AlgorithmIdentifierOwned,
    /// Content encryption, without IV parameters
    pub encryption: AlgorithmIdentifierOwned,
    pub wrapping: AlgorithmIdentifierOwned,
    pub agreement: AlgorithmIdentifierOwned,
    /// PRF for PBKDF2
    pub pbkdf2_prf: AlgorithmIdentifierOwned,
    pub pbkdf2_iterations: u32,
}

impl ProviderProfile {
    pub const ECDSA_256: &'static str = "ECDSA-256";

    /// Look up a profile by name
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            Self::ECDSA_256 => Ok(Self::ecdsa_256()),
            _ => Err(Error::UnsupportedProfile(name.to_owned())),
        }
    }

    /// P-256 keys, ECDSA with SHA-256, AES-256 and PBKDF2 with HMAC-SHA256
    pub fn ecdsa_256() -> Self {
        Self {
            name: Self::ECDSA_256.to_owned(),
            generation: AlgorithmIdentifierOwned {
                oid: oid::EC_PUBLIC_KEY_OID,
                parameters: Some(Any::from(oid::SECP256R1_OID)),
            },
            signature: algorithm(oid::ECDSA_WITH_SHA256_OID),
            digest: algorithm(oid::SHA256_OID),
            encryption: algorithm(oid::AES_256_CBC_OID),
            wrapping: algorithm(oid::AES_256_WRAP_OID),
            agreement: algorithm(oid::DH_SINGLE_PASS_STD_DH_SHA256_KDF_OID),
            pbkdf2_prf: AlgorithmIdentifierOwned {
                oid: oid::HMAC_SHA256_OID,
                parameters: Some(Any::null()),
            },
            pbkdf2_iterations: 2048,
        }
    }

    /// Override the PBKDF2 iteration count
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = iterations;
        self
    }
}

pub(crate) fn algorithm(oid: ObjectIdentifier) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned { oid, parameters: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_lookup() {
        let profile = ProviderProfile::by_name("ECDSA-256").unwrap();
        assert_eq!(profile.signature.oid, oid::ECDSA_WITH_SHA256_OID);
        assert_eq!(profile.pbkdf2_iterations, 2048);

        let err = ProviderProfile::by_name("GOST-2012").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Format);
    }
}
