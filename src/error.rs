//!
//! [Error] enum definition
//!
use der::oid::ObjectIdentifier;
use hmac::digest::MacError;

/// Coarse classification of [Error] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Undecodable or structurally invalid input
    Format,
    /// Missing key, certificate, CRL, request or trust anchor
    NotFound,
    /// Key usage or validity rules forbid the operation
    Policy,
    /// Signature, MAC, digest, unwrap or decryption failure
    Cryptographic,
    /// Caller supplied an incomplete or inconsistent set of arguments
    Input,
}

/// Possible errors for engine operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    DerError(#[from] der::Error),

    #[error(transparent)]
    PemError(#[from] der::pem::Error),

    #[error("Invalid version")]
    InvalidVersion,

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(ObjectIdentifier),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(ObjectIdentifier),

    #[error("Unsupported provider profile: {0}")]
    UnsupportedProfile(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid parameters")]
    InvalidParameters,

    #[error("Invalid length")]
    InvalidLength,

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Private key not found: {0}")]
    KeyNotFound(String),

    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    #[error("CRL not found: {0}")]
    CrlNotFound(String),

    #[error("Certification request not found: {0}")]
    RequestNotFound(String),

    #[error("No trusted certificate found in the certification path")]
    TrustAnchorNotFound,

    #[error("Recipient key required, the content is addressed to: {0:?}")]
    RecipientKeyRequired(Vec<String>),

    #[error("No recipient found")]
    NoRecipient,

    #[error("Issuer key usage does not permit {0}")]
    KeyUsageNotPermitted(&'static str),

    #[error("Issuer certificate is not yet valid")]
    IssuerNotYetValid,

    #[error("Issuer certificate is expired")]
    IssuerExpired,

    #[error("Issuer name does not match the issuer certificate")]
    IssuerMismatch,

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Message digest mismatch")]
    DigestMismatch,

    #[error(transparent)]
    MacError(#[from] MacError),

    #[error("Unpad error")]
    UnpadError,

    #[error("Key unwrap failed")]
    UnwrapError,

    #[error("Password required")]
    PasswordRequired,

    #[error("Alias required")]
    AliasRequired,

    #[error("Recipient does not fit the envelope mode: {0}")]
    InvalidRecipient(&'static str),

    #[error("Maximum nesting depth of {0} exceeded")]
    NestingTooDeep(usize),
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DerError(_)
            | Error::PemError(_)
            | Error::InvalidVersion
            | Error::UnsupportedContentType(_)
            | Error::UnsupportedAlgorithm(_)
            | Error::UnsupportedProfile(_)
            | Error::MissingField(_)
            | Error::InvalidParameters
            | Error::InvalidLength
            | Error::InvalidPrivateKey
            | Error::InvalidPublicKey => ErrorKind::Format,
            Error::KeyNotFound(_)
            | Error::CertificateNotFound(_)
            | Error::CrlNotFound(_)
            | Error::RequestNotFound(_)
            | Error::TrustAnchorNotFound
            | Error::RecipientKeyRequired(_)
            | Error::NoRecipient => ErrorKind::NotFound,
            Error::KeyUsageNotPermitted(_) | Error::IssuerNotYetValid | Error::IssuerExpired | Error::IssuerMismatch => {
                ErrorKind::Policy
            }
            Error::SignatureInvalid
            | Error::DigestMismatch
            | Error::MacError(_)
            | Error::UnpadError
            | Error::UnwrapError => ErrorKind::Cryptographic,
            Error::PasswordRequired | Error::AliasRequired | Error::InvalidRecipient(_) | Error::NestingTooDeep(_) => {
                ErrorKind::Input
            }
        }
    }
}
