//!
//! A PKIX engine written in pure Rust: certification paths, certificate and CRL issuance,
//! CMS messages and PKCS#12 key stores on top of a pluggable crypto provider.
//!
//! The central type is [Pkix], which owns a [CryptoProvider] performing every cryptographic primitive,
//! a [KeyStore] holding certificates, CRLs, certification requests and keys by alias,
//! and a [ProviderProfile] naming the algorithms used for new objects.
//!
//! Supported operations:
//!
//! * certificate selection, path building, path validation and revocation checks
//! * self-signed certificates, certification requests, certificate issuance and CRL updates
//! * CMS signed, digested, enveloped and encrypted data, including nested envelopes
//! * PKCS#12 import and export with PBES2 encryption and HMAC integrity
//! * PKCS#8 import and export of private keys
//!
//! All operations are `async` because the provider may be backed by hardware or a remote service.
//! The bundled [SoftwareProvider] implements the `ECDSA-256` profile in software.
//!

mod cert;
mod codec;
mod crl;
mod engine;
pub mod error;
mod input;
mod issuer;
mod key;
mod keycodec;
mod keystore;
mod message;
mod name;
mod objects;
pub mod oid;
mod path;
mod pfx;
mod profile;
mod provider;
pub mod secret;
mod selector;
mod serial;
mod software;
mod time;

pub use rand;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, error::Error>;

pub use cert::CertificateExt;
pub use crl::{CrlPrototype, Revocation};
pub use engine::Pkix;
pub use error::{Error, ErrorKind};
pub use input::{Encoded, Input, OutputFormat};
pub use issuer::CertificatePrototype;
pub use key::{Key, KeyPair, PrivateKey, StoredKey};
pub use keycodec::KeyFormat;
pub use keystore::{Entries, KeyStore, KeyStoreEntry, MemoryKeyStore};
pub use message::{CmsContent, EnvelopeMode, Extracted, Originator, Recipients, SignMode};
pub use name::{FlatName, names_equal};
pub use objects::{ExportFormat, parse_certs_only};
pub use path::{CertPath, PathEnd, build_cert_path, is_revoked, issuer_selector};
pub use pfx::{ExportMode, ExportOptions, MacAlgorithm};
pub use profile::ProviderProfile;
pub use provider::{CryptoProvider, Derivation};
pub use selector::{Selector, compare_buffers, match_certificate, match_crl, select_certificates, select_crls};
pub use serial::{Serial, number_inc};
pub use software::SoftwareProvider;
pub use time::{add_years, from_time, to_time, today};
