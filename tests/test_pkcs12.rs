use std::str::FromStr;

use cms::content_info::ContentInfo;
use der::{Decode, Encode, asn1::OctetString};
use futures::executor::block_on;
use pkcs12::pfx::{Pfx, Version};
use pkix_engine::{
    CertificatePrototype, CrlPrototype, Error, ErrorKind, ExportMode, ExportOptions, Key, KeyStore, MacAlgorithm,
    MemoryKeyStore, OutputFormat, Pkix, ProviderProfile, Revocation, SignMode, SoftwareProvider, StoredKey,
    secret::SecretKeyType,
};
use x509_cert::name::Name;

const PASSWORD: &str = "changeit";

fn engine() -> Pkix<SoftwareProvider> {
    Pkix::new(SoftwareProvider::new(), MemoryKeyStore::new())
        .with_profile(ProviderProfile::ecdsa_256().with_iterations(16))
}

fn options() -> ExportOptions {
    ExportOptions::new().mac_iterations(16).encryption_iterations(16)
}

/// Root with a CRL, an issued end entity and a secret key
fn populated() -> Pkix<SoftwareProvider> {
    let mut pkix = engine();
    let root = CertificatePrototype::new().subject(Name::from_str("CN=Root,O=Test").unwrap());
    block_on(pkix.create_certificate(&root, "root", Some(PASSWORD))).unwrap();
    block_on(pkix.update_crl(&CrlPrototype::new().revoke(Revocation::new(9u64)), "root", Some(PASSWORD))).unwrap();

    let leaf = CertificatePrototype::new().subject(Name::from_str("CN=Leaf,O=Test").unwrap());
    block_on(pkix.create_request(&leaf, "leaf", None)).unwrap();
    block_on(pkix.issue_certificate(&CertificatePrototype::new(), "leaf", "root", Some(PASSWORD))).unwrap();

    block_on(pkix.generate_secret("aes", SecretKeyType::Aes128Cbc, None, None)).unwrap();
    pkix
}

fn assert_same_objects(source: &Pkix<SoftwareProvider>, target: &Pkix<SoftwareProvider>) {
    for alias in ["root", "leaf"] {
        assert_eq!(source.store().get_certificate(alias), target.store().get_certificate(alias));
    }
    assert_eq!(source.store().get_crl("root"), target.store().get_crl("root"));

    let leaf_key = block_on(source.retrieve("leaf", None)).unwrap();
    assert_eq!(block_on(target.retrieve("leaf", Some(PASSWORD))).unwrap(), leaf_key);
    let secret = block_on(source.retrieve("aes", None)).unwrap();
    assert_eq!(block_on(target.retrieve("aes", Some(PASSWORD))).unwrap(), secret);
}

#[test]
fn test_mac_protected_roundtrip() {
    let source = populated();
    let exported = block_on(source.export_key_store(Some(PASSWORD), &options())).unwrap();

    let pfx = Pfx::from_der(exported.as_bytes()).unwrap();
    let mac_data = pfx.mac_data.unwrap();
    assert_eq!(mac_data.iterations, 16);
    assert_eq!(mac_data.mac.digest.as_bytes().len(), 32);

    let mut target = engine();
    let mut aliases = block_on(target.import_key_store(exported.as_bytes(), Some(PASSWORD))).unwrap();
    aliases.sort();
    assert_eq!(aliases, vec!["aes", "leaf", "root"]);

    assert!(target.store().get_key("leaf").unwrap().is_encrypted());
    assert_same_objects(&source, &target);
}

#[test]
fn test_encrypted_roundtrip() {
    let source = populated().with_format(OutputFormat::Pem);
    let options = options().mode(ExportMode::Encrypt).mac_algorithm(MacAlgorithm::HmacSha1);
    let exported = block_on(source.export_key_store(Some(PASSWORD), &options)).unwrap();
    assert!(std::str::from_utf8(exported.as_bytes()).unwrap().starts_with("-----BEGIN PKCS12-----"));

    let pfx = Pfx::from_der(&exported.to_der().unwrap()).unwrap();
    assert_eq!(pfx.mac_data.unwrap().mac.digest.as_bytes().len(), 20);

    let mut target = engine();
    block_on(target.import_key_store(exported.as_bytes(), Some(PASSWORD))).unwrap();
    assert_same_objects(&source, &target);
}

#[test]
fn test_wrong_password_stores_nothing() {
    let source = populated();
    let exported = block_on(source.export_key_store(Some(PASSWORD), &options())).unwrap();

    let mut target = engine();
    let err = block_on(target.import_key_store(exported.as_bytes(), Some("wrong"))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cryptographic);
    assert!(target.store().aliases().is_empty());

    let err = block_on(target.import_key_store(exported.as_bytes(), None)).unwrap_err();
    assert!(matches!(err, Error::PasswordRequired));
    assert!(target.store().aliases().is_empty());
}

#[test]
fn test_export_without_password() {
    let source = populated();
    let exported = block_on(source.export_key_store(None, &options())).unwrap();

    assert!(Pfx::from_der(exported.as_bytes()).unwrap().mac_data.is_none());

    let mut target = engine();
    block_on(target.import_key_store(exported.as_bytes(), None)).unwrap();
    assert!(matches!(target.store().get_key("leaf"), Some(StoredKey::Private(_))));
    assert!(matches!(target.store().get_key("aes"), Some(StoredKey::Secret(_))));
    // the root key was stored encrypted and is exported as-is
    assert!(target.store().get_key("root").unwrap().is_encrypted());
    assert!(matches!(
        block_on(target.retrieve("root", Some(PASSWORD))),
        Ok(Key::Private(_))
    ));

    let mut other = engine();
    let err = block_on(other.import_key_store(exported.as_bytes(), Some(PASSWORD))).unwrap_err();
    assert!(matches!(err, Error::MissingField("macData")));

    let err = block_on(source.export_key_store(None, &options().mode(ExportMode::Encrypt))).unwrap_err();
    assert!(matches!(err, Error::PasswordRequired));
}

#[test]
fn test_signed_store_requires_mac_with_password() {
    let mut pkix = populated();
    let exported = block_on(pkix.export_key_store(None, &options())).unwrap();

    let pfx = Pfx::from_der(exported.as_bytes()).unwrap();
    let safes = OctetString::from_der(&pfx.auth_safe.content.to_der().unwrap()).unwrap();
    let signed = block_on(pkix.sign_data(safes.as_bytes(), &[], "root", Some(PASSWORD))).unwrap();

    let signed_pfx = Pfx {
        version: Version::V3,
        auth_safe: ContentInfo::from_der(signed.as_bytes()).unwrap(),
        mac_data: None,
    }
    .to_der()
    .unwrap();

    let err = block_on(pkix.import_key_store(&signed_pfx, Some(PASSWORD))).unwrap_err();
    assert!(matches!(err, Error::MissingField("macData")));

    let mut aliases = block_on(pkix.import_key_store(&signed_pfx, None)).unwrap();
    aliases.sort();
    assert_eq!(aliases, vec!["aes", "leaf", "root"]);
}

#[test]
fn test_import_keeps_existing_entries() {
    let mut source = engine();
    let proto = CertificatePrototype::new().subject(Name::from_str("CN=Imported").unwrap());
    block_on(source.create_certificate(&proto, "imported", None)).unwrap();
    let exported = block_on(source.export_key_store(Some(PASSWORD), &options())).unwrap();

    let mut target = populated();
    let before = target.store().aliases().len();
    block_on(target.import_key_store(exported.as_bytes(), Some(PASSWORD))).unwrap();

    assert_eq!(target.store().aliases().len(), before + 1);
    assert!(target.store().get_certificate("root").is_some());
    assert!(target.store().get_certificate("imported").is_some());
}

#[test]
fn test_garbage_input() {
    let mut pkix = engine();
    let err = block_on(pkix.import_key_store(b"not a pfx", Some(PASSWORD))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}
