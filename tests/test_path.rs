use std::str::FromStr;

use chrono::Duration;
use der::asn1::BitString;
use futures::executor::block_on;
use pkix_engine::{
    CertificateExt, CertificatePrototype, CrlPrototype, Error, ErrorKind, Input, KeyStore, MemoryKeyStore, PathEnd, Pkix,
    ProviderProfile, Revocation, Selector, Serial, SoftwareProvider, select_certificates,
};
use x509_cert::{
    Certificate,
    ext::pkix::{KeyUsage, KeyUsages},
    name::Name,
};

fn engine() -> Pkix<SoftwareProvider> {
    Pkix::new(SoftwareProvider::new(), MemoryKeyStore::new())
        .with_profile(ProviderProfile::ecdsa_256().with_iterations(16))
}

fn subject(name: &str) -> CertificatePrototype {
    CertificatePrototype::new().subject(Name::from_str(name).unwrap())
}

fn issue(pkix: &mut Pkix<SoftwareProvider>, name: &str, alias: &str, issuer: &str, ca: bool) -> Certificate {
    block_on(pkix.create_request(&subject(name), alias, None)).unwrap();
    let mut proto = CertificatePrototype::new();
    if ca {
        proto = proto
            .extension(
                &KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyCertSign | KeyUsages::CRLSign),
                true,
            )
            .unwrap();
    }
    block_on(pkix.issue_certificate(&proto, alias, issuer, None)).unwrap()
}

/// root -> ca -> leaf
fn hierarchy() -> (Pkix<SoftwareProvider>, Certificate, Certificate, Certificate) {
    let mut pkix = engine();
    let root = block_on(pkix.create_certificate(&subject("CN=Root,O=Test"), "root", None)).unwrap();
    let ca = issue(&mut pkix, "CN=Intermediate,O=Test", "ca", "root", true);
    let leaf = issue(&mut pkix, "CN=Leaf,O=Test", "leaf", "ca", false);
    (pkix, root, ca, leaf)
}

#[test]
fn test_selector_conjunction() {
    let (_, root, ca, leaf) = hierarchy();
    let pool = [root.clone(), ca.clone(), leaf.clone()];

    assert_eq!(select_certificates(&pool, &Selector::new()).len(), 3);

    let by_issuer = Selector::new().issuer(root.tbs_certificate.subject.clone());
    assert_eq!(select_certificates(&pool, &by_issuer).len(), 2);

    let by_issuer_and_serial = by_issuer.clone().serial_number(ca.serial());
    assert_eq!(select_certificates(&pool, &by_issuer_and_serial), vec![&ca]);

    let mismatch = by_issuer.serial_number(Serial::Hex("0xdeadbeef".to_owned()));
    assert!(select_certificates(&pool, &mismatch).is_empty());

    let by_key = Selector::new().subject_key_identifier(leaf.subject_key_identifier().unwrap().unwrap());
    assert_eq!(select_certificates(&pool, &by_key), vec![&leaf]);
}

#[test]
fn test_selector_date_bounds_are_exclusive() {
    let (_, root, ca, leaf) = hierarchy();
    let pool = [root, ca, leaf.clone()];
    let by_subject = Selector::new().subject(leaf.tbs_certificate.subject.clone());

    let at_start = by_subject.clone().date(leaf.not_before());
    assert!(select_certificates(&pool, &at_start).is_empty());

    let at_end = by_subject.clone().date(leaf.not_after());
    assert!(select_certificates(&pool, &at_end).is_empty());

    let inside = by_subject.date(leaf.not_before() + Duration::days(1));
    assert_eq!(select_certificates(&pool, &inside), vec![&leaf]);
}

#[test]
fn test_issued_serials() {
    let (_, root, ca, leaf) = hierarchy();

    assert!(root.serial().compare(&Serial::Int(1)).is_eq());
    // one above the root, the largest serial issued under the root name
    assert!(ca.serial().compare(&Serial::Int(2)).is_eq());
    assert!(leaf.serial().compare(&Serial::Int(1)).is_eq());
    assert!(ca.basic_constraints().unwrap().unwrap().ca);
    assert!(!leaf.basic_constraints().unwrap().unwrap().ca);
}

#[test]
fn test_build_complete_path() {
    let (pkix, root, ca, leaf) = hierarchy();

    let path = pkix.build_cert_path(&leaf, &[], None).unwrap();

    assert!(path.is_complete());
    assert_eq!(path.certificates, vec![leaf, ca, root]);
}

#[test]
fn test_path_stops_at_missing_issuer() {
    let (pkix, _, ca, leaf) = hierarchy();

    let crls = pkix.store().get_all_crls();
    let path = pkix_engine::build_cert_path(&leaf, std::slice::from_ref(&ca), &crls, chrono::Utc::now()).unwrap();

    assert_eq!(path.end, PathEnd::IssuerNotFound);
    assert_eq!(path.len(), 2);
}

#[test]
fn test_path_stops_at_revoked_issuer() {
    let (mut pkix, _, ca, leaf) = hierarchy();

    assert!(!pkix.is_revoked(&ca, None));
    let proto = CrlPrototype::new().revoke(Revocation::new(ca.serial()));
    block_on(pkix.update_crl(&proto, "root", None)).unwrap();
    assert!(pkix.is_revoked(&ca, None));
    assert!(!pkix.is_revoked(&leaf, None));

    let path = pkix.build_cert_path(&leaf, &[], None).unwrap();
    assert_eq!(path.end, PathEnd::IssuerRevoked);
    assert_eq!(path.certificates, vec![leaf]);
}

#[test]
fn test_validate_requires_trust_anchor() {
    let (pkix, root, ca, leaf) = hierarchy();
    let chain = vec![leaf.clone(), ca.clone(), root.clone()];

    let validated = block_on(pkix.validate_certificate(&chain[..1], None)).unwrap();
    assert_eq!(validated.len(), 3);

    let mut other = engine();
    let err = block_on(other.validate_certificate(&chain, None)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    block_on(other.import_certificate("root", Input::Decoded(root))).unwrap();
    let validated = block_on(other.validate_certificate(&chain, None)).unwrap();
    assert_eq!(validated, chain);
}

#[test]
fn test_validate_rejects_bad_intermediate_signature() {
    let (_, root, mut ca, leaf) = hierarchy();

    let mut signature = ca.signature.raw_bytes().to_vec();
    let last = signature.len() - 1;
    signature[last] ^= 0x01;
    ca.signature = BitString::from_bytes(&signature).unwrap();

    let mut relying = engine();
    block_on(relying.import_certificate("root", Input::Decoded(root))).unwrap();

    let err = block_on(relying.validate_certificate(&[leaf, ca], None)).unwrap_err();
    assert!(matches!(err, Error::SignatureInvalid));
    assert_eq!(err.kind(), ErrorKind::Cryptographic);
}
