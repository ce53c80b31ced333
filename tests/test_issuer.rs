use std::str::FromStr;

use der::{Decode, Encode, oid::AssociatedOid};
use futures::executor::block_on;
use pkix_engine::{
    CertificateExt, CertificatePrototype, CrlPrototype, Error, ErrorKind, ExportFormat, Input, KeyStore,
    MemoryKeyStore, OutputFormat, Pkix, ProviderProfile, Revocation, Serial, SoftwareProvider, add_years,
    parse_certs_only, today,
};
use x509_cert::{
    crl::CertificateList,
    ext::pkix::{BasicConstraints, CrlNumber, CrlReason, KeyUsage},
    name::Name,
    request::CertReq,
};

const PASSWORD: &str = "changeit";

fn engine() -> Pkix<SoftwareProvider> {
    Pkix::new(SoftwareProvider::new(), MemoryKeyStore::new())
        .with_profile(ProviderProfile::ecdsa_256().with_iterations(16))
}

fn subject(name: &str) -> CertificatePrototype {
    CertificatePrototype::new().subject(Name::from_str(name).unwrap())
}

fn crl_number(crl: &CertificateList) -> Serial {
    let ext = crl
        .tbs_cert_list
        .crl_extensions
        .iter()
        .flatten()
        .find(|e| e.extn_id == CrlNumber::OID)
        .unwrap();
    let number = CrlNumber::from_der(ext.extn_value.as_bytes()).unwrap();
    Serial::from(number.0.as_bytes())
}

#[test]
fn test_issue_from_request() {
    let mut pkix = engine();
    let root = block_on(pkix.create_certificate(&subject("CN=Root"), "root", Some(PASSWORD))).unwrap();
    let request = block_on(pkix.create_request(&subject("CN=Alice"), "alice", None)).unwrap();

    let err = block_on(pkix.issue_certificate(&CertificatePrototype::new(), "alice", "root", None)).unwrap_err();
    assert!(matches!(err, Error::PasswordRequired));

    let cert =
        block_on(pkix.issue_certificate(&CertificatePrototype::new(), "alice", "root", Some(PASSWORD))).unwrap();

    assert_eq!(cert.tbs_certificate.issuer, root.tbs_certificate.subject);
    assert_eq!(cert.tbs_certificate.subject_public_key_info, request.info.public_key);
    assert_eq!(cert.not_after(), root.not_after());
    assert!(!cert.key_usage().unwrap().unwrap().key_cert_sign());

    let aki = cert.authority_key_identifier().unwrap().unwrap();
    assert_eq!(
        aki.key_identifier.unwrap().as_bytes(),
        root.subject_key_identifier().unwrap().unwrap().as_slice()
    );

    let stored = pkix.store().entry("alice").unwrap();
    assert_eq!(stored.certificate(), Some(&cert));
    assert!(stored.request().is_some());
    assert!(stored.key().is_some());
}

#[test]
fn test_requested_basic_constraints_kept() {
    let mut pkix = engine();
    block_on(pkix.create_certificate(&subject("CN=Root"), "root", None)).unwrap();

    let requested = BasicConstraints {
        ca: true,
        path_len_constraint: Some(3),
    };
    let proto = subject("CN=Sub CA").extension(&requested, true).unwrap();
    block_on(pkix.create_request(&proto, "sub", None)).unwrap();
    let cert = block_on(pkix.issue_certificate(&CertificatePrototype::new(), "sub", "root", None)).unwrap();
    assert_eq!(cert.basic_constraints().unwrap(), Some(requested));

    block_on(pkix.create_request(&subject("CN=Plain"), "plain", None)).unwrap();
    let cert = block_on(pkix.issue_certificate(&CertificatePrototype::new(), "plain", "root", None)).unwrap();
    let constraints = cert.basic_constraints().unwrap().unwrap();
    assert!(!constraints.ca);
    assert_eq!(constraints.path_len_constraint, None);
}

#[test]
fn test_serials_increment_per_issuer() {
    let mut pkix = engine();
    block_on(pkix.create_certificate(&subject("CN=Root"), "root", None)).unwrap();

    let mut serials = Vec::new();
    for alias in ["a", "b", "c"] {
        block_on(pkix.create_request(&subject(&format!("CN={alias}")), alias, None)).unwrap();
        let cert = block_on(pkix.issue_certificate(&CertificatePrototype::new(), alias, "root", None)).unwrap();
        serials.push(cert.serial().to_hex());
    }
    assert_eq!(serials, vec!["02", "03", "04"]);

    let proto = CertificatePrototype::new().serial_number(Serial::Int(1000));
    block_on(pkix.create_request(&subject("CN=d"), "d", None)).unwrap();
    let cert = block_on(pkix.issue_certificate(&proto, "d", "root", None)).unwrap();
    assert!(cert.serial().compare(&Serial::Int(1000)).is_eq());
}

#[test]
fn test_issuer_policy() {
    let mut pkix = engine();
    let root = block_on(pkix.create_certificate(&subject("CN=Root"), "root", None)).unwrap();
    block_on(pkix.create_request(&subject("CN=Leaf"), "leaf", None)).unwrap();
    block_on(pkix.issue_certificate(&CertificatePrototype::new(), "leaf", "root", None)).unwrap();

    block_on(pkix.create_request(&subject("CN=Other"), "other", None)).unwrap();
    let err = block_on(pkix.issue_certificate(&CertificatePrototype::new(), "other", "leaf", None)).unwrap_err();
    assert!(matches!(err, Error::KeyUsageNotPermitted("keyCertSign")));

    let late = CertificatePrototype::new().not_before(add_years(root.not_after(), 1));
    let err = block_on(pkix.issue_certificate(&late, "other", "root", None)).unwrap_err();
    assert!(matches!(err, Error::IssuerExpired));
    assert_eq!(err.kind(), ErrorKind::Policy);

    let err = block_on(pkix.update_crl(&CrlPrototype::new(), "leaf", None)).unwrap_err();
    assert!(matches!(err, Error::KeyUsageNotPermitted("cRLSign")));

    let err = block_on(pkix.issue_certificate(&CertificatePrototype::new(), "missing", "root", None)).unwrap_err();
    assert!(matches!(err, Error::RequestNotFound(_)));
}

#[test]
fn test_crl_requires_key_usage() {
    let mut pkix = engine();
    let mut root = block_on(pkix.create_certificate(&subject("CN=Root"), "root", None)).unwrap();

    if let Some(extensions) = root.tbs_certificate.extensions.as_mut() {
        extensions.retain(|ext| ext.extn_id != KeyUsage::OID);
    }
    assert!(root.key_usage().unwrap().is_none());
    pkix.store_mut().set_certificate("root", root);

    let err = block_on(pkix.update_crl(&CrlPrototype::new(), "root", None)).unwrap_err();
    assert!(matches!(err, Error::KeyUsageNotPermitted("cRLSign")));
    assert!(pkix.store().get_crl("root").is_none());
}

#[test]
fn test_crl_updates_accumulate() {
    let mut pkix = engine();
    let root = block_on(pkix.create_certificate(&subject("CN=Root"), "root", None)).unwrap();

    let first = block_on(pkix.update_crl(&CrlPrototype::new().revoke(Revocation::new(5u64)), "root", None)).unwrap();
    assert!(crl_number(&first).compare(&Serial::Int(0)).is_eq());

    let proto = CrlPrototype::new().revoke(Revocation::new(6u64).reason(CrlReason::KeyCompromise));
    let second = block_on(pkix.update_crl(&proto, "root", None)).unwrap();
    assert!(crl_number(&second).compare(&Serial::Int(1)).is_eq());
    assert_eq!(second.tbs_cert_list.revoked_certificates.as_ref().unwrap().len(), 2);
    assert_eq!(second.tbs_cert_list.issuer, root.tbs_certificate.subject);
    assert_eq!(pkix.store().get_crl("root"), Some(second.clone()));

    let numbered = CrlPrototype::new().crl_number(Serial::Int(42)).this_update(today());
    let third = block_on(pkix.update_crl(&numbered, "root", None)).unwrap();
    assert!(crl_number(&third).compare(&Serial::Int(42)).is_eq());
}

#[test]
fn test_import_checks_signatures() {
    let mut ca = engine();
    let root = block_on(ca.create_certificate(&subject("CN=Root"), "root", None)).unwrap();
    block_on(ca.create_request(&subject("CN=Leaf"), "leaf", None)).unwrap();
    let leaf = block_on(ca.issue_certificate(&CertificatePrototype::new(), "leaf", "root", None)).unwrap();
    let crl = block_on(ca.update_crl(&CrlPrototype::new().revoke(Revocation::new(7u64)), "root", None)).unwrap();

    let mut relying = engine();
    block_on(relying.import_certificate("root", Input::Der(root.to_der().unwrap()))).unwrap();
    block_on(relying.import_certificate("leaf", Input::Decoded(leaf.clone()))).unwrap();
    block_on(relying.import_crl("root", Input::Decoded(crl.clone()))).unwrap();
    assert_eq!(relying.store().get_crl("root"), Some(crl));

    let mut tampered = leaf.clone();
    tampered.tbs_certificate.subject = Name::from_str("CN=Mallory").unwrap();
    let err = block_on(relying.import_certificate("mallory", Input::Decoded(tampered))).unwrap_err();
    assert!(matches!(err, Error::SignatureInvalid));
    assert!(!relying.store().contains_alias("mallory"));
}

#[test]
fn test_request_export_import() {
    let mut pkix = engine().with_format(OutputFormat::Pem);
    let request = block_on(pkix.create_request(&subject("CN=Alice"), "alice", None)).unwrap();

    let exported = pkix.export_request("alice").unwrap();
    assert!(std::str::from_utf8(exported.as_bytes()).unwrap().starts_with("-----BEGIN CERTIFICATE REQUEST-----"));

    let mut other = engine();
    let imported = block_on(other.import_request("alice", Input::from(exported.as_bytes()))).unwrap();
    assert_eq!(imported, request);

    let mut forged: CertReq = request.clone();
    forged.info.subject = Name::from_str("CN=Bob").unwrap();
    let err = block_on(other.import_request("bob", Input::Decoded(forged))).unwrap_err();
    assert!(matches!(err, Error::SignatureInvalid));

    assert!(matches!(pkix.export_request("nobody"), Err(Error::RequestNotFound(_))));
}

#[test]
fn test_export_formats() {
    let mut pkix = engine();
    let root = block_on(pkix.create_certificate(&subject("CN=Root"), "root", Some(PASSWORD))).unwrap();
    let crl = block_on(pkix.update_crl(&CrlPrototype::new(), "root", Some(PASSWORD))).unwrap();

    let x509 = block_on(pkix.export_certificate("root", ExportFormat::X509)).unwrap();
    assert_eq!(x509.to_der().unwrap(), root.to_der().unwrap());

    let p7c = block_on(pkix.export_certificate("root", ExportFormat::P7c)).unwrap();
    let (certs, crls) = parse_certs_only(&p7c.to_der().unwrap()).unwrap();
    assert_eq!(certs, vec![root.clone()]);
    assert!(crls.is_empty());

    let p7c = block_on(pkix.export_crl("root", ExportFormat::P7c)).unwrap();
    let (certs, crls) = parse_certs_only(p7c.as_bytes()).unwrap();
    assert!(certs.is_empty());
    assert_eq!(crls, vec![crl.clone()]);

    let p12 = block_on(pkix.export_certificate("root", ExportFormat::P12)).unwrap();
    let mut other = engine();
    let aliases = block_on(other.import_key_store(p12.as_bytes(), None)).unwrap();
    assert_eq!(aliases, vec!["root".to_owned()]);
    assert_eq!(other.store().get_certificate("root"), Some(root));
    assert!(other.store().get_key("root").is_none());

    let p12 = block_on(pkix.export_crl("root", ExportFormat::P12)).unwrap();
    let aliases = block_on(other.import_key_store(p12.as_bytes(), None)).unwrap();
    assert_eq!(aliases, vec!["root".to_owned()]);
    assert_eq!(other.store().get_crl("root"), Some(crl));

    assert!(matches!(
        block_on(pkix.export_crl("nobody", ExportFormat::X509)),
        Err(Error::CrlNotFound(_))
    ));
}
