use cms::{
    cert::x509::attr::{Attribute, AttributeValue, Attributes},
    content_info::ContentInfo,
    encrypted_data::EncryptedData,
    enveloped_data::EncryptedContentInfo,
};
use der::{
    Any, Decode, Encode, Sequence,
    asn1::{BmpString, ObjectIdentifier, OctetString, OctetStringRef, SetOfVec},
};
use pkcs12::{
    cert_type::CertBag,
    crl_type::CrlBag,
    pbe_params::EncryptedPrivateKeyInfo,
    safe_bag::{SafeBag, SafeContents},
};
use spki::AlgorithmIdentifierOwned;
use x509_cert::{Certificate, crl::CertificateList};

use crate::{
    Result,
    error::Error,
    key::{Key, PrivateKey, StoredKey},
    keycodec::{decode_key, encode_key},
    oid,
};

const MAX_SAFE_CONTENTS_DEPTH: usize = 8;

/// Decoded bag content
pub enum BagItem {
    Key(StoredKey),
    Certificate(Certificate),
    Crl(CertificateList),
}

pub struct ParsedBag {
    pub friendly_name: Option<String>,
    pub local_key_id: Option<Vec<u8>>,
    pub item: BagItem,
}

fn get_bag_attribute(oid: &ObjectIdentifier, bag: &SafeBag) -> Option<Vec<u8>> {
    if let Some(ref attrs) = bag.bag_attributes {
        attrs.iter().find_map(|a| {
            if a.oid == *oid {
                a.values.iter().next().and_then(|a| a.to_der().ok())
            } else {
                None
            }
        })
    } else {
        None
    }
}

/// Inner value of a decoded bag, without the explicit [0] tag
fn bag_content(bag: &SafeBag) -> Result<Vec<u8>> {
    Ok(Any::from_der(&bag.bag_value)?.value().to_vec())
}

/// Only PBES2 protected keys can be retrieved later
fn check_encrypted_key(info: &EncryptedPrivateKeyInfo) -> Result<()> {
    if info.encryption_algorithm.oid != oid::PBES2_OID {
        return Err(Error::UnsupportedAlgorithm(info.encryption_algorithm.oid));
    }
    Ok(())
}

pub fn parse_bags(bags: SafeContents, depth: usize) -> Result<Vec<ParsedBag>> {
    if depth > MAX_SAFE_CONTENTS_DEPTH {
        return Err(Error::NestingTooDeep(MAX_SAFE_CONTENTS_DEPTH));
    }

    let mut parsed = Vec::new();

    for bag in bags {
        let local_key_id = get_bag_attribute(&oid::LOCAL_KEY_ID_OID, &bag)
            .and_then(|a| OctetString::from_der(&a).ok().map(|a| a.as_bytes().to_vec()));

        let friendly_name = get_bag_attribute(&oid::FRIENDLY_NAME_OID, &bag)
            .and_then(|n| BmpString::from_der(&n).ok().map(|a| a.to_string()));

        let item = match bag.bag_id {
            oid::PKCS_12_CERT_BAG_OID => {
                let cert_bag = CertBag::from_der(&bag_content(&bag)?)?;
                if cert_bag.cert_id != oid::CERT_TYPE_X509_CERTIFICATE_OID {
                    return Err(Error::UnsupportedContentType(cert_bag.cert_id));
                }
                BagItem::Certificate(Certificate::from_der(cert_bag.cert_value.as_bytes())?)
            }
            oid::PKCS_12_CRL_BAG_OID => {
                let crl_bag = CrlBag::from_der(&bag_content(&bag)?)?;
                if crl_bag.crl_id != oid::CRL_TYPE_X509_CRL_OID {
                    return Err(Error::UnsupportedContentType(crl_bag.crl_id));
                }
                BagItem::Crl(CertificateList::from_der(crl_bag.crl_value.as_bytes())?)
            }
            oid::PKCS_12_KEY_BAG_OID => BagItem::Key(decode_key(&bag_content(&bag)?)?.into()),
            oid::PKCS_12_PKCS8_KEY_BAG_OID => {
                let info = EncryptedPrivateKeyInfo::from_der(&bag_content(&bag)?)?;
                check_encrypted_key(&info)?;
                BagItem::Key(StoredKey::Encrypted(info))
            }
            oid::PKCS_12_SECRET_BAG_OID => {
                let secret_bag = SecretBag::from_bag_der(&bag.bag_value)?;
                BagItem::Key(secret_bag.stored_key()?)
            }
            oid::PKCS_12_SAFE_CONTENTS_BAG_OID => {
                let nested = SafeContents::from_der(&bag_content(&bag)?)?;
                parsed.extend(parse_bags(nested, depth + 1)?);
                continue;
            }
            other => {
                log::debug!("Skipping unsupported bag type {other}");
                continue;
            }
        };

        parsed.push(ParsedBag {
            friendly_name,
            local_key_id,
            item,
        });
    }

    Ok(parsed)
}

/// friendlyName and localKeyId attributes, both derived from the alias
fn bag_attributes(alias: &str) -> Result<Attributes> {
    let mut bag_attributes = Attributes::new();

    let friendly_name =
        SetOfVec::<AttributeValue>::from_iter([Any::from_der(&BmpString::from_utf8(alias)?.to_der()?)?])?;

    bag_attributes.insert(Attribute {
        oid: oid::FRIENDLY_NAME_OID,
        values: friendly_name,
    })?;

    let local_key_id =
        SetOfVec::<AttributeValue>::from_iter([Any::from_der(&OctetStringRef::new(alias.as_bytes())?.to_der()?)?])?;

    bag_attributes.insert(Attribute {
        oid: oid::LOCAL_KEY_ID_OID,
        values: local_key_id,
    })?;

    Ok(bag_attributes)
}

pub fn certificate_to_safe_bag(certificate: &Certificate, alias: &str) -> Result<SafeBag> {
    let cert_bag = CertBag {
        cert_id: oid::CERT_TYPE_X509_CERTIFICATE_OID,
        cert_value: OctetString::new(certificate.to_der()?)?,
    };
    Ok(SafeBag {
        bag_id: oid::PKCS_12_CERT_BAG_OID,
        bag_value: cert_bag.to_der()?,
        bag_attributes: Some(bag_attributes(alias)?),
    })
}

pub fn crl_to_safe_bag(crl: &CertificateList, alias: &str) -> Result<SafeBag> {
    let crl_bag = CrlBag {
        crl_id: oid::CRL_TYPE_X509_CRL_OID,
        crl_value: OctetString::new(crl.to_der()?)?,
    };
    Ok(SafeBag {
        bag_id: oid::PKCS_12_CRL_BAG_OID,
        bag_value: crl_bag.to_der()?,
        bag_attributes: Some(bag_attributes(alias)?),
    })
}

pub fn private_key_to_safe_bag(key: &PrivateKey, alias: &str) -> Result<SafeBag> {
    Ok(SafeBag {
        bag_id: oid::PKCS_12_KEY_BAG_OID,
        bag_value: key.as_der().to_vec(),
        bag_attributes: Some(bag_attributes(alias)?),
    })
}

pub fn encrypted_key_to_safe_bag(info: &EncryptedPrivateKeyInfo, alias: &str) -> Result<SafeBag> {
    Ok(SafeBag {
        bag_id: oid::PKCS_12_PKCS8_KEY_BAG_OID,
        bag_value: info.to_der()?,
        bag_attributes: Some(bag_attributes(alias)?),
    })
}

/// Secret bag holding a plaintext PKCS#8 structure, or an encrypted one when `encrypted` is given
pub fn secret_to_safe_bag(key: &Key, encrypted: Option<&EncryptedPrivateKeyInfo>, alias: &str) -> Result<SafeBag> {
    let secret_bag = match encrypted {
        Some(info) => SecretBag {
            object_identifier: oid::PKCS_12_PKCS8_KEY_BAG_OID,
            secret_value: OctetString::new(info.to_der()?)?,
        },
        None => SecretBag {
            object_identifier: oid::PKCS_12_KEY_BAG_OID,
            secret_value: OctetString::new(encode_key(key)?)?,
        },
    };

    Ok(SafeBag {
        bag_id: oid::PKCS_12_SECRET_BAG_OID,
        bag_value: secret_bag.to_der()?,
        bag_attributes: Some(bag_attributes(alias)?),
    })
}

#[derive(Debug, PartialEq, Eq, Clone, Sequence)]
pub struct SecretBag {
    pub object_identifier: ObjectIdentifier,
    #[asn1(context_specific = "0")]
    pub secret_value: OctetString,
}

impl SecretBag {
    pub fn stored_key(&self) -> Result<StoredKey> {
        match self.object_identifier {
            oid::PKCS_12_PKCS8_KEY_BAG_OID => {
                let info = EncryptedPrivateKeyInfo::from_der(self.secret_value.as_bytes())?;
                check_encrypted_key(&info)?;
                Ok(StoredKey::Encrypted(info))
            }
            oid::PKCS_12_KEY_BAG_OID => Ok(decode_key(self.secret_value.as_bytes())?.into()),
            other => Err(Error::UnsupportedContentType(other)),
        }
    }

    pub fn from_bag_der(data: &[u8]) -> Result<SecretBag> {
        let envelope = Any::from_der(data)?;
        Ok(SecretBag::from_der(envelope.value())?)
    }
}

pub fn data_to_content_info(bags: &[SafeBag]) -> Result<ContentInfo> {
    Ok(ContentInfo {
        content_type: oid::CONTENT_TYPE_DATA_OID,
        content: Any::from_der(&OctetString::new(bags.to_vec().to_der()?)?.to_der()?)?,
    })
}

pub fn encrypted_to_content_info(algorithm: AlgorithmIdentifierOwned, encrypted: Vec<u8>) -> Result<ContentInfo> {
    let encrypted_data = EncryptedData {
        version: cms::content_info::CmsVersion::V0,
        enc_content_info: EncryptedContentInfo {
            content_type: oid::CONTENT_TYPE_DATA_OID,
            content_enc_alg: algorithm,
            encrypted_content: Some(OctetString::new(encrypted)?),
        },
        unprotected_attrs: None,
    };

    Ok(ContentInfo {
        content_type: oid::CONTENT_TYPE_ENCRYPTED_DATA_OID,
        content: Any::from_der(&encrypted_data.to_der()?)?,
    })
}

#[cfg(test)]
mod tests {
    use der::Encode;

    use super::*;
    use crate::secret::{Secret, SecretKeyType};

    #[test]
    fn test_secret_bag_roundtrip() {
        let key = Key::Secret(Secret::new(SecretKeyType::Aes128Cbc, vec![9u8; 16]));
        let bag = secret_to_safe_bag(&key, None, "kek").unwrap();
        assert_eq!(bag.bag_id, oid::PKCS_12_SECRET_BAG_OID);

        // decoding keeps the explicit tag around the bag value
        let decoded = SafeBag::from_der(&bag.to_der().unwrap()).unwrap();
        let parsed = parse_bags(vec![decoded], 0).unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].friendly_name.as_deref(), Some("kek"));
        assert_eq!(parsed[0].local_key_id.as_deref(), Some(&b"kek"[..]));
        assert!(matches!(parsed[0].item, BagItem::Key(StoredKey::Secret(ref s)) if s.key() == [9u8; 16]));
    }

    #[test]
    fn test_unknown_bag_skipped() {
        let bag = SafeBag {
            bag_id: ObjectIdentifier::new_unwrap("1.2.3.4"),
            bag_value: OctetString::new(vec![1, 2, 3]).unwrap().to_der().unwrap(),
            bag_attributes: None,
        };
        let decoded = SafeBag::from_der(&bag.to_der().unwrap()).unwrap();
        assert!(parse_bags(vec![decoded], 0).unwrap().is_empty());
    }
}
