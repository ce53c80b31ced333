//!
//! CMS messages: signed, digested, enveloped and encrypted content
//!
use cms::{
    content_info::ContentInfo, digested_data::DigestedData, encrypted_data::EncryptedData,
    enveloped_data::EnvelopedData, signed_data::SignedData,
};
use der::{
    Any, Decode, Encode,
    asn1::{ObjectIdentifier, OctetString},
};

use crate::{Result, input::unarmor, oid};

mod envelope;
mod extract;
mod sign;

pub use envelope::{EnvelopeMode, Originator, Recipients};
pub use sign::SignMode;

/// Decoded CMS content, one variant per supported content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmsContent {
    Data(Vec<u8>),
    Signed(SignedData),
    Digested(DigestedData),
    Enveloped(EnvelopedData),
    Encrypted(EncryptedData),
    /// Any other content type, kept undecoded
    Other(ContentInfo),
}

impl CmsContent {
    /// Decode DER or PEM input as a `ContentInfo`. Input that is not a `ContentInfo` is plain data.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let der = unarmor(data);
        match ContentInfo::from_der(&der) {
            Ok(info) => Self::try_from(info),
            Err(_) => Ok(CmsContent::Data(data.to_vec())),
        }
    }

    pub fn content_type(&self) -> ObjectIdentifier {
        match self {
            CmsContent::Data(_) => oid::CONTENT_TYPE_DATA_OID,
            CmsContent::Signed(_) => oid::CONTENT_TYPE_SIGNED_DATA_OID,
            CmsContent::Digested(_) => oid::CONTENT_TYPE_DIGESTED_DATA_OID,
            CmsContent::Enveloped(_) => oid::CONTENT_TYPE_ENVELOPED_DATA_OID,
            CmsContent::Encrypted(_) => oid::CONTENT_TYPE_ENCRYPTED_DATA_OID,
            CmsContent::Other(info) => info.content_type,
        }
    }

    /// Bytes carried as encapsulated content when this content gets wrapped:
    /// raw octets for data, the inner structure DER otherwise
    pub fn payload(&self) -> Result<Vec<u8>> {
        match self {
            CmsContent::Data(data) => Ok(data.clone()),
            CmsContent::Signed(signed) => Ok(signed.to_der()?),
            CmsContent::Digested(digested) => Ok(digested.to_der()?),
            CmsContent::Enveloped(enveloped) => Ok(enveloped.to_der()?),
            CmsContent::Encrypted(encrypted) => Ok(encrypted.to_der()?),
            CmsContent::Other(info) => Ok(info.content.to_der()?),
        }
    }

    pub fn to_content_info(&self) -> Result<ContentInfo> {
        let content = match self {
            CmsContent::Data(data) => Any::from_der(&OctetString::new(data.as_slice())?.to_der()?)?,
            CmsContent::Other(info) => return Ok(info.clone()),
            other => Any::from_der(&other.payload()?)?,
        };
        Ok(ContentInfo {
            content_type: self.content_type(),
            content,
        })
    }
}

impl TryFrom<ContentInfo> for CmsContent {
    type Error = crate::error::Error;

    fn try_from(info: ContentInfo) -> Result<Self> {
        let inner = info.content.to_der()?;
        Ok(match info.content_type {
            oid::CONTENT_TYPE_DATA_OID => CmsContent::Data(OctetString::from_der(&inner)?.into_bytes()),
            oid::CONTENT_TYPE_SIGNED_DATA_OID => CmsContent::Signed(SignedData::from_der(&inner)?),
            oid::CONTENT_TYPE_DIGESTED_DATA_OID => CmsContent::Digested(DigestedData::from_der(&inner)?),
            oid::CONTENT_TYPE_ENVELOPED_DATA_OID => CmsContent::Enveloped(EnvelopedData::from_der(&inner)?),
            oid::CONTENT_TYPE_ENCRYPTED_DATA_OID => CmsContent::Encrypted(EncryptedData::from_der(&inner)?),
            _ => CmsContent::Other(info),
        })
    }
}

/// Content recovered from a verified or decrypted envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub content_type: ObjectIdentifier,
    pub content: Vec<u8>,
}

impl Extracted {
    /// Decode the recovered content according to its type
    pub fn into_content(self) -> Result<CmsContent> {
        if self.content_type == oid::CONTENT_TYPE_DATA_OID {
            return Ok(CmsContent::Data(self.content));
        }
        CmsContent::try_from(ContentInfo {
            content_type: self.content_type,
            content: Any::from_der(&self.content)?,
        })
    }
}

/// Wrap encapsulated content octets as `eContent`
pub(crate) fn econtent(payload: &[u8]) -> Result<Any> {
    Ok(Any::from_der(&OctetString::new(payload)?.to_der()?)?)
}

/// Octets of an `eContent` field
pub(crate) fn econtent_octets(econtent: &Any) -> Result<Vec<u8>> {
    Ok(OctetString::from_der(&econtent.to_der()?)?.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_data_sniffing() {
        let content = CmsContent::from_bytes(b"hello").unwrap();
        assert_eq!(content, CmsContent::Data(b"hello".to_vec()));
        assert_eq!(content.content_type(), oid::CONTENT_TYPE_DATA_OID);
    }

    #[test]
    fn test_data_content_info_roundtrip() {
        let info = CmsContent::Data(b"payload".to_vec()).to_content_info().unwrap();
        let der = info.to_der().unwrap();

        let decoded = CmsContent::from_bytes(&der).unwrap();
        assert_eq!(decoded, CmsContent::Data(b"payload".to_vec()));
    }

    #[test]
    fn test_extracted_data() {
        let extracted = Extracted {
            content_type: oid::CONTENT_TYPE_DATA_OID,
            content: vec![1, 2, 3],
        };
        assert_eq!(extracted.into_content().unwrap(), CmsContent::Data(vec![1, 2, 3]));
    }
}
