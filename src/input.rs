use der::{
    DecodeOwned, Encode,
    pem::{self, LineEnding},
};

use crate::Result;

pub(crate) const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub(crate) const CRL_LABEL: &str = "X509 CRL";
pub(crate) const REQUEST_LABEL: &str = "CERTIFICATE REQUEST";
pub(crate) const PKCS7_LABEL: &str = "PKCS7";
pub(crate) const CMS_LABEL: &str = "CMS";
pub(crate) const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
pub(crate) const ENCRYPTED_PRIVATE_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";
pub(crate) const PKCS12_LABEL: &str = "PKCS12";

/// An object given either encoded or already decoded
#[derive(Debug, Clone)]
pub enum Input<T> {
    Der(Vec<u8>),
    Pem(String),
    Decoded(T),
}

impl<T: DecodeOwned> Input<T> {
    /// Decode the input if needed. The PEM label is not checked.
    pub fn resolve(self) -> Result<T> {
        match self {
            Input::Der(der) => Ok(T::from_der(&der)?),
            Input::Pem(text) => {
                let (_, der) = pem::decode_vec(text.as_bytes())?;
                Ok(T::from_der(&der)?)
            }
            Input::Decoded(value) => Ok(value),
        }
    }
}

impl<T> From<&[u8]> for Input<T> {
    fn from(data: &[u8]) -> Self {
        match std::str::from_utf8(data) {
            Ok(text) if text.trim_start().starts_with("-----BEGIN") => Input::Pem(text.to_owned()),
            _ => Input::Der(data.to_vec()),
        }
    }
}

/// Output encoding used by every export operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Der,
    Pem,
}

/// Encoded output of an export operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    Der(Vec<u8>),
    Pem(String),
}

impl Encoded {
    pub(crate) fn new(format: OutputFormat, label: &str, der: Vec<u8>) -> Result<Self> {
        match format {
            OutputFormat::Der => Ok(Encoded::Der(der)),
            OutputFormat::Pem => Ok(Encoded::Pem(pem::encode_string(label, LineEnding::LF, &der)?)),
        }
    }

    pub(crate) fn encode<T: Encode>(format: OutputFormat, label: &str, value: &T) -> Result<Self> {
        Self::new(format, label, value.to_der()?)
    }

    /// DER bytes, decoding PEM if needed
    pub fn to_der(&self) -> Result<Vec<u8>> {
        match self {
            Encoded::Der(der) => Ok(der.clone()),
            Encoded::Pem(text) => Ok(pem::decode_vec(text.as_bytes())?.1),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Encoded::Der(der) => der,
            Encoded::Pem(text) => text.as_bytes(),
        }
    }
}

/// Raw bytes of opaque input: PEM armour is removed, anything else is returned as-is
pub(crate) fn unarmor(data: &[u8]) -> Vec<u8> {
    match std::str::from_utf8(data) {
        Ok(text) if text.trim_start().starts_with("-----BEGIN") => match pem::decode_vec(text.trim().as_bytes()) {
            Ok((_, der)) => der,
            Err(_) => data.to_vec(),
        },
        _ => data.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_pem_roundtrip() {
        let der = vec![0x04, 0x02, 0xca, 0xfe];
        let pem = Encoded::new(OutputFormat::Pem, CMS_LABEL, der.clone()).unwrap();

        assert!(matches!(pem, Encoded::Pem(ref text) if text.starts_with("-----BEGIN CMS-----")));
        assert_eq!(pem.to_der().unwrap(), der);
        assert_eq!(unarmor(pem.as_bytes()), der);
        assert_eq!(unarmor(b"plain text"), b"plain text".to_vec());
    }

    #[test]
    fn test_input_sniffing() {
        let input: Input<der::asn1::OctetString> = Input::from(&[0x04, 0x01, 0x05][..]);
        assert_eq!(input.resolve().unwrap().as_bytes(), &[5]);
    }
}
