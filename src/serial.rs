use std::{cmp::Ordering, fmt};

use x509_cert::serial_number::SerialNumber;

use crate::Result;

/// Serial number in one of the representations accepted across the engine.
///
/// All comparisons go through [Serial::to_hex]: the canonical lowercase big-endian hex string,
/// left-padded with `0` to equal length and compared as text.
#[derive(Clone, PartialEq, Eq)]
pub enum Serial {
    Int(u64),
    Hex(String),
    Bytes(Vec<u8>),
}

impl Serial {
    /// Canonical lowercase hex digits without the `0x` prefix
    pub fn to_hex(&self) -> String {
        match self {
            Serial::Int(value) => format!("{value:x}"),
            Serial::Hex(value) => {
                let value = value.trim();
                value
                    .strip_prefix("0x")
                    .or_else(|| value.strip_prefix("0X"))
                    .unwrap_or(value)
                    .to_ascii_lowercase()
            }
            Serial::Bytes(value) => hex::encode(value),
        }
    }

    /// Compare two serials by their padded canonical hex form
    pub fn compare(&self, other: &Serial) -> Ordering {
        let (a, b) = (self.to_hex(), other.to_hex());
        let width = a.len().max(b.len());
        format!("{a:0>width$}").cmp(&format!("{b:0>width$}"))
    }

    /// Big-endian magnitude bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut digits = self.to_hex();
        if digits.is_empty() {
            digits.push('0');
        }
        if digits.len() % 2 == 1 {
            digits.insert(0, '0');
        }
        hex::decode(&digits).map_err(|_| crate::error::Error::InvalidParameters)
    }

    /// Convert to the X.509 serial number type
    pub fn to_serial_number(&self) -> Result<SerialNumber> {
        Ok(SerialNumber::new(&self.to_bytes()?)?)
    }
}

impl From<u64> for Serial {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Serial {
    fn from(value: &str) -> Self {
        Self::Hex(value.to_owned())
    }
}

impl From<String> for Serial {
    fn from(value: String) -> Self {
        Self::Hex(value)
    }
}

impl From<&[u8]> for Serial {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Serial {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&SerialNumber> for Serial {
    fn from(value: &SerialNumber) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Serial").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Increment a big-endian hex number by one. The result is `0x`-prefixed.
pub fn number_inc(hex: &str) -> String {
    let digits = Serial::Hex(hex.to_owned()).to_hex();
    let mut out: Vec<char> = digits.chars().collect();
    let mut carry = true;

    for c in out.iter_mut().rev() {
        if !carry {
            break;
        }
        match *c {
            'f' => *c = '0',
            '9' => {
                *c = 'a';
                carry = false;
            }
            d => {
                *c = char::from_digit(d.to_digit(16).unwrap_or(0) + 1, 16).unwrap_or('0');
                carry = false;
            }
        }
    }
    if carry {
        out.insert(0, '1');
    }

    format!("0x{}", out.into_iter().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_inc() {
        assert_eq!(number_inc("0xff"), "0x100");
        assert_eq!(number_inc("9"), "0xa");
        assert_eq!(number_inc(""), "0x1");
        assert_eq!(number_inc("0x1f"), "0x20");
        assert_eq!(number_inc("0xAB"), "0xac");
    }

    #[test]
    fn test_compare_representations() {
        let int = Serial::Int(0x1234);
        let hex = Serial::Hex("0x1234".into());
        let bare = Serial::Hex("1234".into());
        let bytes = Serial::Bytes(vec![0x12, 0x34]);

        assert_eq!(int.compare(&hex), Ordering::Equal);
        assert_eq!(hex.compare(&bare), Ordering::Equal);
        assert_eq!(bare.compare(&bytes), Ordering::Equal);
        assert_eq!(Serial::Bytes(vec![0, 0xff]).compare(&Serial::Int(0xff)), Ordering::Equal);
    }

    #[test]
    fn test_compare_ordering() {
        assert_eq!(Serial::Int(0xff).compare(&Serial::Int(0x100)), Ordering::Less);
        assert_eq!(Serial::Hex("0x0a".into()).compare(&Serial::Int(9)), Ordering::Greater);
    }

    #[test]
    fn test_to_serial_number() {
        let serial = Serial::Hex("0x100".into()).to_serial_number().unwrap();
        assert_eq!(serial.as_bytes(), &[1, 0]);
        assert_eq!(Serial::from(&serial).compare(&Serial::Int(256)), Ordering::Equal);
    }
}
