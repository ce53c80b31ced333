use std::collections::BTreeMap;

use der::oid::ObjectIdentifier;
use x509_cert::name::Name;

/// Distinguished name flattened into attribute type -> value content.
///
/// The string tag of each value is not part of the map, so a PrintableString and a UTF8String
/// carrying the same text compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatName(BTreeMap<ObjectIdentifier, Vec<u8>>);

impl FlatName {
    pub fn get(&self, oid: &ObjectIdentifier) -> Option<&[u8]> {
        self.0.get(oid).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Both directions must match: every attribute of `self` is in `other` with the same value and vice versa
    pub fn matches(&self, other: &FlatName) -> bool {
        let covers = |a: &FlatName, b: &FlatName| a.0.iter().all(|(oid, value)| b.get(oid) == Some(value.as_slice()));
        covers(self, other) && covers(other, self)
    }
}

impl From<&Name> for FlatName {
    fn from(name: &Name) -> Self {
        let mut map = BTreeMap::new();
        for rdn in name.0.iter() {
            for atv in rdn.0.iter() {
                map.insert(atv.oid, atv.value.value().to_vec());
            }
        }
        Self(map)
    }
}

/// Name equality on the flattened form
pub fn names_equal(a: &Name, b: &Name) -> bool {
    FlatName::from(a).matches(&FlatName::from(b))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use der::{Any, Tag};
    use x509_cert::attr::AttributeTypeAndValue;

    use super::*;

    #[test]
    fn test_names_equal() {
        let a = Name::from_str("CN=Root,O=Acme").unwrap();
        let b = Name::from_str("O=Acme,CN=Root").unwrap();
        let c = Name::from_str("CN=Root").unwrap();
        let d = Name::from_str("CN=Other,O=Acme").unwrap();

        assert!(names_equal(&a, &b));
        assert!(!names_equal(&a, &c));
        assert!(!names_equal(&c, &a));
        assert!(!names_equal(&a, &d));
    }

    #[test]
    fn test_string_tag_ignored() {
        let utf8 = Name::from_str("CN=Root").unwrap();
        let cn = utf8.0[0].0.get(0).unwrap().oid;

        let mut printable = utf8.clone();
        printable.0[0].0 = der::asn1::SetOfVec::from_iter([AttributeTypeAndValue {
            oid: cn,
            value: Any::new(Tag::PrintableString, "Root".as_bytes()).unwrap(),
        }])
        .unwrap();

        assert!(names_equal(&utf8, &printable));
    }
}
