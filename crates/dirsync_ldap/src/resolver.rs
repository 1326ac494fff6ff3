//! Attribute values as delivered by `ldap3`, and their resolver.

use ldap3::SearchEntry;

use dirsync_core::AttributeResolver;

/// One attribute's values from a search entry.
///
/// `ldap3` splits values by representation: UTF-8 values land in
/// [`SearchEntry::attrs`], everything else in [`SearchEntry::bin_attrs`].
/// Both sets are carried here because a binary attribute (an object GUID,
/// say) occasionally happens to be valid UTF-8 and then shows up on the
/// string side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapValue {
    /// UTF-8 values of the attribute.
    pub texts: Vec<String>,
    /// Non-UTF-8 values of the attribute.
    pub binaries: Vec<Vec<u8>>,
}

impl LdapValue {
    /// Creates a value from string representations.
    pub fn from_texts(texts: Vec<String>) -> Self {
        Self {
            texts,
            binaries: Vec::new(),
        }
    }

    /// Creates a value from a single binary representation.
    pub fn from_binary(bytes: Vec<u8>) -> Self {
        Self {
            texts: Vec::new(),
            binaries: vec![bytes],
        }
    }

    /// Extracts the named attribute from a search entry; `None` if the
    /// entry does not carry it in either representation.
    pub fn from_entry(entry: &SearchEntry, attribute: &str) -> Option<Self> {
        let texts = entry.attrs.get(attribute).cloned().unwrap_or_default();
        let binaries = entry.bin_attrs.get(attribute).cloned().unwrap_or_default();
        if texts.is_empty() && binaries.is_empty() {
            None
        } else {
            Some(Self { texts, binaries })
        }
    }

    /// The attribute's byte form: the first binary value, or the bytes of
    /// the first string value.
    pub fn first_bytes(&self) -> Option<Vec<u8>> {
        self.binaries
            .first()
            .cloned()
            .or_else(|| self.texts.first().map(|s| s.as_bytes().to_vec()))
    }
}

/// Resolver for [`LdapValue`] attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapValueResolver;

impl AttributeResolver for LdapValueResolver {
    type Attribute = LdapValue;

    fn as_string(&self, attribute: &LdapValue) -> Option<String> {
        attribute.texts.first().cloned()
    }

    fn as_integer(&self, attribute: &LdapValue) -> Option<i64> {
        attribute.texts.first().and_then(|s| s.parse().ok())
    }

    fn as_bytes(&self, attribute: &LdapValue) -> Option<Vec<u8>> {
        attribute.first_bytes()
    }

    fn as_string_list(&self, attribute: &LdapValue) -> Vec<String> {
        attribute.texts.clone()
    }
}
