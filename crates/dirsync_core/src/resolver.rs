//! Attribute value resolution.

/// Converts an SDK-specific attribute value into the small set of
/// representations the engine needs.
///
/// A resolver is a stateless value handed out by the directory client
/// ([`crate::DirectoryClient::resolver`]); the engine holds its own copy for
/// the lifetime of a pass.
pub trait AttributeResolver {
    /// The client's attribute value type.
    type Attribute;

    /// Resolves the attribute as a string, if it has a string form.
    fn as_string(&self, attribute: &Self::Attribute) -> Option<String>;

    /// Resolves the attribute as a signed integer, if it parses as one.
    fn as_integer(&self, attribute: &Self::Attribute) -> Option<i64>;

    /// Resolves the attribute as raw bytes, if it has a byte form.
    fn as_bytes(&self, attribute: &Self::Attribute) -> Option<Vec<u8>>;

    /// Resolves the attribute as a list of strings; empty if it has none.
    fn as_string_list(&self, attribute: &Self::Attribute) -> Vec<String>;
}
