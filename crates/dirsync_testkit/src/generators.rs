//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for raw 16-byte object identifiers.
pub fn guid_bytes_strategy() -> impl Strategy<Value = [u8; 16]> {
    prop::array::uniform16(any::<u8>())
}

/// Strategy for small paged-search page sizes, to exercise page boundaries.
pub fn page_size_strategy() -> impl Strategy<Value = u32> {
    1u32..=7
}

/// Strategy for directory sizes in lifecycle tests.
pub fn entry_count_strategy() -> impl Strategy<Value = usize> {
    0usize..40
}

/// Strategy for plausible account names.
pub fn account_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{2,11}").expect("valid regex")
}
