//! LDAP filter combination helpers.
//!
//! The engine never parses filters; it only combines the caller's filter
//! with update-sequence-number bounds. Sub-filter order is deterministic
//! (caller filter first, lower bound, then upper bound) so tests can assert
//! on the exact string; AND is commutative for the server.

use crate::attributes;

/// Joins sub-filters with a logical AND, wrapping each in parentheses
/// unless it is already parenthesized.
pub fn and_all(filters: &[&str]) -> String {
    let mut result = String::from("(&");
    for filter in filters {
        if filter.starts_with('(') {
            result.push_str(filter);
        } else {
            result.push('(');
            result.push_str(filter);
            result.push(')');
        }
    }
    result.push(')');
    result
}

/// Builds a `uSNChanged >= lower` comparison.
pub fn usn_lower_bound(lower: i64) -> String {
    format!("{}>={}", attributes::USN_CHANGED, lower)
}

/// Builds a `uSNChanged <= upper` comparison.
pub fn usn_upper_bound(upper: i64) -> String {
    format!("{}<={}", attributes::USN_CHANGED, upper)
}

/// Combines a caller filter with an upper sequence bound (full sync).
pub fn with_usn_upper_bound(filter: &str, upper: i64) -> String {
    and_all(&[filter, &usn_upper_bound(upper)])
}

/// Combines a caller filter with both sequence bounds (incremental sync).
pub fn with_usn_bounds(filter: &str, lower: i64, upper: i64) -> String {
    and_all(&[filter, &usn_lower_bound(lower), &usn_upper_bound(upper)])
}
