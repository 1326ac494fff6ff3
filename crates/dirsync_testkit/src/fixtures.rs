//! Canned affiliation records and entry builders.

use dirsync_core::{AffiliationRecord, MockAttribute};

/// Root DN of the example directory used throughout the tests.
pub const EXAMPLE_ROOT_DN: &str = "DC=example,DC=com";

/// Subtree the example affiliation is scoped to.
pub const EXAMPLE_SYNC_BASE_DN: &str = "OU=People,DC=example,DC=com";

/// An affiliation record matching [`EXAMPLE_ROOT_DN`] /
/// [`EXAMPLE_SYNC_BASE_DN`], with no watermark recorded yet.
pub fn example_affiliation() -> AffiliationRecord {
    AffiliationRecord {
        url: "ldap://dc01.example.com:389".into(),
        bind_user: "CN=svc-sync,OU=Service,DC=example,DC=com".into(),
        bind_password: "hunter2".into(),
        root_dn: EXAMPLE_ROOT_DN.into(),
        sync_base_dn: EXAMPLE_SYNC_BASE_DN.into(),
        search_filter: "(objectClass=user)".into(),
        search_deleted_objects_filter: "(isDeleted=TRUE)".into(),
        attributes_to_sync: vec!["sAMAccountName".into(), "mail".into()],
        invocation_id: None,
        highest_committed_usn: None,
    }
}

/// DN of a person entry under the example sync base.
pub fn person_dn(account: &str) -> String {
    format!("CN={account},{EXAMPLE_SYNC_BASE_DN}")
}

/// Attribute set for a person entry, matching the example affiliation's
/// attribute list.
pub fn person_attributes(account: &str, mail: &str) -> Vec<(String, MockAttribute)> {
    vec![
        (
            "sAMAccountName".to_string(),
            MockAttribute::Text(account.to_string()),
        ),
        ("mail".to_string(), MockAttribute::Text(mail.to_string())),
    ]
}
