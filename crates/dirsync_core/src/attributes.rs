//! Well-known directory attribute names and protocol constants.
//!
//! These are the Active Directory operational attributes the engine relies
//! on; callers never need to list them in an affiliation record.

/// Root DSE attribute holding the directory's highest committed update
/// sequence number, used as the sync watermark.
pub const HIGHEST_COMMITTED_USN: &str = "highestCommittedUSN";

/// Attribute on the directory service object identifying the database
/// instance; changes when the directory is restored from backup.
pub const INVOCATION_ID: &str = "invocationID";

/// Root DSE attribute holding the DN of the directory service object that
/// carries the invocation id.
pub const DS_SERVICE_NAME: &str = "dsServiceName";

/// Attribute on the root entry listing well-known container bindings,
/// among them the Deleted Objects container.
pub const WELL_KNOWN_OBJECTS: &str = "wellKnownObjects";

/// Per-entry update sequence number bumped on every modification.
pub const USN_CHANGED: &str = "uSNChanged";

/// Per-entry update sequence number assigned at creation time.
pub const USN_CREATED: &str = "uSNCreated";

/// Binary attribute holding an entry's stable 16-byte object identifier.
pub const OBJECT_GUID: &str = "objectGUID";

/// Request control OID instructing the server to include tombstoned
/// (deleted) objects in search results.
pub const SHOW_DELETED_CONTROL_OID: &str = "1.2.840.113556.1.4.417";

/// Marker distinguishing the Deleted Objects binding among the
/// `wellKnownObjects` values.
pub const DELETED_OBJECTS_MARKER: &str = ":CN=Deleted Objects,";

/// Default page size for paged searches.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
