//! # dirsync core
//!
//! Incremental change-data-capture sync engine for LDAP directories.
//!
//! This crate provides:
//! - The synchronization engine: full and incremental passes driven by the
//!   directory's update-sequence-number counter, with restore-from-backup
//!   detection via the server's invocation id
//! - The paginated search cursor: cookie-driven page retrieval exposed as a
//!   single lazy sequence
//! - The persisted affiliation record (recipe + watermark) and its store
//!   boundary
//! - The collaborator traits a concrete directory client implements
//!   (`dirsync_ldap` ships one for real LDAP servers)
//!
//! ## Key invariants
//!
//! - The remote sequence counter is read once per pass and bounds every
//!   query in that pass
//! - The affiliation record is persisted exactly once, after every query of
//!   the pass has succeeded; a failed pass leaves it untouched
//! - The invocation id and the watermark are recorded together or not at all
//! - An engine instance is single-threaded and blocking; run one instance
//!   per affiliation

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod affiliation;
pub mod attributes;
pub mod client;
pub mod engine;
pub mod error;
pub mod filter;
pub mod guid;
pub mod paging;
pub mod processor;
pub mod resolver;

pub use affiliation::{
    AffiliationRecord, AffiliationStore, FileAffiliationStore, MemoryAffiliationStore,
};
pub use client::{
    DeletedIdStream, DirectoryClient, EntryRow, MockAttribute, MockDirectoryClient, MockResolver,
    RecordedSearch, RowStream,
};
pub use engine::{SyncEngine, SyncPhase, SyncStats};
pub use error::{ClientError, ClientResult, StoreError, SyncError, SyncResult};
pub use guid::{guid_from_bytes, guid_to_bytes};
pub use paging::{PagedSearchCursor, PagedSearchSource, SearchPage, SearchRequest, SearchScope};
pub use processor::{EntryProcessor, RecordingProcessor};
pub use resolver::AttributeResolver;
