//! # dirsync LDAP client
//!
//! Concrete [`DirectoryClient`](dirsync_core::DirectoryClient)
//! implementation for the dirsync engine, built on the `ldap3` crate.
//!
//! This crate provides:
//! - Blocking connection establishment with an optional simple bind
//! - Root-DSE and single-entry attribute reads
//! - Cookie-paged subtree searches driven by the core search cursor
//! - Tombstone retrieval via the show-deleted request control
//! - An attribute resolver for `ldap3`'s value representation
//!
//! ```no_run
//! use dirsync_core::{MemoryAffiliationStore, SyncEngine};
//! use dirsync_ldap::LdapDirectoryClient;
//!
//! # fn run(store: MemoryAffiliationStore) -> dirsync_core::SyncResult<()> {
//! let record = store.get("acme").expect("record created beforehand");
//! let client = LdapDirectoryClient::for_affiliation(&record)?;
//! let mut engine = SyncEngine::new(client, store, "acme".to_string());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod paging;
mod resolver;

pub use client::LdapDirectoryClient;
pub use config::{ConfigError, ConnectionConfig};
pub use resolver::{LdapValue, LdapValueResolver};
