//! The `ldap3`-backed directory client.

use ldap3::controls::RawControl;
use ldap3::{LdapConn, LdapConnSettings, Scope, SearchEntry};
use tracing::{debug, warn};
use uuid::Uuid;

use dirsync_core::{
    attributes, guid_from_bytes, AffiliationRecord, ClientError, ClientResult, DeletedIdStream,
    DirectoryClient, PagedSearchCursor, RowStream, SearchRequest,
};

use crate::config::ConnectionConfig;
use crate::paging::PagedConn;
use crate::resolver::{LdapValue, LdapValueResolver};

/// Aligns an entry's attributes positionally with the requested names.
fn entry_to_row(entry: &SearchEntry, names: &[String]) -> Vec<Option<LdapValue>> {
    names
        .iter()
        .map(|name| LdapValue::from_entry(entry, name))
        .collect()
}

/// Decodes an entry's `objectGUID`, warning (not failing) on a malformed
/// identifier.
fn entry_object_guid(entry: &SearchEntry) -> Option<Uuid> {
    let bytes = LdapValue::from_entry(entry, attributes::OBJECT_GUID)
        .and_then(|value| value.first_bytes())?;
    let guid = guid_from_bytes(&bytes);
    if guid.is_none() {
        warn!(
            dn = %entry.dn,
            length = bytes.len(),
            "objectGUID is not a 16-byte identifier"
        );
    }
    guid
}

/// A blocking directory client over one `ldap3` connection.
///
/// Searches run as paged searches with the configured page size; tombstone
/// searches additionally attach the show-deleted request control. The
/// client performs no retries: a lost connection surfaces as
/// [`ClientError::Communication`] and the caller decides what to do with
/// the pass.
pub struct LdapDirectoryClient {
    conn: LdapConn,
    config: ConnectionConfig,
}

impl LdapDirectoryClient {
    /// Connects (and binds, if credentials are configured) according to
    /// `config`.
    pub fn connect(config: ConnectionConfig) -> ClientResult<Self> {
        config
            .validate()
            .map_err(|e| ClientError::communication(format!("invalid configuration: {e}")))?;

        debug!(url = %config.url, "connecting to directory server");
        let settings = LdapConnSettings::new().set_conn_timeout(config.connect_timeout);
        let mut conn = LdapConn::with_settings(settings, &config.url)
            .map_err(|e| ClientError::communication(e.to_string()))?;

        if let (Some(bind_dn), Some(bind_password)) = (&config.bind_dn, &config.bind_password) {
            conn.simple_bind(bind_dn, bind_password)
                .map_err(|e| ClientError::communication(e.to_string()))?
                .success()
                .map_err(|e| ClientError::communication(e.to_string()))?;
            debug!(bind_dn = %bind_dn, "bind succeeded");
        }

        Ok(Self { conn, config })
    }

    /// Connects using the connection fields of an affiliation record.
    pub fn for_affiliation(record: &AffiliationRecord) -> ClientResult<Self> {
        Self::connect(ConnectionConfig::from_affiliation(record))
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Reads one attribute of the entry at `base` via a base-scoped search.
    fn read_single_attribute(&mut self, base: &str, name: &str) -> ClientResult<LdapValue> {
        let display = if base.is_empty() { "<root DSE>" } else { base };
        let (entries, _response) = self
            .conn
            .search(base, Scope::Base, "(objectClass=*)", vec![name])
            .map_err(|e| ClientError::communication(e.to_string()))?
            .success()
            .map_err(|e| ClientError::communication(e.to_string()))?;

        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::EntryNotFound(display.to_string()))?;
        let entry = SearchEntry::construct(entry);

        LdapValue::from_entry(&entry, name).ok_or_else(|| ClientError::AttributeNotFound {
            entry: display.to_string(),
            attribute: name.to_string(),
        })
    }
}

impl DirectoryClient for LdapDirectoryClient {
    type Attribute = LdapValue;
    type Resolver = LdapValueResolver;

    fn root_dse_attribute(&mut self, name: &str) -> ClientResult<LdapValue> {
        self.read_single_attribute("", name)
    }

    fn entry_attribute(&mut self, dn: &str, name: &str) -> ClientResult<LdapValue> {
        self.read_single_attribute(dn, name)
    }

    fn search<'a>(
        &'a mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> ClientResult<RowStream<'a, LdapValue>> {
        let request = SearchRequest::subtree(base_dn, filter, attributes.to_vec());
        let names = attributes.to_vec();
        let source = PagedConn {
            conn: &mut self.conn,
            extra_controls: Vec::new(),
        };
        let cursor = PagedSearchCursor::new(source, request, self.config.page_size);
        Ok(Box::new(cursor.map(move |item| {
            item.map(|entry| entry_to_row(&entry, &names))
        })))
    }

    fn search_deleted<'a>(
        &'a mut self,
        container_dn: &str,
        filter: &str,
    ) -> ClientResult<DeletedIdStream<'a>> {
        let request = SearchRequest::subtree(
            container_dn,
            filter,
            vec![attributes::OBJECT_GUID.to_string()],
        );
        let show_deleted = RawControl {
            ctype: attributes::SHOW_DELETED_CONTROL_OID.to_string(),
            crit: true,
            val: None,
        };
        let source = PagedConn {
            conn: &mut self.conn,
            extra_controls: vec![show_deleted],
        };
        let cursor = PagedSearchCursor::new(source, request, self.config.page_size);
        Ok(Box::new(
            cursor.map(|item| item.map(|entry| entry_object_guid(&entry))),
        ))
    }

    fn resolver(&self) -> LdapValueResolver {
        LdapValueResolver
    }

    fn close(&mut self) {
        if let Err(e) = self.conn.unbind() {
            debug!(error = %e, "unbind failed while closing the connection");
        }
    }
}
