//! The directory client boundary.
//!
//! The engine talks to the remote directory exclusively through
//! [`DirectoryClient`]; `dirsync_ldap` provides the real implementation and
//! [`MockDirectoryClient`] a scripted one for tests.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::resolver::AttributeResolver;

/// One search result row: attribute values aligned positionally with the
/// requested attribute names, `None` where the entry lacks the attribute.
pub type EntryRow<A> = Vec<Option<A>>;

/// A lazy, fallible sequence of search result rows.
pub type RowStream<'a, A> = Box<dyn Iterator<Item = ClientResult<EntryRow<A>>> + 'a>;

/// A lazy, fallible sequence of deleted-object identifiers. A `None` item
/// is an object whose identifier could not be decoded (reported by the
/// client, skipped by the engine).
pub type DeletedIdStream<'a> = Box<dyn Iterator<Item = ClientResult<Option<Uuid>>> + 'a>;

/// Executes the primitive remote operations the engine needs.
///
/// `search` and `search_deleted` must exhaust the full result set, not just
/// one page, and every row must carry exactly as many values as attributes
/// were requested. Retry and timeout policy belong to the implementation;
/// the engine treats every failure as final for the current pass.
pub trait DirectoryClient {
    /// The implementation's raw attribute value type.
    type Attribute;
    /// The resolver for [`Self::Attribute`] values.
    type Resolver: AttributeResolver<Attribute = Self::Attribute>;

    /// Reads one attribute of the root DSE.
    fn root_dse_attribute(&mut self, name: &str) -> ClientResult<Self::Attribute>;

    /// Reads one attribute of the entry at `dn`.
    fn entry_attribute(&mut self, dn: &str, name: &str) -> ClientResult<Self::Attribute>;

    /// Runs a filtered subtree search under `base_dn`, returning rows
    /// positionally aligned with `attributes`.
    fn search<'a>(
        &'a mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> ClientResult<RowStream<'a, Self::Attribute>>;

    /// Runs a filtered search for tombstoned objects under `container_dn`,
    /// returning each object's stable identifier.
    fn search_deleted<'a>(
        &'a mut self,
        container_dn: &str,
        filter: &str,
    ) -> ClientResult<DeletedIdStream<'a>>;

    /// Returns a resolver for this client's attribute values. Resolvers are
    /// stateless; the engine keeps its own copy.
    fn resolver(&self) -> Self::Resolver;

    /// Releases the underlying connection.
    fn close(&mut self);
}

/// Attribute values served by [`MockDirectoryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAttribute {
    /// A string value.
    Text(String),
    /// An integer value.
    Integer(i64),
    /// A raw byte value.
    Bytes(Vec<u8>),
    /// A multi-valued string attribute.
    TextList(Vec<String>),
}

/// Resolver for [`MockAttribute`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockResolver;

impl AttributeResolver for MockResolver {
    type Attribute = MockAttribute;

    fn as_string(&self, attribute: &MockAttribute) -> Option<String> {
        match attribute {
            MockAttribute::Text(s) => Some(s.clone()),
            MockAttribute::Integer(i) => Some(i.to_string()),
            MockAttribute::TextList(list) => list.first().cloned(),
            MockAttribute::Bytes(_) => None,
        }
    }

    fn as_integer(&self, attribute: &MockAttribute) -> Option<i64> {
        match attribute {
            MockAttribute::Integer(i) => Some(*i),
            MockAttribute::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn as_bytes(&self, attribute: &MockAttribute) -> Option<Vec<u8>> {
        match attribute {
            MockAttribute::Bytes(b) => Some(b.clone()),
            MockAttribute::Text(s) => Some(s.clone().into_bytes()),
            _ => None,
        }
    }

    fn as_string_list(&self, attribute: &MockAttribute) -> Vec<String> {
        match attribute {
            MockAttribute::TextList(list) => list.clone(),
            MockAttribute::Text(s) => vec![s.clone()],
            MockAttribute::Integer(i) => vec![i.to_string()],
            MockAttribute::Bytes(_) => Vec::new(),
        }
    }
}

/// One recorded search invocation on the mock client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSearch {
    /// Base DN the search was issued against.
    pub base_dn: String,
    /// Filter string as built by the engine.
    pub filter: String,
    /// Requested attribute names, in order.
    pub attributes: Vec<String>,
}

/// A scripted directory client for tests.
///
/// Root DSE and entry attributes are looked up from configured maps; search
/// results are served from queues in FIFO order, one queued result set per
/// search invocation. Every search is recorded for assertion.
#[derive(Debug, Default)]
pub struct MockDirectoryClient {
    root_dse: HashMap<String, MockAttribute>,
    entry_attributes: HashMap<(String, String), MockAttribute>,
    search_results: VecDeque<Vec<EntryRow<MockAttribute>>>,
    deleted_results: VecDeque<Vec<Option<Uuid>>>,
    searches: Vec<RecordedSearch>,
    deleted_searches: Vec<RecordedSearch>,
    root_dse_reads: Vec<String>,
    closed: bool,
}

impl MockDirectoryClient {
    /// Creates an empty mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a root DSE attribute.
    pub fn set_root_dse_attribute(&mut self, name: impl Into<String>, value: MockAttribute) {
        self.root_dse.insert(name.into(), value);
    }

    /// Sets an attribute on the entry at `dn`.
    pub fn set_entry_attribute(
        &mut self,
        dn: impl Into<String>,
        name: impl Into<String>,
        value: MockAttribute,
    ) {
        self.entry_attributes.insert((dn.into(), name.into()), value);
    }

    /// Queues the result set served by the next `search` call.
    pub fn push_search_result(&mut self, rows: Vec<EntryRow<MockAttribute>>) {
        self.search_results.push_back(rows);
    }

    /// Queues the result set served by the next `search_deleted` call.
    pub fn push_deleted_result(&mut self, ids: Vec<Option<Uuid>>) {
        self.deleted_results.push_back(ids);
    }

    /// Searches issued so far, in order.
    pub fn searches(&self) -> &[RecordedSearch] {
        &self.searches
    }

    /// Deleted-object searches issued so far, in order.
    pub fn deleted_searches(&self) -> &[RecordedSearch] {
        &self.deleted_searches
    }

    /// Root DSE attribute names read so far, in order.
    pub fn root_dse_reads(&self) -> &[String] {
        &self.root_dse_reads
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl DirectoryClient for MockDirectoryClient {
    type Attribute = MockAttribute;
    type Resolver = MockResolver;

    fn root_dse_attribute(&mut self, name: &str) -> ClientResult<MockAttribute> {
        self.root_dse_reads.push(name.to_string());
        self.root_dse
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::AttributeNotFound {
                entry: "<root DSE>".into(),
                attribute: name.into(),
            })
    }

    fn entry_attribute(&mut self, dn: &str, name: &str) -> ClientResult<MockAttribute> {
        self.entry_attributes
            .get(&(dn.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::AttributeNotFound {
                entry: dn.into(),
                attribute: name.into(),
            })
    }

    fn search<'a>(
        &'a mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> ClientResult<RowStream<'a, MockAttribute>> {
        self.searches.push(RecordedSearch {
            base_dn: base_dn.to_string(),
            filter: filter.to_string(),
            attributes: attributes.to_vec(),
        });
        let rows = self
            .search_results
            .pop_front()
            .ok_or_else(|| ClientError::communication("no scripted search result queued"))?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn search_deleted<'a>(
        &'a mut self,
        container_dn: &str,
        filter: &str,
    ) -> ClientResult<DeletedIdStream<'a>> {
        self.deleted_searches.push(RecordedSearch {
            base_dn: container_dn.to_string(),
            filter: filter.to_string(),
            attributes: Vec::new(),
        });
        let ids = self
            .deleted_results
            .pop_front()
            .ok_or_else(|| ClientError::communication("no scripted deleted result queued"))?;
        Ok(Box::new(ids.into_iter().map(Ok)))
    }

    fn resolver(&self) -> MockResolver {
        MockResolver
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
