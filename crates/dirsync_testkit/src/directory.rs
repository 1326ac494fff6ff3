//! An in-memory directory server for tests.
//!
//! [`SimulatedDirectory`] behaves like a small Active Directory instance:
//! entries carry `uSNCreated`/`uSNChanged` sequence numbers, deletions
//! leave tombstones behind, the root DSE exposes the highest committed USN
//! and the directory service DN, and a restore-from-backup can be simulated
//! by rolling the invocation id. Searches are served through the core paged
//! cursor in real pages, so the full cookie protocol is exercised.
//!
//! The simulator interprets only the `uSNChanged` bounds of a filter; the
//! caller part of the filter is accepted verbatim and ignored.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use dirsync_core::{
    attributes, guid_from_bytes, guid_to_bytes, ClientError, ClientResult, DeletedIdStream,
    DirectoryClient, EntryRow, MockAttribute, MockResolver, PagedSearchCursor, PagedSearchSource,
    RowStream, SearchPage, SearchRequest,
};

/// Well-known GUID of the Deleted Objects container.
pub const DELETED_OBJECTS_WKGUID: &str = "18E2EA80684F11D2B9AA00C04F79F805";

/// Extracts the `uSNChanged` lower and upper bounds from a filter string.
///
/// Returns `(lower, upper)`; a side not present in the filter is `None`.
pub fn filter_usn_bounds(filter: &str) -> (Option<i64>, Option<i64>) {
    (
        bound_after(filter, &format!("{}>=", attributes::USN_CHANGED)),
        bound_after(filter, &format!("{}<=", attributes::USN_CHANGED)),
    )
}

fn bound_after(filter: &str, pattern: &str) -> Option<i64> {
    let start = filter.find(pattern)? + pattern.len();
    let digits: String = filter[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    digits.parse().ok()
}

fn within(usn: i64, lower: Option<i64>, upper: Option<i64>) -> bool {
    lower.map_or(true, |l| usn >= l) && upper.map_or(true, |u| usn <= u)
}

fn under_base(dn: &str, base: &str) -> bool {
    dn == base || dn.ends_with(&format!(",{base}"))
}

#[derive(Debug, Clone)]
struct SimEntry {
    dn: String,
    guid: Uuid,
    usn_created: i64,
    usn_changed: i64,
    attributes: BTreeMap<String, MockAttribute>,
}

#[derive(Debug, Clone)]
struct Tombstone {
    guid_bytes: [u8; 16],
    usn_changed: i64,
}

#[derive(Debug)]
struct SimState {
    root_dn: String,
    ds_service_dn: String,
    invocation_id: Uuid,
    highest_committed_usn: i64,
    entries: Vec<SimEntry>,
    tombstones: Vec<Tombstone>,
    page_size: u32,
    closed: bool,
}

impl SimState {
    fn next_usn(&mut self) -> i64 {
        self.highest_committed_usn += 1;
        self.highest_committed_usn
    }

    fn entry_value(&self, entry: &SimEntry, name: &str) -> Option<MockAttribute> {
        match name {
            n if n == attributes::USN_CREATED => Some(MockAttribute::Integer(entry.usn_created)),
            n if n == attributes::USN_CHANGED => Some(MockAttribute::Integer(entry.usn_changed)),
            n if n == attributes::OBJECT_GUID => {
                Some(MockAttribute::Bytes(guid_to_bytes(&entry.guid).to_vec()))
            }
            other => entry.attributes.get(other).cloned(),
        }
    }

    fn matching_rows(&self, request: &SearchRequest) -> Vec<EntryRow<MockAttribute>> {
        let (lower, upper) = filter_usn_bounds(&request.filter);
        self.entries
            .iter()
            .filter(|entry| under_base(&entry.dn, &request.base_dn))
            .filter(|entry| within(entry.usn_changed, lower, upper))
            .map(|entry| {
                request
                    .attributes
                    .iter()
                    .map(|name| self.entry_value(entry, name))
                    .collect()
            })
            .collect()
    }

    fn matching_tombstones(&self, filter: &str) -> Vec<Option<Uuid>> {
        let (lower, upper) = filter_usn_bounds(filter);
        self.tombstones
            .iter()
            .filter(|tombstone| within(tombstone.usn_changed, lower, upper))
            .map(|tombstone| guid_from_bytes(&tombstone.guid_bytes))
            .collect()
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.closed {
            Err(ClientError::communication("connection is closed"))
        } else {
            Ok(())
        }
    }
}

/// A shared-handle in-memory directory.
///
/// Cloning yields another handle onto the same directory, so a test can
/// keep one handle for mutations while the engine owns another as its
/// client.
#[derive(Debug, Clone)]
pub struct SimulatedDirectory {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDirectory {
    /// Creates an empty directory rooted at `root_dn`.
    pub fn new(root_dn: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                root_dn: root_dn.to_string(),
                ds_service_dn: format!(
                    "CN=NTDS Settings,CN=DC01,CN=Servers,CN=Configuration,{root_dn}"
                ),
                invocation_id: Uuid::new_v4(),
                highest_committed_usn: 0,
                entries: Vec::new(),
                tombstones: Vec::new(),
                page_size: attributes::DEFAULT_PAGE_SIZE,
                closed: false,
            })),
        }
    }

    /// Sets the page size served to the paged cursor.
    pub fn with_page_size(self, page_size: u32) -> Self {
        self.state.lock().page_size = page_size;
        self
    }

    /// The directory's root DN.
    pub fn root_dn(&self) -> String {
        self.state.lock().root_dn.clone()
    }

    /// The current invocation id.
    pub fn invocation_id(&self) -> Uuid {
        self.state.lock().invocation_id
    }

    /// The current highest committed USN.
    pub fn highest_committed_usn(&self) -> i64 {
        self.state.lock().highest_committed_usn
    }

    /// The DN under which tombstones are searched.
    pub fn deleted_objects_container(&self) -> String {
        let state = self.state.lock();
        format!("<WKGUID={DELETED_OBJECTS_WKGUID},{}>", state.root_dn)
    }

    /// Adds an entry, assigning it a fresh GUID and the next USN as both
    /// its creation and change sequence number. Returns the GUID.
    pub fn add_entry(&self, dn: &str, attrs: Vec<(String, MockAttribute)>) -> Uuid {
        let mut state = self.state.lock();
        let usn = state.next_usn();
        let guid = Uuid::new_v4();
        state.entries.push(SimEntry {
            dn: dn.to_string(),
            guid,
            usn_created: usn,
            usn_changed: usn,
            attributes: attrs.into_iter().collect(),
        });
        guid
    }

    /// Sets one attribute on an existing entry, bumping its `uSNChanged`.
    /// Returns false if no entry has that DN.
    pub fn modify_entry(&self, dn: &str, name: &str, value: MockAttribute) -> bool {
        let mut state = self.state.lock();
        let usn = state.next_usn();
        match state.entries.iter_mut().find(|entry| entry.dn == dn) {
            Some(entry) => {
                entry.attributes.insert(name.to_string(), value);
                entry.usn_changed = usn;
                true
            }
            None => {
                // The USN was consumed; directories do not roll counters
                // back either.
                false
            }
        }
    }

    /// Deletes an entry, leaving a tombstone behind. Returns the deleted
    /// entry's GUID.
    pub fn delete_entry(&self, dn: &str) -> Option<Uuid> {
        let mut state = self.state.lock();
        let position = state.entries.iter().position(|entry| entry.dn == dn)?;
        let entry = state.entries.remove(position);
        let usn = state.next_usn();
        state.tombstones.push(Tombstone {
            guid_bytes: guid_to_bytes(&entry.guid),
            usn_changed: usn,
        });
        Some(entry.guid)
    }

    /// Simulates a restore from backup: the invocation id changes, the
    /// sequence counter and data stay.
    pub fn restore_from_backup(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().invocation_id = id;
        id
    }
}

fn parse_cookie(cookie: Option<&[u8]>) -> ClientResult<usize> {
    match cookie {
        None => Ok(0),
        Some(bytes) => {
            let bytes: [u8; 8] = bytes
                .try_into()
                .map_err(|_| ClientError::communication("malformed paging cookie"))?;
            Ok(usize::from_le_bytes(bytes))
        }
    }
}

fn slice_page<E: Clone>(items: &[E], page_size: u32, offset: usize) -> SearchPage<E> {
    let end = offset.saturating_add(page_size as usize).min(items.len());
    let entries = items[offset.min(items.len())..end].to_vec();
    if end < items.len() {
        SearchPage::with_cookie(entries, end.to_le_bytes().to_vec())
    } else {
        SearchPage::last(entries)
    }
}

struct SimRowSource {
    state: Arc<Mutex<SimState>>,
}

impl PagedSearchSource for SimRowSource {
    type Entry = EntryRow<MockAttribute>;

    fn fetch_page(
        &mut self,
        request: &SearchRequest,
        page_size: u32,
        cookie: Option<&[u8]>,
    ) -> ClientResult<SearchPage<EntryRow<MockAttribute>>> {
        let state = self.state.lock();
        state.ensure_open()?;
        let rows = state.matching_rows(request);
        Ok(slice_page(&rows, page_size, parse_cookie(cookie)?))
    }
}

struct SimDeletedSource {
    state: Arc<Mutex<SimState>>,
}

impl PagedSearchSource for SimDeletedSource {
    type Entry = Option<Uuid>;

    fn fetch_page(
        &mut self,
        request: &SearchRequest,
        page_size: u32,
        cookie: Option<&[u8]>,
    ) -> ClientResult<SearchPage<Option<Uuid>>> {
        let state = self.state.lock();
        state.ensure_open()?;
        let ids = state.matching_tombstones(&request.filter);
        Ok(slice_page(&ids, page_size, parse_cookie(cookie)?))
    }
}

impl DirectoryClient for SimulatedDirectory {
    type Attribute = MockAttribute;
    type Resolver = MockResolver;

    fn root_dse_attribute(&mut self, name: &str) -> ClientResult<MockAttribute> {
        let state = self.state.lock();
        state.ensure_open()?;
        match name {
            n if n == attributes::HIGHEST_COMMITTED_USN => {
                Ok(MockAttribute::Integer(state.highest_committed_usn))
            }
            n if n == attributes::DS_SERVICE_NAME => {
                Ok(MockAttribute::Text(state.ds_service_dn.clone()))
            }
            other => Err(ClientError::AttributeNotFound {
                entry: "<root DSE>".into(),
                attribute: other.into(),
            }),
        }
    }

    fn entry_attribute(&mut self, dn: &str, name: &str) -> ClientResult<MockAttribute> {
        let state = self.state.lock();
        state.ensure_open()?;
        if dn == state.ds_service_dn && name == attributes::INVOCATION_ID {
            return Ok(MockAttribute::Bytes(
                guid_to_bytes(&state.invocation_id).to_vec(),
            ));
        }
        if dn == state.root_dn && name == attributes::WELL_KNOWN_OBJECTS {
            return Ok(MockAttribute::TextList(vec![
                format!(
                    "B:32:AB1D30F3768811D1ADED00C04FD8D5CD:CN=System,{}",
                    state.root_dn
                ),
                format!(
                    "B:32:{DELETED_OBJECTS_WKGUID}:CN=Deleted Objects,{}",
                    state.root_dn
                ),
            ]));
        }
        let entry = state
            .entries
            .iter()
            .find(|entry| entry.dn == dn)
            .ok_or_else(|| ClientError::EntryNotFound(dn.to_string()))?;
        state
            .entry_value(entry, name)
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
        let page_size = {
            let state = self.state.lock();
            state.ensure_open()?;
            state.page_size
        };
        let request = SearchRequest::subtree(base_dn, filter, attributes.to_vec());
        let source = SimRowSource {
            state: Arc::clone(&self.state),
        };
        Ok(Box::new(PagedSearchCursor::new(source, request, page_size)))
    }

    fn search_deleted<'a>(
        &'a mut self,
        container_dn: &str,
        filter: &str,
    ) -> ClientResult<DeletedIdStream<'a>> {
        let page_size = {
            let state = self.state.lock();
            state.ensure_open()?;
            let container = format!("<WKGUID={DELETED_OBJECTS_WKGUID},{}>", state.root_dn);
            if container_dn != container {
                return Err(ClientError::EntryNotFound(container_dn.to_string()));
            }
            state.page_size
        };
        let request = SearchRequest::subtree(container_dn, filter, Vec::new());
        let source = SimDeletedSource {
            state: Arc::clone(&self.state),
        };
        Ok(Box::new(PagedSearchCursor::new(source, request, page_size)))
    }

    fn resolver(&self) -> MockResolver {
        MockResolver
    }

    fn close(&mut self) {
        self.state.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "DC=example,DC=com";

    fn attrs(account: &str) -> Vec<(String, MockAttribute)> {
        vec![(
            "sAMAccountName".to_string(),
            MockAttribute::Text(account.to_string()),
        )]
    }

    #[test]
    fn filter_bounds_are_extracted() {
        assert_eq!(
            filter_usn_bounds("(&(objectClass=user)(uSNChanged>=100)(uSNChanged<=150))"),
            (Some(100), Some(150))
        );
        assert_eq!(
            filter_usn_bounds("(&(objectClass=user)(uSNChanged<=150))"),
            (None, Some(150))
        );
        assert_eq!(filter_usn_bounds("(objectClass=user)"), (None, None));
    }

    #[test]
    fn usns_are_assigned_monotonically() {
        let directory = SimulatedDirectory::new(ROOT);
        assert_eq!(directory.highest_committed_usn(), 0);

        directory.add_entry(&format!("CN=a,{ROOT}"), attrs("a"));
        directory.add_entry(&format!("CN=b,{ROOT}"), attrs("b"));
        assert_eq!(directory.highest_committed_usn(), 2);

        directory.modify_entry(
            &format!("CN=a,{ROOT}"),
            "mail",
            MockAttribute::Text("a@example.com".into()),
        );
        assert_eq!(directory.highest_committed_usn(), 3);

        directory.delete_entry(&format!("CN=b,{ROOT}"));
        assert_eq!(directory.highest_committed_usn(), 4);
    }

    #[test]
    fn search_pages_through_the_cursor() {
        let mut directory = SimulatedDirectory::new(ROOT).with_page_size(2);
        for i in 0..5 {
            directory.add_entry(&format!("CN=u{i},{ROOT}"), attrs(&format!("u{i}")));
        }

        let rows: Vec<_> = directory
            .search(ROOT, "(objectClass=user)", &["sAMAccountName".to_string()])
            .unwrap()
            .collect::<ClientResult<_>>()
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4], vec![Some(MockAttribute::Text("u4".into()))]);
    }

    #[test]
    fn search_respects_usn_bounds_and_base() {
        let mut directory = SimulatedDirectory::new(ROOT);
        directory.add_entry(&format!("CN=a,OU=People,{ROOT}"), attrs("a")); // usn 1
        directory.add_entry(&format!("CN=b,OU=People,{ROOT}"), attrs("b")); // usn 2
        directory.add_entry(&format!("CN=c,OU=Other,{ROOT}"), attrs("c")); // usn 3

        let rows: Vec<_> = directory
            .search(
                &format!("OU=People,{ROOT}"),
                "(&(objectClass=user)(uSNChanged>=2)(uSNChanged<=3))",
                &["sAMAccountName".to_string()],
            )
            .unwrap()
            .collect::<ClientResult<_>>()
            .unwrap();
        assert_eq!(rows, vec![vec![Some(MockAttribute::Text("b".into()))]]);
    }

    #[test]
    fn tombstones_surface_in_deleted_searches_only() {
        let mut directory = SimulatedDirectory::new(ROOT);
        directory.add_entry(&format!("CN=a,{ROOT}"), attrs("a"));
        let guid = directory.delete_entry(&format!("CN=a,{ROOT}")).unwrap();

        let rows: Vec<_> = directory
            .search(ROOT, "(objectClass=user)", &["sAMAccountName".to_string()])
            .unwrap()
            .collect::<ClientResult<_>>()
            .unwrap();
        assert!(rows.is_empty());

        let container = directory.deleted_objects_container();
        let ids: Vec<_> = directory
            .search_deleted(&container, "(isDeleted=TRUE)")
            .unwrap()
            .collect::<ClientResult<_>>()
            .unwrap();
        assert_eq!(ids, vec![Some(guid)]);

        // A wrong container DN is rejected.
        assert!(directory
            .search_deleted("CN=Wrong,DC=example,DC=com", "(isDeleted=TRUE)")
            .is_err());
    }

    #[test]
    fn closed_directory_refuses_operations() {
        let mut directory = SimulatedDirectory::new(ROOT);
        directory.close();
        assert!(directory
            .root_dse_attribute(attributes::HIGHEST_COMMITTED_USN)
            .is_err());
    }

    #[test]
    fn restore_changes_only_the_invocation_id() {
        let directory = SimulatedDirectory::new(ROOT);
        directory.add_entry(&format!("CN=a,{ROOT}"), attrs("a"));
        let before = directory.invocation_id();
        let usn_before = directory.highest_committed_usn();

        let after = directory.restore_from_backup();
        assert_ne!(before, after);
        assert_eq!(directory.invocation_id(), after);
        assert_eq!(directory.highest_committed_usn(), usn_before);
    }
}
