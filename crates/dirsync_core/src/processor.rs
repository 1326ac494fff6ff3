//! The caller-supplied sink for sync results.

use uuid::Uuid;

/// Receives the entries a sync pass discovers.
///
/// Within one pass, new/changed entries are delivered before deletions;
/// there is no ordering guarantee beyond that. An entry is an ordered list
/// of attribute values aligned positionally with the affiliation record's
/// attribute-name list (`None` where the attribute is absent on the object).
pub trait EntryProcessor<A> {
    /// Called for an entry created since the last sync (every entry, on a
    /// full sync).
    fn process_new(&mut self, entry: &[Option<A>]);

    /// Called for an entry modified since the last sync.
    fn process_changed(&mut self, entry: &[Option<A>]);

    /// Called for an entry deleted since the last sync, identified by its
    /// stable object GUID.
    fn process_deleted(&mut self, object_id: Uuid);
}

/// An entry processor that records everything it receives, for tests.
#[derive(Debug)]
pub struct RecordingProcessor<A> {
    /// Entries reported as new, in delivery order.
    pub new_entries: Vec<Vec<Option<A>>>,
    /// Entries reported as changed, in delivery order.
    pub changed_entries: Vec<Vec<Option<A>>>,
    /// Object GUIDs reported as deleted, in delivery order.
    pub deleted_ids: Vec<Uuid>,
}

impl<A> RecordingProcessor<A> {
    /// Creates an empty recording processor.
    pub fn new() -> Self {
        Self {
            new_entries: Vec::new(),
            changed_entries: Vec::new(),
            deleted_ids: Vec::new(),
        }
    }

    /// Total number of callbacks received.
    pub fn total(&self) -> usize {
        self.new_entries.len() + self.changed_entries.len() + self.deleted_ids.len()
    }
}

impl<A> Default for RecordingProcessor<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Clone> EntryProcessor<A> for RecordingProcessor<A> {
    fn process_new(&mut self, entry: &[Option<A>]) {
        self.new_entries.push(entry.to_vec());
    }

    fn process_changed(&mut self, entry: &[Option<A>]) {
        self.changed_entries.push(entry.to_vec());
    }

    fn process_deleted(&mut self, object_id: Uuid) {
        self.deleted_ids.push(object_id);
    }
}
