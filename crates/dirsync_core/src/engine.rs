//! The synchronization engine.
//!
//! One engine instance is bound to one affiliation record and runs full or
//! incremental passes against the remote directory, feeding results to the
//! caller's [`EntryProcessor`]. All I/O is synchronous and blocking; an
//! engine is not safe for concurrent invocation (run one instance per
//! affiliation, each on its own thread if needed).

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::affiliation::{AffiliationRecord, AffiliationStore};
use crate::attributes;
use crate::client::DirectoryClient;
use crate::error::{StoreError, SyncError, SyncResult};
use crate::filter;
use crate::guid::guid_from_bytes;
use crate::processor::EntryProcessor;
use crate::resolver::AttributeResolver;

/// Where a sync pass currently stands.
///
/// Terminal failure in any phase aborts the pass without touching the
/// persisted record; the phase returns to [`Idle`](SyncPhase::Idle) either
/// way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No pass is running.
    Idle,
    /// The affiliation record has been loaded from the store.
    RecordLoaded,
    /// The remote sequence counter has been read and bounds this pass.
    RemoteStateRead,
    /// The remote invocation id matched the recorded one (incremental only).
    IdentityChecked,
    /// Data queries are running and results are being delivered.
    Searching,
    /// The record has been updated in memory and is about to be persisted.
    RecordUpdated,
}

impl SyncPhase {
    /// Returns true while a pass is in flight.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncPhase::Idle)
    }
}

/// Counters accumulated across the life of an engine instance.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Successfully completed passes (full and incremental).
    pub passes_completed: u64,
    /// Entries reported as new.
    pub new_entries: u64,
    /// Entries reported as changed.
    pub changed_entries: u64,
    /// Objects reported as deleted.
    pub deleted_entries: u64,
    /// Message of the most recent failure, cleared on the next success.
    pub last_error: Option<String>,
}

/// Replicates one affiliation's slice of a remote directory.
///
/// `full_sync` reports every matching entry as new and records the
/// watermark (the remote's highest committed USN together with its
/// invocation id). `incremental_sync` reports only what changed since the
/// recorded watermark, classifying entries as new or changed by their
/// creation sequence number and detecting deletions through the directory's
/// tombstone container. Both persist the updated record exactly once, after
/// every query of the pass has succeeded.
pub struct SyncEngine<C: DirectoryClient, S: AffiliationStore> {
    client: C,
    store: S,
    key: S::Key,
    resolver: C::Resolver,
    phase: SyncPhase,
    stats: SyncStats,
}

impl<C: DirectoryClient, S: AffiliationStore> SyncEngine<C, S> {
    /// Creates an engine for the affiliation stored under `key`.
    pub fn new(client: C, store: S, key: S::Key) -> Self {
        let resolver = client.resolver();
        Self {
            client,
            store,
            key,
            resolver,
            phase: SyncPhase::Idle,
            stats: SyncStats::default(),
        }
    }

    /// Current phase of the running pass ([`SyncPhase::Idle`] between
    /// passes).
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// The directory client this engine drives.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The affiliation store this engine persists to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Tears the engine down, releasing the client connection.
    pub fn shutdown(mut self) {
        self.client.close();
    }

    /// Runs a full pass: every entry matching the affiliation's filter (up
    /// to the remote's current highest committed USN) is reported as new,
    /// then the watermark is recorded and persisted.
    ///
    /// Returns the remote's highest committed USN as of this pass.
    pub fn full_sync<P>(&mut self, processor: &mut P) -> SyncResult<i64>
    where
        P: EntryProcessor<C::Attribute>,
    {
        debug!("starting full synchronization pass");
        let result = self.run_full_sync(processor);
        self.finish_pass(&result);
        result
    }

    /// Runs an incremental pass: reports entries created, changed, and
    /// deleted since the recorded watermark, then advances and persists it.
    ///
    /// Fails with [`SyncError::InitialFullSyncRequired`] if no full sync has
    /// recorded a watermark yet, and with
    /// [`SyncError::InvocationIdMismatch`] if the remote directory was
    /// restored from backup since; both are remedied by running
    /// [`full_sync`](Self::full_sync).
    ///
    /// Returns the remote's highest committed USN as of this pass.
    pub fn incremental_sync<P>(&mut self, processor: &mut P) -> SyncResult<i64>
    where
        P: EntryProcessor<C::Attribute>,
    {
        debug!("starting incremental synchronization pass");
        let result = self.run_incremental_sync(processor);
        self.finish_pass(&result);
        result
    }

    /// Checks whether an incremental pass would be accepted right now:
    /// the record carries a watermark and the remote still reports the
    /// recorded invocation id. Never mutates the record.
    pub fn is_incremental_sync_possible(&mut self) -> SyncResult<bool> {
        let affiliation = self.load_affiliation()?;
        let expected = match (affiliation.invocation_id, affiliation.highest_committed_usn) {
            (Some(id), Some(_)) => id,
            _ => return Ok(false),
        };
        let actual = self.read_invocation_id()?;
        Ok(actual == expected)
    }

    fn run_full_sync<P>(&mut self, processor: &mut P) -> SyncResult<i64>
    where
        P: EntryProcessor<C::Attribute>,
    {
        let mut affiliation = self.load_affiliation()?;
        self.phase = SyncPhase::RecordLoaded;

        let remote_hcsn = self.read_remote_hcsn()?;
        self.phase = SyncPhase::RemoteStateRead;

        let search_filter = filter::with_usn_upper_bound(&affiliation.search_filter, remote_hcsn);
        self.phase = SyncPhase::Searching;
        {
            let rows = self.client.search(
                &affiliation.sync_base_dn,
                &search_filter,
                &affiliation.attributes_to_sync,
            )?;
            for row in rows {
                let row = row?;
                processor.process_new(&row);
                self.stats.new_entries += 1;
            }
        }

        let invocation_id = self.read_invocation_id()?;
        affiliation.invocation_id = Some(invocation_id);
        affiliation.highest_committed_usn = Some(remote_hcsn);
        self.phase = SyncPhase::RecordUpdated;
        self.persist(&affiliation)?;

        info!(
            remote_hcsn,
            %invocation_id,
            "full synchronization pass complete"
        );
        Ok(remote_hcsn)
    }

    fn run_incremental_sync<P>(&mut self, processor: &mut P) -> SyncResult<i64>
    where
        P: EntryProcessor<C::Attribute>,
    {
        let mut affiliation = self.load_affiliation()?;
        self.phase = SyncPhase::RecordLoaded;

        // Gate on the watermark before touching the network at all.
        let (expected_id, lower) =
            match (affiliation.invocation_id, affiliation.highest_committed_usn) {
                (Some(id), Some(usn)) => (id, usn),
                _ => return Err(SyncError::InitialFullSyncRequired),
            };

        let upper = self.read_remote_hcsn()?;
        self.phase = SyncPhase::RemoteStateRead;

        // The identity check runs after the upper bound is captured and
        // before any data query, so a restore detected mid-pass aborts
        // before stale data is reported.
        let actual_id = self.read_invocation_id()?;
        if actual_id != expected_id {
            return Err(SyncError::InvocationIdMismatch {
                expected: expected_id,
                actual: actual_id,
            });
        }
        self.phase = SyncPhase::IdentityChecked;

        self.phase = SyncPhase::Searching;
        self.query_changed_and_new(processor, &affiliation, lower, upper)?;
        self.query_deleted(processor, &affiliation, lower, upper)?;

        affiliation.highest_committed_usn = Some(upper);
        self.phase = SyncPhase::RecordUpdated;
        self.persist(&affiliation)?;

        info!(
            lower_bound = lower,
            upper_bound = upper,
            "incremental synchronization pass complete"
        );
        Ok(upper)
    }

    fn query_changed_and_new<P>(
        &mut self,
        processor: &mut P,
        affiliation: &AffiliationRecord,
        lower: i64,
        upper: i64,
    ) -> SyncResult<()>
    where
        P: EntryProcessor<C::Attribute>,
    {
        let search_filter = filter::with_usn_bounds(&affiliation.search_filter, lower, upper);

        // The creation sequence number rides along as a synthetic first
        // column and is stripped before delivery.
        let mut requested = Vec::with_capacity(affiliation.attributes_to_sync.len() + 1);
        requested.push(attributes::USN_CREATED.to_string());
        requested.extend(affiliation.attributes_to_sync.iter().cloned());

        let rows = self
            .client
            .search(&affiliation.sync_base_dn, &search_filter, &requested)?;
        for row in rows {
            let row = row?;
            let usn_created = row
                .first()
                .and_then(|value| value.as_ref())
                .and_then(|value| self.resolver.as_integer(value));
            let entry = &row[1..];
            match usn_created {
                Some(created) if created > lower => {
                    processor.process_new(entry);
                    self.stats.new_entries += 1;
                }
                Some(_) => {
                    processor.process_changed(entry);
                    self.stats.changed_entries += 1;
                }
                None => {
                    warn!(
                        attribute = attributes::USN_CREATED,
                        "entry is missing its creation sequence number, reporting it as changed"
                    );
                    processor.process_changed(entry);
                    self.stats.changed_entries += 1;
                }
            }
        }
        Ok(())
    }

    fn query_deleted<P>(
        &mut self,
        processor: &mut P,
        affiliation: &AffiliationRecord,
        lower: i64,
        upper: i64,
    ) -> SyncResult<()>
    where
        P: EntryProcessor<C::Attribute>,
    {
        let container = self.deleted_objects_container(&affiliation.root_dn)?;
        let search_filter =
            filter::with_usn_bounds(&affiliation.search_deleted_objects_filter, lower, upper);

        let ids = self.client.search_deleted(&container, &search_filter)?;
        for id in ids {
            match id? {
                Some(object_id) => {
                    processor.process_deleted(object_id);
                    self.stats.deleted_entries += 1;
                }
                None => {
                    warn!("skipping a tombstone whose object identifier could not be decoded");
                }
            }
        }
        Ok(())
    }

    fn load_affiliation(&mut self) -> SyncResult<AffiliationRecord> {
        self.store.load(&self.key).map_err(|e| match e {
            StoreError::NotFound => SyncError::AffiliationNotFound,
            other => SyncError::Store(other),
        })
    }

    fn persist(&mut self, affiliation: &AffiliationRecord) -> SyncResult<()> {
        self.store
            .save(&self.key, affiliation)
            .map_err(SyncError::Store)?;
        Ok(())
    }

    /// Reads the remote's highest committed USN from the root DSE. The pass
    /// captures this value once and bounds every query with it.
    fn read_remote_hcsn(&mut self) -> SyncResult<i64> {
        let attribute = match self
            .client
            .root_dse_attribute(attributes::HIGHEST_COMMITTED_USN)
        {
            Ok(value) => value,
            Err(e) if !e.is_communication() => {
                return Err(SyncError::RemoteStateInvalid(format!(
                    "root DSE does not expose '{}': {e}",
                    attributes::HIGHEST_COMMITTED_USN
                )))
            }
            Err(e) => return Err(e.into()),
        };
        self.resolver.as_integer(&attribute).ok_or_else(|| {
            SyncError::RemoteStateInvalid(format!(
                "root DSE attribute '{}' is not an integer",
                attributes::HIGHEST_COMMITTED_USN
            ))
        })
    }

    /// Reads the invocation id of the remote database instance: the root
    /// DSE names the directory service object, whose `invocationID`
    /// attribute carries the id as a 16-byte GUID.
    fn read_invocation_id(&mut self) -> SyncResult<Uuid> {
        let ds_service = self
            .client
            .root_dse_attribute(attributes::DS_SERVICE_NAME)?;
        let ds_service_dn = self.resolver.as_string(&ds_service).ok_or_else(|| {
            SyncError::RemoteStateInvalid(format!(
                "root DSE attribute '{}' is not a string",
                attributes::DS_SERVICE_NAME
            ))
        })?;

        let invocation = self
            .client
            .entry_attribute(&ds_service_dn, attributes::INVOCATION_ID)?;
        let bytes = self.resolver.as_bytes(&invocation).ok_or_else(|| {
            SyncError::RemoteStateInvalid(format!(
                "attribute '{}' on '{ds_service_dn}' has no byte form",
                attributes::INVOCATION_ID
            ))
        })?;
        guid_from_bytes(&bytes).ok_or_else(|| {
            SyncError::RemoteStateInvalid(format!(
                "attribute '{}' on '{ds_service_dn}' is not a 16-byte GUID",
                attributes::INVOCATION_ID
            ))
        })
    }

    /// Resolves the DN of the Deleted Objects container from the root
    /// entry's `wellKnownObjects` bindings. Each binding has the form
    /// `B:32:<guid>:<dn>`; the container is addressed as
    /// `<WKGUID=<guid>,<rootDN>>`.
    fn deleted_objects_container(&mut self, root_dn: &str) -> SyncResult<String> {
        let attribute = self
            .client
            .entry_attribute(root_dn, attributes::WELL_KNOWN_OBJECTS)?;
        for binding in self.resolver.as_string_list(&attribute) {
            if binding.contains(attributes::DELETED_OBJECTS_MARKER) {
                if let Some(wkguid) = binding.split(':').nth(2) {
                    return Ok(format!("<WKGUID={wkguid},{root_dn}>"));
                }
            }
        }
        Err(SyncError::RemoteStateInvalid(
            "could not determine the GUID of the Deleted Objects container".into(),
        ))
    }

    fn finish_pass(&mut self, result: &SyncResult<i64>) {
        match result {
            Ok(_) => {
                self.stats.passes_completed += 1;
                self.stats.last_error = None;
            }
            Err(e) => self.stats.last_error = Some(e.to_string()),
        }
        self.phase = SyncPhase::Idle;
    }
}
