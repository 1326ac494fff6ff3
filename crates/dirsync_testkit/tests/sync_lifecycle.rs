//! Lifecycle tests driving the sync engine against the simulated directory.

use dirsync_core::{
    MemoryAffiliationStore, MockAttribute, RecordingProcessor, SyncEngine, SyncError,
};
use dirsync_testkit::prelude::*;
use proptest::prelude::*;

fn setup(page_size: u32) -> (SimulatedDirectory, MemoryAffiliationStore) {
    let directory = SimulatedDirectory::new(EXAMPLE_ROOT_DN).with_page_size(page_size);
    let store = MemoryAffiliationStore::new();
    store.insert("acme", example_affiliation());
    (directory, store)
}

fn engine(
    directory: &SimulatedDirectory,
    store: &MemoryAffiliationStore,
) -> SyncEngine<SimulatedDirectory, MemoryAffiliationStore> {
    SyncEngine::new(directory.clone(), store.clone(), "acme".to_string())
}

#[test]
fn full_then_incremental_reports_exactly_the_mutations() {
    let (directory, store) = setup(2);
    directory.add_entry(
        &person_dn("alice"),
        person_attributes("alice", "alice@example.com"),
    );
    directory.add_entry(
        &person_dn("bob"),
        person_attributes("bob", "bob@example.com"),
    );
    directory.add_entry(
        &person_dn("carol"),
        person_attributes("carol", "carol@example.com"),
    );

    let mut engine = engine(&directory, &store);
    let mut processor = RecordingProcessor::new();
    let hcsn = engine.full_sync(&mut processor).unwrap();
    assert_eq!(hcsn, 3);
    assert_eq!(processor.new_entries.len(), 3);
    assert_eq!(store.get("acme").unwrap().highest_committed_usn, Some(3));
    assert_eq!(
        store.get("acme").unwrap().invocation_id,
        Some(directory.invocation_id())
    );

    // Mutate: one modification, one creation, one deletion.
    assert!(directory.modify_entry(
        &person_dn("alice"),
        "mail",
        MockAttribute::Text("alice@corp.example.com".into()),
    ));
    directory.add_entry(
        &person_dn("dave"),
        person_attributes("dave", "dave@example.com"),
    );
    let deleted = directory.delete_entry(&person_dn("bob")).unwrap();

    let mut processor = RecordingProcessor::new();
    let hcsn = engine.incremental_sync(&mut processor).unwrap();
    assert_eq!(hcsn, 6);

    // dave was created after the watermark; alice and carol fall inside the
    // changed window (carol's uSNChanged equals the old watermark, which is
    // inclusive); bob surfaces as a tombstone.
    assert_eq!(processor.new_entries.len(), 1);
    assert_eq!(
        processor.new_entries[0],
        vec![
            Some(MockAttribute::Text("dave".into())),
            Some(MockAttribute::Text("dave@example.com".into())),
        ]
    );
    assert_eq!(processor.changed_entries.len(), 2);
    assert!(processor.changed_entries.contains(&vec![
        Some(MockAttribute::Text("alice".into())),
        Some(MockAttribute::Text("alice@corp.example.com".into())),
    ]));
    assert_eq!(processor.deleted_ids, vec![deleted]);

    assert_eq!(store.get("acme").unwrap().highest_committed_usn, Some(6));
}

#[test]
fn full_sync_is_idempotent_without_remote_changes() {
    let (directory, store) = setup(3);
    for i in 0..7 {
        directory.add_entry(
            &person_dn(&format!("user{i}")),
            person_attributes(&format!("user{i}"), &format!("user{i}@example.com")),
        );
    }

    let mut engine = engine(&directory, &store);

    let mut first = RecordingProcessor::new();
    let hcsn_first = engine.full_sync(&mut first).unwrap();

    let mut second = RecordingProcessor::new();
    let hcsn_second = engine.full_sync(&mut second).unwrap();

    assert_eq!(hcsn_first, hcsn_second);
    assert_eq!(first.new_entries, second.new_entries);
    assert_eq!(
        store.get("acme").unwrap().highest_committed_usn,
        Some(hcsn_second)
    );
}

#[test]
fn quiet_incremental_passes_report_nothing_and_keep_the_watermark() {
    let (directory, store) = setup(2);
    directory.add_entry(
        &person_dn("alice"),
        person_attributes("alice", "alice@example.com"),
    );

    let mut engine = engine(&directory, &store);
    let mut processor = RecordingProcessor::new();
    engine.full_sync(&mut processor).unwrap();

    // First quiet pass re-reports the entry sitting exactly on the
    // watermark as changed, but nothing else; the watermark stays.
    let mut processor = RecordingProcessor::new();
    let hcsn = engine.incremental_sync(&mut processor).unwrap();
    assert_eq!(hcsn, 1);
    assert!(processor.new_entries.is_empty());
    assert!(processor.deleted_ids.is_empty());
    assert_eq!(store.get("acme").unwrap().highest_committed_usn, Some(1));
}

#[test]
fn watermark_never_decreases() {
    let (directory, store) = setup(2);
    let mut engine = engine(&directory, &store);
    let mut processor = RecordingProcessor::new();

    let mut last = engine.full_sync(&mut processor).unwrap();
    for i in 0..5 {
        directory.add_entry(
            &person_dn(&format!("user{i}")),
            person_attributes(&format!("user{i}"), &format!("user{i}@example.com")),
        );
        if i % 2 == 0 {
            directory.modify_entry(
                &person_dn(&format!("user{i}")),
                "mail",
                MockAttribute::Text(format!("user{i}@corp.example.com")),
            );
        }
        let hcsn = engine.incremental_sync(&mut processor).unwrap();
        assert!(hcsn >= last);
        assert_eq!(
            store.get("acme").unwrap().highest_committed_usn,
            Some(hcsn)
        );
        last = hcsn;
    }
}

#[test]
fn incremental_sync_requires_a_prior_full_sync() {
    let (directory, store) = setup(2);
    let mut engine = engine(&directory, &store);
    let mut processor = RecordingProcessor::new();

    let err = engine.incremental_sync(&mut processor).unwrap_err();
    assert!(matches!(err, SyncError::InitialFullSyncRequired));
    assert!(err.requires_full_sync());
    assert!(!store.get("acme").unwrap().has_watermark());
}

#[test]
fn restore_from_backup_forces_a_full_resync() {
    let (directory, store) = setup(2);
    directory.add_entry(
        &person_dn("alice"),
        person_attributes("alice", "alice@example.com"),
    );

    let mut engine = engine(&directory, &store);
    let mut processor = RecordingProcessor::new();
    engine.full_sync(&mut processor).unwrap();
    let recorded = store.get("acme").unwrap();

    let new_id = directory.restore_from_backup();
    assert!(!engine.is_incremental_sync_possible().unwrap());

    let mut processor = RecordingProcessor::new();
    let err = engine.incremental_sync(&mut processor).unwrap_err();
    assert!(matches!(err, SyncError::InvocationIdMismatch { .. }));
    assert!(err.requires_full_sync());
    assert_eq!(processor.total(), 0);
    // The record still carries the pre-restore watermark.
    assert_eq!(store.get("acme").unwrap(), recorded);

    // The prescribed remedy works and re-records the new identity.
    let mut processor = RecordingProcessor::new();
    engine.full_sync(&mut processor).unwrap();
    assert_eq!(processor.new_entries.len(), 1);
    assert_eq!(store.get("acme").unwrap().invocation_id, Some(new_id));
    assert!(engine.is_incremental_sync_possible().unwrap());
}

proptest! {
    #[test]
    fn full_sync_reports_every_entry_for_any_page_size(
        count in entry_count_strategy(),
        page_size in page_size_strategy(),
    ) {
        let (directory, store) = setup(page_size);
        for i in 0..count {
            directory.add_entry(
                &person_dn(&format!("user{i}")),
                person_attributes(&format!("user{i}"), &format!("user{i}@example.com")),
            );
        }

        let mut engine = engine(&directory, &store);
        let mut processor = RecordingProcessor::new();
        let hcsn = engine.full_sync(&mut processor).unwrap();

        prop_assert_eq!(hcsn, count as i64);
        prop_assert_eq!(processor.new_entries.len(), count);
        prop_assert_eq!(
            store.get("acme").unwrap().highest_committed_usn,
            Some(count as i64)
        );
    }
}
