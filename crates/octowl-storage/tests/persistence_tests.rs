use std::fs;
use std::path::PathBuf;

use filetime::FileTime;
use octowl_core::{Dataset, ServerStatus, Vr, tags};
use octowl_storage::{IndexedStore, StorageError};

fn open_store() -> (tempfile::TempDir, IndexedStore) {
    let dir = tempfile::tempdir().expect("tmp dir");
    let store = IndexedStore::open(dir.path().join("worklist"), "dataset").expect("open store");
    (dir, store)
}

fn scheduled_exam(patient_id: &str, modality: &str) -> Dataset {
    let mut step = Dataset::new();
    step.put_str(tags::MODALITY, Vr::CS, modality).unwrap();
    step.put_str(tags::SCHEDULED_PROCEDURE_STEP_START_DATE, Vr::DA, "20240307")
        .unwrap();

    let mut ds = Dataset::new();
    ds.put_str(tags::PATIENT_NAME, Vr::PN, "Doe^Jane").unwrap();
    ds.put_str(tags::PATIENT_ID, Vr::LO, patient_id).unwrap();
    ds.put_sequence(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE, vec![step]);
    ds
}

fn path_of(store: &IndexedStore, index: usize) -> PathBuf {
    store.file_path(store.get(index).unwrap().file_name())
}

#[test]
fn dirty_flag_follows_saves() {
    let (_dir, mut store) = open_store();
    let mut status = ServerStatus::new();

    let a = store.add(scheduled_exam("A", "CT"));
    let b = store.add(scheduled_exam("B", "MR"));
    let c = store.add(scheduled_exam("C", "US"));
    assert!(store.get(a).unwrap().is_dirty());

    store.save_one(a, &mut status).unwrap();
    assert!(!store.get(a).unwrap().is_dirty());
    assert!(store.get(b).unwrap().is_dirty());

    assert!(store.save_dirty(&mut status));
    assert!(!store.get(b).unwrap().is_dirty());
    assert!(!store.get(c).unwrap().is_dirty());

    assert!(store.mark_dirty(b));
    assert!(store.save_all(&mut status));
    for index in [a, b, c] {
        assert!(!store.get(index).unwrap().is_dirty());
        assert!(path_of(&store, index).exists());
    }
    assert!(status.pending_errors().is_empty());
}

#[test]
fn save_dirty_leaves_clean_files_untouched() {
    let (_dir, mut store) = open_store();
    let mut status = ServerStatus::new();

    let clean = store.add(scheduled_exam("A", "CT"));
    let edited = store.add(scheduled_exam("B", "MR"));
    assert!(store.save_all(&mut status));

    let past = FileTime::from_unix_time(1_000_000_000, 0);
    let clean_path = path_of(&store, clean);
    let edited_path = path_of(&store, edited);
    filetime::set_file_mtime(&clean_path, past).unwrap();
    filetime::set_file_mtime(&edited_path, past).unwrap();
    let clean_bytes = fs::read(&clean_path).unwrap();

    assert!(store.mark_dirty(edited));
    assert!(store.save_dirty(&mut status));

    let clean_meta = fs::metadata(&clean_path).unwrap();
    assert_eq!(FileTime::from_last_modification_time(&clean_meta), past);
    assert_eq!(fs::read(&clean_path).unwrap(), clean_bytes);

    let edited_meta = fs::metadata(&edited_path).unwrap();
    assert_ne!(FileTime::from_last_modification_time(&edited_meta), past);
}

#[test]
fn save_dirty_with_nothing_dirty_succeeds() {
    let (_dir, mut store) = open_store();
    let mut status = ServerStatus::new();
    assert!(store.save_dirty(&mut status));

    store.add(Dataset::new());
    assert!(store.save_all(&mut status));
    assert!(store.save_dirty(&mut status));
}

#[test]
fn save_one_unknown_index_is_not_logged() {
    let (_dir, mut store) = open_store();
    let mut status = ServerStatus::new();

    let err = store.save_one(5, &mut status).unwrap_err();
    assert!(matches!(err, StorageError::UnknownIndex(5)));
    assert!(err.is_contract_violation());
    assert!(status.pending_errors().is_empty());
}

#[test]
fn failed_save_is_logged_and_keeps_entry_dirty() {
    let (_dir, mut store) = open_store();
    let mut status = ServerStatus::new();

    let blocked = store.add(scheduled_exam("A", "CT"));
    let fine = store.add(scheduled_exam("B", "MR"));
    // A directory at the target path makes the write fail.
    fs::create_dir(path_of(&store, blocked)).unwrap();

    let err = store.save_one(blocked, &mut status).unwrap_err();
    assert!(matches!(err, StorageError::Persist { .. }));
    assert!(store.get(blocked).unwrap().is_dirty());
    assert_eq!(status.pending_errors().len(), 1);

    assert!(!store.save_dirty(&mut status));
    assert!(store.get(blocked).unwrap().is_dirty());
    assert!(!store.get(fine).unwrap().is_dirty());
    assert_eq!(status.pending_errors().len(), 2);

    assert!(!store.save_all(&mut status));
    assert!(status.pending_errors()[2].contains("Failed to save: "));
}

#[test]
fn saved_entries_load_back_into_a_fresh_store() {
    let (dir, mut store) = open_store();
    let mut status = ServerStatus::new();

    let first = store.add(scheduled_exam("A", "CT"));
    let second = store.add(scheduled_exam("B", "MR"));
    store.save_one(first, &mut status).unwrap();
    store.save_one(second, &mut status).unwrap();
    let names = [
        store.get(first).unwrap().file_name().to_string(),
        store.get(second).unwrap().file_name().to_string(),
    ];
    drop(store);

    let mut fresh = IndexedStore::open(dir.path().join("worklist"), "dataset").unwrap();
    assert_eq!(fresh.load_all(&mut status).unwrap(), 2);
    assert_eq!(fresh.count(), 2);

    for index in fresh.indexes() {
        let entry = fresh.get(index).unwrap();
        assert!(!entry.is_dirty());
        assert!(names.contains(&entry.file_name().to_string()));
        let patient = entry.record().get_str(tags::PATIENT_ID).unwrap();
        let expected = if patient == "A" {
            scheduled_exam("A", "CT")
        } else {
            scheduled_exam("B", "MR")
        };
        assert_eq!(entry.record(), &expected);
    }
    assert!(status.pending_errors().is_empty());
}

#[test]
fn unsaved_entries_are_not_loaded() {
    let (dir, mut store) = open_store();
    let mut status = ServerStatus::new();
    store.add(scheduled_exam("A", "CT"));
    drop(store);

    let mut fresh = IndexedStore::open(dir.path().join("worklist"), "dataset").unwrap();
    assert_eq!(fresh.load_all(&mut status).unwrap(), 0);
    assert_eq!(fresh.count(), 0);
}
