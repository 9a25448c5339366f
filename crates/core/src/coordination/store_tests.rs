// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn quick_lock() -> LockConfig {
    LockConfig::new(3, Duration::from_millis(1)).with_max_backoff(Duration::from_millis(2))
}

fn patient_lock() -> LockConfig {
    LockConfig::new(2_000, Duration::from_millis(1)).with_max_backoff(Duration::from_millis(5))
}

fn stores(dir: &Path) -> Vec<Box<dyn SharedStateStore>> {
    vec![
        Box::new(FileBackedStore::open(dir.join("state.json")).unwrap()),
        Box::new(InMemoryStore::new()),
    ]
}

#[test]
fn open_creates_state_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session").join("state.json");

    let store = FileBackedStore::open(&path).unwrap();

    assert!(path.exists());
    let doc: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert!(doc.get("stateId").is_some());
    assert!(doc.get("lastModified").is_some());
    assert_eq!(doc["data"], json!({}));
    assert!(!store.state_id().unwrap().is_empty());
}

#[test]
fn reopening_keeps_state_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let first = FileBackedStore::open(&path).unwrap().state_id().unwrap();
    let second = FileBackedStore::open(&path).unwrap().state_id().unwrap();
    assert_eq!(first, second);
}

#[test]
fn set_get_remove_behave_the_same_for_both_stores() {
    let dir = tempfile::tempdir().unwrap();
    for store in stores(dir.path()) {
        assert_eq!(store.get("missing").unwrap(), None);

        store.set("name", json!("alpha")).unwrap();
        store.set("count", json!(3)).unwrap();
        assert_eq!(store.get("name").unwrap(), Some(json!("alpha")));

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 2);

        assert_eq!(store.remove("name").unwrap(), Some(json!("alpha")));
        assert_eq!(store.remove("name").unwrap(), None);
        assert_eq!(store.get("name").unwrap(), None);
    }
}

#[test]
fn value_set_by_one_handle_is_read_by_another() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let writer = FileBackedStore::open(&path).unwrap();
    let reader = FileBackedStore::open(&path).unwrap();

    writer
        .set("config", json!({"workers": 3, "tags": ["a", "b"]}))
        .unwrap();

    assert_eq!(
        reader.get("config").unwrap(),
        Some(json!({"workers": 3, "tags": ["a", "b"]}))
    );
}

#[test]
fn update_passes_previous_value() {
    let dir = tempfile::tempdir().unwrap();
    for store in stores(dir.path()) {
        let first = store
            .update("n", &mut |old| json!(old.and_then(|v| v.as_i64()).unwrap_or(0) + 1))
            .unwrap();
        let second = store
            .update("n", &mut |old| json!(old.and_then(|v| v.as_i64()).unwrap_or(0) + 1))
            .unwrap();
        assert_eq!(first, json!(1));
        assert_eq!(second, json!(2));
    }
}

#[test]
fn compare_and_swap_requires_matching_value() {
    let dir = tempfile::tempdir().unwrap();
    for store in stores(dir.path()) {
        store.set("counter", json!(0)).unwrap();

        assert!(!store.compare_and_swap("counter", &json!(5), json!(6)).unwrap());
        assert!(store.compare_and_swap("counter", &json!(0), json!(1)).unwrap());
        assert!(!store.compare_and_swap("counter", &json!(0), json!(1)).unwrap());
        assert_eq!(store.get("counter").unwrap(), Some(json!(1)));
    }
}

// Stringified comparison: different JSON types with equal text forms match.
#[test]
fn compare_and_swap_treats_equal_string_forms_as_equal() {
    let dir = tempfile::tempdir().unwrap();
    for store in stores(dir.path()) {
        store.set("counter", json!("0")).unwrap();
        assert!(store.compare_and_swap("counter", &json!(0), json!(1)).unwrap());

        store.set("flag", json!(true)).unwrap();
        assert!(store.compare_and_swap("flag", &json!("true"), json!(false)).unwrap());
    }
}

#[test]
fn compare_and_swap_on_missing_key_matches_null() {
    let store = InMemoryStore::new();
    assert!(store.compare_and_swap("fresh", &Value::Null, json!("x")).unwrap());
    assert_eq!(store.get("fresh").unwrap(), Some(json!("x")));
}

#[yare::parameterized(
    absent = { None, "" },
    null = { Some(json!(null)), "" },
    string = { Some(json!("abc")), "abc" },
    number = { Some(json!(42)), "42" },
    boolean = { Some(json!(false)), "false" },
    object = { Some(json!({"a": 1})), "{\"a\":1}" },
)]
fn display_form_renders_values(value: Option<Value>, expected: &str) {
    assert_eq!(display_form(value.as_ref()), expected);
}

#[test]
fn get_falls_back_to_cache_when_lock_is_stuck() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = FileBackedStore::open_with(&path, quick_lock()).unwrap();
    store.set("mode", json!("fast")).unwrap();

    // Another holder grabs the lock and changes the document behind our back
    let foreign = FileLock::acquire(&lock_path_for(&path), &quick_lock()).unwrap();
    let mut doc = store.snapshot().unwrap();
    doc.data.insert("mode".to_string(), json!("slow"));
    fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    assert_eq!(store.get("mode").unwrap(), Some(json!("fast")));

    foreign.release();
    assert_eq!(store.get("mode").unwrap(), Some(json!("slow")));
}

#[test]
fn mutations_propagate_lock_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = FileBackedStore::open_with(&path, quick_lock()).unwrap();
    let _foreign = FileLock::acquire(&lock_path_for(&path), &quick_lock()).unwrap();

    assert!(matches!(
        store.set("k", json!(1)),
        Err(StoreError::LockUnavailable(_))
    ));
    assert!(matches!(
        store.compare_and_swap("k", &json!(1), json!(2)),
        Err(StoreError::LockUnavailable(_))
    ));
    assert!(matches!(
        store.update("k", &mut |_| json!(0)),
        Err(StoreError::LockUnavailable(_))
    ));
}

#[test]
fn corrupt_document_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = FileBackedStore::open(&path).unwrap();
    fs::write(&path, b"{not json").unwrap();

    assert!(matches!(store.set("k", json!(1)), Err(StoreError::Corrupt { .. })));
}

#[test]
fn concurrent_updates_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    FileBackedStore::open(&path).unwrap();

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            std::thread::spawn(move || {
                let store = FileBackedStore::open_with(&path, patient_lock()).unwrap();
                for _ in 0..25 {
                    store
                        .update("counter", &mut |old| {
                            json!(old.and_then(|v| v.as_i64()).unwrap_or(0) + 1)
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let store = FileBackedStore::open(&path).unwrap();
    assert_eq!(store.get("counter").unwrap(), Some(json!(100)));
}

#[test]
fn concurrent_cas_with_same_expected_has_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    FileBackedStore::open(&path).unwrap().set("counter", json!(0)).unwrap();
    let barrier = Arc::new(std::sync::Barrier::new(3));

    let threads: Vec<_> = (0..3)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let store = FileBackedStore::open_with(&path, patient_lock()).unwrap();
                barrier.wait();
                store.compare_and_swap("counter", &json!(0), json!(1)).unwrap()
            })
        })
        .collect();
    let wins = threads
        .into_iter()
        .map(|t| t.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(wins, 1);
    let store = FileBackedStore::open(&path).unwrap();
    assert_eq!(store.get("counter").unwrap(), Some(json!(1)));
}
