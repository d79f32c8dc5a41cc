use super::helpers::*;
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

// --------------------- Open ---------------------

#[test]
fn zero_magic_is_reserved() {
    let dir = tempdir().unwrap();
    let result = TwinSlotStore::open(dir.path().join("state.dat"), 0);
    assert!(matches!(result, Err(StoreError::ReservedMagic(0))));
    // Nothing was created.
    assert!(!dir.path().join("state.dat").exists());
}

#[test]
fn missing_parent_directory_is_io_error() {
    let dir = tempdir().unwrap();
    let result = TwinSlotStore::open(dir.path().join("no/such/dir/state.dat"), MAGIC);
    assert!(matches!(result, Err(StoreError::Io(_))));
}

#[test]
fn open_creates_formatted_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("state.dat");
    assert!(!path.exists());

    let store = TwinSlotStore::open(&path, MAGIC)?;
    assert!(path.exists());
    assert_eq!(file_len(&path), MIN_FILE_LEN);
    assert_eq!(store.path(), path.as_path());
    assert_eq!(store.magic(), MAGIC);
    Ok(())
}

// --------------------- Exclusivity ---------------------

#[test]
fn second_open_fails_with_already_locked() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("state.dat");

    let mut first = TwinSlotStore::open(&path, MAGIC)?;
    first.store(b"held")?;

    match TwinSlotStore::open(&path, MAGIC) {
        Err(StoreError::AlreadyLocked(p)) => assert_eq!(p, path),
        other => panic!("expected AlreadyLocked, got {:?}", other),
    }

    // The holder is unaffected by the failed attempt.
    first.store(b"still mine")?;
    assert_eq!(first.latest_payload(), Some(&b"still mine"[..]));
    first.close()?;

    let second = TwinSlotStore::open(&path, MAGIC)?;
    assert_eq!(second.latest_payload(), Some(&b"still mine"[..]));
    Ok(())
}

#[test]
fn dropping_handle_releases_lock() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("state.dat");

    {
        let _held = TwinSlotStore::open(&path, MAGIC)?;
        assert!(matches!(
            TwinSlotStore::open(&path, MAGIC),
            Err(StoreError::AlreadyLocked(_))
        ));
    }

    TwinSlotStore::open(&path, MAGIC)?;
    Ok(())
}

#[test]
fn failed_open_does_not_keep_lock() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("state.dat");
    {
        let mut store = TwinSlotStore::open(&path, MAGIC)?;
        store.store(b"x")?;
    }

    // Wrong tag: open fails after taking the lock.
    assert!(TwinSlotStore::open(&path, MAGIC + 7).is_err());
    // The lock was released with the failed handle.
    let store = TwinSlotStore::open(&path, MAGIC)?;
    assert_eq!(store.latest_payload(), Some(&b"x"[..]));
    Ok(())
}

// --------------------- Invalidate ---------------------

#[test]
fn invalidate_falls_back_to_previous_version() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("state.dat");

    let mut store = TwinSlotStore::open(&path, MAGIC)?;
    store.store(&[b'p'; 50])?;
    store.store(b"v1")?;
    store.store(b"v2")?;

    assert!(store.invalidate_latest()?);
    assert_eq!(store.latest_payload(), Some(&b"v1"[..]));
    store.close()?;

    let store = TwinSlotStore::open(&path, MAGIC)?;
    assert_eq!(store.latest_payload(), Some(&b"v1"[..]));
    Ok(())
}

#[test]
fn invalidate_everything_leaves_no_data() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("state.dat");

    let mut store = TwinSlotStore::open(&path, MAGIC)?;
    store.store(&[b'p'; 50])?;
    store.store(b"v1")?;

    assert!(store.invalidate_latest()?);
    assert!(store.invalidate_latest()?);
    assert_eq!(store.latest_payload(), None);
    assert_eq!(store.active_slot(), None);
    assert!(!store.invalidate_latest()?);
    store.close()?;

    // Both slots vacant: a clean "no data" state, not corruption.
    let store = TwinSlotStore::open(&path, MAGIC)?;
    assert_eq!(store.latest_payload(), None);
    Ok(())
}

#[test]
fn invalidate_on_fresh_store_is_noop() -> Result<()> {
    let dir = tempdir()?;
    let mut store = TwinSlotStore::open(dir.path().join("state.dat"), MAGIC)?;
    assert!(!store.invalidate_latest()?);
    assert_eq!(store.file_len(), MIN_FILE_LEN);
    Ok(())
}

#[test]
fn store_after_invalidate_reuses_invalidated_slot() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("state.dat");

    let mut store = TwinSlotStore::open(&path, MAGIC)?;
    store.store(&[b'p'; 50])?;
    store.store(b"v1")?;
    let discarded = store.active_slot().unwrap();

    store.invalidate_latest()?;
    assert_eq!(store.active_slot(), Some(discarded.other()));

    store.store(b"v2")?;
    assert_eq!(store.active_slot(), Some(discarded));
    assert_eq!(store.latest_payload(), Some(&b"v2"[..]));
    let fallback = store.slot_meta(discarded.other()).unwrap();
    assert!(store.latest_timestamp().unwrap() > fallback.timestamp);
    Ok(())
}

// --------------------- Flush / close / diagnostics ---------------------

#[test]
fn flush_and_close_succeed() -> Result<()> {
    let dir = tempdir()?;
    let mut store = TwinSlotStore::open(dir.path().join("state.dat"), MAGIC)?;
    store.store(b"data")?;
    store.flush()?;
    store.close()?;
    Ok(())
}

#[test]
fn stats_reflect_cached_state() -> Result<()> {
    let dir = tempdir()?;
    let mut store = TwinSlotStore::open(dir.path().join("state.dat"), MAGIC)?;
    store.store(&[1u8; 64])?;
    store.store(b"abc")?;

    let stats = store.stats();
    assert_eq!(stats.file_len, 200);
    assert_eq!(stats.slot_capacity, 100);
    assert_eq!(stats.active, Some(Slot::A));
    assert_eq!(stats.slots[Slot::B.index()].unwrap().payload_len, 64);
    assert_eq!(stats.latest_len, Some(3));
    assert_eq!(stats.latest_timestamp, store.latest_timestamp());
    Ok(())
}

#[test]
fn debug_output_names_fields() -> Result<()> {
    let dir = tempdir()?;
    let store = TwinSlotStore::open(dir.path().join("state.dat"), MAGIC)?;
    let out = format!("{:?}", store);
    assert!(out.contains("TwinSlotStore"));
    assert!(out.contains("0xabcd"));
    assert!(out.contains("file_len: 72"));
    Ok(())
}

#[test]
fn slot_geometry() {
    assert_eq!(Slot::A.other(), Slot::B);
    assert_eq!(Slot::B.other(), Slot::A);
    assert_eq!(Slot::A.offset(200), 0);
    assert_eq!(Slot::B.offset(200), 100);
    assert_eq!(Slot::A.end(201), 100);
    assert_eq!(Slot::B.end(201), 201);
    assert_eq!(Slot::B.to_string(), "B");
}
