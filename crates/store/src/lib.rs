//! # Store - TwinSlot Double-Buffered Storage
//!
//! A crash-safe store for exactly one opaque byte blob. The backing file is
//! split into two equally sized halves ("slots"); every write lands in the
//! slot that does **not** hold the latest record, so the previous version
//! stays intact until the new one is durable.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                TWINSLOT STORE                 │
//! │                                               │
//! │ write.rs → encode → stale slot fits?          │
//! │              |  yes: overwrite stale slot     │
//! │              |  no : layout.rs growth         │
//! │              v                                │
//! │           fsync → recovery.rs refresh         │
//! │                                               │
//! │ recovery.rs → decode slot A + slot B          │
//! │            (newest valid timestamp wins)      │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                               |
//! |--------------|-------------------------------------------------------|
//! | `lib.rs`     | `TwinSlotStore`, `open`, accessors, `close`, `Debug`, `Drop` |
//! | [`layout`]   | Formatting, slot offsets, growth + relocation          |
//! | [`write`]    | `store()`, `invalidate_latest()`                       |
//! | [`recovery`] | Slot validation and latest-record selection            |
//! | [`lock`]     | Advisory exclusive lock, directory fsync               |
//!
//! ## File Layout
//!
//! ```text
//! ┌────────────────────────────┐  offset 0
//! │ SLOT A: record + slack     │
//! ├────────────────────────────┤  offset file_len / 2
//! │ SLOT B: record + slack     │
//! └────────────────────────────┘  offset file_len
//! ```
//!
//! Each record is `[magic][timestamp][len][payload][md5]`, see the [`record`]
//! crate.
//!
//! A magic of `0` marks a vacant slot: formatting writes empty placeholders
//! with it, and invalidation overwrites a record's magic with it. Callers
//! must therefore pick a non-zero tag; `open` rejects `0` with
//! [`StoreError::ReservedMagic`].
//!
//! ## Crash Safety
//!
//! The slot that is not being written keeps its bytes untouched for the whole
//! operation. A torn write leaves garbage that fails the checksum, and
//! recovery falls back to the untouched slot.
//!
//! ## Locking
//!
//! `open` takes a non-blocking exclusive advisory lock (`flock` on Unix,
//! `LockFileEx` on Windows) that is held until the handle is closed or
//! dropped. Advisory locks are not reliable on every filesystem; some network
//! mounts silently grant them to every client.
mod layout;
mod lock;
mod recovery;
mod write;

use record::{Record, RECORD_OVERHEAD, VACANT_MAGIC};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub use layout::now_millis;
pub use record::DecodeError;

/// Smallest well-formed file: two empty records.
pub const MIN_FILE_LEN: u64 = 2 * RECORD_OVERHEAD;

/// Exclusive upper bound on the encoded size of a record.
///
/// Keeps the total file length below `1 << 31` bytes.
pub const MAX_SLOT_CAPACITY: u64 = 1 << 30;

/// Errors returned by [`TwinSlotStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file is too short or holds no valid record for this magic.
    #[error("bad format: {0}")]
    BadFormat(String),

    /// Another handle holds the advisory lock on this path.
    #[error("{} is locked by another handle", .0.display())]
    AlreadyLocked(PathBuf),

    /// The payload can never fit in a slot.
    #[error("record too large: {encoded_len} bytes (limit {limit})")]
    TooLarge {
        /// Encoded size of the rejected record.
        encoded_len: u64,
        /// Exclusive limit on the encoded size.
        limit: u64,
    },

    /// The caller asked for the tag that marks vacant slots.
    #[error("magic {0:#x} is reserved for vacant slots")]
    ReservedMagic(u64),

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One of the two halves of the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The first half, starting at offset 0.
    A,
    /// The second half, starting at `file_len / 2`.
    B,
}

impl Slot {
    /// Both slots in file order.
    pub const ALL: [Slot; 2] = [Slot::A, Slot::B];

    /// Returns the opposite slot.
    #[must_use]
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    /// Returns `0` for slot A and `1` for slot B.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    /// Byte offset of this slot in a file of `file_len` bytes.
    #[must_use]
    pub fn offset(self, file_len: u64) -> u64 {
        match self {
            Slot::A => 0,
            Slot::B => file_len / 2,
        }
    }

    /// Byte offset one past the end of this slot.
    #[must_use]
    pub fn end(self, file_len: u64) -> u64 {
        match self {
            Slot::A => file_len / 2,
            Slot::B => file_len,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::A => f.write_str("A"),
            Slot::B => f.write_str("B"),
        }
    }
}

/// Cached description of a valid record sitting in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMeta {
    /// Record timestamp in Unix milliseconds.
    pub timestamp: i64,
    /// Payload length in bytes.
    pub payload_len: u32,
}

impl SlotMeta {
    /// Size of the record on disk, framing included.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        RECORD_OVERHEAD + u64::from(self.payload_len)
    }
}

/// Point-in-time summary of a store, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Current file length in bytes.
    pub file_len: u64,
    /// Bytes available to a record in each slot.
    pub slot_capacity: u64,
    /// Slot holding the latest record, if any.
    pub active: Option<Slot>,
    /// Valid record metadata per slot, indexed by [`Slot::index`].
    pub slots: [Option<SlotMeta>; 2],
    /// Timestamp of the latest record.
    pub latest_timestamp: Option<i64>,
    /// Payload length of the latest record.
    pub latest_len: Option<usize>,
}

/// A handle on one double-buffered file.
///
/// # Write Path
///
/// 1. Encode the payload with a fresh, strictly increasing timestamp.
/// 2. Write it into the stale slot, growing the file first if it won't fit.
/// 3. `fsync`, then re-validate both slots and confirm the new record won.
///
/// # Read Path
///
/// [`latest_payload`](TwinSlotStore::latest_payload) is served from the cache
/// built by the last recovery pass; it performs no I/O.
///
/// # Recovery
///
/// On [`open`](TwinSlotStore::open) both slots are validated and the newest
/// valid record becomes the latest. A single damaged slot is tolerated.
///
/// All mutating operations take `&mut self`. A handle shared between threads
/// must be wrapped in a `Mutex`.
pub struct TwinSlotStore {
    pub(crate) path: PathBuf,
    pub(crate) file: File,
    pub(crate) magic: u64,
    /// File length observed by the last layout change or recovery pass.
    pub(crate) file_len: u64,
    /// Latest valid record, as decoded from disk.
    pub(crate) latest: Option<Record>,
    /// Valid-record metadata per slot.
    pub(crate) slots: [Option<SlotMeta>; 2],
    /// Slot holding `latest`.
    pub(crate) active: Option<Slot>,
}

impl fmt::Debug for TwinSlotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwinSlotStore")
            .field("path", &self.path)
            .field("magic", &format_args!("{:#x}", self.magic))
            .field("file_len", &self.file_len)
            .field("slot_capacity", &self.slot_capacity())
            .field("active", &self.active)
            .field("slot_a", &self.slots[0])
            .field("slot_b", &self.slots[1])
            .field("latest_timestamp", &self.latest_timestamp())
            .field("latest_len", &self.latest.as_ref().map(|r| r.payload.len()))
            .finish()
    }
}

impl TwinSlotStore {
    /// Opens the store at `path` for the format tagged `magic`.
    ///
    /// # Steps
    ///
    /// 1. Reject the reserved vacant magic (`0`).
    /// 2. Open (creating if needed) the file read/write.
    /// 3. Take the exclusive advisory lock without waiting.
    /// 4. Format the file if it is missing or shorter than [`MIN_FILE_LEN`].
    /// 5. Validate both slots and cache the latest record.
    ///
    /// # Empty Stores
    ///
    /// A file whose slots are both vacant opens with no data instead of
    /// failing, whether it was formatted just now, formatted by an earlier
    /// handle and never written, or had every version invalidated. Only
    /// damaged or foreign bytes with no valid record beside them are a
    /// format error.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ReservedMagic`] for `magic == 0`.
    /// - [`StoreError::AlreadyLocked`] if another handle holds the path.
    /// - [`StoreError::BadFormat`] if neither slot holds a valid record and at
    ///   least one holds damaged or foreign data.
    /// - [`StoreError::Io`] on any OS failure.
    pub fn open<P: AsRef<Path>>(path: P, magic: u64) -> Result<Self> {
        if magic == VACANT_MAGIC {
            return Err(StoreError::ReservedMagic(magic));
        }
        let path = path.as_ref().to_path_buf();
        let existed = path.exists();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        lock::acquire(&file, &path)?;

        let mut file_len = file.metadata()?.len();
        let fresh = file_len < MIN_FILE_LEN;
        if fresh {
            info!(path = %path.display(), found_len = file_len, "formatting store file");
            file_len = layout::format(&mut file)?;
            if !existed {
                lock::fsync_parent_dir(&path)?;
            }
        }

        let mut store = Self {
            path,
            file,
            magic,
            file_len,
            latest: None,
            slots: [None, None],
            active: None,
        };
        // an error below drops `store`, which releases the lock
        let corrupt = store.refresh()?;
        store.ensure_readable(corrupt)?;

        info!(
            path = %store.path.display(),
            file_len = store.file_len,
            active = ?store.active,
            fresh,
            "store opened"
        );
        Ok(store)
    }

    /// Returns the payload of the latest record, or `None` if the store holds
    /// no data. Served from cache.
    #[must_use]
    pub fn latest_payload(&self) -> Option<&[u8]> {
        self.latest.as_ref().map(|r| r.payload.as_slice())
    }

    /// Returns the timestamp (Unix milliseconds) of the latest record.
    #[must_use]
    pub fn latest_timestamp(&self) -> Option<i64> {
        self.latest.as_ref().map(|r| r.timestamp)
    }

    /// Forces all written data to stable storage.
    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Releases the lock and closes the file.
    ///
    /// Unlock failures are ignored; closing the descriptor releases the lock
    /// regardless. The handle is consumed, so no operation can follow.
    pub fn close(self) -> Result<()> {
        info!(path = %self.path.display(), "closing store");
        drop(self);
        Ok(())
    }

    /// Returns the path this store was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the caller's format tag.
    #[must_use]
    pub fn magic(&self) -> u64 {
        self.magic
    }

    /// Returns the current file length in bytes.
    #[must_use]
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Returns the number of bytes each slot can hold.
    #[must_use]
    pub fn slot_capacity(&self) -> u64 {
        self.file_len / 2
    }

    /// Returns the slot holding the latest record.
    #[must_use]
    pub fn active_slot(&self) -> Option<Slot> {
        self.active
    }

    /// Returns the cached metadata for `slot`, if it holds a valid record.
    #[must_use]
    pub fn slot_meta(&self, slot: Slot) -> Option<SlotMeta> {
        self.slots[slot.index()]
    }

    /// Returns a diagnostic snapshot of the cached state.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            file_len: self.file_len,
            slot_capacity: self.slot_capacity(),
            active: self.active,
            slots: self.slots,
            latest_timestamp: self.latest_timestamp(),
            latest_len: self.latest.as_ref().map(|r| r.payload.len()),
        }
    }
}

/// Best-effort unlock on drop.
///
/// Closing the descriptor releases the lock anyway; the explicit unlock just
/// makes the release happen before the file is closed.
impl Drop for TwinSlotStore {
    fn drop(&mut self) {
        lock::release(&self.file, &self.path);
    }
}

#[cfg(test)]
mod tests;
