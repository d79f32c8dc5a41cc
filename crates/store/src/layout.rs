/// Slot sizing, formatting, and growth.
///
/// The file is always `2 × slot_capacity` bytes long. Capacity is defined
/// one way everywhere: the largest encoded record the layout has had to hold.
/// It grows when a new record does not fit the stale slot, and the growth
/// path relocates the still-valid latest record before slot boundaries move.
use record::{Record, RECORD_OVERHEAD};
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::{Result, Slot, TwinSlotStore, MIN_FILE_LEN};

/// Current wall-clock time in Unix milliseconds.
///
/// Clocks set before 1970 read as `0`.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Writes `bytes` at `offset` without touching anything else in the file.
pub(crate) fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.flush()
}

/// Formats `file` as an empty store and returns its new length.
///
/// Both slots receive a zero-length vacant placeholder stamped with the
/// current time, and the result is fsynced.
pub(crate) fn format(file: &mut File) -> io::Result<u64> {
    let placeholder = Record::vacant(now_millis()).encode()?;

    file.set_len(0)?;
    file.set_len(MIN_FILE_LEN)?;
    write_at(file, Slot::A.offset(MIN_FILE_LEN), &placeholder)?;
    write_at(file, Slot::B.offset(MIN_FILE_LEN), &placeholder)?;
    file.sync_all()?;

    Ok(MIN_FILE_LEN)
}

/// Capacity needed to hold both the current latest record and a new one.
pub(crate) fn required_capacity(latest_len: u64, new_len: u64) -> u64 {
    latest_len.max(new_len).max(RECORD_OVERHEAD)
}

impl TwinSlotStore {
    /// Writes `bytes` into `slot` under the current layout.
    pub(crate) fn write_slot(&mut self, slot: Slot, bytes: &[u8]) -> Result<()> {
        let offset = slot.offset(self.file_len);
        debug!(%slot, offset, len = bytes.len(), "writing slot");
        write_at(&mut self.file, offset, bytes)?;
        Ok(())
    }

    /// Resizes the file so both the latest record and `new_record` fit, then
    /// writes `new_record` into slot B.
    ///
    /// # Steps
    ///
    /// 1. `new_capacity = max(latest encoded len, new encoded len, 36)`.
    /// 2. Move the latest record into slot A and resize (see
    ///    [`prepare_growth`](TwinSlotStore::prepare_growth)).
    /// 3. Write `new_record` at `new_capacity` and fsync.
    ///
    /// A crash after step 2 leaves the latest record valid in slot A whatever
    /// happens to slot B.
    pub(crate) fn grow_and_write(&mut self, new_record: &[u8]) -> Result<()> {
        let latest_len = self.latest.as_ref().map_or(0, Record::encoded_len);
        let new_capacity = required_capacity(latest_len, new_record.len() as u64);

        self.prepare_growth(new_capacity)?;
        self.write_slot(Slot::B, new_record)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Lays the file out for `new_capacity` with the latest record in slot A
    /// and slot B free.
    ///
    /// 1. If the latest record lives in slot B, copy it to slot A and fsync.
    ///    Slot A is stale at that point, so the copy never endangers the
    ///    only valid record.
    /// 2. Set the file length to exactly `2 × new_capacity`. This also trims
    ///    any oversized or odd-length legacy file.
    /// 3. Point the cache at slot A, so a failed write into slot B can't be
    ///    followed by a write over the only valid copy.
    pub(crate) fn prepare_growth(&mut self, new_capacity: u64) -> Result<()> {
        let new_file_len = 2 * new_capacity;
        info!(
            path = %self.path.display(),
            old_file_len = self.file_len,
            new_file_len,
            "resizing store file"
        );

        if let (Some(rec), Some(Slot::B)) = (&self.latest, self.active) {
            let bytes = rec.encode()?;
            debug!(len = bytes.len(), "relocating latest record from slot B to slot A");
            write_at(&mut self.file, Slot::A.offset(self.file_len), &bytes)?;
            self.file.sync_all()?;
        }

        self.file.set_len(new_file_len)?;
        self.file_len = new_file_len;

        // new slot B starts past every old record start, so it holds no valid record
        let latest_meta = self.active.and_then(|slot| self.slots[slot.index()]);
        self.slots = [latest_meta, None];
        self.active = latest_meta.map(|_| Slot::A);
        Ok(())
    }
}
