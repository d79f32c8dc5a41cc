/// Write path: `store()` and `invalidate_latest()`.
///
/// Every mutation targets the slot that does not hold the latest record. The
/// other slot is never written during the call, so a crash at any point
/// leaves at least the previous version recoverable.
use record::{Record, VACANT_MAGIC};
use std::io;
use tracing::{debug, info, warn};

use crate::layout::{now_millis, write_at};
use crate::{Result, Slot, StoreError, TwinSlotStore, MAX_SLOT_CAPACITY};

/// Returns the encoded size of a record carrying `payload_len` bytes, or
/// [`StoreError::TooLarge`] if it could never fit a slot.
pub(crate) fn check_record_size(payload_len: usize) -> Result<u64> {
    let encoded_len = record::encoded_len(payload_len);
    if encoded_len >= MAX_SLOT_CAPACITY {
        return Err(StoreError::TooLarge {
            encoded_len,
            limit: MAX_SLOT_CAPACITY,
        });
    }
    Ok(encoded_len)
}

impl TwinSlotStore {
    /// Durably replaces the stored blob with `payload`.
    ///
    /// # Steps
    ///
    /// 1. Reject payloads whose record could never fit a slot.
    /// 2. Build the record with a timestamp strictly greater than the latest.
    /// 3. If it fits the stale slot, overwrite only that slot and fsync;
    ///    otherwise grow the file (see `grow_and_write`).
    /// 4. Re-validate both slots and confirm the new record is the latest.
    ///
    /// # Errors
    ///
    /// [`StoreError::TooLarge`] before any I/O if the encoded record reaches
    /// [`MAX_SLOT_CAPACITY`]; [`StoreError::Io`] on write, sync, or
    /// verification failure.
    pub fn store(&mut self, payload: &[u8]) -> Result<()> {
        let encoded_len = check_record_size(payload.len())?;
        let timestamp = self.next_timestamp();
        let bytes = Record::new(self.magic, timestamp, payload.to_vec()).encode()?;

        if let Err(e) = self.place(encoded_len, &bytes) {
            // the cache must match the disk before any later write picks a slot
            if let Err(refresh_err) = self.refresh() {
                warn!(
                    path = %self.path.display(),
                    error = %refresh_err,
                    "could not re-read slots after failed write"
                );
            }
            return Err(e);
        }

        self.refresh()?;
        if self.latest_timestamp() != Some(timestamp) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "record written at timestamp {} did not read back as the latest",
                    timestamp
                ),
            )));
        }

        debug!(
            timestamp,
            len = payload.len(),
            active = ?self.active,
            "stored new version"
        );
        Ok(())
    }

    /// Writes an encoded record into the stale slot, growing the file first
    /// if it won't fit.
    fn place(&mut self, encoded_len: u64, bytes: &[u8]) -> Result<()> {
        if encoded_len <= self.slot_capacity() {
            let target = self.stale_slot();
            self.write_slot(target, bytes)?;
            self.file.sync_all()?;
            Ok(())
        } else {
            self.grow_and_write(bytes)
        }
    }

    /// Discards the latest version without writing a replacement.
    ///
    /// Zeroes the magic field of the active slot, so the other slot's record
    /// (or nothing) becomes the latest. Returns `false` if there was no data.
    pub fn invalidate_latest(&mut self) -> Result<bool> {
        let Some(slot) = self.active else {
            return Ok(false);
        };

        let offset = slot.offset(self.file_len);
        write_at(&mut self.file, offset, &VACANT_MAGIC.to_le_bytes())?;
        self.file.sync_all()?;
        self.refresh()?;

        info!(
            path = %self.path.display(),
            invalidated = %slot,
            now_active = ?self.active,
            "invalidated latest record"
        );
        Ok(true)
    }

    /// The slot a new record goes into: whichever is not active, or slot A
    /// when neither holds data.
    pub(crate) fn stale_slot(&self) -> Slot {
        self.active.map_or(Slot::A, Slot::other)
    }

    /// Wall-clock milliseconds, bumped past the latest record so versions
    /// stay strictly ordered within a millisecond or across clock steps.
    pub(crate) fn next_timestamp(&self) -> i64 {
        let now = now_millis();
        match self.latest_timestamp() {
            Some(latest) if latest >= now => latest.saturating_add(1),
            _ => now,
        }
    }
}
