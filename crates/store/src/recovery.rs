/// Slot validation and latest-record selection.
///
/// Both slots are decoded independently. A slot that fails validation only
/// drops out of consideration; it becomes an error solely when no slot is
/// valid and at least one of them holds damaged or foreign bytes.
use record::{DecodeError, Record};
use tracing::{debug, warn};

use crate::{Result, Slot, SlotMeta, StoreError, TwinSlotStore, MIN_FILE_LEN};

/// Outcome of validating one slot.
#[derive(Debug)]
pub(crate) enum SlotRead {
    /// The slot holds a record for this magic.
    Valid(Record),
    /// The slot holds a formatted placeholder or an invalidated record.
    Vacant,
    /// The slot holds bytes that are not a valid record for this magic.
    Corrupt(DecodeError),
}

/// Picks the slot with the newest valid record. Ties go to slot A.
pub(crate) fn choose_latest(slots: &[Option<SlotMeta>; 2]) -> Option<Slot> {
    match (slots[0], slots[1]) {
        (Some(a), Some(b)) if b.timestamp > a.timestamp => Some(Slot::B),
        (Some(_), _) => Some(Slot::A),
        (None, Some(_)) => Some(Slot::B),
        (None, None) => None,
    }
}

impl TwinSlotStore {
    fn read_slot(&mut self, slot: Slot, file_len: u64) -> Result<SlotRead> {
        let decoded = Record::decode_at(
            &mut self.file,
            slot.offset(file_len),
            self.magic,
            slot.end(file_len),
        );
        match decoded {
            Ok(rec) => Ok(SlotRead::Valid(rec)),
            Err(e) if e.is_vacant() => Ok(SlotRead::Vacant),
            Err(DecodeError::Io(e)) => Err(StoreError::Io(e)),
            Err(e) => Ok(SlotRead::Corrupt(e)),
        }
    }

    /// Re-validates both slots from disk and rebuilds the cache.
    ///
    /// Returns the number of slots that held damaged or foreign bytes. The
    /// cache is replaced even when no slot is valid.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadFormat`] if the file is shorter than
    /// [`MIN_FILE_LEN`]; [`StoreError::Io`] on read failure.
    pub(crate) fn refresh(&mut self) -> Result<usize> {
        let file_len = self.file.metadata()?.len();
        if file_len < MIN_FILE_LEN {
            return Err(StoreError::BadFormat(format!(
                "file is {} bytes, need at least {}",
                file_len, MIN_FILE_LEN
            )));
        }

        let mut records: [Option<Record>; 2] = [None, None];
        let mut slots: [Option<SlotMeta>; 2] = [None, None];
        let mut corrupt = 0usize;

        for slot in Slot::ALL {
            match self.read_slot(slot, file_len)? {
                SlotRead::Valid(rec) => {
                    debug!(%slot, timestamp = rec.timestamp, len = rec.payload.len(), "slot valid");
                    slots[slot.index()] = Some(SlotMeta {
                        timestamp: rec.timestamp,
                        payload_len: rec.payload.len() as u32,
                    });
                    records[slot.index()] = Some(rec);
                }
                SlotRead::Vacant => debug!(%slot, "slot vacant"),
                SlotRead::Corrupt(e) => {
                    debug!(%slot, error = %e, "slot failed validation");
                    corrupt += 1;
                }
            }
        }

        let active = choose_latest(&slots);
        if let Some(slot) = active {
            if corrupt > 0 {
                warn!(
                    path = %self.path.display(),
                    using = %slot,
                    "ignoring a slot that failed validation"
                );
            }
        }

        self.file_len = file_len;
        self.slots = slots;
        self.active = active;
        self.latest = active.and_then(|slot| records[slot.index()].take());
        Ok(corrupt)
    }

    /// Fails with [`StoreError::BadFormat`] when no slot is valid and at least
    /// one slot is damaged. Vacant slots alone mean "no data", which is fine.
    pub(crate) fn ensure_readable(&self, corrupt: usize) -> Result<()> {
        if self.active.is_none() && corrupt > 0 {
            return Err(StoreError::BadFormat(format!(
                "{}: no valid record for magic {:#x} ({} damaged slot(s))",
                self.path.display(),
                self.magic,
                corrupt
            )));
        }
        Ok(())
    }

    /// Re-reads both slots from disk and returns the latest payload.
    ///
    /// Unlike [`latest_payload`](TwinSlotStore::latest_payload), this performs
    /// I/O and notices changes made to the file behind the cache's back.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadFormat`] if the file is undersized or every slot is
    /// invalid with at least one damaged; [`StoreError::Io`] on read failure.
    pub fn read_latest_data(&mut self) -> Result<Option<&[u8]>> {
        let corrupt = self.refresh()?;
        self.ensure_readable(corrupt)?;
        Ok(self.latest_payload())
    }
}
