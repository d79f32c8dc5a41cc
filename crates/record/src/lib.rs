//! # Record - Versioned Blob Codec
//!
//! Encodes and decodes the single versioned record that a TwinSlot store keeps
//! in each of its two slots.
//!
//! ## Binary Record Format
//!
//! ```text
//! [magic: u64 LE][timestamp_millis: i64 LE][payload_len: u32 LE][payload ...][md5: 16 bytes]
//! ```
//!
//! The 20-byte header plus the 16-byte checksum give a fixed overhead of
//! [`RECORD_OVERHEAD`] bytes. The checksum is the MD5 digest of every byte that
//! precedes it in the record (header and payload).
//!
//! Decoding never panics on bad input: a slot holding garbage, a foreign tag,
//! or a torn write yields a [`DecodeError`] that the caller treats as
//! "no usable record here".
//!
//! ## Example
//!
//! ```rust
//! use record::Record;
//!
//! let rec = Record::new(0xABCD, 1_700_000_000_000, b"hello".to_vec());
//! let bytes = rec.encode().unwrap();
//! assert_eq!(bytes.len() as u64, rec.encoded_len());
//!
//! let decoded = Record::decode(&bytes, 0xABCD).unwrap();
//! assert_eq!(decoded, rec);
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use md5::{Digest, Md5};
use std::io::{self, Read, Seek, SeekFrom};

use thiserror::Error;

/// Size of the fixed header: magic (8) + timestamp (8) + payload length (4).
pub const HEADER_LEN: u64 = 8 + 8 + 4;

/// Size of the trailing MD5 checksum.
pub const CHECKSUM_LEN: u64 = 16;

/// Bytes every record spends on framing, independent of the payload.
pub const RECORD_OVERHEAD: u64 = HEADER_LEN + CHECKSUM_LEN;

/// Magic value of a vacant slot.
///
/// Placeholder records written when a file is formatted carry this tag, and
/// invalidating a record overwrites its magic with it. A vacant slot is never
/// valid for any caller.
pub const VACANT_MAGIC: u64 = 0;

/// Returns the encoded size of a record carrying `payload_len` bytes.
#[must_use]
pub fn encoded_len(payload_len: usize) -> u64 {
    RECORD_OVERHEAD + payload_len as u64
}

/// A single versioned blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Application-chosen format tag.
    pub magic: u64,
    /// Milliseconds since the Unix epoch at which this version was created.
    pub timestamp: i64,
    /// Opaque application data.
    pub payload: Vec<u8>,
}

/// Reasons a byte region does not hold a usable record.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The header carries a different format tag.
    #[error("magic mismatch: expected {expected:#x}, found {found:#x}")]
    MagicMismatch {
        /// Tag the caller asked for.
        expected: u64,
        /// Tag found in the header.
        found: u64,
    },

    /// The declared payload length runs past the end of the slot.
    #[error("declared payload length {declared} exceeds the {available} bytes available")]
    LengthOutOfBounds {
        /// Payload length read from the header.
        declared: u32,
        /// Bytes available from the record start to the end of the slot.
        available: u64,
    },

    /// The trailing digest does not match the record contents.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// The region ended before a full record could be read.
    #[error("truncated record")]
    Truncated,

    /// An underlying I/O error other than a short read.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// Returns `true` if the region is a vacant slot rather than damaged data.
    #[must_use]
    pub fn is_vacant(&self) -> bool {
        matches!(self, DecodeError::MagicMismatch { found, .. } if *found == VACANT_MAGIC)
    }
}

/// Computes the MD5 digest used as the record checksum.
#[must_use]
pub fn digest(bytes: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    let mut out = [0u8; 16];
    out.copy_from_slice(&hasher.finalize());
    out
}

impl Record {
    /// Creates a record from its parts.
    pub fn new(magic: u64, timestamp: i64, payload: Vec<u8>) -> Self {
        Self {
            magic,
            timestamp,
            payload,
        }
    }

    /// Creates the zero-length placeholder written into both slots of a
    /// freshly formatted file.
    pub fn vacant(timestamp: i64) -> Self {
        Self::new(VACANT_MAGIC, timestamp, Vec::new())
    }

    /// Returns the number of bytes [`encode`](Record::encode) produces.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        encoded_len(self.payload.len())
    }

    /// Serializes the record.
    ///
    /// Fails with `InvalidInput` if the payload length does not fit in the
    /// 32-bit length field.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Serializes the record, appending to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        let payload_len = u32::try_from(self.payload.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "record payload too large (exceeds u32::MAX bytes)",
            )
        })?;

        let start = buf.len();
        buf.write_u64::<LittleEndian>(self.magic)?;
        buf.write_i64::<LittleEndian>(self.timestamp)?;
        buf.write_u32::<LittleEndian>(payload_len)?;
        buf.extend_from_slice(&self.payload);

        let sum = digest(&buf[start..]);
        buf.extend_from_slice(&sum);
        Ok(())
    }

    /// Decodes a record from the start of `bytes`.
    ///
    /// `bytes` is the whole region the record may occupy; trailing bytes past
    /// the record are ignored.
    pub fn decode(bytes: &[u8], expected_magic: u64) -> Result<Record, DecodeError> {
        let mut rdr = bytes;
        Self::decode_from(&mut rdr, expected_magic, bytes.len() as u64)
    }

    /// Decodes a record from `reader`, which is positioned at the record start
    /// and has `available` bytes left before the end of its slot.
    ///
    /// # Validation order
    ///
    /// 1. Header present (else [`DecodeError::Truncated`]).
    /// 2. Magic equals `expected_magic`.
    /// 3. Header + payload + checksum fit in `available`.
    /// 4. Payload and checksum readable (else `Truncated`).
    /// 5. Digest over header and payload matches the stored checksum.
    pub fn decode_from<R: Read>(
        reader: &mut R,
        expected_magic: u64,
        available: u64,
    ) -> Result<Record, DecodeError> {
        if available < RECORD_OVERHEAD {
            return Err(DecodeError::Truncated);
        }

        let mut header = [0u8; HEADER_LEN as usize];
        read_exact_or_truncated(reader, &mut header)?;

        let mut hr = &header[..];
        let magic = hr.read_u64::<LittleEndian>()?;
        let timestamp = hr.read_i64::<LittleEndian>()?;
        let payload_len = hr.read_u32::<LittleEndian>()?;

        if magic != expected_magic {
            return Err(DecodeError::MagicMismatch {
                expected: expected_magic,
                found: magic,
            });
        }

        if RECORD_OVERHEAD + u64::from(payload_len) > available {
            return Err(DecodeError::LengthOutOfBounds {
                declared: payload_len,
                available,
            });
        }

        let mut payload = vec![0u8; payload_len as usize];
        read_exact_or_truncated(reader, &mut payload)?;
        let mut stored = [0u8; CHECKSUM_LEN as usize];
        read_exact_or_truncated(reader, &mut stored)?;

        let mut hasher = Md5::new();
        hasher.update(header);
        hasher.update(&payload);
        if hasher.finalize().as_slice() != &stored[..] {
            return Err(DecodeError::ChecksumMismatch);
        }

        Ok(Record {
            magic,
            timestamp,
            payload,
        })
    }

    /// Decodes the record that starts at `offset` and must end by `slot_end`.
    ///
    /// This is the positioned form used when validating a slot inside a file.
    pub fn decode_at<R: Read + Seek>(
        reader: &mut R,
        offset: u64,
        expected_magic: u64,
        slot_end: u64,
    ) -> Result<Record, DecodeError> {
        let available = slot_end.saturating_sub(offset);
        reader.seek(SeekFrom::Start(offset))?;
        Self::decode_from(reader, expected_magic, available)
    }
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DecodeError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(DecodeError::Truncated),
        Err(e) => Err(DecodeError::Io(e)),
    }
}
