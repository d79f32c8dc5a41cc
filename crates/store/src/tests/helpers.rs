use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const MAGIC: u64 = 0xABCD;

pub fn file_len(path: &Path) -> u64 {
    fs::metadata(path).unwrap().len()
}

/// XORs the byte at `offset` with `0xFF`.
pub fn flip_byte(path: &Path, offset: u64) {
    let mut f = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut b = [0u8; 1];
    f.seek(SeekFrom::Start(offset)).unwrap();
    f.read_exact(&mut b).unwrap();
    b[0] ^= 0xFF;
    f.seek(SeekFrom::Start(offset)).unwrap();
    f.write_all(&b).unwrap();
    f.sync_all().unwrap();
}

/// Overwrites `len` bytes starting at `offset` with `fill`.
pub fn smear(path: &Path, offset: u64, len: usize, fill: u8) {
    let mut f = OpenOptions::new().write(true).open(path).unwrap();
    f.seek(SeekFrom::Start(offset)).unwrap();
    f.write_all(&vec![fill; len]).unwrap();
    f.sync_all().unwrap();
}
