/// Advisory locking and directory durability helpers.
///
/// The lock is a whole-file exclusive advisory lock taken without blocking.
/// Contention is reported immediately; waiting or retrying is left to the
/// caller.
use fs2::FileExt;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::{Result, StoreError};

/// Takes the exclusive lock on `file` or fails with
/// [`StoreError::AlreadyLocked`].
pub(crate) fn acquire(file: &File, path: &Path) -> Result<()> {
    match FileExt::try_lock_exclusive(file) {
        Ok(()) => {
            debug!(path = %path.display(), "acquired exclusive lock");
            Ok(())
        }
        Err(e) if is_contended(&e) => Err(StoreError::AlreadyLocked(path.to_path_buf())),
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Releases the lock on `file`, ignoring failures.
pub(crate) fn release(file: &File, path: &Path) {
    if let Err(e) = FileExt::unlock(file) {
        debug!(path = %path.display(), error = %e, "unlock failed; descriptor close will release it");
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Syncs the directory containing `path` so a newly created file's directory
/// entry survives power loss.
#[cfg(unix)]
pub(crate) fn fsync_parent_dir(path: &Path) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::OpenOptions::new().read(true).open(dir)?.sync_all()
}

/// Directories cannot be opened as files here; creation durability rests on
/// the file's own `sync_all`.
#[cfg(not(unix))]
pub(crate) fn fsync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
