//! # Config - TwinSlot Runtime Settings
//!
//! Reads settings from environment variables with defaults:
//!
//! ```text
//! TWINSLOT_PATH   store file path                    (default: "twinslot.dat")
//! TWINSLOT_MAGIC  format tag, decimal or 0x-hex      (default: 0x5457494E534C4F54, "TWINSLOT")
//! ```
//!
//! Lookup goes through a closure so tests can supply variables without
//! touching the process environment.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Environment variable naming the store file.
pub const PATH_VAR: &str = "TWINSLOT_PATH";

/// Environment variable holding the format tag.
pub const MAGIC_VAR: &str = "TWINSLOT_MAGIC";

/// Store file used when [`PATH_VAR`] is unset.
pub const DEFAULT_PATH: &str = "twinslot.dat";

/// Format tag used when [`MAGIC_VAR`] is unset (ASCII "TWINSLOT").
pub const DEFAULT_MAGIC: u64 = 0x5457_494E_534C_4F54;

/// Settings for opening a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path of the double-buffered file.
    pub path: PathBuf,
    /// Application format tag written into every record.
    pub magic: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            magic: DEFAULT_MAGIC,
        }
    }
}

impl Config {
    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through `lookup`, which returns the value of a variable
    /// or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the magic is not a number or is `0`, or if the
    /// path is empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(path) = lookup(PATH_VAR) {
            if path.trim().is_empty() {
                bail!("{} must not be empty", PATH_VAR);
            }
            cfg.path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(MAGIC_VAR) {
            cfg.magic =
                parse_magic(&raw).with_context(|| format!("invalid {} value {:?}", MAGIC_VAR, raw))?;
        }

        Ok(cfg)
    }
}

/// Parses a format tag given in decimal or with a `0x` prefix.
///
/// Underscores are accepted as digit separators. Zero is rejected because it
/// marks vacant slots on disk.
pub fn parse_magic(raw: &str) -> Result<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != '_').collect();
    let value = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16)?,
        None => cleaned.parse::<u64>()?,
    };
    if value == 0 {
        bail!("magic must be non-zero");
    }
    Ok(value)
}
