//! Data storage and persistence
//!
//! Encrypted at-rest persistence for the ledger: one file per block, a
//! chain-index tip record, the pending pool, and the participant wallets.
//! On restart the encrypted files are the source of truth; in-memory state
//! is rebuilt from them, never the reverse.

pub mod block_store;
pub mod encrypted;
pub mod mempool;

pub use block_store::BlockStore;
pub use encrypted::{SecureKey, StorageCipher};
pub use mempool::Mempool;

use crate::error::{LedgerError, Result};
use std::fs;
use std::path::Path;

/// Write a file atomically: write to a sibling temp file, then rename over
/// the target. A crash mid-write can never leave a truncated file behind.
/// Callers serialize writes to the same path under their component lock.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| LedgerError::Storage(format!("Failed to create {}: {e}", parent.display())))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    fs::write(&tmp, bytes)
        .map_err(|e| LedgerError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| LedgerError::Storage(format!("Failed to rename over {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parents_and_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.bin");

        atomic_write(&path, b"one").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"one");

        atomic_write(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert!(!path.with_extension("bin.tmp").exists());
    }
}
