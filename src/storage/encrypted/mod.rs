//! At-rest encryption
//!
//! Every persisted ledger file (blocks, chain index, mempool, wallets) is
//! sealed with AES-256-GCM under a key derived from the node's key pair.
//! This protects storage media against offline access only; it is not
//! peer-to-peer confidentiality.

pub mod cipher;

pub use cipher::{SecureKey, StorageCipher};

use crate::error::Result;

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(length: usize) -> Result<Vec<u8>> {
    use rand::RngCore;
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    Ok(bytes)
}
