use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use ripemd::{Digest as RipemdDigest, Ripemd160};

use crate::error::{LedgerError, Result};
use data_encoding::HEXLOWER;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds. Block and checkpoint timestamps use this.
pub fn current_timestamp() -> Result<i64> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| LedgerError::Io(format!("System time error: {e}")))?
        .as_secs();

    if secs > i64::MAX as u64 {
        return Err(LedgerError::Io("Timestamp overflow".to_string()));
    }

    Ok(secs as i64)
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// SHA-256 digest rendered as lowercase hex, the form stored in block hashes.
pub fn sha256_hex(data: &[u8]) -> String {
    HEXLOWER.encode(sha256_digest(data).as_slice())
}

pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| LedgerError::Validation(format!("Invalid base58 encoding: {e}")))
}

/// Generate a fresh ECDSA P-256 key pair, returned as PKCS#8 bytes.
pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| LedgerError::KeyLoad(format!("Failed to generate ECDSA key pair: {e}")))?
        .as_ref()
        .to_vec();
    Ok(pkcs8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_is_stable() {
        let digest = sha256_hex(b"tracker-chain");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, sha256_hex(b"tracker-chain"));
        assert_ne!(digest, sha256_hex(b"tracker-chain2"));
    }

    #[test]
    fn test_base58_round_trip() {
        let payload = vec![0u8, 1, 2, 3, 255];
        let encoded = base58_encode(&payload);
        assert_eq!(base58_decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_new_key_pair_is_unique() {
        let a = new_key_pair().unwrap();
        let b = new_key_pair().unwrap();
        assert_ne!(a, b);
    }
}
