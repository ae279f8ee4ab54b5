use crate::error::{LedgerError, Result};
use crate::storage::atomic_write;
use crate::storage::encrypted::StorageCipher;
use crate::utils::{
    base58_decode, base58_encode, deserialize, ripemd160_digest, serialize, sha256_digest,
};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

pub const WALLETS_FILE: &str = "wallets.bin";

/// A participant identity: key pair plus the derived base58check address.
#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    LedgerError::KeyLoad(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn get_address(&self) -> String {
        let pub_key_hash = hash_pub_key(self.public_key.as_slice());
        let mut payload: Vec<u8> = vec![VERSION];
        payload.extend(pub_key_hash.as_slice());
        let checksum = checksum(payload.as_slice());
        payload.extend(checksum.as_slice());
        // version + pub_key_hash + checksum
        base58_encode(payload.as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }
}

fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = sha256_digest(pub_key);
    ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = sha256_digest(payload);
    let second_sha = sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

pub fn validate_address(address: &str) -> bool {
    let payload = match base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() < ADDRESS_CHECK_SUM_LEN + 1 {
        return false;
    }

    let actual_checksum = payload[payload.len() - ADDRESS_CHECK_SUM_LEN..].to_vec();
    let target_checksum = checksum(&payload[..payload.len() - ADDRESS_CHECK_SUM_LEN]);
    actual_checksum.eq(target_checksum.as_slice())
}

/// Email-keyed participant registry, persisted encrypted at rest. Creator
/// and checkpoint addresses are derived here on first use.
pub struct Wallets {
    inner: RwLock<HashMap<String, Wallet>>,
    path: PathBuf,
    cipher: Arc<StorageCipher>,
}

impl std::fmt::Debug for Wallets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallets")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Wallets {
    /// Open the registry at `dir`, loading the encrypted wallet file if one
    /// exists. A missing file starts an empty registry.
    pub fn open(dir: &Path, cipher: Arc<StorageCipher>) -> Result<Wallets> {
        let path = dir.join(WALLETS_FILE);
        let wallets = if path.exists() {
            let sealed = std::fs::read(&path)
                .map_err(|e| LedgerError::Storage(format!("Failed to read wallet file: {e}")))?;
            let plaintext = cipher.decrypt(&sealed)?;
            deserialize(&plaintext)?
        } else {
            HashMap::new()
        };

        Ok(Wallets {
            inner: RwLock::new(wallets),
            path,
            cipher,
        })
    }

    /// Derive (or look up) the address for a participant email.
    pub fn get_or_create_address(&self, email: &str) -> Result<String> {
        {
            let inner = self.inner.read().map_err(|_| {
                LedgerError::Storage("Failed to acquire read lock on wallets".to_string())
            })?;
            if let Some(wallet) = inner.get(email) {
                return Ok(wallet.get_address());
            }
        }

        let wallet = Wallet::new()?;
        let mut inner = self.inner.write().map_err(|_| {
            LedgerError::Storage("Failed to acquire write lock on wallets".to_string())
        })?;
        // A concurrent creator may have won the race; keep the first entry.
        let address = inner
            .entry(email.to_string())
            .or_insert(wallet)
            .get_address();
        self.persist(&inner)?;
        Ok(address)
    }

    pub fn get_address(&self, email: &str) -> Option<String> {
        match self.inner.read() {
            Ok(inner) => inner.get(email).map(|w| w.get_address()),
            Err(_) => {
                log::error!("Failed to acquire read lock on wallets");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(inner) => inner.len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, wallets: &HashMap<String, Wallet>) -> Result<()> {
        let plaintext = serialize(wallets)?;
        let sealed = self.cipher.encrypt(&plaintext)?;
        atomic_write(&self.path, &sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::encrypted::SecureKey;
    use tempfile::tempdir;

    fn test_cipher() -> Arc<StorageCipher> {
        Arc::new(StorageCipher::new(&SecureKey::new(vec![7u8; 32])).unwrap())
    }

    #[test]
    fn test_address_is_valid_base58check() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        assert!(validate_address(&address));
        assert!(!validate_address("obviously-not-an-address"));
    }

    #[test]
    fn test_get_or_create_is_stable_per_email() {
        let dir = tempdir().unwrap();
        let wallets = Wallets::open(dir.path(), test_cipher()).unwrap();

        let first = wallets.get_or_create_address("a@x.org").unwrap();
        let second = wallets.get_or_create_address("a@x.org").unwrap();
        assert_eq!(first, second);
        assert_eq!(wallets.len(), 1);

        let other = wallets.get_or_create_address("b@x.org").unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_registry_survives_reopen() {
        let dir = tempdir().unwrap();
        let address = {
            let wallets = Wallets::open(dir.path(), test_cipher()).unwrap();
            wallets.get_or_create_address("a@x.org").unwrap()
        };

        let reopened = Wallets::open(dir.path(), test_cipher()).unwrap();
        assert_eq!(reopened.get_address("a@x.org"), Some(address));
    }

    #[test]
    fn test_wrong_key_cannot_open_registry() {
        let dir = tempdir().unwrap();
        {
            let wallets = Wallets::open(dir.path(), test_cipher()).unwrap();
            wallets.get_or_create_address("a@x.org").unwrap();
        }

        let wrong = Arc::new(StorageCipher::new(&SecureKey::new(vec![9u8; 32])).unwrap());
        let err = Wallets::open(dir.path(), wrong).unwrap_err();
        assert!(matches!(err, LedgerError::CorruptCiphertext(_)));
    }
}
