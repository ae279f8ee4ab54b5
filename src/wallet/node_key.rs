use crate::error::{LedgerError, Result};
use crate::storage::encrypted::SecureKey;
use crate::utils::{new_key_pair, sha256_digest};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use std::fs;
use std::path::Path;

pub const PRIVATE_KEY_FILE: &str = "private.key";
pub const PUBLIC_KEY_FILE: &str = "public.key";

const STORAGE_KEY_SALT_LEN: usize = 16;

/// The node's long-lived key pair, persisted as PKCS#8 private-key and raw
/// public-key files under the data directory.
pub struct NodeKeyPair {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl std::fmt::Debug for NodeKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeKeyPair").finish_non_exhaustive()
    }
}

impl NodeKeyPair {
    pub fn generate() -> Result<NodeKeyPair> {
        let pkcs8 = new_key_pair()?;
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(NodeKeyPair { pkcs8, public_key })
    }

    /// Load the key pair from `dir`, or generate and persist a fresh one if
    /// the key files do not exist yet. Idempotent across restarts.
    pub fn load_or_create(dir: &Path) -> Result<NodeKeyPair> {
        let private_path = dir.join(PRIVATE_KEY_FILE);
        if private_path.exists() {
            return Self::load(dir);
        }

        fs::create_dir_all(dir)
            .map_err(|e| LedgerError::KeyLoad(format!("Failed to create key directory: {e}")))?;

        let keys = Self::generate()?;
        fs::write(&private_path, &keys.pkcs8)
            .map_err(|e| LedgerError::KeyLoad(format!("Failed to save private key: {e}")))?;
        restrict_permissions(&private_path)?;
        fs::write(dir.join(PUBLIC_KEY_FILE), &keys.public_key)
            .map_err(|e| LedgerError::KeyLoad(format!("Failed to save public key: {e}")))?;

        log::info!("Generated node key pair in {}", dir.display());
        Ok(keys)
    }

    pub fn load(dir: &Path) -> Result<NodeKeyPair> {
        let pkcs8 = fs::read(dir.join(PRIVATE_KEY_FILE))
            .map_err(|e| LedgerError::KeyLoad(format!("Failed to read private key: {e}")))?;
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(NodeKeyPair { pkcs8, public_key })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Derive the symmetric at-rest storage key from the private key with
    /// Argon2id, salted by a digest of the public key. Local encryption-at-rest
    /// contract only: anyone holding the node's key file can reproduce this.
    pub fn storage_key(&self) -> Result<SecureKey> {
        use argon2::{Algorithm, Argon2, Params, Version};

        let params = Params::new(65536, 3, 1, Some(32))
            .map_err(|e| LedgerError::Encryption(format!("Invalid Argon2 parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let salt = sha256_digest(&self.public_key);
        let mut key = vec![0u8; 32];
        argon2
            .hash_password_into(&self.pkcs8, &salt[..STORAGE_KEY_SALT_LEN], &mut key)
            .map_err(|e| LedgerError::Encryption(format!("Storage key derivation failed: {e}")))?;

        Ok(SecureKey::new(key))
    }
}

fn public_key_from_pkcs8(pkcs8: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| LedgerError::KeyLoad(format!("Failed to parse PKCS#8 private key: {e}")))?;
    Ok(key_pair.public_key().as_ref().to_vec())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| LedgerError::KeyLoad(format!("Failed to restrict key permissions: {e}")))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_or_create_is_idempotent() {
        let dir = tempdir().unwrap();

        let first = NodeKeyPair::load_or_create(dir.path()).unwrap();
        let second = NodeKeyPair::load_or_create(dir.path()).unwrap();

        assert_eq!(first.public_key(), second.public_key());
        assert!(dir.path().join(PRIVATE_KEY_FILE).exists());
        assert!(dir.path().join(PUBLIC_KEY_FILE).exists());
    }

    #[test]
    fn test_storage_key_is_stable_per_key_pair() {
        let dir = tempdir().unwrap();
        let keys = NodeKeyPair::load_or_create(dir.path()).unwrap();

        let a = keys.storage_key().unwrap();
        let b = keys.storage_key().unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.len(), 32);

        let other = NodeKeyPair::generate().unwrap();
        assert_ne!(a.as_bytes(), other.storage_key().unwrap().as_bytes());
    }

    #[test]
    fn test_garbage_private_key_fails_to_load() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(PRIVATE_KEY_FILE), b"not a key").unwrap();

        let err = NodeKeyPair::load(dir.path()).unwrap_err();
        assert!(matches!(err, LedgerError::KeyLoad(_)));
    }
}
