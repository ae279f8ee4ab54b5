use crate::error::{LedgerError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use zeroize::ZeroizeOnDrop;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Secure key wrapper that automatically zeros memory on drop
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecureKey {
    key: Vec<u8>,
}

impl SecureKey {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureKey")
            .field("length", &self.key.len())
            .finish()
    }
}

/// AES-256-GCM cipher for at-rest ledger files.
///
/// Ciphertexts are self-contained: a random 12-byte nonce followed by the
/// sealed payload. Decryption of anything truncated or tampered fails with
/// `CorruptCiphertext`.
pub struct StorageCipher {
    cipher: Aes256Gcm,
}

impl StorageCipher {
    pub fn new(key: &SecureKey) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(LedgerError::Encryption(
                "AES-256-GCM requires a 32-byte key".to_string(),
            ));
        }

        let aes_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        Ok(Self {
            cipher: Aes256Gcm::new(aes_key),
        })
    }

    /// Seal a plaintext under a fresh random nonce. Output is nonce || ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce_bytes = super::generate_random_bytes(NONCE_LEN)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| LedgerError::Encryption(format!("AES-256-GCM encryption failed: {e}")))?;

        let mut out = nonce_bytes;
        out.extend(sealed);
        Ok(out)
    }

    /// Open a nonce-prefixed ciphertext produced by [`StorageCipher::encrypt`].
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(LedgerError::CorruptCiphertext(
                "Ciphertext shorter than nonce".to_string(),
            ));
        }

        let (nonce_bytes, sealed) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher.decrypt(nonce, sealed).map_err(|_| {
            LedgerError::CorruptCiphertext("AES-256-GCM authentication failed".to_string())
        })
    }

    pub const fn key_length() -> usize {
        KEY_LEN
    }

    pub const fn nonce_length() -> usize {
        NONCE_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher_with(byte: u8) -> StorageCipher {
        StorageCipher::new(&SecureKey::new(vec![byte; 32])).unwrap()
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(StorageCipher::new(&SecureKey::new(vec![0u8; 16])).is_err());
        assert!(StorageCipher::new(&SecureKey::new(vec![0u8; 32])).is_ok());
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher_with(1);
        let plaintext = b"ledger state at rest";

        let sealed = cipher.encrypt(plaintext).unwrap();
        assert!(sealed.len() > plaintext.len());

        let opened = cipher.decrypt(&sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let cipher = cipher_with(1);
        let sealed = cipher.encrypt(b"").unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"");
    }

    #[test]
    fn test_tampered_ciphertext_is_corrupt() {
        let cipher = cipher_with(1);
        let mut sealed = cipher.encrypt(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        let err = cipher.decrypt(&sealed).unwrap_err();
        assert!(matches!(err, LedgerError::CorruptCiphertext(_)));
    }

    #[test]
    fn test_truncated_ciphertext_is_corrupt() {
        let cipher = cipher_with(1);
        let sealed = cipher.encrypt(b"payload").unwrap();

        let err = cipher.decrypt(&sealed[..8]).unwrap_err();
        assert!(matches!(err, LedgerError::CorruptCiphertext(_)));
    }

    #[test]
    fn test_wrong_key_is_corrupt_never_garbage() {
        let sealed = cipher_with(1).encrypt(b"{\"k\":1}").unwrap();
        let err = cipher_with(2).decrypt(&sealed).unwrap_err();
        assert!(matches!(err, LedgerError::CorruptCiphertext(_)));
    }

    #[test]
    fn test_nonces_are_fresh() {
        let cipher = cipher_with(1);
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }
}
