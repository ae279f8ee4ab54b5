//! Utility functions and helpers
//!
//! Cryptographic digests, encoding helpers, timestamps, and the
//! binary serialization layer used by the RPC transport and key files.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, new_key_pair, ripemd160_digest, sha256_digest,
    sha256_hex,
};

pub use serialization::{deserialize, serialize};
