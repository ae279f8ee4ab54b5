use crate::core::Tracker;
use crate::error::Result;
use crate::utils::{current_timestamp, sha256_hex};
use serde::{Deserialize, Serialize};

/// `prev_hash` of the canonical genesis block.
pub const GENESIS_PREV_HASH: &str = "0";

/// A sealed batch of tracker transactions. Immutable once mined; only the
/// proof-of-work search mutates a candidate, and only through [`Block::seal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    index: u64,
    timestamp: i64,
    prev_hash: String,
    hash: String,
    nonce: u64,
    transactions: Vec<Tracker>,
    /// Records that the at-rest encryption contract was honored when the
    /// block was persisted.
    encrypted: bool,
}

/// Canonical hash payload. Field order is fixed; the JSON rendering of this
/// struct is the cross-process hashing contract, so nothing here may ever be
/// a map or otherwise serialize nondeterministically.
#[derive(Serialize)]
struct HashPayload<'a> {
    index: u64,
    timestamp: i64,
    prev_hash: &'a str,
    transactions: &'a [Tracker],
    nonce: u64,
}

impl Block {
    /// The canonical genesis block: index 0, `prev_hash` "0", no
    /// transactions, nonce 0. Not proof-of-work sealed.
    pub fn genesis() -> Result<Block> {
        let mut block = Block {
            index: 0,
            timestamp: current_timestamp()?,
            prev_hash: GENESIS_PREV_HASH.to_string(),
            hash: String::new(),
            nonce: 0,
            transactions: vec![],
            encrypted: true,
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    /// An unsealed candidate extending `prev`. The hash stays empty until
    /// the miner seals it.
    pub fn next(prev: &Block, transactions: Vec<Tracker>) -> Result<Block> {
        Ok(Block {
            index: prev.index + 1,
            timestamp: current_timestamp()?,
            prev_hash: prev.hash.clone(),
            hash: String::new(),
            nonce: 0,
            transactions,
            encrypted: true,
        })
    }

    /// SHA-256 over the canonical JSON encoding of
    /// (index, timestamp, prev_hash, transactions, nonce).
    pub fn compute_hash(&self) -> Result<String> {
        self.hash_with_nonce(self.nonce)
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> Result<String> {
        let payload = serde_json::to_vec(&HashPayload {
            index: self.index,
            timestamp: self.timestamp,
            prev_hash: &self.prev_hash,
            transactions: &self.transactions,
            nonce,
        })?;
        Ok(sha256_hex(&payload))
    }

    /// Fix the winning nonce and its hash. Called once by the miner.
    pub fn seal(&mut self, nonce: u64, hash: String) {
        self.nonce = nonce;
        self.hash = hash;
    }

    /// Whether the recorded hash matches the block's content.
    pub fn hash_matches(&self) -> bool {
        self.compute_hash().map(|h| h == self.hash).unwrap_or(false)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.prev_hash == GENESIS_PREV_HASH
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_prev_hash(&self) -> &str {
        &self.prev_hash
    }

    pub fn get_hash(&self) -> &str {
        &self.hash
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_transactions(&self) -> &[Tracker] {
        &self.transactions
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn contains_tracker(&self, id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id == id)
    }

}
