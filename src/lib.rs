//! # tracker-chain
//!
//! A permissioned, single-organization ledger node that records document
//! tracker workflow events as transactions, batches them into hash-linked
//! proof-of-work blocks, and converges with a small set of known and
//! discovered peers.
//!
//! ## Layout
//! - `core/`: the tracker transaction model, blocks, proof-of-work, and
//!   the chain engine with its append/replace rules
//! - `storage/`: AES-256-GCM at-rest encryption, per-block files, the
//!   chain-index tip record, and the pending pool
//! - `wallet/`: the node key pair (storage-key derivation) and participant
//!   address derivation
//! - `p2p/`: peer discovery plus the two interchangeable transports
//!   (HTTP JSON and binary RPC)
//! - `node/`: the wired-up node with its collaborator-facing operations
//!   and the periodic miner/sync workers
//! - `config/`, `cli/`, `error/`, `utils/`: the ambient layers

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod node;
pub mod p2p;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, Settings, GLOBAL_CONFIG};
pub use core::{
    Block, Chain, Checkpoint, CheckpointDraft, ProofOfWork, Tracker, TrackerDraft, TrackerStatus,
    DEFAULT_DIFFICULTY, GENESIS_PREV_HASH,
};
pub use error::{LedgerError, Result};
pub use node::{start_miner_worker, start_sync_worker, CheckpointCompletion, Node};
pub use p2p::PeerRegistry;
pub use storage::{BlockStore, Mempool, SecureKey, StorageCipher};
pub use utils::{current_timestamp, sha256_digest, sha256_hex};
pub use wallet::{validate_address, NodeKeyPair, Wallet, Wallets};
