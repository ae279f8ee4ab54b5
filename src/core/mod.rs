//! Core ledger functionality
//!
//! The tracker transaction model, block construction and hashing, the
//! proof-of-work seal, and the chain engine with its append/replace rules.

pub mod block;
pub mod chain;
pub mod proof_of_work;
pub mod tracker;

pub use block::{Block, GENESIS_PREV_HASH};
pub use chain::Chain;
pub use proof_of_work::{ProofOfWork, DEFAULT_DIFFICULTY};
pub use tracker::{Checkpoint, CheckpointDraft, Tracker, TrackerDraft, TrackerStatus};
