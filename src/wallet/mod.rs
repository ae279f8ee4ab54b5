//! Key material and participant identities
//!
//! One long-lived ECDSA P-256 key pair per node drives the at-rest storage
//! key; a small participant registry derives checkpoint addresses from
//! emails. The node's private key never leaves the node.

pub mod node_key;
pub mod wallet;

pub use node_key::{NodeKeyPair, PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};
pub use wallet::{validate_address, Wallet, Wallets, ADDRESS_CHECK_SUM_LEN};
