use crate::core::{Block, ProofOfWork, Tracker};
use crate::error::{LedgerError, Result};
use crate::storage::BlockStore;
use log::{info, warn};
use std::sync::RwLock;

/// The authoritative hash-linked ledger of a node.
///
/// The block sequence is exclusively owned here and mutated only under the
/// write lock; `append` and `replace_chain` are linearized by it. Mining
/// runs on an unattached candidate outside any lock - only the final append
/// takes it. Persistence goes through the encrypted [`BlockStore`].
pub struct Chain {
    blocks: RwLock<Vec<Block>>,
    store: BlockStore,
    pow: ProofOfWork,
}

impl Chain {
    /// Load the chain from encrypted storage, creating and persisting the
    /// genesis block when no chain exists yet.
    pub fn open(store: BlockStore, difficulty: usize) -> Result<Chain> {
        let mut blocks = store.load_chain()?;
        if blocks.is_empty() {
            let genesis = Block::genesis()?;
            store.save_block(&genesis)?;
            info!("Created genesis block {}", genesis.get_hash());
            blocks.push(genesis);
        } else {
            info!("Loaded chain with {} blocks", blocks.len());
        }

        Ok(Chain {
            blocks: RwLock::new(blocks),
            store,
            pow: ProofOfWork::new(difficulty),
        })
    }

    pub fn difficulty(&self) -> usize {
        self.pow.difficulty()
    }

    pub fn last_block(&self) -> Block {
        let blocks = self
            .blocks
            .read()
            .expect("Failed to acquire read lock on chain - this should never happen");
        blocks
            .last()
            .expect("Chain always holds at least the genesis block")
            .clone()
    }

    pub fn get_all(&self) -> Vec<Block> {
        self.blocks
            .read()
            .expect("Failed to acquire read lock on chain - this should never happen")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.blocks
            .read()
            .expect("Failed to acquire read lock on chain - this should never happen")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the current tip.
    pub fn height(&self) -> u64 {
        self.last_block().get_index()
    }

    pub fn block_by_index(&self, index: u64) -> Option<Block> {
        let blocks = self
            .blocks
            .read()
            .expect("Failed to acquire read lock on chain - this should never happen");
        blocks.iter().find(|b| b.get_index() == index).cloned()
    }

    /// Whether a candidate correctly extends its predecessor: index
    /// succession, hash linkage, content hash, and the difficulty target.
    pub fn is_valid_block(&self, candidate: &Block, predecessor: &Block) -> bool {
        if predecessor.get_index() + 1 != candidate.get_index() {
            return false;
        }
        if predecessor.get_hash() != candidate.get_prev_hash() {
            return false;
        }
        self.pow.block_is_sealed(candidate)
    }

    /// Whether a full chain is valid: a canonical genesis head and every
    /// adjacent pair passing [`Chain::is_valid_block`].
    pub fn is_valid_chain(&self, blocks: &[Block]) -> bool {
        let Some(genesis) = blocks.first() else {
            return false;
        };
        if !genesis.is_genesis() || !genesis.hash_matches() {
            return false;
        }

        blocks
            .windows(2)
            .all(|pair| self.is_valid_block(&pair[1], &pair[0]))
    }

    /// Validate against the current tip and extend the chain. Rejection
    /// leaves both memory and storage untouched.
    pub fn append(&self, block: &Block) -> Result<()> {
        let mut blocks = self
            .blocks
            .write()
            .expect("Failed to acquire write lock on chain - this should never happen");

        let tip = blocks
            .last()
            .expect("Chain always holds at least the genesis block");
        if !self.is_valid_block(block, tip) {
            return Err(LedgerError::RejectedBlock(format!(
                "Block {} does not extend tip {}",
                block.get_index(),
                tip.get_index()
            )));
        }

        self.store.save_block(block)?;
        blocks.push(block.clone());
        info!(
            "Appended block #{} {} ({} transactions)",
            block.get_index(),
            block.get_hash(),
            block.get_transactions().len()
        );
        Ok(())
    }

    /// Idempotent entry point for peer-pushed blocks: a hash already present
    /// or a stale index is a benign no-op, a valid extension is applied, and
    /// only an invalid fresh candidate is rejected.
    pub fn try_append(&self, block: &Block) -> Result<bool> {
        let mut blocks = self
            .blocks
            .write()
            .expect("Failed to acquire write lock on chain - this should never happen");

        let tip = blocks
            .last()
            .expect("Chain always holds at least the genesis block");
        if block.get_index() <= tip.get_index()
            || blocks.iter().any(|b| b.get_hash() == block.get_hash())
        {
            return Ok(false);
        }

        if !self.is_valid_block(block, tip) {
            return Err(LedgerError::RejectedBlock(format!(
                "Peer block {} failed validation against tip {}",
                block.get_index(),
                tip.get_index()
            )));
        }

        self.store.save_block(block)?;
        blocks.push(block.clone());
        info!(
            "Accepted peer block #{} {}",
            block.get_index(),
            block.get_hash()
        );
        Ok(true)
    }

    /// Longest-valid-chain rule: adopt `candidate` only when it is strictly
    /// longer than the local chain and valid in full. Ties never replace.
    /// On acceptance the persisted block files are replaced wholesale.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> Result<bool> {
        let mut blocks = self
            .blocks
            .write()
            .expect("Failed to acquire write lock on chain - this should never happen");

        if candidate.len() <= blocks.len() {
            return Ok(false);
        }
        if !self.is_valid_chain(&candidate) {
            warn!(
                "Rejected replacement chain of length {}: validation failed",
                candidate.len()
            );
            return Ok(false);
        }

        self.store.replace_all(&candidate)?;
        info!(
            "Replaced local chain ({} blocks) with peer chain ({} blocks)",
            blocks.len(),
            candidate.len()
        );
        *blocks = candidate;
        Ok(true)
    }

    /// Defensive pass removing blocks with a repeated hash, keeping the
    /// first occurrence in index order. Rewrites storage when anything was
    /// dropped.
    pub fn remove_duplicate_blocks(&self) -> Result<usize> {
        let mut blocks = self
            .blocks
            .write()
            .expect("Failed to acquire write lock on chain - this should never happen");

        let mut seen = std::collections::HashSet::new();
        let before = blocks.len();
        blocks.retain(|b| seen.insert(b.get_hash().to_string()));
        let removed = before - blocks.len();

        if removed > 0 {
            warn!("Removed {removed} duplicate blocks");
            self.store.replace_all(&blocks)?;
        }
        Ok(removed)
    }

    /// Whether a tracker id is already finalized in a block. The miner's
    /// backstop against re-mining an id a peer block already carried.
    pub fn contains_tracker(&self, id: &str) -> bool {
        let blocks = self
            .blocks
            .read()
            .expect("Failed to acquire read lock on chain - this should never happen");
        blocks.iter().any(|b| b.contains_tracker(id))
    }

    pub fn find_tracker(&self, id: &str) -> Option<Tracker> {
        let blocks = self
            .blocks
            .read()
            .expect("Failed to acquire read lock on chain - this should never happen");
        blocks
            .iter()
            .flat_map(|b| b.get_transactions())
            .find(|tx| tx.id == id)
            .cloned()
    }

    /// Every finalized tracker snapshot, oldest block first.
    pub fn all_trackers(&self) -> Vec<Tracker> {
        let blocks = self
            .blocks
            .read()
            .expect("Failed to acquire read lock on chain - this should never happen");
        blocks
            .iter()
            .flat_map(|b| b.get_transactions())
            .cloned()
            .collect()
    }

    /// Build a candidate on the current tip, run the proof-of-work search
    /// outside the lock, then append. A tip moved by a concurrent append or
    /// replacement surfaces as `RejectedBlock`; callers retry next tick.
    pub fn mine_new_block(&self, transactions: Vec<Tracker>) -> Result<Block> {
        if transactions.is_empty() {
            return Err(LedgerError::Validation(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let tip = self.last_block();
        let mut candidate = Block::next(&tip, transactions)?;
        self.pow.mine(&mut candidate)?;
        self.append(&candidate)?;
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tracker::test_support::completed_tracker;
    use crate::storage::encrypted::{SecureKey, StorageCipher};
    use std::sync::Arc;
    use tempfile::tempdir;

    const TEST_DIFFICULTY: usize = 2;

    fn open_chain(dir: &std::path::Path) -> Chain {
        let cipher = Arc::new(StorageCipher::new(&SecureKey::new(vec![5u8; 32])).unwrap());
        let store = BlockStore::open(dir, cipher).unwrap();
        Chain::open(store, TEST_DIFFICULTY).unwrap()
    }

    fn mined_block(chain: &Chain, ids: &[&str]) -> Block {
        let trackers = ids.iter().map(|id| completed_tracker(id)).collect();
        let tip = chain.last_block();
        let mut block = Block::next(&tip, trackers).unwrap();
        ProofOfWork::new(TEST_DIFFICULTY).mine(&mut block).unwrap();
        block
    }

    #[test]
    fn test_open_creates_genesis_once() {
        let dir = tempdir().unwrap();
        {
            let chain = open_chain(dir.path());
            assert_eq!(chain.len(), 1);
        }

        // Reopen must load the same genesis, not mint a new one.
        let first_hash = open_chain(dir.path()).last_block().get_hash().to_string();
        let second_hash = open_chain(dir.path()).last_block().get_hash().to_string();
        assert_eq!(first_hash, second_hash);
    }

    #[test]
    fn test_mine_and_append_extends_chain() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());

        let block = chain
            .mine_new_block(vec![completed_tracker("t1")])
            .unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.height(), 1);
        assert_eq!(block.get_prev_hash(), chain.get_all()[0].get_hash());
        assert!(chain.contains_tracker("t1"));
    }

    #[test]
    fn test_chain_links_hold_after_several_blocks() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());
        chain.mine_new_block(vec![completed_tracker("t1")]).unwrap();
        chain.mine_new_block(vec![completed_tracker("t2")]).unwrap();

        let blocks = chain.get_all();
        for pair in blocks.windows(2) {
            assert_eq!(pair[0].get_index() + 1, pair[1].get_index());
            assert_eq!(pair[0].get_hash(), pair[1].get_prev_hash());
            assert!(pair[1].hash_matches());
        }
        assert!(chain.is_valid_chain(&blocks));
    }

    #[test]
    fn test_append_rejects_bad_linkage() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());

        let mut orphan = mined_block(&chain, &["t1"]);
        chain.mine_new_block(vec![completed_tracker("t2")]).unwrap();

        // The tip moved, so the candidate's prev_hash is stale.
        let err = chain.append(&orphan).unwrap_err();
        assert!(matches!(err, LedgerError::RejectedBlock(_)));
        assert_eq!(chain.len(), 2);

        // Same failure for a tampered hash at the right index.
        orphan = mined_block(&chain, &["t3"]);
        orphan.seal(orphan.get_nonce(), "00".repeat(32));
        let err = chain.append(&orphan).unwrap_err();
        assert!(matches!(err, LedgerError::RejectedBlock(_)));
    }

    #[test]
    fn test_try_append_is_idempotent() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());

        let block = mined_block(&chain, &["t1"]);
        assert!(chain.try_append(&block).unwrap());
        assert_eq!(chain.len(), 2);

        // Second delivery of the same block is a benign no-op.
        assert!(!chain.try_append(&block).unwrap());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_try_append_rejects_invalid_fresh_block() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());

        let mut block = mined_block(&chain, &["t1"]);
        block.seal(block.get_nonce(), "ff".repeat(32));
        assert!(chain.try_append(&block).is_err());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_replace_chain_requires_strictly_longer() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let local = open_chain(dir_a.path());
        let remote = open_chain(dir_b.path());

        local.mine_new_block(vec![completed_tracker("a1")]).unwrap();
        remote.mine_new_block(vec![completed_tracker("b1")]).unwrap();

        // Equal length: never replaced, regardless of validity.
        assert!(!local.replace_chain(remote.get_all()).unwrap());

        remote.mine_new_block(vec![completed_tracker("b2")]).unwrap();
        assert!(local.replace_chain(remote.get_all()).unwrap());

        let local_hashes: Vec<String> = local
            .get_all()
            .iter()
            .map(|b| b.get_hash().to_string())
            .collect();
        let remote_hashes: Vec<String> = remote
            .get_all()
            .iter()
            .map(|b| b.get_hash().to_string())
            .collect();
        assert_eq!(local_hashes, remote_hashes);
    }

    #[test]
    fn test_replace_chain_rejects_tampered_candidate() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let local = open_chain(dir_a.path());
        let remote = open_chain(dir_b.path());

        remote.mine_new_block(vec![completed_tracker("b1")]).unwrap();
        remote.mine_new_block(vec![completed_tracker("b2")]).unwrap();

        let mut candidate = remote.get_all();
        let nonce = candidate[1].get_nonce();
        candidate[1].seal(nonce, "00".repeat(32));

        // Longer but invalid: rejected, local state untouched.
        assert!(!local.replace_chain(candidate).unwrap());
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn test_replace_chain_survives_restart() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let remote_blocks = {
            let remote = open_chain(dir_b.path());
            remote.mine_new_block(vec![completed_tracker("b1")]).unwrap();
            remote.mine_new_block(vec![completed_tracker("b2")]).unwrap();
            remote.get_all()
        };

        {
            let local = open_chain(dir_a.path());
            assert!(local.replace_chain(remote_blocks.clone()).unwrap());
        }

        let reloaded = open_chain(dir_a.path());
        assert_eq!(reloaded.len(), 3);
        assert_eq!(
            reloaded.last_block().get_hash(),
            remote_blocks.last().unwrap().get_hash()
        );
    }

    #[test]
    fn test_find_tracker_across_blocks() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());
        chain.mine_new_block(vec![completed_tracker("t1")]).unwrap();
        chain
            .mine_new_block(vec![completed_tracker("t2"), completed_tracker("t3")])
            .unwrap();

        assert!(chain.find_tracker("t3").is_some());
        assert!(chain.find_tracker("missing").is_none());
        assert_eq!(chain.all_trackers().len(), 3);
    }

    #[test]
    fn test_empty_candidate_chain_is_invalid() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());
        assert!(!chain.is_valid_chain(&[]));
    }
}
