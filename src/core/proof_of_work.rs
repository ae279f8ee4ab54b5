use crate::core::Block;
use crate::error::Result;
use log::debug;

/// Default number of leading zero hex characters required of a sealed hash.
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Proof-of-work search against a leading-zero hex prefix target.
///
/// Mining is CPU-bound and unbounded in the worst case; it operates on an
/// unattached candidate block and must never run under the chain lock or on
/// a request-handling path.
pub struct ProofOfWork {
    difficulty: usize,
    prefix: String,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> ProofOfWork {
        ProofOfWork {
            difficulty,
            prefix: "0".repeat(difficulty),
        }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Increment the nonce until the hash carries the difficulty prefix,
    /// then seal the block.
    pub fn mine(&self, block: &mut Block) -> Result<()> {
        let mut nonce: u64 = 0;
        loop {
            let hash = block.hash_with_nonce(nonce)?;
            if hash.starts_with(&self.prefix) {
                debug!(
                    "Sealed block {} after {} attempts: {hash}",
                    block.get_index(),
                    nonce + 1
                );
                block.seal(nonce, hash);
                return Ok(());
            }
            nonce += 1;
        }
    }

    /// Whether a block's recorded hash matches its content and satisfies
    /// the difficulty target. Genesis is exempt from the target.
    pub fn block_is_sealed(&self, block: &Block) -> bool {
        block.hash_matches() && block.get_hash().starts_with(&self.prefix)
    }
}
