use crate::core::Block;
use crate::error::{LedgerError, Result};
use crate::storage::atomic_write;
use crate::storage::encrypted::StorageCipher;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const BLOCKS_DIR: &str = "blocks";
pub const CHAIN_INDEX_FILE: &str = "chain.bin";

/// Encrypted block persistence: one AEAD-sealed file per block named by
/// index, plus a sealed chain-index file recording the current tip as
/// `index:hash`. On restart the index bounds how many block files to read
/// back, in order, before the in-memory chain is trusted.
pub struct BlockStore {
    dir: PathBuf,
    cipher: Arc<StorageCipher>,
}

impl BlockStore {
    pub fn open(dir: &Path, cipher: Arc<StorageCipher>) -> Result<BlockStore> {
        fs::create_dir_all(dir.join(BLOCKS_DIR))
            .map_err(|e| LedgerError::Storage(format!("Failed to create blocks dir: {e}")))?;
        Ok(BlockStore {
            dir: dir.to_path_buf(),
            cipher,
        })
    }

    fn block_path(&self, index: u64) -> PathBuf {
        self.dir.join(BLOCKS_DIR).join(format!("{index}.bin"))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(CHAIN_INDEX_FILE)
    }

    /// Persist a block and advance the chain-index tip record to it.
    pub fn save_block(&self, block: &Block) -> Result<()> {
        let plaintext = serde_json::to_vec(block)?;
        let sealed = self.cipher.encrypt(&plaintext)?;
        atomic_write(&self.block_path(block.get_index()), &sealed)?;
        self.write_tip(block.get_index(), block.get_hash())
    }

    pub fn load_block(&self, index: u64) -> Result<Block> {
        let path = self.block_path(index);
        let sealed = fs::read(&path).map_err(|e| {
            LedgerError::Storage(format!("Failed to read block file {}: {e}", path.display()))
        })?;
        let plaintext = self.cipher.decrypt(&sealed)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn write_tip(&self, index: u64, hash: &str) -> Result<()> {
        let record = format!("{index}:{hash}");
        let sealed = self.cipher.encrypt(record.as_bytes())?;
        atomic_write(&self.index_path(), &sealed)
    }

    /// The persisted tip record, or `None` when no chain has been stored yet.
    pub fn read_tip(&self) -> Result<Option<(u64, String)>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(None);
        }

        let sealed = fs::read(&path)
            .map_err(|e| LedgerError::Storage(format!("Failed to read chain index: {e}")))?;
        let plaintext = self.cipher.decrypt(&sealed)?;
        let record = String::from_utf8(plaintext)
            .map_err(|e| LedgerError::Storage(format!("Invalid chain index encoding: {e}")))?;

        let (index, hash) = record.split_once(':').ok_or_else(|| {
            LedgerError::Storage("Invalid chain index format, expected index:hash".to_string())
        })?;
        let index = index
            .parse::<u64>()
            .map_err(|e| LedgerError::Storage(format!("Invalid chain index value: {e}")))?;

        Ok(Some((index, hash.to_string())))
    }

    /// Read the whole persisted chain back in index order. A missing index
    /// file yields an empty chain; a tip whose recorded hash does not match
    /// the last block read is a storage fault.
    pub fn load_chain(&self) -> Result<Vec<Block>> {
        let Some((tip_index, tip_hash)) = self.read_tip()? else {
            return Ok(vec![]);
        };

        let mut chain = Vec::with_capacity(tip_index as usize + 1);
        for index in 0..=tip_index {
            chain.push(self.load_block(index)?);
        }

        let last = chain.last().ok_or_else(|| {
            LedgerError::Storage("Chain index present but no blocks on disk".to_string())
        })?;
        if last.get_hash() != tip_hash {
            return Err(LedgerError::Storage(format!(
                "Chain index tip {tip_hash} does not match block {tip_index}"
            )));
        }

        Ok(chain)
    }

    /// Replace every persisted block and the tip record with `blocks`.
    pub fn replace_all(&self, blocks: &[Block]) -> Result<()> {
        self.clear()?;
        for block in blocks {
            self.save_block(block)?;
        }
        Ok(())
    }

    /// Remove all persisted block files and the chain index.
    pub fn clear(&self) -> Result<()> {
        let blocks_dir = self.dir.join(BLOCKS_DIR);
        if blocks_dir.exists() {
            for entry in fs::read_dir(&blocks_dir)
                .map_err(|e| LedgerError::Storage(format!("Failed to list blocks dir: {e}")))?
            {
                let entry =
                    entry.map_err(|e| LedgerError::Storage(format!("Failed to list block: {e}")))?;
                if entry.path().extension().is_some_and(|ext| ext == "bin") {
                    fs::remove_file(entry.path()).map_err(|e| {
                        LedgerError::Storage(format!("Failed to remove block file: {e}"))
                    })?;
                }
            }
        }

        let index_path = self.index_path();
        if index_path.exists() {
            fs::remove_file(&index_path)
                .map_err(|e| LedgerError::Storage(format!("Failed to remove chain index: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::encrypted::SecureKey;
    use tempfile::tempdir;

    fn test_store(dir: &Path) -> BlockStore {
        let cipher = Arc::new(StorageCipher::new(&SecureKey::new(vec![3u8; 32])).unwrap());
        BlockStore::open(dir, cipher).unwrap()
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let genesis = Block::genesis().unwrap();
        store.save_block(&genesis).unwrap();

        let loaded = store.load_block(0).unwrap();
        assert_eq!(loaded, genesis);
        assert_eq!(
            store.read_tip().unwrap(),
            Some((0, genesis.get_hash().to_string()))
        );
    }

    #[test]
    fn test_missing_index_is_empty_chain() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        assert!(store.load_chain().unwrap().is_empty());
    }

    #[test]
    fn test_load_chain_in_order() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let genesis = Block::genesis().unwrap();
        let next = {
            let mut block = Block::next(&genesis, vec![]).unwrap();
            let hash = block.compute_hash().unwrap();
            block.seal(0, hash);
            block
        };
        store.save_block(&genesis).unwrap();
        store.save_block(&next).unwrap();

        let chain = store.load_chain().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].get_index(), 0);
        assert_eq!(chain[1].get_index(), 1);
    }

    #[test]
    fn test_block_files_are_not_plaintext() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        let genesis = Block::genesis().unwrap();
        store.save_block(&genesis).unwrap();

        let raw = fs::read(dir.path().join(BLOCKS_DIR).join("0.bin")).unwrap();
        assert!(serde_json::from_slice::<Block>(&raw).is_err());
    }

    #[test]
    fn test_replace_all_discards_old_blocks() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let genesis = Block::genesis().unwrap();
        let next = {
            let mut block = Block::next(&genesis, vec![]).unwrap();
            let hash = block.compute_hash().unwrap();
            block.seal(0, hash);
            block
        };
        store.save_block(&genesis).unwrap();
        store.save_block(&next).unwrap();

        let replacement = Block::genesis().unwrap();
        store.replace_all(std::slice::from_ref(&replacement)).unwrap();

        let chain = store.load_chain().unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].get_hash(), replacement.get_hash());
        assert!(!dir.path().join(BLOCKS_DIR).join("1.bin").exists());
    }

    #[test]
    fn test_wrong_key_is_corrupt() {
        let dir = tempdir().unwrap();
        {
            let store = test_store(dir.path());
            store.save_block(&Block::genesis().unwrap()).unwrap();
        }

        let wrong = Arc::new(StorageCipher::new(&SecureKey::new(vec![4u8; 32])).unwrap());
        let store = BlockStore::open(dir.path(), wrong).unwrap();
        let err = store.load_chain().unwrap_err();
        assert!(matches!(err, LedgerError::CorruptCiphertext(_)));
    }
}
