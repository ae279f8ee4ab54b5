use crate::config::Settings;
use crate::core::{Block, Chain, Tracker, TrackerDraft, TrackerStatus};
use crate::error::{LedgerError, Result};
use crate::p2p::{self, PeerRegistry};
use crate::storage::{BlockStore, Mempool, StorageCipher};
use crate::utils::current_timestamp;
use crate::wallet::{NodeKeyPair, Wallets};
use log::{info, warn};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Completion event for one checkpoint. The evidence hash/path come from
/// the external evidence layer; the note is encrypted here if the
/// checkpoint allows viewing.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointCompletion {
    pub tracker_id: String,
    pub email: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub evidence_hash: String,
    #[serde(default)]
    pub evidence_path: String,
}

/// A ledger node: the owned core components plus the peer registry.
pub struct Node {
    chain: Chain,
    mempool: Mempool,
    wallets: Wallets,
    cipher: Arc<StorageCipher>,
    peers: PeerRegistry,
}

impl Node {
    /// Boot the node from its data directory: load or create the key pair,
    /// derive the storage key, read the encrypted chain and pool back, and
    /// run the defensive dedup passes.
    pub fn bootstrap(settings: &Settings) -> Result<Arc<Node>> {
        let data_dir = PathBuf::from(&settings.data_dir);

        let keys = NodeKeyPair::load_or_create(&data_dir)?;
        let cipher = Arc::new(StorageCipher::new(&keys.storage_key()?)?);

        let store = BlockStore::open(&data_dir, Arc::clone(&cipher))?;
        let chain = Chain::open(store, settings.difficulty)?;
        let mempool = Mempool::open(&data_dir, Arc::clone(&cipher))?;
        let wallets = Wallets::open(&data_dir, Arc::clone(&cipher))?;

        chain.remove_duplicate_blocks()?;
        mempool.remove_duplicates()?;

        info!(
            "Node ready: chain height {}, {} pending trackers",
            chain.height(),
            mempool.len()
        );

        Ok(Arc::new(Node {
            chain,
            mempool,
            wallets,
            cipher,
            peers: PeerRegistry::from_settings(settings),
        }))
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    /// Create a tracker: assign its id and timestamps, derive creator and
    /// checkpoint addresses, encrypt viewable notes, admit it to the pool,
    /// and broadcast it to the known peers.
    pub fn create_tracker(&self, draft: TrackerDraft) -> Result<Tracker> {
        if draft.creator.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Tracker creator must not be empty".to_string(),
            ));
        }
        if draft.checkpoints.is_empty() {
            return Err(LedgerError::Validation(
                "Tracker must declare at least one checkpoint".to_string(),
            ));
        }

        let creator_address = self.wallets.get_or_create_address(&draft.creator)?;

        let mut checkpoints = Vec::with_capacity(draft.checkpoints.len());
        for cp in draft.checkpoints {
            let address = self.wallets.get_or_create_address(&cp.email)?;
            let encrypted_note = if cp.is_viewable && !cp.note.is_empty() {
                self.encrypt_note(&cp.note)?
            } else {
                String::new()
            };

            checkpoints.push(crate::core::Checkpoint {
                email: cp.email,
                kind: cp.kind,
                company: cp.company,
                role: cp.role,
                is_viewable: cp.is_viewable,
                // The plaintext never leaves the creating call.
                note: String::new(),
                encrypted_note,
                address,
                evidence_hash: String::new(),
                evidence_path: String::new(),
                is_completed: false,
                completed_at: 0,
            });
        }

        let tracker = Tracker {
            id: uuid::Uuid::new_v4().to_string(),
            kind: draft.kind,
            privacy: draft.privacy,
            creator: draft.creator,
            creator_address,
            created_at: current_timestamp()?,
            checkpoints,
            status: TrackerStatus::Progress,
        };

        self.mempool.add(tracker.clone())?;
        p2p::broadcast_transaction(&self.peers.known(), &tracker);
        Ok(tracker)
    }

    /// Complete one checkpoint, identified by participant email. Single-use:
    /// the mutation runs under the pool lock, so two racing completions of
    /// the same checkpoint cannot both succeed.
    pub fn complete_checkpoint(&self, input: CheckpointCompletion) -> Result<Tracker> {
        let tracker = self.mempool.get(&input.tracker_id).ok_or_else(|| {
            LedgerError::NotFound(format!("Tracker {} not found in pool", input.tracker_id))
        })?;

        let address = tracker
            .checkpoint_address_for_email(&input.email)
            .ok_or_else(|| {
                LedgerError::NotFound(format!(
                    "No checkpoint for {} in tracker {}",
                    input.email, input.tracker_id
                ))
            })?;

        let viewable = tracker
            .checkpoint_by_address(&address)
            .is_some_and(|cp| cp.is_viewable);
        let encrypted_note = if viewable && !input.note.is_empty() {
            Some(self.encrypt_note(&input.note)?)
        } else {
            None
        };

        let completed_at = current_timestamp()?;
        let updated = self.mempool.modify(&input.tracker_id, |tx| {
            tx.complete_checkpoint(
                &address,
                encrypted_note,
                &input.evidence_hash,
                &input.evidence_path,
                completed_at,
            )
        })?;

        // A fully completed tracker is ready for mining; let peers know.
        if updated.is_complete() {
            p2p::broadcast_transaction(&self.peers.known(), &updated);
        }
        Ok(updated)
    }

    /// Decrypt the note of a viewable checkpoint, wherever the tracker
    /// currently lives (pool or chain).
    pub fn decrypt_note(&self, tracker_id: &str, address: &str) -> Result<String> {
        let tracker = self.tracker_by_id(tracker_id)?;
        let checkpoint = tracker.checkpoint_by_address(address).ok_or_else(|| {
            LedgerError::NotFound(format!("Checkpoint {address} not found in tracker {tracker_id}"))
        })?;

        if !checkpoint.is_viewable || checkpoint.encrypted_note.is_empty() {
            return Err(LedgerError::Validation(format!(
                "Checkpoint {address} has no viewable note"
            )));
        }

        let sealed = hex::decode(&checkpoint.encrypted_note)
            .map_err(|e| LedgerError::Validation(format!("Invalid note encoding: {e}")))?;
        let plaintext = self.cipher.decrypt(&sealed)?;
        String::from_utf8(plaintext)
            .map_err(|e| LedgerError::CorruptCiphertext(format!("Note is not UTF-8: {e}")))
    }

    /// Every known tracker: live pool entries first, then finalized chain
    /// snapshots for ids no longer pooled.
    pub fn trackers(&self) -> Vec<Tracker> {
        let mut seen = std::collections::HashSet::new();
        let mut all = Vec::new();
        for tx in self.mempool.get_all() {
            seen.insert(tx.id.clone());
            all.push(tx);
        }
        for tx in self.chain.all_trackers() {
            if seen.insert(tx.id.clone()) {
                all.push(tx);
            }
        }
        all
    }

    pub fn tracker_by_id(&self, id: &str) -> Result<Tracker> {
        self.mempool
            .get(id)
            .or_else(|| self.chain.find_tracker(id))
            .ok_or_else(|| LedgerError::NotFound(format!("Tracker {id} not found")))
    }

    /// Status counts for the trackers an email created or participates in.
    pub fn tracker_summary(&self, email: &str) -> std::collections::HashMap<String, usize> {
        let mut summary = std::collections::HashMap::new();
        for tracker in self.trackers() {
            let involved = tracker.creator == email
                || tracker.checkpoints.iter().any(|cp| cp.email == email);
            if involved {
                *summary.entry(tracker.status.as_str().to_string()).or_insert(0) += 1;
            }
        }
        summary
    }

    /// One miner tick: drain completed trackers, drop ids the chain already
    /// finalized, mine and append a block, prune the pool, broadcast.
    /// Returns `None` when there was nothing to mine.
    pub fn mine_once(&self) -> Result<Option<Block>> {
        let completed = self.mempool.completed();
        if completed.is_empty() {
            return Ok(None);
        }

        let (fresh, stale): (Vec<Tracker>, Vec<Tracker>) = completed
            .into_iter()
            .partition(|tx| !self.chain.contains_tracker(&tx.id));

        if !stale.is_empty() {
            let ids: Vec<String> = stale.into_iter().map(|tx| tx.id).collect();
            warn!("Dropping {} already-finalized trackers from pool", ids.len());
            self.mempool.remove_many(&ids)?;
        }
        if fresh.is_empty() {
            return Ok(None);
        }

        let ids: Vec<String> = fresh.iter().map(|tx| tx.id.clone()).collect();
        let block = self.chain.mine_new_block(fresh)?;
        self.mempool.remove_many(&ids)?;

        info!(
            "Mined block #{} | Hash: {} | Tx: {}",
            block.get_index(),
            block.get_hash(),
            block.get_transactions().len()
        );
        p2p::broadcast_block(&self.peers.known(), &block);
        Ok(Some(block))
    }

    /// Handle a block pushed by a peer: idempotent append, then prune the
    /// pool of the transactions it finalized.
    pub fn receive_block(&self, block: &Block) -> Result<bool> {
        let applied = self.chain.try_append(block)?;
        if applied {
            self.prune_finalized(block.get_transactions());
        }
        Ok(applied)
    }

    /// One sync tick over every known/discovered peer. Returns the number
    /// of peers successfully reconciled; an unreachable peer aborts only
    /// its own iteration.
    pub fn sync_once(&self) -> usize {
        let peers = self.peers.discover();
        let mut synced = 0;

        for peer in peers {
            if let Err(e) = self.chain.remove_duplicate_blocks() {
                warn!("Duplicate-block cleanup failed: {e}");
            }
            if let Err(e) = self.mempool.remove_duplicates() {
                warn!("Pool cleanup failed: {e}");
            }

            let Some(latest) = p2p::fetch_latest_block(&peer) else {
                continue;
            };
            self.reconcile_tip(&peer, &latest);

            for tx in p2p::fetch_pool(&peer) {
                if let Err(e) = self.mempool.add_if_not_exists(tx) {
                    warn!("Failed to merge pool entry from {peer}: {e}");
                }
            }
            synced += 1;
        }
        synced
    }

    /// Reconcile the local chain against a peer's tip: try the cheap append
    /// first, then fall back to a full-chain pull and the
    /// longest-valid-chain rule when the peer is strictly ahead.
    fn reconcile_tip(&self, peer: &str, latest: &Block) {
        let tip = self.chain.last_block();
        if latest.get_hash() == tip.get_hash() {
            return;
        }

        match self.chain.try_append(latest) {
            Ok(true) => {
                self.prune_finalized(latest.get_transactions());
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("Peer {peer} pushed an invalid tip: {e}"),
        }

        if latest.get_index() <= tip.get_index() {
            return;
        }

        let candidate = p2p::fetch_chain(peer);
        if candidate.is_empty() {
            return;
        }
        match self.chain.replace_chain(candidate) {
            Ok(true) => {
                let finalized = self.chain.all_trackers();
                self.prune_finalized(&finalized);
            }
            Ok(false) => {}
            Err(e) => warn!("Chain replacement from {peer} failed: {e}"),
        }
    }

    fn prune_finalized(&self, finalized: &[Tracker]) {
        let ids: Vec<String> = finalized.iter().map(|tx| tx.id.clone()).collect();
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.mempool.remove_many(&ids) {
            warn!("Failed to prune finalized trackers from pool: {e}");
        }
    }

    fn encrypt_note(&self, note: &str) -> Result<String> {
        Ok(hex::encode(self.cipher.encrypt(note.as_bytes())?))
    }
}
