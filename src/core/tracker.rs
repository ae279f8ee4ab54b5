use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Workflow state of a tracker, derived from its checkpoints.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum TrackerStatus {
    Pending,
    Progress,
    Complete,
}

impl TrackerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerStatus::Pending => "pending",
            TrackerStatus::Progress => "progress",
            TrackerStatus::Complete => "complete",
        }
    }
}

/// One participant's step within a tracker. Completed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Checkpoint {
    pub email: String,
    /// internal / external
    #[serde(rename = "type")]
    pub kind: String,
    /// Only populated for external checkpoints
    #[serde(default)]
    pub company: String,
    /// signer / courier
    pub role: String,
    /// If true, the note is encrypted and can later be decrypted
    #[serde(rename = "is_view")]
    pub is_viewable: bool,
    /// Plaintext note, scrubbed to empty once encrypted
    #[serde(default)]
    pub note: String,
    /// Hex AEAD ciphertext, populated only if the checkpoint is viewable
    #[serde(default)]
    pub encrypted_note: String,
    /// Derived participant address
    pub address: String,
    #[serde(default)]
    pub evidence_hash: String,
    #[serde(default)]
    pub evidence_path: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: i64,
}

/// A multi-checkpoint document workflow instance - the transaction type
/// stored in blocks and in the pending pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Tracker {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub privacy: String,
    pub creator: String,
    pub creator_address: String,
    pub created_at: i64,
    pub checkpoints: Vec<Checkpoint>,
    pub status: TrackerStatus,
}

impl Tracker {
    /// Recompute the derived status: complete iff every checkpoint is
    /// completed, otherwise progress.
    pub fn derive_status(&mut self) {
        if !self.checkpoints.is_empty() && self.checkpoints.iter().all(|cp| cp.is_completed) {
            self.status = TrackerStatus::Complete;
        } else {
            self.status = TrackerStatus::Progress;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == TrackerStatus::Complete
    }

    pub fn checkpoint_by_address(&self, address: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|cp| cp.address == address)
    }

    pub fn has_checkpoint_for_address(&self, address: &str) -> bool {
        self.checkpoint_by_address(address).is_some()
    }

    /// Resolve a participant email to its checkpoint address.
    pub fn checkpoint_address_for_email(&self, email: &str) -> Option<String> {
        self.checkpoints
            .iter()
            .find(|cp| cp.email == email)
            .map(|cp| cp.address.clone())
    }

    /// Mark the checkpoint at `address` completed. Single-use: a checkpoint
    /// already completed (or a tracker already complete) rejects the call
    /// and leaves every field untouched.
    pub fn complete_checkpoint(
        &mut self,
        address: &str,
        encrypted_note: Option<String>,
        evidence_hash: &str,
        evidence_path: &str,
        completed_at: i64,
    ) -> Result<()> {
        if self.is_complete() {
            return Err(LedgerError::Validation(format!(
                "Tracker {} is already complete",
                self.id
            )));
        }

        let id = self.id.clone();
        let checkpoint = self
            .checkpoints
            .iter_mut()
            .find(|cp| cp.address == address)
            .ok_or_else(|| {
                LedgerError::NotFound(format!("Checkpoint {address} not found in tracker {id}"))
            })?;

        if checkpoint.is_completed {
            return Err(LedgerError::Validation(format!(
                "Checkpoint {address} for tracker {id} is already completed"
            )));
        }

        checkpoint.is_completed = true;
        checkpoint.completed_at = completed_at;
        checkpoint.evidence_hash = evidence_hash.to_string();
        checkpoint.evidence_path = evidence_path.to_string();
        checkpoint.note.clear();
        if let Some(ciphertext) = encrypted_note {
            checkpoint.encrypted_note = ciphertext;
        }

        self.derive_status();
        Ok(())
    }
}

/// Creation-time input for a tracker, before ids and addresses are assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerDraft {
    #[serde(rename = "type")]
    pub kind: String,
    pub privacy: String,
    pub creator: String,
    pub checkpoints: Vec<CheckpointDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDraft {
    pub email: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub company: String,
    pub role: String,
    #[serde(rename = "is_view", default)]
    pub is_viewable: bool,
    #[serde(default)]
    pub note: String,
}


#[cfg(test)]
mod tests {
    use super::test_support::{completed_tracker, pending_tracker};
    use super::*;

    #[test]
    fn test_status_derivation() {
        let mut tracker = pending_tracker("t1", &["a@x.org", "b@x.org"]);
        tracker.derive_status();
        assert_eq!(tracker.status, TrackerStatus::Progress);

        tracker
            .complete_checkpoint("addr-a@x.org", None, "h1", "p1", 100)
            .unwrap();
        assert_eq!(tracker.status, TrackerStatus::Progress);

        tracker
            .complete_checkpoint("addr-b@x.org", None, "h2", "p2", 200)
            .unwrap();
        assert_eq!(tracker.status, TrackerStatus::Complete);
    }

    #[test]
    fn test_checkpoint_completion_is_single_use() {
        let mut tracker = pending_tracker("t1", &["a@x.org", "b@x.org"]);
        tracker
            .complete_checkpoint("addr-a@x.org", None, "h1", "p1", 100)
            .unwrap();

        let err = tracker
            .complete_checkpoint("addr-a@x.org", None, "h-other", "p-other", 999)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        // The first completion's evidence must survive untouched.
        let checkpoint = tracker.checkpoint_by_address("addr-a@x.org").unwrap();
        assert_eq!(checkpoint.evidence_hash, "h1");
        assert_eq!(checkpoint.evidence_path, "p1");
        assert_eq!(checkpoint.completed_at, 100);
    }

    #[test]
    fn test_complete_tracker_rejects_further_mutation() {
        let mut tracker = completed_tracker("t1");
        assert!(tracker.is_complete());

        let err = tracker
            .complete_checkpoint("addr-signer@example.org", None, "h", "p", 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_unknown_checkpoint_address() {
        let mut tracker = pending_tracker("t1", &["a@x.org"]);
        let err = tracker
            .complete_checkpoint("addr-missing", None, "h", "p", 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_email_to_address_resolution() {
        let tracker = pending_tracker("t1", &["a@x.org"]);
        assert_eq!(
            tracker.checkpoint_address_for_email("a@x.org").as_deref(),
            Some("addr-a@x.org")
        );
        assert!(tracker.checkpoint_address_for_email("nobody@x.org").is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let tracker = pending_tracker("t1", &["a@x.org"]);
        let json = serde_json::to_value(&tracker).unwrap();
        assert_eq!(json["type"], "document");
        assert_eq!(json["status"], "progress");
        assert_eq!(json["checkpoints"][0]["is_view"], false);
        assert_eq!(json["checkpoints"][0]["type"], "internal");
    }
}
