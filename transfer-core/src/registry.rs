//! Transfer registry with per-id atomic check-and-set
//!
//! The registry is the single source of truth for every transfer a plugin
//! instance has seen. All writes for one id serialize through the dashmap
//! entry lock (single writer per id); writes for distinct ids proceed
//! independently. Records are never compacted: retained transfers remain
//! queryable for the life of the process.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::types::TransferRecord;
use crate::{Error, Result};

/// Outcome of inserting a transfer record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No prior entry; record stored as-is
    Created,
    /// Prior entry exists and is field-equal to the incoming submission;
    /// nothing mutated
    Duplicate,
    /// Prior entry exists and differs; caller must surface `DuplicateId`
    Conflict,
}

/// Keyed store of all transfers known to a plugin instance
#[derive(Debug, Default)]
pub struct TransferRegistry {
    transfers: DashMap<Uuid, TransferRecord>,
}

impl TransferRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            transfers: DashMap::new(),
        }
    }

    /// Insert a record, enforcing one-writer-per-id idempotency
    ///
    /// A `Duplicate` outcome never mutates the stored record, which is what
    /// yields the "send twice, no error, no duplicate side effect"
    /// guarantee. Idempotency applies at the acceptance boundary only: a
    /// duplicate of a terminal transfer is still `Duplicate` and does not
    /// resurrect it.
    pub fn put(&self, record: TransferRecord) -> PutOutcome {
        match self.transfers.entry(record.transfer.id) {
            Entry::Occupied(existing) => {
                if existing.get().transfer.same_submission(&record.transfer) {
                    debug!(id = %record.transfer.id, "idempotent resubmission, no mutation");
                    PutOutcome::Duplicate
                } else {
                    PutOutcome::Conflict
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                PutOutcome::Created
            }
        }
    }

    /// Snapshot a record by id
    pub fn get(&self, id: Uuid) -> Option<TransferRecord> {
        self.transfers.get(&id).map(|entry| entry.value().clone())
    }

    /// Run a state transition under the per-id entry lock
    ///
    /// The closure observes and mutates the live record; no other writer
    /// for this id can interleave. Event emission must happen only after
    /// this returns, so observers always see state that already reflects
    /// the notification.
    pub fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut TransferRecord) -> Result<T>,
    ) -> Result<T> {
        let mut entry = self
            .transfers
            .get_mut(&id)
            .ok_or(Error::TransferNotFound(id))?;
        f(entry.value_mut())
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    /// True when no transfer has been accepted yet
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Account, Direction, Transfer, TransferState};

    fn record(id: Uuid, amount: &str) -> TransferRecord {
        TransferRecord::new(
            Transfer {
                id,
                ledger: "example.ledger.".to_string(),
                from_account: Account::new("example.ledger.alice"),
                to_account: Account::new("example.ledger.bob"),
                amount: amount.to_string(),
                data: None,
                note_to_self: None,
                execution_condition: None,
                expires_at: None,
            },
            Direction::Outgoing,
            TransferState::Completed,
        )
    }

    #[test]
    fn test_put_created_then_duplicate() {
        let registry = TransferRegistry::new();
        let id = Uuid::new_v4();

        assert_eq!(registry.put(record(id, "1.0")), PutOutcome::Created);
        assert_eq!(registry.put(record(id, "1.0")), PutOutcome::Duplicate);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_put_conflict_never_mutates() {
        let registry = TransferRegistry::new();
        let id = Uuid::new_v4();

        registry.put(record(id, "1.0"));
        assert_eq!(registry.put(record(id, "2.0")), PutOutcome::Conflict);

        let stored = registry.get(id).unwrap();
        assert_eq!(stored.transfer.amount, "1.0");
    }

    #[test]
    fn test_duplicate_of_terminal_record_does_not_resurrect() {
        let registry = TransferRegistry::new();
        let id = Uuid::new_v4();

        registry.put(record(id, "1.0"));
        registry
            .update(id, |rec| {
                rec.set_state(TransferState::Cancelled);
                Ok(())
            })
            .unwrap();

        assert_eq!(registry.put(record(id, "1.0")), PutOutcome::Duplicate);
        assert_eq!(
            registry.get(id).unwrap().state,
            TransferState::Cancelled
        );
    }

    #[test]
    fn test_update_unknown_id() {
        let registry = TransferRegistry::new();
        let id = Uuid::new_v4();

        let result = registry.update(id, |_| Ok(()));
        assert!(matches!(result, Err(Error::TransferNotFound(missing)) if missing == id));
    }

    #[test]
    fn test_update_serializes_transition() {
        let registry = TransferRegistry::new();
        let id = Uuid::new_v4();
        let mut rec = record(id, "1.0");
        rec.state = TransferState::Prepared;
        registry.put(rec);

        let transitioned = registry
            .update(id, |rec| {
                if rec.state != TransferState::Prepared {
                    return Err(Error::NotAccepted("not prepared".to_string()));
                }
                rec.set_state(TransferState::Rejected);
                Ok(true)
            })
            .unwrap();
        assert!(transitioned);

        // Second attempt observes the terminal state
        let second = registry.update(id, |rec| {
            if rec.state != TransferState::Prepared {
                return Err(Error::NotAccepted("not prepared".to_string()));
            }
            Ok(true)
        });
        assert!(matches!(second, Err(Error::NotAccepted(_))));
    }
}
