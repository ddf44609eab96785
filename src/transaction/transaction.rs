use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Rid, TableOid, TxnId};
use crate::transaction::lock::LockMode;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase locking transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Typed reasons a transaction gets aborted by the lock service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockOnShrinking,
    LockSharedOnReadUncommitted,
    UpgradeConflict,
    IncompatibleUpgrade,
    TableLockNotPresent,
    TableUnlockedBeforeUnlockingRows,
    AttemptedUnlockButNoLockHeld,
    AttemptedIntentionLockOnRow,
    Deadlock,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AbortReason::LockOnShrinking => "lock requested while shrinking",
            AbortReason::LockSharedOnReadUncommitted => {
                "shared lock requested under read-uncommitted"
            }
            AbortReason::UpgradeConflict => "another transaction is already upgrading",
            AbortReason::IncompatibleUpgrade => "upgrade not allowed by the lattice",
            AbortReason::TableLockNotPresent => "row lock without a matching table lock",
            AbortReason::TableUnlockedBeforeUnlockingRows => {
                "table unlocked before its row locks"
            }
            AbortReason::AttemptedUnlockButNoLockHeld => "unlock without a held lock",
            AbortReason::AttemptedIntentionLockOnRow => "intention lock requested on a row",
            AbortReason::Deadlock => "chosen as deadlock victim",
        };
        write!(f, "{}", text)
    }
}

/// Structured abort: the transaction id plus the typed reason.
/// By the time a caller sees this the transaction state is ABORTED.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("transaction {txn_id} aborted: {reason}")]
pub struct TransactionAbort {
    pub txn_id: TxnId,
    pub reason: AbortReason,
}

impl TransactionAbort {
    pub fn new(txn_id: TxnId, reason: AbortReason) -> Self {
        Self { txn_id, reason }
    }
}

/// An active transaction.
///
/// Lock bookkeeping and the state live behind mutexes because the deadlock
/// detector aborts transactions from its own thread.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: Mutex<TransactionState>,
    /// Held table locks; at most one mode per table
    table_locks: Mutex<HashMap<TableOid, LockMode>>,
    /// Held row locks, grouped by table
    row_locks: Mutex<HashMap<TableOid, HashMap<Rid, LockMode>>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: Mutex::new(TransactionState::Growing),
            table_locks: Mutex::new(HashMap::new()),
            row_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    pub fn record_table_lock(&self, oid: TableOid, mode: LockMode) {
        self.table_locks.lock().insert(oid, mode);
    }

    pub fn erase_table_lock(&self, oid: TableOid) {
        self.table_locks.lock().remove(&oid);
    }

    pub fn table_lock_mode(&self, oid: TableOid) -> Option<LockMode> {
        self.table_locks.lock().get(&oid).copied()
    }

    /// Does this transaction hold a table lock that licenses row writes
    /// (X, IX or SIX)?
    pub fn has_write_intent_on(&self, oid: TableOid) -> bool {
        matches!(
            self.table_lock_mode(oid),
            Some(LockMode::Exclusive)
                | Some(LockMode::IntentionExclusive)
                | Some(LockMode::SharedIntentionExclusive)
        )
    }

    pub fn record_row_lock(&self, oid: TableOid, rid: Rid, mode: LockMode) {
        self.row_locks
            .lock()
            .entry(oid)
            .or_default()
            .insert(rid, mode);
    }

    pub fn erase_row_lock(&self, oid: TableOid, rid: Rid) {
        let mut rows = self.row_locks.lock();
        if let Some(table_rows) = rows.get_mut(&oid) {
            table_rows.remove(&rid);
            if table_rows.is_empty() {
                rows.remove(&oid);
            }
        }
    }

    pub fn row_lock_mode(&self, oid: TableOid, rid: Rid) -> Option<LockMode> {
        self.row_locks
            .lock()
            .get(&oid)
            .and_then(|rows| rows.get(&rid))
            .copied()
    }

    /// Any row of `oid` still locked by this transaction?
    pub fn holds_row_locks_on(&self, oid: TableOid) -> bool {
        self.row_locks
            .lock()
            .get(&oid)
            .is_some_and(|rows| !rows.is_empty())
    }

    /// Snapshot of the held table locks
    pub fn held_table_locks(&self) -> Vec<(TableOid, LockMode)> {
        self.table_locks
            .lock()
            .iter()
            .map(|(&oid, &mode)| (oid, mode))
            .collect()
    }

    /// Snapshot of the held row locks
    pub fn held_row_locks(&self) -> Vec<(TableOid, Rid, LockMode)> {
        self.row_locks
            .lock()
            .iter()
            .flat_map(|(&oid, rows)| {
                rows.iter().map(move |(&rid, &mode)| (oid, rid, mode))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_transaction_is_growing() {
        let txn = Transaction::new(1, IsolationLevel::RepeatableRead);
        assert_eq!(txn.id(), 1);
        assert_eq!(txn.state(), TransactionState::Growing);
        assert_eq!(txn.isolation_level(), IsolationLevel::RepeatableRead);
    }

    #[test]
    fn test_lock_bookkeeping() {
        let txn = Transaction::new(2, IsolationLevel::ReadCommitted);

        txn.record_table_lock(10, LockMode::IntentionExclusive);
        assert!(txn.has_write_intent_on(10));
        assert!(!txn.has_write_intent_on(11));

        let rid = Rid::new(1, 0);
        txn.record_row_lock(10, rid, LockMode::Exclusive);
        assert!(txn.holds_row_locks_on(10));
        assert_eq!(txn.row_lock_mode(10, rid), Some(LockMode::Exclusive));

        txn.erase_row_lock(10, rid);
        assert!(!txn.holds_row_locks_on(10));

        txn.erase_table_lock(10);
        assert_eq!(txn.table_lock_mode(10), None);
    }

    #[test]
    fn test_shared_table_lock_carries_no_write_intent() {
        let txn = Transaction::new(3, IsolationLevel::RepeatableRead);
        txn.record_table_lock(5, LockMode::Shared);
        assert!(!txn.has_write_intent_on(5));
        txn.record_table_lock(5, LockMode::SharedIntentionExclusive);
        assert!(txn.has_write_intent_on(5));
    }
}
