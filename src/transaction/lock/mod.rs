//! Multi-granularity lock service.
//!
//! Tables take any of the five modes; rows take only S or X. Grants respect
//! queue FIFO order except that an in-flight upgrade has priority. Blocked
//! requests wait on the queue's condition variable; a background worker
//! periodically aborts deadlock victims (see `deadlock.rs`).

mod deadlock;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use std::thread::JoinHandle;

use crate::common::types::{Rid, TableOid, TxnId};
use crate::transaction::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionAbort, TransactionState,
};
use crate::transaction::transaction_manager::TransactionManager;

/// Lock modes, coarsest conflict first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

impl LockMode {
    /// Compatibility matrix between a held mode and a requested mode
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        use LockMode::*;
        match (self, other) {
            (IntentionShared, Exclusive) | (Exclusive, IntentionShared) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive) => true,
            (IntentionExclusive, _) | (_, IntentionExclusive) => false,
            (Shared, Shared) => true,
            _ => false,
        }
    }

    /// The upgrade lattice: IS -> {S, X, IX, SIX}; S -> {X, SIX};
    /// IX -> {X, SIX}; SIX -> {X}
    pub fn can_upgrade_to(&self, target: &LockMode) -> bool {
        use LockMode::*;
        match self {
            IntentionShared => !matches!(target, IntentionShared),
            Shared | IntentionExclusive => {
                matches!(target, Exclusive | SharedIntentionExclusive)
            }
            SharedIntentionExclusive => matches!(target, Exclusive),
            Exclusive => false,
        }
    }

    /// Only S and X apply at row granularity
    pub fn is_row_mode(&self) -> bool {
        matches!(self, LockMode::Shared | LockMode::Exclusive)
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LockMode::IntentionShared => "IS",
            LockMode::IntentionExclusive => "IX",
            LockMode::Shared => "S",
            LockMode::SharedIntentionExclusive => "SIX",
            LockMode::Exclusive => "X",
        };
        write!(f, "{}", text)
    }
}

/// One lock request in a queue
#[derive(Debug, Clone)]
pub(crate) struct LockRequest {
    pub txn_id: TxnId,
    pub mode: LockMode,
    pub granted: bool,
}

pub(crate) struct QueueState {
    pub requests: VecDeque<LockRequest>,
    /// Transaction currently re-queued for an upgrade, if any
    pub upgrading: Option<TxnId>,
}

/// FIFO wait queue for one lockable resource
pub(crate) struct LockRequestQueue {
    pub inner: Mutex<QueueState>,
    pub cv: Condvar,
}

impl LockRequestQueue {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueState {
                requests: VecDeque::new(),
                upgrading: None,
            }),
            cv: Condvar::new(),
        })
    }
}

/// The lock manager: per-table and per-row request queues plus the
/// deadlock detector.
pub struct LockManager {
    pub(crate) table_lock_map: Mutex<HashMap<TableOid, Arc<LockRequestQueue>>>,
    pub(crate) row_lock_map: Mutex<HashMap<Rid, Arc<LockRequestQueue>>>,
    pub(crate) txn_manager: Arc<TransactionManager>,
    pub(crate) detection_interval: Duration,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) detector: Mutex<Option<JoinHandle<()>>>,
}

impl LockManager {
    /// The transaction manager is an injected collaborator: the cycle
    /// detector resolves victim ids through it.
    pub fn new(txn_manager: Arc<TransactionManager>, detection_interval: Duration) -> Self {
        Self {
            table_lock_map: Mutex::new(HashMap::new()),
            row_lock_map: Mutex::new(HashMap::new()),
            txn_manager,
            detection_interval,
            running: Arc::new(AtomicBool::new(false)),
            detector: Mutex::new(None),
        }
    }

    /// Acquire a table lock, blocking until granted.
    ///
    /// Fails with a typed abort when the request violates the isolation
    /// rules, the upgrade protocol, or when this transaction is aborted by
    /// the deadlock detector while waiting. Requests from finished
    /// transactions are a caller bug and panic.
    pub fn lock_table(
        &self,
        txn: &Transaction,
        mode: LockMode,
        oid: TableOid,
    ) -> Result<(), TransactionAbort> {
        self.check_table_request(txn, mode)?;

        let queue = self.table_queue(oid);
        let mut q = queue.inner.lock();

        if let Some(pos) = q
            .requests
            .iter()
            .position(|r| r.txn_id == txn.id())
        {
            if !q.requests[pos].granted {
                return Err(Self::abort(txn, AbortReason::IncompatibleUpgrade));
            }
            if q.requests[pos].mode == mode {
                return Ok(());
            }
            if q.upgrading.is_some() {
                return Err(Self::abort(txn, AbortReason::UpgradeConflict));
            }
            if !q.requests[pos].mode.can_upgrade_to(&mode) {
                return Err(Self::abort(txn, AbortReason::IncompatibleUpgrade));
            }

            let _ = q.requests.remove(pos);
            txn.erase_table_lock(oid);
            q.upgrading = Some(txn.id());
        }

        q.requests.push_back(LockRequest {
            txn_id: txn.id(),
            mode,
            granted: false,
        });

        while !Self::try_grant(&mut *q, txn.id()) {
            queue.cv.wait(&mut q);
            if txn.state() == TransactionState::Aborted {
                Self::remove_request(&mut *q, txn.id());
                if q.upgrading == Some(txn.id()) {
                    q.upgrading = None;
                }
                queue.cv.notify_all();
                return Err(TransactionAbort::new(txn.id(), AbortReason::Deadlock));
            }
        }
        drop(q);

        txn.record_table_lock(oid, mode);
        Ok(())
    }

    /// Release a table lock: refuses while the transaction still holds row
    /// locks on the table, and drives the GROWING -> SHRINKING transition.
    pub fn unlock_table(&self, txn: &Transaction, oid: TableOid) -> Result<(), TransactionAbort> {
        if txn.holds_row_locks_on(oid) {
            return Err(Self::abort(
                txn,
                AbortReason::TableUnlockedBeforeUnlockingRows,
            ));
        }

        let queue = {
            let map = self.table_lock_map.lock();
            match map.get(&oid) {
                Some(queue) => Arc::clone(queue),
                None => {
                    drop(map);
                    return Err(Self::abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
                }
            }
        };

        let mut q = queue.inner.lock();
        let pos = match q.requests.iter().position(|r| r.txn_id == txn.id()) {
            Some(pos) => pos,
            None => return Err(Self::abort(txn, AbortReason::AttemptedUnlockButNoLockHeld)),
        };

        let mode = q.requests[pos].mode;
        if txn.state() == TransactionState::Growing {
            let shrinks = match txn.isolation_level() {
                IsolationLevel::RepeatableRead => {
                    matches!(mode, LockMode::Shared | LockMode::Exclusive)
                }
                IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => {
                    mode == LockMode::Exclusive
                }
            };
            if shrinks {
                txn.set_state(TransactionState::Shrinking);
            }
        }

        let _ = q.requests.remove(pos);
        txn.erase_table_lock(oid);
        queue.cv.notify_all();
        Ok(())
    }

    /// Acquire a row lock (S or X only), blocking until granted
    pub fn lock_row(
        &self,
        txn: &Transaction,
        mode: LockMode,
        oid: TableOid,
        rid: Rid,
    ) -> Result<(), TransactionAbort> {
        self.check_row_request(txn, mode, oid)?;

        let queue = self.row_queue(rid);
        let mut q = queue.inner.lock();

        if let Some(pos) = q
            .requests
            .iter()
            .position(|r| r.txn_id == txn.id())
        {
            if !q.requests[pos].granted {
                return Err(Self::abort(txn, AbortReason::IncompatibleUpgrade));
            }
            if q.requests[pos].mode == mode {
                return Ok(());
            }
            if q.upgrading.is_some() {
                return Err(Self::abort(txn, AbortReason::UpgradeConflict));
            }
            if !q.requests[pos].mode.can_upgrade_to(&mode) {
                return Err(Self::abort(txn, AbortReason::IncompatibleUpgrade));
            }

            let _ = q.requests.remove(pos);
            txn.erase_row_lock(oid, rid);
            q.upgrading = Some(txn.id());
        }

        q.requests.push_back(LockRequest {
            txn_id: txn.id(),
            mode,
            granted: false,
        });

        while !Self::try_grant(&mut *q, txn.id()) {
            queue.cv.wait(&mut q);
            if txn.state() == TransactionState::Aborted {
                Self::remove_request(&mut *q, txn.id());
                if q.upgrading == Some(txn.id()) {
                    q.upgrading = None;
                }
                queue.cv.notify_all();
                return Err(TransactionAbort::new(txn.id(), AbortReason::Deadlock));
            }
        }
        drop(q);

        txn.record_row_lock(oid, rid, mode);
        Ok(())
    }

    /// Release a row lock and drive the 2PL transition
    pub fn unlock_row(
        &self,
        txn: &Transaction,
        oid: TableOid,
        rid: Rid,
    ) -> Result<(), TransactionAbort> {
        let queue = {
            let map = self.row_lock_map.lock();
            match map.get(&rid) {
                Some(queue) => Arc::clone(queue),
                None => {
                    drop(map);
                    return Err(Self::abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
                }
            }
        };

        let mut q = queue.inner.lock();
        let pos = match q.requests.iter().position(|r| r.txn_id == txn.id()) {
            Some(pos) => pos,
            None => return Err(Self::abort(txn, AbortReason::AttemptedUnlockButNoLockHeld)),
        };

        let mode = q.requests[pos].mode;
        if txn.state() == TransactionState::Growing {
            let shrinks = match txn.isolation_level() {
                IsolationLevel::RepeatableRead => true,
                IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => {
                    mode == LockMode::Exclusive
                }
            };
            if shrinks {
                txn.set_state(TransactionState::Shrinking);
            }
        }

        let _ = q.requests.remove(pos);
        txn.erase_row_lock(oid, rid);
        queue.cv.notify_all();
        Ok(())
    }

    /// Isolation-level pre-checks for table lock requests
    fn check_table_request(
        &self,
        txn: &Transaction,
        mode: LockMode,
    ) -> Result<(), TransactionAbort> {
        let state = txn.state();
        if state == TransactionState::Committed || state == TransactionState::Aborted {
            panic!(
                "transaction {} requested a lock after finishing",
                txn.id()
            );
        }

        match txn.isolation_level() {
            IsolationLevel::RepeatableRead => {
                if state == TransactionState::Shrinking {
                    return Err(Self::abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadCommitted => {
                if state == TransactionState::Shrinking
                    && !matches!(mode, LockMode::Shared | LockMode::IntentionShared)
                {
                    return Err(Self::abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadUncommitted => {
                if matches!(
                    mode,
                    LockMode::Shared
                        | LockMode::IntentionShared
                        | LockMode::SharedIntentionExclusive
                ) {
                    return Err(Self::abort(txn, AbortReason::LockSharedOnReadUncommitted));
                }
                if state == TransactionState::Shrinking {
                    return Err(Self::abort(txn, AbortReason::LockOnShrinking));
                }
            }
        }
        Ok(())
    }

    /// Pre-checks specific to row lock requests
    fn check_row_request(
        &self,
        txn: &Transaction,
        mode: LockMode,
        oid: TableOid,
    ) -> Result<(), TransactionAbort> {
        let state = txn.state();
        if state == TransactionState::Committed || state == TransactionState::Aborted {
            panic!(
                "transaction {} requested a lock after finishing",
                txn.id()
            );
        }

        if !mode.is_row_mode() {
            return Err(Self::abort(txn, AbortReason::AttemptedIntentionLockOnRow));
        }

        if txn.isolation_level() == IsolationLevel::ReadUncommitted && mode == LockMode::Shared {
            return Err(Self::abort(txn, AbortReason::LockSharedOnReadUncommitted));
        }

        // An exclusive row lock needs a write-intent table lock underneath
        if mode == LockMode::Exclusive && !txn.has_write_intent_on(oid) {
            return Err(Self::abort(txn, AbortReason::TableLockNotPresent));
        }

        if state == TransactionState::Shrinking
            && !(txn.isolation_level() == IsolationLevel::ReadCommitted
                && mode == LockMode::Shared)
        {
            return Err(Self::abort(txn, AbortReason::LockOnShrinking));
        }

        Ok(())
    }

    /// Grant test for the not-yet-granted request of `txn_id`.
    ///
    /// A request is granted when it is compatible with every granted holder
    /// and either (a) it is the pending upgrade, or (b) no upgrade is
    /// pending and every earlier waiting request is compatible with it.
    fn try_grant(q: &mut QueueState, txn_id: TxnId) -> bool {
        let my_idx = match q
            .requests
            .iter()
            .position(|r| r.txn_id == txn_id && !r.granted)
        {
            Some(idx) => idx,
            None => return false,
        };
        let my_mode = q.requests[my_idx].mode;

        for r in q.requests.iter() {
            if r.granted && !r.mode.is_compatible_with(&my_mode) {
                return false;
            }
        }

        if q.upgrading == Some(txn_id) {
            q.upgrading = None;
            q.requests[my_idx].granted = true;
            return true;
        }
        if q.upgrading.is_some() {
            return false;
        }

        for (i, r) in q.requests.iter().enumerate() {
            if i == my_idx {
                break;
            }
            if !r.granted && !r.mode.is_compatible_with(&my_mode) {
                return false;
            }
        }

        q.requests[my_idx].granted = true;
        true
    }

    fn remove_request(q: &mut QueueState, txn_id: TxnId) {
        q.requests.retain(|r| r.txn_id != txn_id);
    }

    /// Abort the transaction and build the typed error
    fn abort(txn: &Transaction, reason: AbortReason) -> TransactionAbort {
        txn.set_state(TransactionState::Aborted);
        TransactionAbort::new(txn.id(), reason)
    }

    fn table_queue(&self, oid: TableOid) -> Arc<LockRequestQueue> {
        let mut map = self.table_lock_map.lock();
        Arc::clone(map.entry(oid).or_insert_with(LockRequestQueue::new))
    }

    fn row_queue(&self, rid: Rid) -> Arc<LockRequestQueue> {
        let mut map = self.row_lock_map.lock();
        Arc::clone(map.entry(rid).or_insert_with(LockRequestQueue::new))
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.stop_cycle_detection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_matrix() {
        use LockMode::*;
        let modes = [
            IntentionShared,
            IntentionExclusive,
            Shared,
            SharedIntentionExclusive,
            Exclusive,
        ];

        // Row-major over IS, IX, S, SIX, X
        let expected = [
            [true, true, true, true, false],
            [true, true, false, false, false],
            [true, false, true, false, false],
            [true, false, false, false, false],
            [false, false, false, false, false],
        ];

        for (i, held) in modes.iter().enumerate() {
            for (j, want) in modes.iter().enumerate() {
                assert_eq!(
                    held.is_compatible_with(want),
                    expected[i][j],
                    "held {} vs requested {}",
                    held,
                    want
                );
            }
        }
    }

    #[test]
    fn test_upgrade_lattice() {
        use LockMode::*;

        assert!(IntentionShared.can_upgrade_to(&Shared));
        assert!(IntentionShared.can_upgrade_to(&Exclusive));
        assert!(IntentionShared.can_upgrade_to(&IntentionExclusive));
        assert!(IntentionShared.can_upgrade_to(&SharedIntentionExclusive));

        assert!(Shared.can_upgrade_to(&Exclusive));
        assert!(Shared.can_upgrade_to(&SharedIntentionExclusive));
        assert!(!Shared.can_upgrade_to(&IntentionShared));
        assert!(!Shared.can_upgrade_to(&IntentionExclusive));

        assert!(IntentionExclusive.can_upgrade_to(&Exclusive));
        assert!(IntentionExclusive.can_upgrade_to(&SharedIntentionExclusive));
        assert!(!IntentionExclusive.can_upgrade_to(&Shared));

        assert!(SharedIntentionExclusive.can_upgrade_to(&Exclusive));
        assert!(!SharedIntentionExclusive.can_upgrade_to(&Shared));

        assert!(!Exclusive.can_upgrade_to(&Shared));
        assert!(!Exclusive.can_upgrade_to(&SharedIntentionExclusive));
    }

    #[test]
    fn test_row_modes() {
        assert!(LockMode::Shared.is_row_mode());
        assert!(LockMode::Exclusive.is_row_mode());
        assert!(!LockMode::IntentionShared.is_row_mode());
        assert!(!LockMode::IntentionExclusive.is_row_mode());
        assert!(!LockMode::SharedIntentionExclusive.is_row_mode());
    }
}
