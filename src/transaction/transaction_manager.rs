use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::lock::LockManager;
use crate::transaction::transaction::{IsolationLevel, Transaction, TransactionState};

/// Creates transactions and tracks the live ones.
///
/// The deadlock detector resolves victim ids through this registry, so a
/// transaction stays registered until it commits or aborts.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    active_transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            active_transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Begin a new transaction
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.active_transactions
            .lock()
            .insert(txn_id, Arc::clone(&txn));
        txn
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active_transactions.lock().get(&txn_id).cloned()
    }

    /// Commit: release every held lock (rows before tables) and retire the
    /// transaction. Data changes are already in place; nothing to undo.
    pub fn commit(&self, txn: &Arc<Transaction>, lock_manager: &LockManager) {
        self.release_all_locks(txn, lock_manager);
        txn.set_state(TransactionState::Committed);
        self.active_transactions.lock().remove(&txn.id());
        debug!("transaction {} committed", txn.id());
    }

    /// Abort: release every held lock and retire the transaction. Undoing
    /// data changes is the operators' responsibility and has already
    /// happened by the time this runs.
    pub fn abort(&self, txn: &Arc<Transaction>, lock_manager: &LockManager) {
        txn.set_state(TransactionState::Aborted);
        self.release_all_locks(txn, lock_manager);
        self.active_transactions.lock().remove(&txn.id());
        debug!("transaction {} aborted", txn.id());
    }

    fn release_all_locks(&self, txn: &Arc<Transaction>, lock_manager: &LockManager) {
        // Rows first: a table cannot be unlocked while its rows are held
        for (oid, rid, _mode) in txn.held_row_locks() {
            let _ = lock_manager.unlock_row(txn, oid, rid);
        }
        for (oid, _mode) in txn.held_table_locks() {
            let _ = lock_manager.unlock_table(txn, oid);
        }
    }
}
