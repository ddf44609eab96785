pub mod lock;
pub mod transaction;
pub mod transaction_manager;

pub use lock::{LockManager, LockMode};
pub use transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionAbort, TransactionState,
};
pub use transaction_manager::TransactionManager;
