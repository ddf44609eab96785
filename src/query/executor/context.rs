use std::sync::Arc;

use crate::catalog::Catalog;
use crate::storage::buffer::BufferPoolManager;
use crate::transaction::{LockManager, Transaction};

/// Everything an operator needs to run inside one transaction
#[derive(Clone)]
pub struct ExecutorContext {
    pub transaction: Arc<Transaction>,
    pub catalog: Arc<Catalog>,
    pub buffer_pool: Arc<BufferPoolManager>,
    pub lock_manager: Arc<LockManager>,
}

impl ExecutorContext {
    pub fn new(
        transaction: Arc<Transaction>,
        catalog: Arc<Catalog>,
        buffer_pool: Arc<BufferPoolManager>,
        lock_manager: Arc<LockManager>,
    ) -> Self {
        Self {
            transaction,
            catalog,
            buffer_pool,
            lock_manager,
        }
    }
}
