use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::NamedTempFile;

use karstdb::catalog::Catalog;
use karstdb::index::IndexDirectory;
use karstdb::query::executor::context::ExecutorContext;
use karstdb::query::executor::result::{DataValue, Tuple};
use karstdb::storage::buffer::BufferPoolManager;
use karstdb::transaction::{IsolationLevel, LockManager, Transaction, TransactionManager};

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager over a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(
    pool_size: usize,
    replacer_k: usize,
) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, replacer_k, path)?);
    Ok((buffer_pool, file))
}

// A fully wired engine for executor tests
#[allow(dead_code)]
pub struct TestDb {
    pub buffer_pool: Arc<BufferPoolManager>,
    pub directory: Arc<IndexDirectory>,
    pub catalog: Arc<Catalog>,
    pub txn_manager: Arc<TransactionManager>,
    pub lock_manager: Arc<LockManager>,
    _file: NamedTempFile,
}

#[allow(dead_code)]
impl TestDb {
    pub fn new(pool_size: usize) -> Result<Self> {
        let (buffer_pool, file) = create_test_buffer_pool(pool_size, 2)?;
        let directory = IndexDirectory::create(Arc::clone(&buffer_pool))?;
        let catalog = Arc::new(Catalog::new(
            Arc::clone(&buffer_pool),
            Arc::clone(&directory),
        ));
        let txn_manager = Arc::new(TransactionManager::new());
        let lock_manager = Arc::new(LockManager::new(
            Arc::clone(&txn_manager),
            Duration::from_millis(50),
        ));

        Ok(Self {
            buffer_pool,
            directory,
            catalog,
            txn_manager,
            lock_manager,
            _file: file,
        })
    }

    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        self.txn_manager.begin(isolation_level)
    }

    pub fn context(&self, txn: &Arc<Transaction>) -> ExecutorContext {
        ExecutorContext::new(
            Arc::clone(txn),
            Arc::clone(&self.catalog),
            Arc::clone(&self.buffer_pool),
            Arc::clone(&self.lock_manager),
        )
    }

    pub fn commit(&self, txn: &Arc<Transaction>) {
        self.txn_manager.commit(txn, &self.lock_manager);
    }

    pub fn abort(&self, txn: &Arc<Transaction>) {
        self.txn_manager.abort(txn, &self.lock_manager);
    }
}

// A three-column test row: (id, name, score)
#[allow(dead_code)]
pub fn user_row(id: i64, name: &str, score: i64) -> Tuple {
    Tuple::new(vec![
        DataValue::Integer(id),
        DataValue::Text(name.to_string()),
        DataValue::Integer(score),
    ])
}
