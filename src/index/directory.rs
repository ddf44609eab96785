use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;

use crate::common::types::{PageId, PAGE_SIZE};
use crate::index::btree::error::{BTreeError, BTreeResult};
use crate::storage::buffer::BufferPoolManager;

/// Persistent registry of index roots, conventionally on page 0.
///
/// Layout: u16 record count, then per record a u16 name length, the name
/// bytes and the root page id (i32). Every root change is written through
/// so an index can be reopened by name.
pub struct IndexDirectory {
    buffer_pool: Arc<BufferPoolManager>,
    page_id: PageId,
    /// Serializes read-modify-write cycles on the directory page
    latch: Mutex<()>,
}

impl IndexDirectory {
    /// Allocate the directory page. Call before any other allocation so the
    /// directory lands on page 0.
    pub fn create(buffer_pool: Arc<BufferPoolManager>) -> BTreeResult<Arc<Self>> {
        let guard = buffer_pool.new_page_guarded()?;
        let page_id = guard.page_id();
        LittleEndian::write_u16(&mut guard.write().data[0..2], 0);
        drop(guard);

        Ok(Arc::new(Self {
            buffer_pool,
            page_id,
            latch: Mutex::new(()),
        }))
    }

    /// Reattach to an existing directory page
    pub fn open(buffer_pool: Arc<BufferPoolManager>, page_id: PageId) -> Arc<Self> {
        Arc::new(Self {
            buffer_pool,
            page_id,
            latch: Mutex::new(()),
        })
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Root page id recorded for `name`
    pub fn get_root(&self, name: &str) -> BTreeResult<Option<PageId>> {
        let _latch = self.latch.lock();
        let guard = self.buffer_pool.fetch_page_guarded(self.page_id)?;
        let records = Self::parse(&guard.read().data);
        Ok(records
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, root)| root))
    }

    /// Record (or update) the root page id for `name`
    pub fn set_root(&self, name: &str, root: PageId) -> BTreeResult<()> {
        let _latch = self.latch.lock();
        let guard = self.buffer_pool.fetch_page_guarded(self.page_id)?;
        let mut page = guard.write();

        let mut records = Self::parse(&page.data);
        match records.iter_mut().find(|(n, _)| n == name) {
            Some(record) => record.1 = root,
            None => records.push((name.to_string(), root)),
        }
        Self::render(&records, &mut page.data)
    }

    fn parse(data: &[u8]) -> Vec<(String, PageId)> {
        let count = LittleEndian::read_u16(&data[0..2]) as usize;
        let mut records = Vec::with_capacity(count);
        let mut offset = 2;
        for _ in 0..count {
            let name_len = LittleEndian::read_u16(&data[offset..offset + 2]) as usize;
            offset += 2;
            let name = String::from_utf8_lossy(&data[offset..offset + name_len]).into_owned();
            offset += name_len;
            let root = LittleEndian::read_i32(&data[offset..offset + 4]);
            offset += 4;
            records.push((name, root));
        }
        records
    }

    fn render(records: &[(String, PageId)], data: &mut [u8]) -> BTreeResult<()> {
        let needed: usize = 2 + records
            .iter()
            .map(|(n, _)| 2 + n.len() + 4)
            .sum::<usize>();
        if needed > PAGE_SIZE {
            return Err(BTreeError::DirectoryFull);
        }

        data.fill(0);
        LittleEndian::write_u16(&mut data[0..2], records.len() as u16);
        let mut offset = 2;
        for (name, root) in records {
            LittleEndian::write_u16(&mut data[offset..offset + 2], name.len() as u16);
            offset += 2;
            data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
            offset += name.len();
            LittleEndian::write_i32(&mut data[offset..offset + 4], *root);
            offset += 4;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::INVALID_PAGE_ID;
    use tempfile::NamedTempFile;

    #[test]
    fn test_directory_records_roots() {
        let file = NamedTempFile::new().unwrap();
        let bpm = Arc::new(BufferPoolManager::new(8, 2, file.path()).unwrap());
        let dir = IndexDirectory::create(Arc::clone(&bpm)).unwrap();
        assert_eq!(dir.page_id(), 0);

        assert_eq!(dir.get_root("missing").unwrap(), None);

        dir.set_root("orders_pk", 7).unwrap();
        dir.set_root("users_pk", INVALID_PAGE_ID).unwrap();
        assert_eq!(dir.get_root("orders_pk").unwrap(), Some(7));
        assert_eq!(dir.get_root("users_pk").unwrap(), Some(INVALID_PAGE_ID));

        dir.set_root("orders_pk", 12).unwrap();
        assert_eq!(dir.get_root("orders_pk").unwrap(), Some(12));
    }

    #[test]
    fn test_directory_survives_reopen() {
        let file = NamedTempFile::new().unwrap();
        let page_id = {
            let bpm = Arc::new(BufferPoolManager::new(8, 2, file.path()).unwrap());
            let dir = IndexDirectory::create(Arc::clone(&bpm)).unwrap();
            dir.set_root("pk", 3).unwrap();
            bpm.flush_all_pages().unwrap();
            dir.page_id()
        };

        let bpm = Arc::new(BufferPoolManager::new(8, 2, file.path()).unwrap());
        let dir = IndexDirectory::open(bpm, page_id);
        assert_eq!(dir.get_root("pk").unwrap(), Some(3));
    }
}
