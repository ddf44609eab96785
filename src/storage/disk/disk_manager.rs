use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Page, PageId, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager handles the raw disk I/O: whole pages addressed by id
pub struct DiskManager {
    db_file: Mutex<File>,
}

impl DiskManager {
    /// Create a new DiskManager over the specified database file
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        Ok(Self {
            db_file: Mutex::new(file),
        })
    }

    /// Read a page from disk. Pages beyond the end of the file read as zeroes;
    /// the file grows lazily on the first write.
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        if page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut file = self.db_file.lock();

        let file_size = file.metadata()?.len();
        if offset >= file_size {
            page.reset(page_id);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut page.data)?;
        page.page_id = page_id;

        Ok(())
    }

    /// Write a page to disk at its id's offset
    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        if page.page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page.page_id));
        }

        let offset = Self::page_offset(page.page_id);
        let mut file = self.db_file.lock();

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;
        file.flush()?;

        Ok(())
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }
}
