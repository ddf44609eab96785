use crate::common::types::{Page, PAGE_SIZE};
use crate::storage::page::error::PageError;
use crate::storage::page::header::PageHeader;
use crate::storage::page::layout::{RecordLocation, FLAG_TOMBSTONE, HEADER_SIZE, SLOT_SIZE};

/// Stateless accessor for slotted data pages.
///
/// Record data grows forward from the header; the slot array grows backward
/// from the page end. Deletion is two-phase: a tombstone flag hides the
/// record while keeping its bytes, so the delete can still be rolled back;
/// applying the delete zeroes the slot for good.
pub struct PageManager;

impl Default for PageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PageManager {
    pub fn new() -> Self {
        Self
    }

    pub fn init_page(&self, page: &mut Page) {
        let header = PageHeader::new();
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn get_header(&self, page: &Page) -> PageHeader {
        PageHeader::from_bytes(&page.data[0..HEADER_SIZE])
    }

    pub fn set_header(&self, page: &mut Page, header: &PageHeader) {
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn free_space(&self, page: &Page) -> u32 {
        self.get_header(page).free_space_size
    }

    /// Insert a record, returning its slot index
    pub fn insert_record(&self, page: &mut Page, data: &[u8]) -> Result<u32, PageError> {
        let mut header = self.get_header(page);

        let record_size = data.len() as u32;
        let total_needed = record_size + SLOT_SIZE as u32;
        if header.free_space_size < total_needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot = header.record_count;
        let slot_pos = Self::slot_position(slot);
        let location = RecordLocation {
            offset: header.free_space_offset,
            length: record_size,
            flags: 0,
        };

        let start = header.free_space_offset as usize;
        page.data[start..start + data.len()].copy_from_slice(data);
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&location.to_bytes());

        header.free_space_offset += record_size;
        header.free_space_size -= total_needed;
        header.record_count += 1;
        self.set_header(page, &header);

        Ok(slot)
    }

    /// Read a live record's bytes
    pub fn get_record(&self, page: &Page, slot: u32) -> Result<Vec<u8>, PageError> {
        let location = self.slot(page, slot)?;
        if location.is_dead() {
            return Err(PageError::RecordNotFound);
        }
        if location.is_tombstoned() {
            return Err(PageError::RecordDeleted);
        }

        let start = location.offset as usize;
        let end = start + location.length as usize;
        Ok(page.data[start..end].to_vec())
    }

    /// Tombstone a record: hidden from reads, bytes retained
    pub fn mark_delete(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let mut location = self.slot(page, slot)?;
        if location.is_dead() {
            return Err(PageError::RecordNotFound);
        }
        if location.is_tombstoned() {
            return Err(PageError::RecordDeleted);
        }

        location.flags |= FLAG_TOMBSTONE;
        self.set_slot(page, slot, &location);
        Ok(())
    }

    /// Revert a tombstone, making the record visible again
    pub fn rollback_delete(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let mut location = self.slot(page, slot)?;
        if location.is_dead() {
            return Err(PageError::RecordNotFound);
        }
        if !location.is_tombstoned() {
            return Err(PageError::RecordNotDeleted);
        }

        location.flags &= !FLAG_TOMBSTONE;
        self.set_slot(page, slot, &location);
        Ok(())
    }

    /// Physically remove a record. The slot stays dead; space is not
    /// compacted here.
    pub fn apply_delete(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let mut location = self.slot(page, slot)?;
        if location.is_dead() {
            return Err(PageError::RecordNotFound);
        }

        location.length = 0;
        location.flags = 0;
        self.set_slot(page, slot, &location);
        Ok(())
    }

    /// Slot state for scans: None when dead, otherwise (bytes, tombstoned)
    pub fn record_state(&self, page: &Page, slot: u32) -> Result<Option<(Vec<u8>, bool)>, PageError> {
        let location = self.slot(page, slot)?;
        if location.is_dead() {
            return Ok(None);
        }
        let start = location.offset as usize;
        let end = start + location.length as usize;
        Ok(Some((page.data[start..end].to_vec(), location.is_tombstoned())))
    }

    pub fn record_count(&self, page: &Page) -> u32 {
        self.get_header(page).record_count
    }

    fn slot(&self, page: &Page, slot: u32) -> Result<RecordLocation, PageError> {
        let header = self.get_header(page);
        if slot >= header.record_count {
            return Err(PageError::InvalidRecordId);
        }
        let pos = Self::slot_position(slot);
        Ok(RecordLocation::from_bytes(&page.data[pos..pos + SLOT_SIZE]))
    }

    fn set_slot(&self, page: &mut Page, slot: u32, location: &RecordLocation) {
        let pos = Self::slot_position(slot);
        page.data[pos..pos + SLOT_SIZE].copy_from_slice(&location.to_bytes());
    }

    fn slot_position(slot: u32) -> usize {
        PAGE_SIZE - SLOT_SIZE * (slot as usize + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_page() -> (PageManager, Page) {
        let pm = PageManager::new();
        let mut page = Page::new(1);
        pm.init_page(&mut page);
        (pm, page)
    }

    #[test]
    fn test_insert_and_get() {
        let (pm, mut page) = fresh_page();

        let s0 = pm.insert_record(&mut page, b"first").unwrap();
        let s1 = pm.insert_record(&mut page, b"second").unwrap();
        assert_eq!(s0, 0);
        assert_eq!(s1, 1);

        assert_eq!(pm.get_record(&page, 0).unwrap(), b"first");
        assert_eq!(pm.get_record(&page, 1).unwrap(), b"second");
        assert!(matches!(
            pm.get_record(&page, 2),
            Err(PageError::InvalidRecordId)
        ));
    }

    #[test]
    fn test_two_phase_delete() {
        let (pm, mut page) = fresh_page();
        pm.insert_record(&mut page, b"doomed").unwrap();

        pm.mark_delete(&mut page, 0).unwrap();
        assert!(matches!(pm.get_record(&page, 0), Err(PageError::RecordDeleted)));
        assert!(matches!(
            pm.mark_delete(&mut page, 0),
            Err(PageError::RecordDeleted)
        ));

        pm.rollback_delete(&mut page, 0).unwrap();
        assert_eq!(pm.get_record(&page, 0).unwrap(), b"doomed");

        pm.mark_delete(&mut page, 0).unwrap();
        pm.apply_delete(&mut page, 0).unwrap();
        assert!(matches!(pm.get_record(&page, 0), Err(PageError::RecordNotFound)));
        assert!(matches!(
            pm.apply_delete(&mut page, 0),
            Err(PageError::RecordNotFound)
        ));
    }

    #[test]
    fn test_rollback_requires_tombstone() {
        let (pm, mut page) = fresh_page();
        pm.insert_record(&mut page, b"x").unwrap();
        assert!(matches!(
            pm.rollback_delete(&mut page, 0),
            Err(PageError::RecordNotDeleted)
        ));
    }

    #[test]
    fn test_page_fills_up() {
        let (pm, mut page) = fresh_page();
        let record = vec![0xAAu8; 512];
        let mut inserted = 0;
        loop {
            match pm.insert_record(&mut page, &record) {
                Ok(_) => inserted += 1,
                Err(PageError::InsufficientSpace) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        // 4096-byte page, 20-byte header, 512 + 12 per record
        assert_eq!(inserted, 7);
        assert_eq!(pm.record_count(&page), 7);
    }
}
