use byteorder::{ByteOrder, LittleEndian};

/// Page header size: 4 bytes per field * 5 fields
pub const HEADER_SIZE: usize = 20;

/// Slot entry size: offset + length + flags, 4 bytes each
pub const SLOT_SIZE: usize = 12;

/// Slot flag: record is tombstoned by an in-flight delete
pub const FLAG_TOMBSTONE: u32 = 1;

/// A slot array entry locating one record inside a page.
///
/// The slot array grows from the end of the page; record data grows from
/// just after the header. A dead record keeps its slot with length 0.
#[derive(Debug, Clone, Copy)]
pub struct RecordLocation {
    pub offset: u32,
    pub length: u32,
    pub flags: u32,
}

impl RecordLocation {
    pub fn to_bytes(&self) -> [u8; SLOT_SIZE] {
        let mut bytes = [0u8; SLOT_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], self.offset);
        LittleEndian::write_u32(&mut bytes[4..8], self.length);
        LittleEndian::write_u32(&mut bytes[8..12], self.flags);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            offset: LittleEndian::read_u32(&bytes[0..4]),
            length: LittleEndian::read_u32(&bytes[4..8]),
            flags: LittleEndian::read_u32(&bytes[8..12]),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.length == 0
    }

    pub fn is_tombstoned(&self) -> bool {
        self.flags & FLAG_TOMBSTONE != 0
    }
}
