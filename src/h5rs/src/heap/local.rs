//! Local heap (`HEAP`): a contiguous segment of null-terminated names
//! referenced by symbol-table entries. Offset 0 is reserved, so writers must
//! place the first name at offset >= 8 and readers must skip any entry whose
//! link-name-offset is 0.

use crate::error::{Hdf5Error, Result};
use crate::io::{Reader, Writer};

pub const SIGNATURE: [u8; 4] = *b"HEAP";
const RESERVED_PREFIX: usize = 8;

#[derive(Debug, Default)]
pub struct LocalHeap {
    data: Vec<u8>,
}

impl LocalHeap {
    pub fn new() -> Self {
        LocalHeap { data: vec![0u8; RESERVED_PREFIX] }
    }

    /// Appends `name` (NUL-terminated) and returns its byte offset, which is
    /// guaranteed to be `>= 8` so readers never confuse it with the reserved
    /// sentinel at offset 0.
    pub fn add_name(&mut self, name: &str) -> u64 {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(name.as_bytes());
        self.data.push(0);
        // Keep the segment 8-byte aligned, matching how the rest of this
        // format pads every structure.
        while !self.data.len().is_multiple_of(8) {
            self.data.push(0);
        }
        offset
    }

    pub fn emit(&self, writer: &mut Writer, offset_size: u8) -> u64 {
        let start = writer.position();
        writer.write_bytes(&SIGNATURE);
        writer.write_u8(0); // version
        writer.write_zeros(3);
        writer.write_offset(offset_size, self.data.len() as u64); // data segment size
        writer.write_offset(offset_size, UNDEFINED_FREE_LIST); // head of free list
        let data_address_field = writer.position();
        writer.write_offset(offset_size, 0); // patched below
        let data_address = writer.position();
        writer.write_bytes(&self.data);
        writer.patch_offset_at(data_address_field, offset_size, data_address);
        start
    }

    pub fn parse(reader: &mut Reader, offset_size: u8) -> Result<(u64, u64)> {
        let sig = reader.read_exact(4)?;
        if sig != SIGNATURE {
            return Err(Hdf5Error::invalid_signature("LocalHeap::parse", reader.position() - 4, "HEAP", &sig));
        }
        let _version = reader.read_u8()?;
        reader.read_exact(3)?;
        let data_segment_size = reader.read_offset(offset_size)?;
        let _free_list_head = reader.read_offset(offset_size)?;
        let data_segment_address = reader.read_offset(offset_size)?;
        Ok((data_segment_address, data_segment_size))
    }

    /// Reads the NUL-terminated name at `name_offset` within the data segment
    /// starting at absolute address `data_address`. An offset of 0 is the
    /// reserved sentinel and yields no name.
    pub fn read_name(reader: &mut Reader, data_address: u64, name_offset: u64) -> Result<Option<String>> {
        if name_offset == 0 {
            return Ok(None);
        }
        reader.seek_address(data_address + name_offset)?;
        Ok(Some(reader.read_null_terminated(10_000)?))
    }
}

const UNDEFINED_FREE_LIST: u64 = crate::address::UNDEFINED;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_name_lands_past_reserved_prefix() {
        let mut heap = LocalHeap::new();
        let offset = heap.add_name("alpha");
        assert!(offset >= 8);
    }
}
