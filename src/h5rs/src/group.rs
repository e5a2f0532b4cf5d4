//! Classic group representation: a local heap holding child
//! names, one symbol-table node (`SNOD`) holding the per-child entries, and
//! a B-tree v1 symbol-table index over that single node. This crate
//! always builds a single SNOD per group — adequate for the group sizes its
//! builder produces; see DESIGN.md for the scope decision against the
//! modern fractal-heap/link-message profile (read support for which lives in
//! [`crate::heap::FractalHeap`] and [`crate::btree::v2`]).

use crate::address::UNDEFINED;
use crate::btree::v1;
use crate::error::{Hdf5Error, Result};
use crate::heap::LocalHeap;
use crate::io::{Reader, Writer};

pub const SNOD_SIGNATURE: [u8; 4] = *b"SNOD";

#[derive(Debug, Clone)]
pub struct SymbolTableEntry {
    pub link_name_offset: u64,
    pub object_header_address: u64,
}

fn write_snod(writer: &mut Writer, offset_size: u8, entries: &[SymbolTableEntry]) -> u64 {
    let start = writer.position();
    writer.write_bytes(&SNOD_SIGNATURE);
    writer.write_u8(1); // version
    writer.write_u8(0); // reserved
    writer.write_u16(entries.len() as u16);
    for entry in entries {
        writer.write_offset(offset_size, entry.link_name_offset);
        writer.write_offset(offset_size, entry.object_header_address);
        writer.write_u32(0); // cache type: 0 = no cached data
        writer.write_u32(0); // reserved
        writer.write_offset(offset_size, UNDEFINED); // scratch: btree address
        writer.write_offset(offset_size, UNDEFINED); // scratch: heap address
    }
    start
}

fn read_snod(reader: &mut Reader, offset_size: u8, address: u64) -> Result<Vec<SymbolTableEntry>> {
    reader.seek_address(address)?;
    let sig = reader.read_exact(4)?;
    if sig != SNOD_SIGNATURE {
        return Err(Hdf5Error::invalid_signature("group::read_snod", address, "SNOD", &sig));
    }
    let _version = reader.read_u8()?;
    reader.read_u8()?;
    let num_symbols = reader.read_u16()? as usize;
    let mut entries = Vec::with_capacity(num_symbols);
    for _ in 0..num_symbols {
        let link_name_offset = reader.read_offset(offset_size)?;
        let object_header_address = reader.read_offset(offset_size)?;
        reader.read_u32()?;
        reader.read_u32()?;
        reader.read_offset(offset_size)?;
        reader.read_offset(offset_size)?;
        entries.push(SymbolTableEntry { link_name_offset, object_header_address });
    }
    Ok(entries)
}

/// Builds the heap/SNOD/B-tree triple for a group's children and returns
/// `(heap_address, btree_address)` for the object header's SymbolTable message.
pub fn build_group(writer: &mut Writer, offset_size: u8, children: &[(String, u64)]) -> (u64, u64) {
    let mut heap = LocalHeap::new();
    let mut entries = Vec::with_capacity(children.len());
    let mut hashes = Vec::with_capacity(children.len());
    for (name, child_addr) in children {
        let offset = heap.add_name(name);
        entries.push(SymbolTableEntry { link_name_offset: offset, object_header_address: *child_addr });
        hashes.push(v1::name_hash(name));
    }
    let snod_address = write_snod(writer, offset_size, &entries);
    let heap_address = heap.emit(writer, offset_size);
    let min_hash = hashes.iter().min().copied().unwrap_or(0);
    let max_hash = hashes.iter().max().copied().unwrap_or(0);
    let btree_address = v1::write_symbol_table_index(writer, offset_size, snod_address, min_hash, max_hash);
    (heap_address, btree_address)
}

/// Reads every `(name, object_header_address)` child pair out of a group's
/// symbol-table index and local heap.
pub fn read_children(reader: &mut Reader, offset_size: u8, btree_address: u64, heap_address: u64) -> Result<Vec<(String, u64)>> {
    let snod_addresses = v1::read_symbol_table_index(reader, offset_size, btree_address)?;
    reader.seek_address(heap_address)?;
    let (data_address, _data_size) = LocalHeap::parse(reader, offset_size)?;

    let mut out = Vec::new();
    for snod_address in snod_addresses {
        for entry in read_snod(reader, offset_size, snod_address)? {
            if let Some(name) = LocalHeap::read_name(reader, data_address, entry.link_name_offset)? {
                out.push((name, entry.object_header_address));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_roundtrip() {
        let children = vec![("alpha".to_string(), 1000u64), ("beta".to_string(), 2000u64)];
        let mut w = Writer::new();
        let (heap_addr, btree_addr) = build_group(&mut w, 8, &children);
        let mut r = Reader::new(w.into_bytes());
        let mut back = read_children(&mut r, 8, btree_addr, heap_addr).unwrap();
        back.sort();
        let mut expected = children;
        expected.sort();
        assert_eq!(back, expected);
    }
}
