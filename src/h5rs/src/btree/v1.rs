//! B-tree v1: the chunk index (node type 1) and the symbol-table
//! index (node type 0). Both share the same `TREE` node framing; only the
//! key shape and comparison differ.
//!
//! Layout follows the canonical HDF5 interleaving of keys and children
//! (`key0 child0 key1 child1 ... keyN`) per the HDF5 File Format
//! Specification, rather than a key-after-children ordering (see DESIGN.md).

use crate::error::{Hdf5Error, Result};
use crate::io::{Reader, Writer};

pub const SIGNATURE: [u8; 4] = *b"TREE";
const MAX_ENTRIES: usize = 16;

pub const NODE_TYPE_GROUP: u8 = 0;
pub const NODE_TYPE_CHUNK: u8 = 1;

/// A chunk-index key: `{size, filter_mask, scaled_coords[rank+1]}`.
/// The trailing coordinate is always 0 (the element-size dimension).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChunkKey {
    pub scaled_coords: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct ChunkEntry {
    pub scaled_coords: Vec<u64>,
    pub chunk_size: u32,
    pub filter_mask: u32,
    pub address: u64,
}

/// Builds a chunk B-tree bottom-up from entries already sorted by scaled
/// coordinates, writing every node and returning the root's address.
pub fn build_chunk_index(writer: &mut Writer, offset_size: u8, rank: usize, entries: &[ChunkEntry]) -> u64 {
    assert!(!entries.is_empty(), "chunk index requires at least one chunk");

    // Leaf level: one node per <=16 entries.
    let mut level_nodes: Vec<(Vec<u64>, u64)> = Vec::new(); // (min scaled coords incl trailing 0, address)
    for group in entries.chunks(MAX_ENTRIES) {
        let addr = write_chunk_leaf(writer, offset_size, rank, group);
        let min_key = group[0].scaled_coords.clone();
        level_nodes.push((min_key, addr));
    }

    let mut level = 0u8;
    while level_nodes.len() > 1 {
        level += 1;
        let mut next_level = Vec::new();
        for group in level_nodes.chunks(MAX_ENTRIES) {
            let addr = write_internal_node(writer, offset_size, NODE_TYPE_CHUNK, level, group, rank + 1);
            next_level.push((group[0].0.clone(), addr));
        }
        level_nodes = next_level;
    }

    level_nodes[0].1
}

fn write_chunk_leaf(writer: &mut Writer, offset_size: u8, rank: usize, group: &[ChunkEntry]) -> u64 {
    let start = writer.position();
    writer.write_bytes(&SIGNATURE);
    writer.write_u8(NODE_TYPE_CHUNK);
    writer.write_u8(0); // level 0 = leaf
    writer.write_u16(group.len() as u16);
    writer.write_offset(offset_size, crate::address::UNDEFINED); // left sibling
    writer.write_offset(offset_size, crate::address::UNDEFINED); // right sibling

    for entry in group {
        write_chunk_key(writer, &entry.chunk_size, &entry.filter_mask, &entry.scaled_coords, rank);
        writer.write_offset(offset_size, entry.address);
    }
    // Trailing key: the maximum key of this leaf (one past the last entry),
    // matching the interleaved "entries+1 keys" framing.
    if let Some(last) = group.last() {
        write_chunk_key(writer, &0, &0, &bump_last_nonzero(&last.scaled_coords), rank);
    }
    start
}

fn bump_last_nonzero(coords: &[u64]) -> Vec<u64> {
    let mut v = coords.to_vec();
    if let Some(first) = v.first_mut() {
        *first += 1;
    }
    v
}

fn write_chunk_key(writer: &mut Writer, size: &u32, filter_mask: &u32, scaled_coords: &[u64], rank: usize) {
    writer.write_u32(*size);
    writer.write_u32(*filter_mask);
    for i in 0..=rank {
        writer.write_u64(*scaled_coords.get(i).unwrap_or(&0));
    }
}

fn write_internal_node(writer: &mut Writer, offset_size: u8, node_type: u8, level: u8, children: &[(Vec<u64>, u64)], key_dims: usize) -> u64 {
    let start = writer.position();
    writer.write_bytes(&SIGNATURE);
    writer.write_u8(node_type);
    writer.write_u8(level);
    writer.write_u16(children.len() as u16);
    writer.write_offset(offset_size, crate::address::UNDEFINED);
    writer.write_offset(offset_size, crate::address::UNDEFINED);

    for (key, addr) in children {
        write_chunk_key(writer, &0, &0, key, key_dims - 1);
        writer.write_offset(offset_size, *addr);
    }
    if let Some((key, _)) = children.last() {
        write_chunk_key(writer, &0, &0, &bump_last_nonzero(key), key_dims - 1);
    }
    start
}

/// Descends the chunk B-tree looking for the entry whose scaled coordinates
/// match exactly; returns `None` if the chunk is sparse (never written), in
/// which case the caller fills with the dataset's fill value.
pub fn lookup_chunk(reader: &mut Reader, offset_size: u8, root: u64, rank: usize, target: &[u64]) -> Result<Option<ChunkEntry>> {
    let mut addr = root;
    loop {
        reader.seek_address(addr)?;
        let sig = reader.read_exact(4)?;
        if sig != SIGNATURE {
            return Err(Hdf5Error::invalid_signature("btree::v1::lookup_chunk", addr, "TREE", &sig));
        }
        let _node_type = reader.read_u8()?;
        let level = reader.read_u8()?;
        let entries_used = reader.read_u16()? as usize;
        let _left = reader.read_offset(offset_size)?;
        let _right = reader.read_offset(offset_size)?;

        if level == 0 {
            for _ in 0..entries_used {
                let size = reader.read_u32()?;
                let filter_mask = reader.read_u32()?;
                let mut coords = Vec::with_capacity(rank + 1);
                for _ in 0..=rank {
                    coords.push(reader.read_u64()?);
                }
                let entry_addr = reader.read_offset(offset_size)?;
                if coords[..rank] == target[..rank] {
                    return Ok(Some(ChunkEntry { scaled_coords: coords, chunk_size: size, filter_mask, address: entry_addr }));
                }
            }
            return Ok(None);
        } else {
            let mut next = None;
            for i in 0..entries_used {
                let _size = reader.read_u32()?;
                let _filter_mask = reader.read_u32()?;
                let mut coords = Vec::with_capacity(rank + 1);
                for _ in 0..=rank {
                    coords.push(reader.read_u64()?);
                }
                let child_addr = reader.read_offset(offset_size)?;
                if coords[..rank] <= target[..rank] {
                    next = Some(child_addr);
                }
                let _ = i;
            }
            match next {
                Some(child) => addr = child,
                None => return Ok(None),
            }
        }
    }
}

/// Reads every leaf entry across the whole chunk B-tree, in on-disk order.
pub fn collect_all_chunks(reader: &mut Reader, offset_size: u8, root: u64, rank: usize) -> Result<Vec<ChunkEntry>> {
    let mut out = Vec::new();
    collect_chunks_rec(reader, offset_size, root, rank, &mut out)?;
    Ok(out)
}

fn collect_chunks_rec(reader: &mut Reader, offset_size: u8, addr: u64, rank: usize, out: &mut Vec<ChunkEntry>) -> Result<()> {
    reader.seek_address(addr)?;
    let sig = reader.read_exact(4)?;
    if sig != SIGNATURE {
        return Err(Hdf5Error::invalid_signature("btree::v1::collect_all_chunks", addr, "TREE", &sig));
    }
    let _node_type = reader.read_u8()?;
    let level = reader.read_u8()?;
    let entries_used = reader.read_u16()? as usize;
    let _left = reader.read_offset(offset_size)?;
    let _right = reader.read_offset(offset_size)?;

    if level == 0 {
        for _ in 0..entries_used {
            let size = reader.read_u32()?;
            let filter_mask = reader.read_u32()?;
            let mut coords = Vec::with_capacity(rank + 1);
            for _ in 0..=rank {
                coords.push(reader.read_u64()?);
            }
            let address = reader.read_offset(offset_size)?;
            out.push(ChunkEntry { scaled_coords: coords, chunk_size: size, filter_mask, address });
        }
    } else {
        let mut children = Vec::with_capacity(entries_used);
        for _ in 0..entries_used {
            let _size = reader.read_u32()?;
            let _filter_mask = reader.read_u32()?;
            for _ in 0..=rank {
                reader.read_u64()?;
            }
            children.push(reader.read_offset(offset_size)?);
        }
        for child in children {
            collect_chunks_rec(reader, offset_size, child, rank, out)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Symbol-table profile (node type 0): keys are link-name hashes.
// ---------------------------------------------------------------------

/// The H5-style name hash fold: `hash' = ((hash<<4) + codeunit)` with
/// a wraparound fold of the top nibble back into the low bits.
pub fn name_hash(name: &str) -> u64 {
    let mut hash: u64 = 0;
    for &byte in name.as_bytes() {
        hash = (hash << 4).wrapping_add(byte as u64);
        let g = hash & 0xF000_0000_0000_0000;
        if g != 0 {
            hash ^= g >> 56;
            hash ^= g;
        }
    }
    hash
}

#[derive(Debug, Clone)]
pub struct SymbolTableLeafEntry {
    pub hash: u64,
    pub snod_address: u64,
}

/// Writes a single-leaf symbol-table B-tree (sufficient for the group sizes
/// this crate's builder produces; see DESIGN.md for the single-level scope).
pub fn write_symbol_table_index(writer: &mut Writer, offset_size: u8, snod_address: u64, min_hash: u64, max_hash: u64) -> u64 {
    let start = writer.position();
    writer.write_bytes(&SIGNATURE);
    writer.write_u8(NODE_TYPE_GROUP);
    writer.write_u8(0); // leaf
    writer.write_u16(1); // one child: the single SNOD
    writer.write_offset(offset_size, crate::address::UNDEFINED);
    writer.write_offset(offset_size, crate::address::UNDEFINED);
    writer.write_u64(min_hash);
    writer.write_offset(offset_size, snod_address);
    writer.write_u64(max_hash.wrapping_add(1));
    start
}

pub fn read_symbol_table_index(reader: &mut Reader, offset_size: u8, root: u64) -> Result<Vec<u64>> {
    reader.seek_address(root)?;
    let sig = reader.read_exact(4)?;
    if sig != SIGNATURE {
        return Err(Hdf5Error::invalid_signature("btree::v1::read_symbol_table_index", root, "TREE", &sig));
    }
    let _node_type = reader.read_u8()?;
    let level = reader.read_u8()?;
    let entries_used = reader.read_u16()? as usize;
    let _left = reader.read_offset(offset_size)?;
    let _right = reader.read_offset(offset_size)?;

    let mut children = Vec::with_capacity(entries_used);
    if level == 0 {
        for _ in 0..entries_used {
            let _key = reader.read_u64()?;
            children.push(reader.read_offset(offset_size)?);
        }
    } else {
        for _ in 0..entries_used {
            let _key = reader.read_u64()?;
            let child = reader.read_offset(offset_size)?;
            children.extend(read_symbol_table_index(reader, offset_size, child)?);
        }
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_index_roundtrip_single_leaf() {
        let entries: Vec<ChunkEntry> = (0..4)
            .map(|i| ChunkEntry { scaled_coords: vec![i, 0], chunk_size: 100, filter_mask: 0, address: 1000 + i * 100 })
            .collect();
        let mut w = Writer::new();
        let root = build_chunk_index(&mut w, 8, 1, &entries);
        let mut r = Reader::new(w.into_bytes());
        let found = lookup_chunk(&mut r, 8, root, 1, &[2, 0]).unwrap().unwrap();
        assert_eq!(found.address, 1200);
        assert!(lookup_chunk(&mut r, 8, root, 1, &[9, 0]).unwrap().is_none());
    }

    #[test]
    fn chunk_index_multi_level() {
        let entries: Vec<ChunkEntry> = (0..40)
            .map(|i| ChunkEntry { scaled_coords: vec![i, 0], chunk_size: 10, filter_mask: 0, address: i * 10 })
            .collect();
        let mut w = Writer::new();
        let root = build_chunk_index(&mut w, 8, 1, &entries);
        let mut r = Reader::new(w.into_bytes());
        let all = collect_all_chunks(&mut r, 8, root, 1).unwrap();
        assert_eq!(all.len(), 40);
        let found = lookup_chunk(&mut r, 8, root, 1, &[35, 0]).unwrap().unwrap();
        assert_eq!(found.address, 350);
    }

    #[test]
    fn name_hash_is_stable() {
        assert_eq!(name_hash("foo"), name_hash("foo"));
        assert_ne!(name_hash("foo"), name_hash("bar"));
    }
}
