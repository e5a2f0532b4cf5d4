//! Superblock codec.
//!
//! ## Locator
//! Probes the 8-byte magic at file offsets {0, 512, 1024, 2048}; the matching
//! offset becomes the *base offset* that every other stored address is
//! relative to.

use crate::address::UNDEFINED;
use crate::error::{Hdf5Error, Result};
use crate::io::{Reader, Writer};

pub const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', 0x0D, 0x0A, 0x1A, 0x0A];

const PROBE_OFFSETS: [u64; 4] = [0, 512, 1024, 2048];

#[derive(Debug, Clone)]
pub struct SymbolTableEntryFields {
    pub link_name_offset: u64,
    pub object_header_address: u64,
    pub cache_type: u32,
    pub btree_address: u64,
    pub heap_address: u64,
}

#[derive(Debug, Clone)]
pub struct Superblock {
    pub version: u8,
    pub free_space_version: u8,
    pub root_group_version: u8,
    pub shared_header_version: u8,
    pub offset_size: u8,
    pub length_size: u8,
    pub group_leaf_k: u16,
    pub group_internal_k: u16,
    pub consistency_flags: u32,
    pub base_address: u64,
    pub free_space_info_address: u64,
    pub eof_address: u64,
    pub driver_block_address: u64,
    /// v0/v1 only: the root group's symbol-table entry embedded in the superblock.
    pub root_symbol_table_entry: Option<SymbolTableEntryFields>,
    /// v2/v3 only.
    pub superblock_ext_address: u64,
    pub root_group_object_header_address: u64,
    /// The file offset at which the magic bytes were found; every stored
    /// address is interpreted relative to this.
    pub base_offset: u64,
}

impl Superblock {
    /// Probes {0, 512, 1024, 2048} for the magic signature and parses the
    /// superblock found there.
    pub fn locate_and_parse(reader: &mut Reader) -> Result<Superblock> {
        for &offset in &PROBE_OFFSETS {
            if offset + 8 > reader.len() {
                break;
            }
            reader.seek(offset)?;
            let magic = reader.read_exact(8)?;
            if magic == SIGNATURE {
                return Superblock::parse_at(reader, offset);
            }
        }
        Err(Hdf5Error::invalid_signature("Superblock::locate_and_parse", 0, "HDF5 magic", &[]))
    }

    fn parse_at(reader: &mut Reader, base_offset: u64) -> Result<Superblock> {
        let version = reader.read_u8()?;
        match version {
            0 | 1 => Self::parse_v0_v1(reader, version, base_offset),
            2 | 3 => Self::parse_v2_v3(reader, version, base_offset),
            other => Err(Hdf5Error::unsupported_version("Superblock::parse", other as u32)),
        }
    }

    fn parse_v0_v1(reader: &mut Reader, version: u8, base_offset: u64) -> Result<Superblock> {
        let free_space_version = reader.read_u8()?;
        let root_group_version = reader.read_u8()?;
        let _reserved0 = reader.read_u8()?;
        let shared_header_version = reader.read_u8()?;
        let offset_size = reader.read_u8()?;
        let length_size = reader.read_u8()?;
        let _reserved1 = reader.read_u8()?;
        let group_leaf_k = reader.read_u16()?;
        let group_internal_k = reader.read_u16()?;
        let consistency_flags = reader.read_u32()?;
        if version == 1 {
            // Indexed storage internal node K + reserved, version-1 only addition.
            let _indexed_storage_internal_k = reader.read_u16()?;
            let _reserved2 = reader.read_u16()?;
        }
        let base_address = reader.read_offset(offset_size)?;
        let free_space_info_address = reader.read_offset(offset_size)?;
        let eof_address = reader.read_offset(offset_size)?;
        let driver_block_address = reader.read_offset(offset_size)?;

        let link_name_offset = reader.read_offset(offset_size)?;
        let object_header_address = reader.read_offset(offset_size)?;
        let cache_type = reader.read_u32()?;
        let _reserved3 = reader.read_u32()?;
        let btree_address = reader.read_offset(offset_size)?;
        let heap_address = reader.read_offset(offset_size)?;

        Ok(Superblock {
            version,
            free_space_version,
            root_group_version,
            shared_header_version,
            offset_size,
            length_size,
            group_leaf_k,
            group_internal_k,
            consistency_flags,
            base_address,
            free_space_info_address,
            eof_address,
            driver_block_address,
            root_group_object_header_address: object_header_address,
            root_symbol_table_entry: Some(SymbolTableEntryFields {
                link_name_offset,
                object_header_address,
                cache_type,
                btree_address,
                heap_address,
            }),
            superblock_ext_address: UNDEFINED,
            base_offset,
        })
    }

    fn parse_v2_v3(reader: &mut Reader, version: u8, base_offset: u64) -> Result<Superblock> {
        let offset_size = reader.read_u8()?;
        let length_size = reader.read_u8()?;
        let consistency_flags = reader.read_u8()? as u32;
        let base_address = reader.read_offset(offset_size)?;
        let superblock_ext_address = reader.read_offset(offset_size)?;
        let eof_address = reader.read_offset(offset_size)?;
        let root_group_object_header_address = reader.read_offset(offset_size)?;
        let _checksum = reader.read_u32()?;

        Ok(Superblock {
            version,
            free_space_version: 0,
            root_group_version: 0,
            shared_header_version: 0,
            offset_size,
            length_size,
            group_leaf_k: 0,
            group_internal_k: 0,
            consistency_flags,
            base_address,
            free_space_info_address: UNDEFINED,
            eof_address,
            driver_block_address: UNDEFINED,
            root_group_object_header_address,
            root_symbol_table_entry: None,
            superblock_ext_address,
            base_offset,
        })
    }

    /// Emits the 96-byte v0 superblock with placeholder root-group and eof
    /// addresses. Returns the file offsets of those two placeholders so the
    /// caller can patch them once known.
    pub fn emit_v0_placeholder(writer: &mut Writer, offset_size: u8, length_size: u8) -> (u64, u64) {
        writer.write_bytes(&SIGNATURE);
        writer.write_u8(0); // superblock version
        writer.write_u8(0); // free space version
        writer.write_u8(0); // root group version
        writer.write_u8(0); // reserved
        writer.write_u8(0); // shared header version
        writer.write_u8(offset_size);
        writer.write_u8(length_size);
        writer.write_u8(0); // reserved
        writer.write_u16(4); // group leaf k
        writer.write_u16(16); // group internal k
        writer.write_u32(0); // consistency flags
        writer.write_offset(offset_size, 0); // base address
        writer.write_offset(offset_size, UNDEFINED); // free space info address
        let eof_offset = writer.position();
        writer.write_offset(offset_size, 0); // eof address (patched)
        writer.write_offset(offset_size, UNDEFINED); // driver block address

        // Root group symbol table entry.
        writer.write_offset(offset_size, 0); // link name offset (root has none)
        let root_addr_offset = writer.position();
        writer.write_offset(offset_size, 0); // object header address (patched)
        writer.write_u32(0); // cache type
        writer.write_u32(0); // reserved
        writer.write_offset(offset_size, UNDEFINED); // scratch: btree address
        writer.write_offset(offset_size, UNDEFINED); // scratch: heap address

        (root_addr_offset, eof_offset)
    }
}
