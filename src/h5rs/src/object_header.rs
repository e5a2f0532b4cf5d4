//! Object header codec. Every addressable object (group or dataset)
//! is a prefix plus a list of 8-byte-aligned messages; a continuation
//! message chains to a further block of messages when the prefix's inline
//! area fills up.

use crate::error::{Hdf5Error, Result};
use crate::io::{Reader, Writer};

pub const V1_SIGNATURE_TOTAL_MESSAGES_VERSION: u8 = 1;
pub const V2_SIGNATURE: [u8; 4] = *b"OHDR";

pub const MSG_NIL: u16 = 0x0000;
pub const MSG_DATASPACE: u16 = 0x0001;
pub const MSG_LINK_INFO: u16 = 0x0002;
pub const MSG_DATATYPE: u16 = 0x0003;
pub const MSG_FILL_VALUE_OLD: u16 = 0x0004;
pub const MSG_FILL_VALUE: u16 = 0x0005;
pub const MSG_LINK: u16 = 0x0006;
pub const MSG_DATA_LAYOUT: u16 = 0x0008;
pub const MSG_GROUP_INFO: u16 = 0x000A;
pub const MSG_FILTER_PIPELINE: u16 = 0x000B;
pub const MSG_ATTRIBUTE: u16 = 0x000C;
pub const MSG_OBJECT_COMMENT: u16 = 0x000D;
pub const MSG_SYMBOL_TABLE: u16 = 0x0011;
pub const MSG_CONTINUATION: u16 = 0x0010;

/// A single message: a type tag plus its raw, already-padded payload. Higher
/// layers (`Datatype`, `Dataspace`, ...) decode the payload on demand rather
/// than this type owning every variant, mirroring how this codebase keeps
/// wire framing and semantic decoding in separate passes.
#[derive(Debug, Clone)]
pub struct Message {
    pub type_id: u16,
    pub flags: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectHeader {
    pub messages: Vec<Message>,
}

impl ObjectHeader {
    pub fn new() -> Self {
        ObjectHeader::default()
    }

    pub fn push(&mut self, type_id: u16, data: Vec<u8>) {
        self.messages.push(Message { type_id, flags: 0, data });
    }

    pub fn find(&self, type_id: u16) -> Option<&Message> {
        self.messages.iter().find(|m| m.type_id == type_id)
    }

    pub fn find_all<'a>(&'a self, type_id: u16) -> impl Iterator<Item = &'a Message> + 'a {
        self.messages.iter().filter(move |m| m.type_id == type_id)
    }

    /// Reads a v1 object header prefix: `{version, reserved, total_headers,
    /// object_ref_count, header_size}` followed by padded messages and any
    /// chained continuation blocks.
    pub fn decode_v1(reader: &mut Reader, offset_size: u8) -> Result<ObjectHeader> {
        let version = reader.read_u8()?;
        if version != V1_SIGNATURE_TOTAL_MESSAGES_VERSION {
            return Err(Hdf5Error::unsupported_version("ObjectHeader::decode_v1", version as u32));
        }
        reader.read_u8()?; // reserved
        let total_header_messages = reader.read_u16()? as usize;
        let _object_ref_count = reader.read_u32()?;
        let header_size = reader.read_u32()? as u64;
        reader.read_exact(4)?; // padding to 8-byte alignment

        let mut header = ObjectHeader::new();
        let block_end = reader.position() + header_size;
        read_message_block(reader, offset_size, block_end, total_header_messages, &mut header)?;
        Ok(header)
    }

    /// Reads a v2 object header (`OHDR` signature, optional times/max-compact
    /// fields gated by flag bits, then messages with a 1-byte size width
    /// chosen by the same flags).
    pub fn decode_v2(reader: &mut Reader, offset_size: u8) -> Result<ObjectHeader> {
        let sig = reader.read_exact(4)?;
        if sig != V2_SIGNATURE {
            return Err(Hdf5Error::invalid_signature("ObjectHeader::decode_v2", reader.position() - 4, "OHDR", &sig));
        }
        let _version = reader.read_u8()?;
        let flags = reader.read_u8()?;
        if flags & 0x20 != 0 {
            reader.read_exact(16)?; // access/mod/change/birth times
        }
        if flags & 0x10 != 0 {
            reader.read_exact(4)?; // max compact / min dense attribute counts
        }
        let size_of_chunk0 = match flags & 0x03 {
            0 => reader.read_u8()? as u64,
            1 => reader.read_u16()? as u64,
            2 => reader.read_u32()? as u64,
            _ => reader.read_u64()?,
        };

        let mut header = ObjectHeader::new();
        let block_end = reader.position() + size_of_chunk0;
        read_v2_message_block(reader, offset_size, block_end, flags, &mut header)?;
        Ok(header)
    }

    /// Emits a v1 object header containing every pushed message, padding and
    /// 8-byte-aligning each one. This crate never splits messages across a
    /// continuation block.
    pub fn encode_v1(&self, writer: &mut Writer) -> u64 {
        let start = writer.position();
        writer.write_u8(1); // version
        writer.write_u8(0); // reserved
        writer.write_u16(self.messages.len() as u16);
        writer.write_u32(1); // object reference count
        let size_field = writer.position();
        writer.write_u32(0); // patched below
        writer.write_zeros(4);

        let body_start = writer.position();
        for message in &self.messages {
            let mut padded = message.data.clone();
            while padded.len() % 8 != 0 {
                padded.push(0);
            }
            writer.write_u16(message.type_id);
            writer.write_u16(padded.len() as u16);
            writer.write_u8(message.flags);
            writer.write_zeros(3);
            writer.write_bytes(&padded);
        }
        let body_size = writer.position() - body_start;
        writer.patch_u32_at(size_field, body_size as u32);
        start
    }
}

fn read_message_block(reader: &mut Reader, offset_size: u8, block_end: u64, remaining_messages: usize, header: &mut ObjectHeader) -> Result<()> {
    let mut remaining = remaining_messages;
    while remaining > 0 && reader.position() < block_end {
        let type_id = reader.read_u16()?;
        let data_size = reader.read_u16()? as usize;
        let flags = reader.read_u8()?;
        reader.read_exact(3)?; // reserved
        let data = reader.read_exact(data_size)?;
        remaining -= 1;

        if type_id == MSG_CONTINUATION {
            let mut sub = Reader::new(data.clone());
            let cont_addr = sub.read_offset(offset_size)?;
            let cont_len = sub.read_offset(offset_size)?;
            reader.seek_address(cont_addr)?;
            let cont_end = reader.position() + cont_len;
            read_message_block(reader, offset_size, cont_end, remaining, header)?;
            return Ok(());
        }
        header.messages.push(Message { type_id, flags, data });
    }
    Ok(())
}

fn read_v2_message_block(reader: &mut Reader, offset_size: u8, block_end: u64, flags: u8, header: &mut ObjectHeader) -> Result<()> {
    let creation_order_tracked = flags & 0x04 != 0;
    while reader.position() + 4 <= block_end {
        let type_id = reader.read_u8()? as u16;
        let data_size = reader.read_u16()? as usize;
        let msg_flags = reader.read_u8()?;
        if creation_order_tracked {
            reader.read_exact(2)?;
        }
        let data = reader.read_exact(data_size)?;

        if type_id == MSG_CONTINUATION {
            let mut sub = Reader::new(data.clone());
            let cont_addr = sub.read_offset(offset_size)?;
            let cont_len = sub.read_offset(offset_size)?;
            reader.seek_address(cont_addr)?;
            let sig = reader.read_exact(4)?;
            if sig != *b"OCHK" {
                return Err(Hdf5Error::invalid_signature("ObjectHeader::decode_v2(continuation)", cont_addr, "OCHK", &sig));
            }
            let cont_end = reader.position() + cont_len - 4;
            read_v2_message_block(reader, offset_size, cont_end, flags, header)?;
            return Ok(());
        }
        header.messages.push(Message { type_id, flags: msg_flags, data });
    }
    Ok(())
}

/// A dataset carries Datatype+Dataspace+DataLayout; a group carries a
/// SymbolTable message or LinkInfo/GroupInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Group,
    Dataset,
}

pub fn classify(header: &ObjectHeader) -> Result<ObjectKind> {
    let has_dataset_messages =
        header.find(MSG_DATATYPE).is_some() && header.find(MSG_DATASPACE).is_some() && header.find(MSG_DATA_LAYOUT).is_some();
    let has_group_messages = header.find(MSG_SYMBOL_TABLE).is_some() || header.find(MSG_LINK_INFO).is_some() || header.find(MSG_GROUP_INFO).is_some();

    match (has_dataset_messages, has_group_messages) {
        (true, false) => Ok(ObjectKind::Dataset),
        (false, true) => Ok(ObjectKind::Group),
        _ => Err(Hdf5Error::corrupted("object_header::classify", "object header carries neither a coherent dataset nor group message set")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_roundtrip_and_classification() {
        let mut header = ObjectHeader::new();
        header.push(MSG_DATATYPE, vec![0u8; 8]);
        header.push(MSG_DATASPACE, vec![1, 0, 0, 0, 0, 0, 0, 0]);
        header.push(MSG_DATA_LAYOUT, vec![2u8; 16]);

        let mut w = Writer::new();
        let addr = header.encode_v1(&mut w);
        let mut r = Reader::new(w.into_bytes());
        r.seek(addr).unwrap();
        let back = ObjectHeader::decode_v1(&mut r, 8).unwrap();
        assert_eq!(back.messages.len(), 3);
        assert_eq!(classify(&back).unwrap(), ObjectKind::Dataset);
    }

    #[test]
    fn group_classification() {
        let mut header = ObjectHeader::new();
        header.push(MSG_SYMBOL_TABLE, vec![0u8; 16]);
        assert_eq!(classify(&header).unwrap(), ObjectKind::Group);
    }

    #[test]
    fn inconsistent_header_is_rejected() {
        let header = ObjectHeader::new();
        assert!(classify(&header).is_err());
    }
}
