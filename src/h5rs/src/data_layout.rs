//! Data layout message payload: contiguous, compact, or chunked
//! storage. This crate emits version 3 payloads and reads versions 1-3.

use crate::error::{Hdf5Error, Result};
use crate::io::{Reader, Writer};

const CLASS_COMPACT: u8 = 0;
const CLASS_CONTIGUOUS: u8 = 1;
const CLASS_CHUNKED: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum DataLayout {
    Compact { data: Vec<u8> },
    Contiguous { address: u64, size: u64 },
    Chunked { btree_address: u64, chunk_dims: Vec<u32>, element_size: u32 },
}

impl DataLayout {
    pub fn decode(reader: &mut Reader, offset_size: u8, length_size: u8) -> Result<DataLayout> {
        let version = reader.read_u8()?;
        if !(1..=3).contains(&version) {
            return Err(Hdf5Error::unsupported_version("DataLayout::decode", version as u32));
        }

        if version < 3 {
            let dimensionality = reader.read_u8()?;
            let class = reader.read_u8()?;
            reader.read_exact(5)?; // reserved
            return decode_legacy(reader, offset_size, length_size, class, dimensionality);
        }

        let class = reader.read_u8()?;
        match class {
            CLASS_COMPACT => {
                let size = reader.read_u16()? as usize;
                let data = reader.read_exact(size)?;
                Ok(DataLayout::Compact { data })
            }
            CLASS_CONTIGUOUS => {
                let address = reader.read_offset(offset_size)?;
                let size = reader.read_offset(length_size)?;
                Ok(DataLayout::Contiguous { address, size })
            }
            CLASS_CHUNKED => {
                let dimensionality = reader.read_u8()?;
                let btree_address = reader.read_offset(offset_size)?;
                let mut chunk_dims = Vec::with_capacity(dimensionality as usize);
                for _ in 0..dimensionality {
                    chunk_dims.push(reader.read_u32()?);
                }
                let element_size = chunk_dims.pop().unwrap_or(1);
                Ok(DataLayout::Chunked { btree_address, chunk_dims, element_size })
            }
            other => Err(Hdf5Error::UnsupportedFeature {
                operation: "DataLayout::decode",
                details: format!("unknown layout class {other}"),
                recovery_hints: vec![],
            }),
        }
    }

    fn encode_class(&self) -> u8 {
        match self {
            DataLayout::Compact { .. } => CLASS_COMPACT,
            DataLayout::Contiguous { .. } => CLASS_CONTIGUOUS,
            DataLayout::Chunked { .. } => CLASS_CHUNKED,
        }
    }

    pub fn encode(&self, writer: &mut Writer, offset_size: u8, length_size: u8) {
        writer.write_u8(3); // version
        writer.write_u8(self.encode_class());
        match self {
            DataLayout::Compact { data } => {
                writer.write_u16(data.len() as u16);
                writer.write_bytes(data);
            }
            DataLayout::Contiguous { address, size } => {
                writer.write_offset(offset_size, *address);
                writer.write_offset(length_size, *size);
            }
            DataLayout::Chunked { btree_address, chunk_dims, element_size } => {
                writer.write_u8((chunk_dims.len() + 1) as u8);
                writer.write_offset(offset_size, *btree_address);
                for d in chunk_dims {
                    writer.write_u32(*d);
                }
                writer.write_u32(*element_size);
            }
        }
    }
}

fn decode_legacy(reader: &mut Reader, offset_size: u8, length_size: u8, class: u8, dimensionality: u8) -> Result<DataLayout> {
    match class {
        CLASS_COMPACT => {
            let size = reader.read_u32()? as usize;
            let data = reader.read_exact(size)?;
            Ok(DataLayout::Compact { data })
        }
        CLASS_CONTIGUOUS => {
            let address = reader.read_offset(offset_size)?;
            let mut dims = Vec::with_capacity(dimensionality as usize);
            for _ in 0..dimensionality {
                dims.push(reader.read_u32()?);
            }
            let size = dims.iter().map(|&d| d as u64).product::<u64>();
            Ok(DataLayout::Contiguous { address, size })
        }
        CLASS_CHUNKED => {
            let btree_address = reader.read_offset(offset_size)?;
            let mut chunk_dims = Vec::with_capacity(dimensionality as usize);
            for _ in 0..dimensionality {
                chunk_dims.push(reader.read_u32()?);
            }
            let element_size = chunk_dims.pop().unwrap_or(1);
            let _ = length_size;
            Ok(DataLayout::Chunked { btree_address, chunk_dims, element_size })
        }
        other => Err(Hdf5Error::UnsupportedFeature {
            operation: "DataLayout::decode(legacy)",
            details: format!("unknown layout class {other}"),
            recovery_hints: vec![],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_roundtrip() {
        let layout = DataLayout::Contiguous { address: 4096, size: 800 };
        let mut w = Writer::new();
        layout.encode(&mut w, 8, 8);
        let mut r = Reader::new(w.into_bytes());
        assert_eq!(DataLayout::decode(&mut r, 8, 8).unwrap(), layout);
    }

    #[test]
    fn chunked_roundtrip() {
        let layout = DataLayout::Chunked { btree_address: 2048, chunk_dims: vec![4, 4], element_size: 8 };
        let mut w = Writer::new();
        layout.encode(&mut w, 8, 8);
        let mut r = Reader::new(w.into_bytes());
        assert_eq!(DataLayout::decode(&mut r, 8, 8).unwrap(), layout);
    }

    #[test]
    fn compact_roundtrip() {
        let layout = DataLayout::Compact { data: vec![1, 2, 3, 4] };
        let mut w = Writer::new();
        layout.encode(&mut w, 8, 8);
        let mut r = Reader::new(w.into_bytes());
        assert_eq!(DataLayout::decode(&mut r, 8, 8).unwrap(), layout);
    }
}
