//! Dataspace codec. `{rank, dims[rank], maxdims[rank]?, permutation?}`.
//! Rank 0 is scalar; a null dataspace (flag bit, rank 0) carries no elements.

use crate::error::{Hdf5Error, Result};
use crate::io::{Reader, Writer};

const FLAG_MAX_DIMS: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataspaceKind {
    Scalar,
    Simple,
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataspace {
    pub kind: DataspaceKind,
    pub dims: Vec<u64>,
    pub max_dims: Option<Vec<u64>>,
    pub permutation: Option<Vec<u32>>,
}

impl Dataspace {
    pub fn simple(dims: Vec<u64>) -> Self {
        Dataspace { kind: DataspaceKind::Simple, dims, max_dims: None, permutation: None }
    }

    pub fn scalar() -> Self {
        Dataspace { kind: DataspaceKind::Scalar, dims: vec![], max_dims: None, permutation: None }
    }

    pub fn null() -> Self {
        Dataspace { kind: DataspaceKind::Null, dims: vec![], max_dims: None, permutation: None }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn total_elements(&self) -> u64 {
        if self.dims.is_empty() {
            match self.kind {
                DataspaceKind::Scalar => 1,
                _ => 0,
            }
        } else {
            self.dims.iter().product()
        }
    }

    pub fn decode(reader: &mut Reader) -> Result<Dataspace> {
        let version = reader.read_u8()?;
        if !(1..=2).contains(&version) {
            return Err(Hdf5Error::unsupported_version("Dataspace::decode", version as u32));
        }
        let rank = reader.read_u8()? as usize;
        let flags = reader.read_u8()?;
        let kind_byte = if version == 2 {
            reader.read_u8()?
        } else {
            reader.read_exact(5)?; // reserved
            0xFF // signal: derive kind from rank below (v1 has no explicit type byte)
        };

        let mut dims = Vec::with_capacity(rank);
        for _ in 0..rank {
            dims.push(reader.read_u64()?);
        }
        let max_dims = if flags & FLAG_MAX_DIMS != 0 {
            let mut v = Vec::with_capacity(rank);
            for _ in 0..rank {
                v.push(reader.read_u64()?);
            }
            Some(v)
        } else {
            None
        };

        let kind = if version == 2 {
            match kind_byte {
                0 => DataspaceKind::Scalar,
                1 => DataspaceKind::Simple,
                2 => DataspaceKind::Null,
                other => {
                    return Err(Hdf5Error::corrupted("Dataspace::decode", format!("unknown dataspace type {other}")))
                }
            }
        } else if rank == 0 {
            DataspaceKind::Scalar
        } else {
            DataspaceKind::Simple
        };

        Ok(Dataspace { kind, dims, max_dims, permutation: None })
    }

    pub fn encode(&self, writer: &mut Writer) {
        let flags = if self.max_dims.is_some() { FLAG_MAX_DIMS } else { 0 };
        // Version 1 has no explicit dataspace-type byte: a rank-0 dataspace
        // always decodes back as Scalar. A Null dataspace needs version 2's
        // type byte to round-trip, so it's the one kind that forces it.
        if self.kind == DataspaceKind::Null {
            writer.write_u8(2); // version
            writer.write_u8(self.rank() as u8);
            writer.write_u8(flags);
            writer.write_u8(2); // type: null
        } else {
            writer.write_u8(1); // version
            writer.write_u8(self.rank() as u8);
            writer.write_u8(flags);
            writer.write_zeros(5);
        }
        for d in &self.dims {
            writer.write_u64(*d);
        }
        if let Some(max_dims) = &self.max_dims {
            for d in max_dims {
                writer.write_u64(*d);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_ranks_0_to_8() {
        for rank in 0..=8usize {
            let dims: Vec<u64> = (1..=rank as u64).collect();
            let space = if rank == 0 { Dataspace::scalar() } else { Dataspace::simple(dims.clone()) };
            let mut w = Writer::new();
            space.encode(&mut w);
            let mut r = Reader::new(w.into_bytes());
            let back = Dataspace::decode(&mut r).unwrap();
            assert_eq!(back.dims, dims);
        }
    }

    #[test]
    fn null_dataspace_roundtrips() {
        let space = Dataspace::null();
        let mut w = Writer::new();
        space.encode(&mut w);
        let mut r = Reader::new(w.into_bytes());
        let back = Dataspace::decode(&mut r).unwrap();
        assert_eq!(back.kind, DataspaceKind::Null);
        assert_eq!(back.dims, Vec::<u64>::new());
    }

    #[test]
    fn max_dims_roundtrip() {
        let mut space = Dataspace::simple(vec![2, 3]);
        space.max_dims = Some(vec![2, u64::MAX]);
        let mut w = Writer::new();
        space.encode(&mut w);
        let mut r = Reader::new(w.into_bytes());
        let back = Dataspace::decode(&mut r).unwrap();
        assert_eq!(back.max_dims, space.max_dims);
    }
}
