//! Datatype codec. The first byte of every datatype payload encodes
//! `(version << 4) | class`. Readers dispatch on class; this writer always
//! emits version 1, except arrays (class 10, always version 2).

use crate::error::{Hdf5Error, Result};
use crate::io::{Reader, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringPadding {
    NullTerminate,
    NullPad,
    SpacePad,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Charset {
    Ascii,
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceKind {
    Object,
    Region,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VlenKind {
    Sequence,
    String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundMember {
    pub name: String,
    pub byte_offset: u32,
    pub datatype: Datatype,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

/// A datatype message payload, the format's 11 classes collapsed into one
/// tagged variant. Recursive for Compound/Array/Vlen.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    Integer { size: u8, signed: bool, order: ByteOrder },
    Float { size: u8, order: ByteOrder },
    Time { size: u8, order: ByteOrder },
    String { size: Option<u32>, padding: StringPadding, charset: Charset },
    Bitfield { size: u8, order: ByteOrder },
    Opaque { size: u32, tag: Option<String> },
    Compound { members: Vec<CompoundMember>, total_size: u32 },
    Reference { kind: ReferenceKind },
    Enumeration { base: Box<Datatype>, members: Vec<EnumMember> },
    Vlen { base: Box<Datatype>, kind: VlenKind },
    Array { base: Box<Datatype>, dims: Vec<u32> },
}

const CLASS_INTEGER: u8 = 0;
const CLASS_FLOAT: u8 = 1;
const CLASS_TIME: u8 = 2;
const CLASS_STRING: u8 = 3;
const CLASS_BITFIELD: u8 = 4;
const CLASS_OPAQUE: u8 = 5;
const CLASS_COMPOUND: u8 = 6;
const CLASS_REFERENCE: u8 = 7;
const CLASS_ENUM: u8 = 8;
const CLASS_VLEN: u8 = 9;
const CLASS_ARRAY: u8 = 10;

impl Datatype {
    pub fn size_bytes(&self) -> u32 {
        match self {
            Datatype::Integer { size, .. } => *size as u32,
            Datatype::Float { size, .. } => *size as u32,
            Datatype::Time { size, .. } => *size as u32,
            Datatype::String { size, .. } => size.unwrap_or(16),
            Datatype::Bitfield { size, .. } => *size as u32,
            Datatype::Opaque { size, .. } => *size,
            Datatype::Compound { total_size, .. } => *total_size,
            Datatype::Reference { kind } => match kind {
                ReferenceKind::Object => 8,
                ReferenceKind::Region => 12,
            },
            Datatype::Enumeration { base, .. } => base.size_bytes(),
            Datatype::Vlen { .. } => 16,
            Datatype::Array { base, dims } => base.size_bytes() * dims.iter().product::<u32>(),
        }
    }

    pub fn is_variable_length(&self) -> bool {
        matches!(self, Datatype::Vlen { .. }) || matches!(self, Datatype::String { size: None, .. })
    }

    pub fn decode(reader: &mut Reader) -> Result<Datatype> {
        let tag = reader.read_u8()?;
        let version = tag >> 4;
        let class = tag & 0x0F;

        let bit0 = reader.read_u8()?;
        let bit1 = reader.read_u8()?;
        let bit2 = reader.read_u8()?;

        match class {
            CLASS_INTEGER => {
                let size = reader.read_u32()? as u8;
                let order = if bit0 & 0x01 != 0 { ByteOrder::Big } else { ByteOrder::Little };
                let signed = bit0 & 0x08 != 0;
                Ok(Datatype::Integer { size, signed, order })
            }
            CLASS_FLOAT => {
                let size = reader.read_u32()? as u8;
                let order = if bit0 & 0x01 != 0 { ByteOrder::Big } else { ByteOrder::Little };
                // exponent location, exponent size, mantissa location, mantissa
                // size, u32 exponent bias: fixed by `size` on encode, but still
                // occupy 8 bytes on disk that a sequential reader must consume.
                reader.read_exact(4)?;
                reader.read_u32()?;
                Ok(Datatype::Float { size, order })
            }
            CLASS_TIME => {
                let size = reader.read_u32()? as u8;
                let order = if bit0 & 0x01 != 0 { ByteOrder::Big } else { ByteOrder::Little };
                Ok(Datatype::Time { size, order })
            }
            CLASS_STRING => {
                let padding = match bit0 & 0x0F {
                    0 => StringPadding::NullTerminate,
                    1 => StringPadding::NullPad,
                    2 => StringPadding::SpacePad,
                    other => {
                        return Err(Hdf5Error::UnsupportedDatatype {
                            operation: "Datatype::decode(string)",
                            details: format!("unknown padding type {other}"),
                            recovery_hints: vec![],
                        })
                    }
                };
                let charset = if (bit0 >> 4) & 0x0F == 1 { Charset::Utf8 } else { Charset::Ascii };
                let raw_size = reader.read_u32()?;
                let size = if raw_size == 0xFFFF_FFFF { None } else { Some(raw_size) };
                Ok(Datatype::String { size, padding, charset })
            }
            CLASS_BITFIELD => {
                let size = reader.read_u32()? as u8;
                let order = if bit0 & 0x01 != 0 { ByteOrder::Big } else { ByteOrder::Little };
                Ok(Datatype::Bitfield { size, order })
            }
            CLASS_OPAQUE => {
                let tag_len = bit0 as usize;
                let size = reader.read_u32()?;
                let tag = if tag_len > 0 {
                    let bytes = reader.read_exact(tag_len)?;
                    let s = String::from_utf8(bytes)
                        .map_err(|e| Hdf5Error::corrupted("Datatype::decode(opaque)", e.to_string()))?;
                    Some(s.trim_end_matches('\0').to_string())
                } else {
                    None
                };
                Ok(Datatype::Opaque { size, tag })
            }
            CLASS_COMPOUND => {
                // Number of members is packed into the bit-field bytes for
                // every version this reader implements (v3's own u16-count
                // form lands in the same two bytes in practice).
                let num_members = ((bit1 as u16) << 8 | bit0 as u16) as u32;
                let total_size = reader.read_u32()?;
                let _ = bit2;

                let mut members = Vec::with_capacity(num_members as usize);
                for _ in 0..num_members {
                    let name = reader.read_null_terminated(4096)?;
                    if version < 3 {
                        let pad = (8 - ((name.len() + 1) % 8)) % 8;
                        if pad > 0 {
                            reader.read_exact(pad)?;
                        }
                    }
                    let byte_offset = reader.read_u32()?;
                    let datatype = Datatype::decode(reader)?;
                    members.push(CompoundMember { name, byte_offset, datatype });
                }
                Ok(Datatype::Compound { members, total_size })
            }
            CLASS_REFERENCE => {
                let kind = match bit0 & 0x0F {
                    0 => ReferenceKind::Object,
                    1 => ReferenceKind::Region,
                    other => {
                        return Err(Hdf5Error::UnsupportedDatatype {
                            operation: "Datatype::decode(reference)",
                            details: format!("unknown reference kind {other}"),
                            recovery_hints: vec![],
                        })
                    }
                };
                Ok(Datatype::Reference { kind })
            }
            CLASS_ENUM => {
                let num_members = ((bit1 as u16) << 8 | bit0 as u16) as u32;
                let base = Box::new(Datatype::decode(reader)?);
                let base_size = base.size_bytes();
                let mut members = Vec::with_capacity(num_members as usize);
                for _ in 0..num_members {
                    let name = reader.read_null_terminated(4096)?;
                    let pad = (8 - ((name.len() + 1) % 8)) % 8;
                    if version < 3 && pad > 0 {
                        reader.read_exact(pad)?;
                    }
                    let value = read_sized_int(reader, base_size)?;
                    members.push(EnumMember { name, value });
                }
                Ok(Datatype::Enumeration { base, members })
            }
            CLASS_VLEN => {
                let kind = match bit0 & 0x0F {
                    1 => VlenKind::String,
                    _ => VlenKind::Sequence,
                };
                let base = Box::new(Datatype::decode(reader)?);
                Ok(Datatype::Vlen { base, kind })
            }
            CLASS_ARRAY => {
                let ndims = reader.read_u8()?;
                reader.read_exact(3)?; // reserved
                let mut dims = Vec::with_capacity(ndims as usize);
                for _ in 0..ndims {
                    dims.push(reader.read_u32()?);
                }
                if version == 1 {
                    // v1 also stores permutation indices, same count; this
                    // writer only ever emits v2+, which dropped that field.
                    for _ in 0..ndims {
                        reader.read_u32()?;
                    }
                }
                let base = Box::new(Datatype::decode(reader)?);
                Ok(Datatype::Array { base, dims })
            }
            other => Err(Hdf5Error::UnsupportedDatatype {
                operation: "Datatype::decode",
                details: format!("unknown class {other}"),
                recovery_hints: vec!["file may use a datatype class newer than this reader".into()],
            }),
        }
    }

    pub fn encode(&self, writer: &mut Writer) {
        match self {
            Datatype::Integer { size, signed, order } => {
                writer.write_u8(1 << 4 | CLASS_INTEGER);
                let bit0 = (if *order == ByteOrder::Big { 0x01 } else { 0 }) | (if *signed { 0x08 } else { 0 });
                writer.write_u8(bit0);
                writer.write_u8(0);
                writer.write_u8(0);
                writer.write_u32(*size as u32);
            }
            Datatype::Float { size, order } => {
                writer.write_u8(1 << 4 | CLASS_FLOAT);
                let bit0 = if *order == ByteOrder::Big { 0x01 } else { 0 };
                writer.write_u8(bit0);
                // mantissa/exponent location+size fields collapse to fixed
                // IEEE-754 layouts keyed by size; spelled out via bit1/bit2
                // as sign-bit-location (bit1) and exponent fields packed in bit2.
                if *size == 4 {
                    writer.write_u8(31); // sign bit location
                    writer.write_u8(20); // exponent location (low nibble) / mantissa (high)
                } else {
                    writer.write_u8(63);
                    writer.write_u8(52);
                }
                writer.write_u32(*size as u32);
                if *size == 4 {
                    writer.write_u8(23); // exponent location
                    writer.write_u8(8); // exponent size
                    writer.write_u8(0); // mantissa location
                    writer.write_u8(23); // mantissa size
                    writer.write_u32(127); // exponent bias
                } else {
                    writer.write_u8(52);
                    writer.write_u8(11);
                    writer.write_u8(0);
                    writer.write_u8(52);
                    writer.write_u32(1023);
                }
            }
            Datatype::Time { size, order } => {
                writer.write_u8(1 << 4 | CLASS_TIME);
                let bit0 = if *order == ByteOrder::Big { 0x01 } else { 0 };
                writer.write_u8(bit0);
                writer.write_u8(0);
                writer.write_u8(0);
                writer.write_u32(*size as u32);
            }
            Datatype::String { size, padding, charset } => {
                writer.write_u8(1 << 4 | CLASS_STRING);
                let pad_bits = match padding {
                    StringPadding::NullTerminate => 0,
                    StringPadding::NullPad => 1,
                    StringPadding::SpacePad => 2,
                };
                let charset_bits = match charset {
                    Charset::Ascii => 0,
                    Charset::Utf8 => 1,
                };
                writer.write_u8(pad_bits | (charset_bits << 4));
                writer.write_u8(0);
                writer.write_u8(0);
                writer.write_u32(size.unwrap_or(0xFFFF_FFFF));
            }
            Datatype::Bitfield { size, order } => {
                writer.write_u8(1 << 4 | CLASS_BITFIELD);
                let bit0 = if *order == ByteOrder::Big { 0x01 } else { 0 };
                writer.write_u8(bit0);
                writer.write_u8(0);
                writer.write_u8(0);
                writer.write_u32(*size as u32);
            }
            Datatype::Opaque { size, tag } => {
                writer.write_u8(1 << 4 | CLASS_OPAQUE);
                let tag_bytes = tag.as_deref().unwrap_or("");
                writer.write_u8(tag_bytes.len() as u8);
                writer.write_u8(0);
                writer.write_u8(0);
                writer.write_u32(*size);
                if !tag_bytes.is_empty() {
                    writer.write_bytes(tag_bytes.as_bytes());
                }
            }
            Datatype::Compound { members, total_size } => {
                writer.write_u8(1 << 4 | CLASS_COMPOUND);
                let n = members.len() as u16;
                writer.write_u8((n & 0xFF) as u8);
                writer.write_u8((n >> 8) as u8);
                writer.write_u8(0);
                writer.write_u32(*total_size);
                for member in members {
                    writer.write_null_terminated(&member.name);
                    let pad = (8 - ((member.name.len() + 1) % 8)) % 8;
                    writer.write_zeros(pad);
                    writer.write_u32(member.byte_offset);
                    member.datatype.encode(writer);
                }
            }
            Datatype::Reference { kind } => {
                writer.write_u8(1 << 4 | CLASS_REFERENCE);
                let bit0 = match kind {
                    ReferenceKind::Object => 0,
                    ReferenceKind::Region => 1,
                };
                writer.write_u8(bit0);
                writer.write_u8(0);
                writer.write_u8(0);
            }
            Datatype::Enumeration { base, members } => {
                writer.write_u8(1 << 4 | CLASS_ENUM);
                let n = members.len() as u16;
                writer.write_u8((n & 0xFF) as u8);
                writer.write_u8((n >> 8) as u8);
                writer.write_u8(0);
                base.encode(writer);
                let base_size = base.size_bytes();
                for member in members {
                    writer.write_null_terminated(&member.name);
                    let pad = (8 - ((member.name.len() + 1) % 8)) % 8;
                    writer.write_zeros(pad);
                    write_sized_int(writer, base_size, member.value);
                }
            }
            Datatype::Vlen { base, kind } => {
                writer.write_u8(1 << 4 | CLASS_VLEN);
                let bit0 = match kind {
                    VlenKind::Sequence => 0,
                    VlenKind::String => 1,
                };
                writer.write_u8(bit0);
                writer.write_u8(0);
                writer.write_u8(0);
                base.encode(writer);
            }
            Datatype::Array { base, dims } => {
                writer.write_u8(2 << 4 | CLASS_ARRAY);
                writer.write_u8(0);
                writer.write_u8(0);
                writer.write_u8(0);
                writer.write_u8(dims.len() as u8);
                writer.write_zeros(3);
                for d in dims {
                    writer.write_u32(*d);
                }
                base.encode(writer);
            }
        }
    }
}

fn read_sized_int(reader: &mut Reader, size: u32) -> Result<i64> {
    Ok(match size {
        1 => reader.read_i8()? as i64,
        2 => reader.read_i16()? as i64,
        4 => reader.read_i32()? as i64,
        8 => reader.read_i64()?,
        other => {
            return Err(Hdf5Error::UnsupportedDatatype {
                operation: "Datatype::decode(enum value)",
                details: format!("unsupported base-type size {other}"),
                recovery_hints: vec![],
            })
        }
    })
}

fn write_sized_int(writer: &mut Writer, size: u32, value: i64) {
    match size {
        1 => writer.write_i8(value as i8),
        2 => writer.write_i16(value as i16),
        4 => writer.write_i32(value as i32),
        _ => writer.write_i64(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(dt: &Datatype) -> Datatype {
        let mut w = Writer::new();
        dt.encode(&mut w);
        let mut r = Reader::new(w.into_bytes());
        Datatype::decode(&mut r).unwrap()
    }

    #[test]
    fn integer_roundtrip() {
        for size in [1u8, 2, 4, 8] {
            for signed in [true, false] {
                let dt = Datatype::Integer { size, signed, order: ByteOrder::Little };
                assert_eq!(roundtrip(&dt), dt);
            }
        }
    }

    #[test]
    fn float_roundtrip() {
        for size in [4u8, 8] {
            let dt = Datatype::Float { size, order: ByteOrder::Little };
            assert_eq!(roundtrip(&dt), dt);
        }
    }

    #[test]
    fn string_roundtrip_fixed_and_variable() {
        let fixed = Datatype::String { size: Some(16), padding: StringPadding::NullPad, charset: Charset::Ascii };
        assert_eq!(roundtrip(&fixed), fixed);

        let vlen = Datatype::String { size: None, padding: StringPadding::NullTerminate, charset: Charset::Utf8 };
        assert_eq!(roundtrip(&vlen), vlen);
    }

    #[test]
    fn compound_roundtrip() {
        let dt = Datatype::Compound {
            members: vec![
                CompoundMember { name: "id".into(), byte_offset: 0, datatype: Datatype::Integer { size: 8, signed: true, order: ByteOrder::Little } },
                CompoundMember { name: "value".into(), byte_offset: 8, datatype: Datatype::Float { size: 8, order: ByteOrder::Little } },
            ],
            total_size: 16,
        };
        assert_eq!(roundtrip(&dt), dt);
    }

    /// A Float member that isn't last exercises the shared reader staying in
    /// sync across members: if Float decode consumed fewer bytes than Float
    /// encode wrote, the next member's name would be read from the wrong offset.
    #[test]
    fn compound_roundtrip_with_non_terminal_float_member() {
        let dt = Datatype::Compound {
            members: vec![
                CompoundMember { name: "value".into(), byte_offset: 0, datatype: Datatype::Float { size: 8, order: ByteOrder::Little } },
                CompoundMember { name: "id".into(), byte_offset: 8, datatype: Datatype::Integer { size: 8, signed: true, order: ByteOrder::Little } },
            ],
            total_size: 16,
        };
        assert_eq!(roundtrip(&dt), dt);
    }

    #[test]
    fn enum_roundtrip() {
        let dt = Datatype::Enumeration {
            base: Box::new(Datatype::Integer { size: 4, signed: true, order: ByteOrder::Little }),
            members: vec![
                EnumMember { name: "RED".into(), value: 0 },
                EnumMember { name: "BLUE".into(), value: 1 },
            ],
        };
        assert_eq!(roundtrip(&dt), dt);
    }

    #[test]
    fn array_roundtrip() {
        let dt = Datatype::Array {
            base: Box::new(Datatype::Integer { size: 4, signed: false, order: ByteOrder::Little }),
            dims: vec![2, 3],
        };
        assert_eq!(roundtrip(&dt), dt);
        assert_eq!(dt.size_bytes(), 24);
    }

    #[test]
    fn vlen_roundtrip() {
        let dt = Datatype::Vlen { base: Box::new(Datatype::Integer { size: 4, signed: true, order: ByteOrder::Little }), kind: VlenKind::Sequence };
        assert_eq!(roundtrip(&dt), dt);
        assert_eq!(dt.size_bytes(), 16);
    }
}
