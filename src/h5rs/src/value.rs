//! The in-memory element representation: a tagged variant
//! wide enough to round-trip every datatype class this crate writes, used at
//! the builder/reader boundary so callers never juggle raw bytes directly.

use crate::datatype::{ByteOrder, Datatype};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Record(Vec<Value>),
}

impl Value {
    /// Infers the datatype this value would be written as, for the simple
    /// homogeneous-array construction path the builder offers.
    pub fn infer_datatype(&self) -> Datatype {
        match self {
            Value::I8(_) => Datatype::Integer { size: 1, signed: true, order: ByteOrder::Little },
            Value::I16(_) => Datatype::Integer { size: 2, signed: true, order: ByteOrder::Little },
            Value::I32(_) => Datatype::Integer { size: 4, signed: true, order: ByteOrder::Little },
            Value::I64(_) => Datatype::Integer { size: 8, signed: true, order: ByteOrder::Little },
            Value::U8(_) => Datatype::Integer { size: 1, signed: false, order: ByteOrder::Little },
            Value::U16(_) => Datatype::Integer { size: 2, signed: false, order: ByteOrder::Little },
            Value::U32(_) => Datatype::Integer { size: 4, signed: false, order: ByteOrder::Little },
            Value::U64(_) => Datatype::Integer { size: 8, signed: false, order: ByteOrder::Little },
            Value::F32(_) => Datatype::Float { size: 4, order: ByteOrder::Little },
            Value::F64(_) => Datatype::Float { size: 8, order: ByteOrder::Little },
            Value::Bool(_) => Datatype::Integer { size: 1, signed: false, order: ByteOrder::Little },
            Value::Str(s) => Datatype::String {
                size: Some(s.len() as u32 + 1),
                padding: crate::datatype::StringPadding::NullPad,
                charset: crate::datatype::Charset::Utf8,
            },
            Value::Record(fields) => {
                let mut offset = 0u32;
                let members = fields
                    .iter()
                    .enumerate()
                    .map(|(i, field)| {
                        let datatype = field.infer_datatype();
                        let member = crate::datatype::CompoundMember {
                            name: format!("field{i}"),
                            byte_offset: offset,
                            datatype: datatype.clone(),
                        };
                        offset += datatype.size_bytes();
                        member
                    })
                    .collect::<Vec<_>>();
                Datatype::Compound { members, total_size: offset }
            }
        }
    }

    /// Encodes this value's bytes according to `datatype`, used for both
    /// fixed-size fields and (via the caller) vlen/string payloads.
    pub fn encode(&self, datatype: &Datatype, out: &mut Vec<u8>) {
        match (self, datatype) {
            (Value::I8(v), _) => out.push(*v as u8),
            (Value::I16(v), _) => out.extend_from_slice(&v.to_le_bytes()),
            (Value::I32(v), _) => out.extend_from_slice(&v.to_le_bytes()),
            (Value::I64(v), _) => out.extend_from_slice(&v.to_le_bytes()),
            (Value::U8(v), _) => out.push(*v),
            (Value::U16(v), _) => out.extend_from_slice(&v.to_le_bytes()),
            (Value::U32(v), _) => out.extend_from_slice(&v.to_le_bytes()),
            (Value::U64(v), _) => out.extend_from_slice(&v.to_le_bytes()),
            (Value::F32(v), _) => out.extend_from_slice(&v.to_le_bytes()),
            (Value::F64(v), _) => out.extend_from_slice(&v.to_le_bytes()),
            (Value::Bool(v), _) => out.push(if *v { 1 } else { 0 }),
            (Value::Str(s), Datatype::String { size: Some(size), .. }) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.resize(*size as usize, 0);
                out.extend_from_slice(&bytes);
            }
            (Value::Str(s), _) => out.extend_from_slice(s.as_bytes()),
            (Value::Record(fields), Datatype::Compound { members, .. }) => {
                for (field, member) in fields.iter().zip(members) {
                    field.encode(&member.datatype, out);
                }
            }
            (Value::Record(fields), _) => {
                for field in fields {
                    let dt = field.infer_datatype();
                    field.encode(&dt, out);
                }
            }
        }
    }

    pub fn decode(datatype: &Datatype, bytes: &[u8]) -> Value {
        match datatype {
            Datatype::Integer { size: 1, signed: true, .. } => Value::I8(bytes[0] as i8),
            Datatype::Integer { size: 1, signed: false, .. } => Value::U8(bytes[0]),
            Datatype::Integer { size: 2, signed: true, .. } => Value::I16(i16::from_le_bytes(bytes[..2].try_into().unwrap())),
            Datatype::Integer { size: 2, signed: false, .. } => Value::U16(u16::from_le_bytes(bytes[..2].try_into().unwrap())),
            Datatype::Integer { size: 4, signed: true, .. } => Value::I32(i32::from_le_bytes(bytes[..4].try_into().unwrap())),
            Datatype::Integer { size: 4, signed: false, .. } => Value::U32(u32::from_le_bytes(bytes[..4].try_into().unwrap())),
            Datatype::Integer { size: 8, signed: true, .. } => Value::I64(i64::from_le_bytes(bytes[..8].try_into().unwrap())),
            Datatype::Integer { size: 8, signed: false, .. } => Value::U64(u64::from_le_bytes(bytes[..8].try_into().unwrap())),
            Datatype::Integer { size, signed, .. } => {
                let mut buf = [0u8; 8];
                buf[..*size as usize].copy_from_slice(&bytes[..*size as usize]);
                let raw = u64::from_le_bytes(buf);
                if *signed {
                    Value::I64(raw as i64)
                } else {
                    Value::U64(raw)
                }
            }
            Datatype::Float { size: 4, .. } => Value::F32(f32::from_le_bytes(bytes[..4].try_into().unwrap())),
            Datatype::Float { .. } => Value::F64(f64::from_le_bytes(bytes[..8].try_into().unwrap_or([0; 8]))),
            Datatype::String { .. } => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Value::Str(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            Datatype::Compound { members, .. } => {
                let fields = members
                    .iter()
                    .map(|m| {
                        let size = m.datatype.size_bytes() as usize;
                        Value::decode(&m.datatype, &bytes[m.byte_offset as usize..m.byte_offset as usize + size])
                    })
                    .collect();
                Value::Record(fields)
            }
            Datatype::Bitfield { size, .. } | Datatype::Time { size, .. } => {
                let mut buf = [0u8; 8];
                buf[..*size as usize].copy_from_slice(&bytes[..*size as usize]);
                Value::U64(u64::from_le_bytes(buf))
            }
            Datatype::Enumeration { base, .. } => Value::decode(base, bytes),
            Datatype::Opaque { .. } => Value::Str(String::from_utf8_lossy(bytes).into_owned()),
            Datatype::Reference { .. } | Datatype::Vlen { .. } | Datatype::Array { .. } => {
                Value::U64(u64::from_le_bytes(bytes[..8.min(bytes.len())].try_into().unwrap_or([0; 8])))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrip() {
        let v = Value::I32(-42);
        let dt = v.infer_datatype();
        let mut bytes = Vec::new();
        v.encode(&dt, &mut bytes);
        assert_eq!(Value::decode(&dt, &bytes), v);
    }

    #[test]
    fn record_roundtrip() {
        let v = Value::Record(vec![Value::I64(7), Value::F64(2.5)]);
        let dt = v.infer_datatype();
        let mut bytes = Vec::new();
        v.encode(&dt, &mut bytes);
        assert_eq!(Value::decode(&dt, &bytes), v);
    }
}
