//! Attribute message codec: `{name, datatype, dataspace, value
//! bytes}`, each section individually padded to an 8-byte boundary in
//! version 1 (the only version this crate emits; version 2/3 read support
//! simply skips the name/datatype padding).

use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::Result;
use crate::io::{Reader, Writer};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub value_bytes: Vec<u8>,
}

impl Attribute {
    pub fn scalar(name: impl Into<String>, value: &Value) -> Attribute {
        let datatype = value.infer_datatype();
        let mut value_bytes = Vec::new();
        value.encode(&datatype, &mut value_bytes);
        Attribute { name: name.into(), datatype, dataspace: Dataspace::scalar(), value_bytes }
    }

    pub fn decode(reader: &mut Reader) -> Result<Attribute> {
        let version = reader.read_u8()?;
        let _flags_or_reserved = reader.read_u8()?;
        let name_size = reader.read_u16()? as usize;
        let datatype_size = reader.read_u16()? as usize;
        let dataspace_size = reader.read_u16()? as usize;

        let mut name_bytes = reader.read_exact(name_size)?;
        if version == 1 {
            pad_to_8(&mut name_bytes, reader)?;
        }
        let name = String::from_utf8_lossy(&name_bytes)
            .trim_end_matches('\0')
            .to_string();

        let datatype_bytes = reader.read_exact(datatype_size)?;
        if version == 1 {
            let consumed = datatype_bytes.len();
            skip_pad_8(reader, consumed)?;
        }
        let mut dt_reader = Reader::new(datatype_bytes);
        let datatype = Datatype::decode(&mut dt_reader)?;

        let dataspace_bytes = reader.read_exact(dataspace_size)?;
        if version == 1 {
            let consumed = dataspace_bytes.len();
            skip_pad_8(reader, consumed)?;
        }
        let mut ds_reader = Reader::new(dataspace_bytes);
        let dataspace = Dataspace::decode(&mut ds_reader)?;

        let element_count = dataspace.total_elements().max(1);
        let value_bytes = reader.read_exact((datatype.size_bytes() as u64 * element_count) as usize)?;

        Ok(Attribute { name, datatype, dataspace, value_bytes })
    }

    pub fn encode(&self, writer: &mut Writer) {
        writer.write_u8(1); // version
        writer.write_u8(0); // reserved
        let name_field = writer.position();
        writer.write_u16(0);
        let dt_field = writer.position();
        writer.write_u16(0);
        let ds_field = writer.position();
        writer.write_u16(0);

        let name_start = writer.position();
        writer.write_null_terminated(&self.name);
        writer.align(8);
        let name_len = writer.position() - name_start;

        let dt_start = writer.position();
        self.datatype.encode(writer);
        writer.align(8);
        let dt_len = writer.position() - dt_start;

        let ds_start = writer.position();
        self.dataspace.encode(writer);
        writer.align(8);
        let ds_len = writer.position() - ds_start;

        writer.write_bytes(&self.value_bytes);

        writer_patch_u16(writer, name_field, name_len as u16);
        writer_patch_u16(writer, dt_field, dt_len as u16);
        writer_patch_u16(writer, ds_field, ds_len as u16);
    }
}

fn writer_patch_u16(writer: &mut Writer, offset: u64, v: u16) {
    writer.patch_at(offset, &v.to_le_bytes());
}

fn pad_to_8(bytes: &mut [u8], reader: &mut Reader) -> Result<()> {
    let pad = (8 - (bytes.len() % 8)) % 8;
    if pad > 0 {
        reader.read_exact(pad)?;
    }
    Ok(())
}

fn skip_pad_8(reader: &mut Reader, consumed: usize) -> Result<()> {
    let pad = (8 - (consumed % 8)) % 8;
    if pad > 0 {
        reader.read_exact(pad)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_attribute_roundtrip() {
        let attr = Attribute::scalar("units", &Value::Str("meters".to_string()));
        let mut w = Writer::new();
        attr.encode(&mut w);
        let mut r = Reader::new(w.into_bytes());
        let back = Attribute::decode(&mut r).unwrap();
        assert_eq!(back.name, "units");
        assert_eq!(back.value_bytes.len(), attr.value_bytes.len());
    }

    #[test]
    fn integer_attribute_roundtrip() {
        let attr = Attribute::scalar("version", &Value::I32(3));
        let mut w = Writer::new();
        attr.encode(&mut w);
        let mut r = Reader::new(w.into_bytes());
        let back = Attribute::decode(&mut r).unwrap();
        assert_eq!(Value::decode(&back.datatype, &back.value_bytes), Value::I32(3));
    }
}
