//! Byte I/O primitives. Little-endian primitives over a random-access
//! in-memory buffer; the writer is fully buffered since the two-phase
//! address-patch algorithm requires random-access writes.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Hdf5Error, Result};

/// Random-access little-endian reader over an in-memory buffer.
///
/// Files are read into memory in full before parsing (mirroring how this
/// codebase's other binary-format front ends open their inputs), which keeps
/// every downstream address computation a plain `seek` rather than a
/// streaming decode.
pub struct Reader {
    cursor: Cursor<Vec<u8>>,
    /// The file offset at which the superblock's magic bytes were located;
    /// every stored (on-disk) address is relative to this and must be
    /// resolved through `seek_address` rather than a raw `seek`. Zero for
    /// sub-readers built over an already-extracted byte range.
    base_offset: u64,
}

impl Reader {
    pub fn new(bytes: Vec<u8>) -> Self {
        Reader { cursor: Cursor::new(bytes), base_offset: 0 }
    }

    /// Records the base offset discovered when locating the superblock, so
    /// that `seek_address` can resolve stored addresses correctly.
    pub fn set_base_offset(&mut self, base_offset: u64) {
        self.base_offset = base_offset;
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Hdf5Error::io("Reader::open", e))?;
        Ok(Reader::new(bytes))
    }

    pub fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.cursor
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Hdf5Error::io("Reader::seek", e))?;
        Ok(())
    }

    /// Seeks to a stored (on-disk) address, adding the base offset located
    /// with the superblock. Use this for every address read out of a
    /// superblock, object header, B-tree, or heap; use the raw `seek` only
    /// for the superblock locator's own signature probing.
    pub fn seek_address(&mut self, addr: u64) -> Result<()> {
        self.seek(self.base_offset + addr)
    }

    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|e| Hdf5Error::io("Reader::read_u8", e))
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.cursor.read_i8().map_err(|e| Hdf5Error::io("Reader::read_i8", e))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|e| Hdf5Error::io("Reader::read_u16", e))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.cursor
            .read_i16::<LittleEndian>()
            .map_err(|e| Hdf5Error::io("Reader::read_i16", e))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| Hdf5Error::io("Reader::read_u32", e))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.cursor
            .read_i32::<LittleEndian>()
            .map_err(|e| Hdf5Error::io("Reader::read_i32", e))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| Hdf5Error::io("Reader::read_u64", e))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.cursor
            .read_i64::<LittleEndian>()
            .map_err(|e| Hdf5Error::io("Reader::read_i64", e))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.cursor
            .read_f32::<LittleEndian>()
            .map_err(|e| Hdf5Error::io("Reader::read_f32", e))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.cursor
            .read_f64::<LittleEndian>()
            .map_err(|e| Hdf5Error::io("Reader::read_f64", e))
    }

    /// Reads an address field whose width is the superblock's offset-size.
    pub fn read_offset(&mut self, offset_size: u8) -> Result<u64> {
        match offset_size {
            4 => Ok(self.read_u32()? as u64),
            8 => self.read_u64(),
            n => Err(Hdf5Error::unsupported_version("Reader::read_offset", n as u32)),
        }
    }

    pub fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|e| Hdf5Error::io("Reader::read_exact", e))?;
        Ok(buf)
    }

    pub fn read_null_terminated(&mut self, max_len: usize) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
            if bytes.len() > max_len {
                return Err(Hdf5Error::corrupted(
                    "Reader::read_null_terminated",
                    format!("name exceeds {max_len} bytes without a terminator"),
                ));
            }
        }
        String::from_utf8(bytes).map_err(|e| Hdf5Error::corrupted("Reader::read_null_terminated", e.to_string()))
    }

    /// Builds a bounded sub-reader over `len` bytes starting at the current position,
    /// advancing past them in the parent reader.
    pub fn sub_reader(&mut self, len: usize) -> Result<Reader> {
        let bytes = self.read_exact(len)?;
        Ok(Reader::new(bytes))
    }
}

/// Fully buffered little-endian writer with backward patch support.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    pub fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.write_u16::<LittleEndian>(v).unwrap();
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.write_i16::<LittleEndian>(v).unwrap();
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.write_u32::<LittleEndian>(v).unwrap();
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.write_i32::<LittleEndian>(v).unwrap();
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.write_u64::<LittleEndian>(v).unwrap();
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.write_i64::<LittleEndian>(v).unwrap();
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.write_f32::<LittleEndian>(v).unwrap();
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.write_f64::<LittleEndian>(v).unwrap();
    }

    pub fn write_offset(&mut self, offset_size: u8, v: u64) {
        match offset_size {
            4 => self.write_u32(v as u32),
            _ => self.write_u64(v),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_zeros(&mut self, n: usize) {
        self.buf.extend(std::iter::repeat_n(0u8, n));
    }

    pub fn write_null_terminated(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Emits zero bytes until `position()` is a multiple of `modulus`.
    pub fn align(&mut self, modulus: usize) {
        let rem = self.buf.len() % modulus;
        if rem != 0 {
            self.write_zeros(modulus - rem);
        }
    }

    /// Overwrites `bytes` at an earlier offset without disturbing the write cursor.
    pub fn patch_at(&mut self, offset: u64, bytes: &[u8]) {
        let offset = offset as usize;
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn patch_u64_at(&mut self, offset: u64, v: u64) {
        self.patch_at(offset, &v.to_le_bytes());
    }

    pub fn patch_u32_at(&mut self, offset: u64, v: u32) {
        self.patch_at(offset, &v.to_le_bytes());
    }

    pub fn patch_offset_at(&mut self, offset: u64, offset_size: u8, v: u64) {
        match offset_size {
            4 => self.patch_u32_at(offset, v as u32),
            _ => self.patch_u64_at(offset, v),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Commits a finished writer buffer to `path` with atomic semantics:
/// write to a sibling temp file, `fsync`, then rename over the target.
/// The temp file is removed on any failure so no partial write is ever
/// visible at the target path.
pub fn commit_atomic(path: impl AsRef<std::path::Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Hdf5Error::io("commit_atomic", e))?;
    let result = tmp
        .write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all());
    match result {
        Ok(()) => tmp
            .persist(path)
            .map(|_| ())
            .map_err(|e| Hdf5Error::io("commit_atomic", e.error)),
        Err(e) => Err(Hdf5Error::io("commit_atomic", e)),
    }
}
