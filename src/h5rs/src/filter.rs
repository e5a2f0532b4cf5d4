//! Filter pipeline. An ordered chain of encoders applied per chunk on
//! write and decoded in reverse per chunk on read. DEFLATE is delegated to
//! `flate2`; LZF has no mainstream
//! crate and is small enough to implement directly behind the same
//! capability interface.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Hdf5Error, Result};
use crate::io::{Reader, Writer};

pub const FILTER_DEFLATE: u16 = 1;
pub const FILTER_LZF: u16 = 32000;

/// The ratio below which a compressed chunk is kept; chunks that don't shrink
/// past this are stored raw.
pub const SKIP_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, PartialEq)]
pub struct FilterDescriptor {
    pub id: u16,
    pub name: Option<String>,
    pub flags: u16,
    pub client_data: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPipeline {
    pub filters: Vec<FilterDescriptor>,
}

impl FilterPipeline {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn gzip(level: u32) -> Self {
        FilterPipeline {
            filters: vec![FilterDescriptor { id: FILTER_DEFLATE, name: None, flags: 0, client_data: vec![level] }],
        }
    }

    pub fn lzf() -> Self {
        FilterPipeline { filters: vec![FilterDescriptor { id: FILTER_LZF, name: None, flags: 0, client_data: vec![] }] }
    }

    /// Applies every filter in order; on chunk-size overflow past
    /// [`SKIP_THRESHOLD`] the original bytes are kept and the corresponding
    /// `filter_mask` bit is set.
    pub fn encode_chunk(&self, data: &[u8]) -> (Vec<u8>, u32) {
        let mut bytes = data.to_vec();
        let mut mask = 0u32;
        for (i, filter) in self.filters.iter().enumerate() {
            let encoded = encode_one(filter, &bytes);
            if (encoded.len() as f64) >= SKIP_THRESHOLD * (bytes.len() as f64) {
                mask |= 1 << i;
                // keep `bytes` as-is; this filter is skipped for this chunk.
            } else {
                bytes = encoded;
            }
        }
        (bytes, mask)
    }

    /// Reverses the pipeline on read, honoring the per-chunk filter mask.
    pub fn decode_chunk(&self, data: &[u8], filter_mask: u32, uncompressed_size: usize) -> Result<Vec<u8>> {
        let mut bytes = data.to_vec();
        for (i, filter) in self.filters.iter().enumerate().rev() {
            if filter_mask & (1 << i) != 0 {
                continue;
            }
            bytes = decode_one(filter, &bytes)?;
        }
        if bytes.len() != uncompressed_size {
            return Err(Hdf5Error::corrupted(
                "FilterPipeline::decode_chunk",
                format!("decoded chunk is {} bytes, expected {uncompressed_size}", bytes.len()),
            ));
        }
        Ok(bytes)
    }

    pub fn decode(reader: &mut Reader) -> Result<FilterPipeline> {
        let version = reader.read_u8()?;
        if version != 1 && version != 2 {
            return Err(Hdf5Error::unsupported_version("FilterPipeline::decode", version as u32));
        }
        let num_filters = reader.read_u8()?;
        if version == 1 {
            reader.read_exact(6)?; // reserved
        } else {
            reader.read_exact(2)?; // reserved
        }
        let mut filters = Vec::with_capacity(num_filters as usize);
        for _ in 0..num_filters {
            let id = reader.read_u16()?;
            let name_len = if version == 1 || id >= 256 { reader.read_u16()? } else { 0 };
            let flags = reader.read_u16()?;
            let num_client_values = reader.read_u16()?;
            let name = if name_len > 0 {
                let bytes = reader.read_exact(name_len as usize)?;
                Some(String::from_utf8_lossy(&bytes).trim_end_matches('\0').to_string())
            } else {
                None
            };
            let mut client_data = Vec::with_capacity(num_client_values as usize);
            for _ in 0..num_client_values {
                client_data.push(reader.read_u32()?);
            }
            if version == 1 && num_client_values % 2 == 1 {
                reader.read_u32()?; // padding value to keep entry 8-byte aligned
            }
            filters.push(FilterDescriptor { id, name, flags, client_data });
        }
        Ok(FilterPipeline { filters })
    }

    pub fn encode(&self, writer: &mut Writer) {
        writer.write_u8(2); // version
        writer.write_u8(self.filters.len() as u8);
        writer.write_zeros(2);
        for filter in &self.filters {
            writer.write_u16(filter.id);
            if filter.id >= 256 {
                let name = filter.name.as_deref().unwrap_or("");
                writer.write_u16((name.len() + 1) as u16);
            }
            writer.write_u16(filter.flags);
            writer.write_u16(filter.client_data.len() as u16);
            if let Some(name) = &filter.name {
                if filter.id >= 256 {
                    writer.write_null_terminated(name);
                }
            }
            for v in &filter.client_data {
                writer.write_u32(*v);
            }
        }
    }
}

fn encode_one(filter: &FilterDescriptor, data: &[u8]) -> Vec<u8> {
    match filter.id {
        FILTER_DEFLATE => {
            let level = filter.client_data.first().copied().unwrap_or(6).min(9);
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
            encoder.write_all(data).expect("in-memory zlib encode cannot fail");
            encoder.finish().expect("in-memory zlib finish cannot fail")
        }
        FILTER_LZF => lzf_compress(data),
        _ => data.to_vec(),
    }
}

fn decode_one(filter: &FilterDescriptor, data: &[u8]) -> Result<Vec<u8>> {
    match filter.id {
        FILTER_DEFLATE => {
            let mut decoder = ZlibDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| Hdf5Error::DecompressionError {
                    operation: "FilterPipeline::decode_chunk(deflate)",
                    details: e.to_string(),
                    recovery_hints: vec!["chunk bytes may be truncated or corrupted".into()],
                })?;
            Ok(out)
        }
        FILTER_LZF => lzf_decompress(data).map_err(|details| Hdf5Error::DecompressionError {
            operation: "FilterPipeline::decode_chunk(lzf)",
            details,
            recovery_hints: vec!["chunk bytes may be truncated or corrupted".into()],
        }),
        other => Err(Hdf5Error::UnsupportedFeature {
            operation: "FilterPipeline::decode_chunk",
            details: format!("unimplemented filter id {other}"),
            recovery_hints: vec!["only DEFLATE (1) and LZF (32000) are implemented".into()],
        }),
    }
}

/// Minimal LZF compressor (liblzf-compatible framing): literal runs and
/// back-references encoded as `{ctrl, ...}` per the classic LZF byte layout.
fn lzf_compress(input: &[u8]) -> Vec<u8> {
    const MAX_LITERAL: usize = 32;
    const MAX_OFF: usize = 1 << 13;
    const MAX_REF: usize = 264;

    let mut out = Vec::with_capacity(input.len());
    let mut literal_start = 0usize;
    let mut i = 0usize;
    let n = input.len();

    let flush_literal = |out: &mut Vec<u8>, start: usize, end: usize| {
        let mut s = start;
        while s < end {
            let len = (end - s).min(MAX_LITERAL);
            out.push((len - 1) as u8);
            out.extend_from_slice(&input[s..s + len]);
            s += len;
        }
    };

    while i + 2 < n {
        let mut best_len = 0usize;
        let mut best_off = 0usize;
        let search_start = i.saturating_sub(MAX_OFF);
        let mut j = i;
        while j > search_start {
            j -= 1;
            if input[j] == input[i] {
                let mut len = 0usize;
                while i + len < n && len < MAX_REF && input[j + len] == input[i + len] {
                    len += 1;
                }
                if len > best_len {
                    best_len = len;
                    best_off = i - j - 1;
                }
            }
        }

        if best_len >= 3 {
            flush_literal(&mut out, literal_start, i);
            let len = best_len - 2;
            if len < 7 {
                out.push(((len << 5) as u8) | ((best_off >> 8) as u8));
            } else {
                out.push((7 << 5) | ((best_off >> 8) as u8));
                out.push((len - 7) as u8);
            }
            out.push((best_off & 0xFF) as u8);
            i += best_len;
            literal_start = i;
        } else {
            i += 1;
        }
    }
    flush_literal(&mut out, literal_start, n);
    out
}

fn lzf_decompress(input: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut out = Vec::new();
    let mut i = 0usize;
    let n = input.len();
    while i < n {
        let ctrl = input[i] as usize;
        i += 1;
        if ctrl < 0x20 {
            let len = ctrl + 1;
            if i + len > n {
                return Err("truncated literal run".into());
            }
            out.extend_from_slice(&input[i..i + len]);
            i += len;
        } else {
            let mut len = ctrl >> 5;
            if len == 7 {
                if i >= n {
                    return Err("truncated length extension".into());
                }
                len += input[i] as usize;
                i += 1;
            }
            if i >= n {
                return Err("truncated back-reference".into());
            }
            let off = ((ctrl & 0x1F) << 8) | input[i] as usize;
            i += 1;
            let start = out.len().checked_sub(off + 1).ok_or("back-reference before start of output")?;
            for k in 0..len + 2 {
                let byte = out[start + k];
                out.push(byte);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lzf_roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog the quick brown fox".to_vec();
        let compressed = lzf_compress(&data);
        let decompressed = lzf_decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn gzip_pipeline_roundtrip() {
        let pipeline = FilterPipeline::gzip(6);
        let data: Vec<u8> = (0..2000u32).flat_map(|x| x.to_le_bytes()).collect();
        let (encoded, mask) = pipeline.encode_chunk(&data);
        let decoded = pipeline.decode_chunk(&encoded, mask, data.len()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn incompressible_chunk_is_skipped() {
        let pipeline = FilterPipeline::gzip(6);
        // Random-ish bytes won't compress 10%; this still must round-trip and
        // set the mask bit for filter 0.
        let data: Vec<u8> = (0..64u32).map(|x| (x.wrapping_mul(2654435761) % 251) as u8).collect();
        let (encoded, mask) = pipeline.encode_chunk(&data);
        let decoded = pipeline.decode_chunk(&encoded, mask, data.len()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn pipeline_message_roundtrip() {
        let pipeline = FilterPipeline::gzip(9);
        let mut w = Writer::new();
        pipeline.encode(&mut w);
        let mut r = Reader::new(w.into_bytes());
        let back = FilterPipeline::decode(&mut r).unwrap();
        assert_eq!(back, pipeline);
    }
}
