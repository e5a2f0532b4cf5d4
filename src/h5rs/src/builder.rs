//! File builder: assembles an in-memory object tree and emits it as
//! a complete HDF5-compatible byte stream in a single bottom-up pass —
//! children are always written before the parent that references them, so
//! no address ever needs a forward patch except the superblock's own
//! root-group and end-of-file fields.

use std::collections::BTreeMap;

use crate::address::UNDEFINED;
use crate::attribute::Attribute;
use crate::btree::v1::{self as btree_v1, ChunkEntry};
use crate::chunk::{row_major_coords, row_major_offset, ChunkGrid};
use crate::data_layout::DataLayout;
use crate::dataspace::Dataspace;
use crate::datatype::{Charset, Datatype, StringPadding};
use crate::error::{Hdf5Error, Result};
use crate::filter::FilterPipeline;
use crate::group;
use crate::heap::{GlobalHeap, VlenReference};
use crate::io::{commit_atomic, Writer};
use crate::object_header::{self, ObjectHeader};
use crate::superblock::Superblock;

/// Tunable knobs for the emitted file. `offset_size`/`length_size`
/// mirror the superblock fields of the same name; every address and length
/// field in the file is written at this width.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub offset_size: u8,
    pub length_size: u8,
    pub metadata_cache_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options { offset_size: 8, length_size: 8, metadata_cache_capacity: 128 }
    }
}

/// A pending attribute: either already-encoded bytes, or a variable-length
/// string whose global-heap object is materialized at emit time, once a
/// writer is available to place the heap collection.
#[derive(Debug, Clone)]
enum AttributeSpec {
    Fixed(Attribute),
    VlenString { name: String, value: String },
}

#[derive(Debug, Clone)]
struct DatasetSpec {
    datatype: Datatype,
    dataspace: Dataspace,
    chunk_dims: Option<Vec<u64>>,
    filters: FilterPipeline,
    bytes: Vec<u8>,
    attributes: Vec<AttributeSpec>,
}

#[derive(Debug, Default)]
struct GroupSpec {
    attributes: Vec<AttributeSpec>,
    children: BTreeMap<String, Entry>,
}

#[derive(Debug)]
enum Entry {
    Group(GroupSpec),
    Dataset(DatasetSpec),
}

/// Builds a single HDF5-compatible file from an in-memory tree of groups and
/// datasets, then emits it in one pass.
pub struct FileBuilder {
    options: Options,
    root: GroupSpec,
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(Hdf5Error::InvalidDatasetName {
            operation: "FileBuilder::path",
            name: path.to_string(),
            details: "paths must be absolute (start with '/')".into(),
            recovery_hints: vec!["prefix the path with '/'".into()],
        });
    }
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Hdf5Error::InvalidDatasetName {
            operation: "FileBuilder::path",
            name: path.to_string(),
            details: "path segments must not be empty (no '//' or trailing '/')".into(),
            recovery_hints: vec![],
        });
    }
    if segments == [""] {
        return Ok(vec![]);
    }
    Ok(segments)
}

impl FileBuilder {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        FileBuilder { options, root: GroupSpec::default() }
    }

    /// Creates a contiguous dataset at `path`, creating any missing parent
    /// groups. Errors if a path segment collides with an existing dataset.
    pub fn create_dataset(&mut self, path: &str, datatype: Datatype, dataspace: Dataspace, bytes: Vec<u8>) -> Result<()> {
        self.create_dataset_inner(path, datatype, dataspace, None, FilterPipeline::default(), bytes)
    }

    /// Creates a chunked (optionally filtered) dataset at `path`.
    pub fn create_chunked_dataset(
        &mut self,
        path: &str,
        datatype: Datatype,
        dataspace: Dataspace,
        chunk_dims: Vec<u64>,
        filters: FilterPipeline,
        bytes: Vec<u8>,
    ) -> Result<()> {
        self.create_dataset_inner(path, datatype, dataspace, Some(chunk_dims), filters, bytes)
    }

    fn create_dataset_inner(
        &mut self,
        path: &str,
        datatype: Datatype,
        dataspace: Dataspace,
        chunk_dims: Option<Vec<u64>>,
        filters: FilterPipeline,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let segments = split_path(path)?;
        let (parents, leaf) = segments
            .split_last()
            .map(|(last, rest)| (rest, *last))
            .ok_or_else(|| Hdf5Error::InvalidDatasetName {
                operation: "FileBuilder::create_dataset",
                name: path.to_string(),
                details: "the root path ('/') is not a valid dataset location".into(),
                recovery_hints: vec![],
            })?;

        let group = self.navigate_create_mut(parents, path)?;
        if group.children.contains_key(leaf) {
            return Err(Hdf5Error::GroupPathConflict {
                operation: "FileBuilder::create_dataset",
                path: path.to_string(),
                details: "an object already exists at this path".into(),
                recovery_hints: vec![],
            });
        }
        group.children.insert(
            leaf.to_string(),
            Entry::Dataset(DatasetSpec { datatype, dataspace, chunk_dims, filters, bytes, attributes: Vec::new() }),
        );
        Ok(())
    }

    /// Attaches an attribute to the group or dataset at `path` (`"/"` for the root group).
    pub fn add_attribute(&mut self, path: &str, attribute: Attribute) -> Result<()> {
        self.attributes_at(path)?.push(AttributeSpec::Fixed(attribute));
        Ok(())
    }

    /// Attaches a variable-length string attribute; its bytes are stored in a
    /// dedicated global-heap collection emitted just ahead of the attribute
    /// message, rather than inline in the object header.
    pub fn add_vlen_string_attribute(&mut self, path: &str, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.attributes_at(path)?.push(AttributeSpec::VlenString { name: name.into(), value: value.into() });
        Ok(())
    }

    fn attributes_at(&mut self, path: &str) -> Result<&mut Vec<AttributeSpec>> {
        let segments = split_path(path)?;
        if segments.is_empty() {
            return Ok(&mut self.root.attributes);
        }
        let (parents, leaf) = segments.split_last().map(|(l, r)| (r, *l)).unwrap();
        let group = self.navigate_create_mut(parents, path)?;
        match group.children.get_mut(leaf) {
            Some(Entry::Group(g)) => Ok(&mut g.attributes),
            Some(Entry::Dataset(d)) => Ok(&mut d.attributes),
            None => Err(Hdf5Error::PathNotFound {
                operation: "FileBuilder::add_attribute",
                path: path.to_string(),
                recovery_hints: vec!["create the group or dataset before attaching attributes".into()],
            }),
        }
    }

    fn navigate_create_mut<'a>(&'a mut self, parents: &[&str], full_path: &str) -> Result<&'a mut GroupSpec> {
        let mut current = &mut self.root;
        for segment in parents {
            let entry = current.children.entry(segment.to_string()).or_insert_with(|| Entry::Group(GroupSpec::default()));
            current = match entry {
                Entry::Group(g) => g,
                Entry::Dataset(_) => {
                    return Err(Hdf5Error::GroupPathConflict {
                        operation: "FileBuilder::navigate",
                        path: full_path.to_string(),
                        details: format!("'{segment}' is a dataset, not a group"),
                        recovery_hints: vec![],
                    })
                }
            };
        }
        Ok(current)
    }

    pub fn build_to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new();
        let (root_addr_field, eof_field) = Superblock::emit_v0_placeholder(&mut writer, self.options.offset_size, self.options.length_size);
        let root_address = self.emit_group(&mut writer, &self.root)?;
        let eof = writer.position();
        writer.patch_offset_at(root_addr_field, self.options.offset_size, root_address);
        writer.patch_offset_at(eof_field, self.options.offset_size, eof);
        Ok(writer.into_bytes())
    }

    pub fn build_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let bytes = self.build_to_bytes()?;
        commit_atomic(path, &bytes)
    }

    fn emit_group(&self, writer: &mut Writer, group: &GroupSpec) -> Result<u64> {
        let mut children = Vec::with_capacity(group.children.len());
        for (name, entry) in &group.children {
            let address = match entry {
                Entry::Group(g) => self.emit_group(writer, g)?,
                Entry::Dataset(d) => self.emit_dataset(writer, d)?,
            };
            children.push((name.clone(), address));
        }

        let mut header = ObjectHeader::new();
        let (heap_address, btree_address) = group::build_group(writer, self.options.offset_size, &children);
        let mut payload = Writer::new();
        payload.write_offset(self.options.offset_size, btree_address);
        payload.write_offset(self.options.offset_size, heap_address);
        header.push(object_header::MSG_SYMBOL_TABLE, payload.into_bytes());
        for spec in &group.attributes {
            let bytes = emit_attribute(writer, self.options.offset_size, spec);
            header.push(object_header::MSG_ATTRIBUTE, bytes);
        }
        Ok(header.encode_v1(writer))
    }

    fn emit_dataset(&self, writer: &mut Writer, dataset: &DatasetSpec) -> Result<u64> {
        let element_size = dataset.datatype.size_bytes() as u64;
        let layout = match &dataset.chunk_dims {
            None => {
                let address = writer.position();
                writer.write_bytes(&dataset.bytes);
                writer.align(8);
                DataLayout::Contiguous { address, size: dataset.bytes.len() as u64 }
            }
            Some(chunk_dims) => self.emit_chunked(writer, dataset, chunk_dims, element_size)?,
        };

        let mut header = ObjectHeader::new();
        let mut dt_writer = Writer::new();
        dataset.datatype.encode(&mut dt_writer);
        header.push(object_header::MSG_DATATYPE, dt_writer.into_bytes());

        let mut ds_writer = Writer::new();
        dataset.dataspace.encode(&mut ds_writer);
        header.push(object_header::MSG_DATASPACE, ds_writer.into_bytes());

        let mut layout_writer = Writer::new();
        layout.encode(&mut layout_writer, self.options.offset_size, self.options.length_size);
        header.push(object_header::MSG_DATA_LAYOUT, layout_writer.into_bytes());

        if !dataset.filters.is_empty() {
            let mut filter_writer = Writer::new();
            dataset.filters.encode(&mut filter_writer);
            header.push(object_header::MSG_FILTER_PIPELINE, filter_writer.into_bytes());
        }

        for spec in &dataset.attributes {
            let bytes = emit_attribute(writer, self.options.offset_size, spec);
            header.push(object_header::MSG_ATTRIBUTE, bytes);
        }

        Ok(header.encode_v1(writer))
    }

    fn emit_chunked(&self, writer: &mut Writer, dataset: &DatasetSpec, chunk_dims: &[u64], element_size: u64) -> Result<DataLayout> {
        let grid = ChunkGrid::new(dataset.dataspace.dims.clone(), chunk_dims.to_vec())?;
        let mut entries = Vec::new();
        for scaled_coords in grid.all_scaled_coords() {
            let chunk_bytes = gather_chunk(&grid, element_size, &dataset.bytes, &scaled_coords);
            let (encoded, filter_mask) = dataset.filters.encode_chunk(&chunk_bytes);
            let address = writer.position();
            writer.write_bytes(&encoded);
            writer.align(8);
            entries.push(ChunkEntry { scaled_coords, chunk_size: encoded.len() as u32, filter_mask, address });
        }
        entries.sort_by(|a, b| a.scaled_coords.cmp(&b.scaled_coords));

        let rank = grid.rank();
        let btree_address = if entries.is_empty() {
            UNDEFINED
        } else {
            btree_v1::build_chunk_index(writer, self.options.offset_size, rank, &entries)
        };

        Ok(DataLayout::Chunked {
            btree_address,
            chunk_dims: chunk_dims.iter().map(|&d| d as u32).collect(),
            element_size: element_size as u32,
        })
    }
}

impl Default for FileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes one pending attribute, writing a one-object global-heap
/// collection just ahead of the attribute message for the vlen-string case.
fn emit_attribute(writer: &mut Writer, offset_size: u8, spec: &AttributeSpec) -> Vec<u8> {
    let attribute = match spec {
        AttributeSpec::Fixed(attribute) => attribute.clone(),
        AttributeSpec::VlenString { name, value } => {
            let mut heap = GlobalHeap::new();
            let object_index = heap.add_object(value.as_bytes());
            let heap_address = heap.emit(writer, offset_size);
            let reference = VlenReference { length: value.len() as u32, heap_address, object_index };
            let mut ref_writer = Writer::new();
            reference.encode(&mut ref_writer);
            let value_bytes = ref_writer.into_bytes();
            Attribute {
                name: name.clone(),
                datatype: Datatype::String { size: None, padding: StringPadding::NullTerminate, charset: Charset::Utf8 },
                dataspace: Dataspace::scalar(),
                value_bytes,
            }
        }
    };
    let mut w = Writer::new();
    attribute.encode(&mut w);
    w.into_bytes()
}

/// Copies the real elements of the chunk at `scaled_coords` out of the
/// dataset's flat row-major byte buffer into a full nominal-size chunk
/// buffer (zero-padded past the dataset's true extent for boundary chunks).
fn gather_chunk(grid: &ChunkGrid, element_size: u64, dataset_bytes: &[u8], scaled_coords: &[u64]) -> Vec<u8> {
    let nominal_elements = grid.full_chunk_element_count();
    let mut buf = vec![0u8; (nominal_elements * element_size) as usize];
    let extent = grid.chunk_extent(scaled_coords);
    let real_elements: u64 = extent.iter().product();

    for linear in 0..real_elements {
        let within = row_major_coords(linear, &extent);
        let global: Vec<u64> = within
            .iter()
            .zip(scaled_coords)
            .zip(&grid.chunk_dims)
            .map(|((&w, &coord), &chunk_dim)| coord * chunk_dim + w)
            .collect();
        let dataset_offset = row_major_offset(&global, &grid.dataset_dims) * element_size;
        let chunk_offset = row_major_offset(&within, &grid.chunk_dims) * element_size;
        let e = element_size as usize;
        buf[chunk_offset as usize..chunk_offset as usize + e]
            .copy_from_slice(&dataset_bytes[dataset_offset as usize..dataset_offset as usize + e]);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::ByteOrder;

    #[test]
    fn rejects_relative_paths() {
        let mut builder = FileBuilder::new();
        let dt = Datatype::Integer { size: 4, signed: true, order: ByteOrder::Little };
        let err = builder.create_dataset("no_leading_slash", dt, Dataspace::scalar(), vec![0; 4]);
        assert!(err.is_err());
    }

    #[test]
    fn detects_group_path_conflict() {
        let mut builder = FileBuilder::new();
        let dt = Datatype::Integer { size: 4, signed: true, order: ByteOrder::Little };
        builder.create_dataset("/a", dt.clone(), Dataspace::scalar(), vec![0; 4]).unwrap();
        let err = builder.create_dataset("/a/b", dt, Dataspace::scalar(), vec![0; 4]);
        assert!(err.is_err());
    }

    #[test]
    fn builds_minimal_file() {
        let mut builder = FileBuilder::new();
        let dt = Datatype::Float { size: 8, order: ByteOrder::Little };
        builder.create_dataset("/x", dt, Dataspace::scalar(), 3.5f64.to_le_bytes().to_vec()).unwrap();
        let bytes = builder.build_to_bytes().unwrap();
        assert_eq!(&bytes[0..8], &crate::superblock::SIGNATURE);
    }
}
