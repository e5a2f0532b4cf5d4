//! An HDF5-1.8+-compatible binary container format library: superblocks,
//! object headers, datatypes, dataspaces, chunked storage with a filter
//! pipeline, B-tree v1/v2 indices, and local/global/fractal heaps, wrapped
//! in a builder for writing and a reader for navigating existing files.

pub mod address;
pub mod attribute;
pub mod btree;
pub mod builder;
pub mod cache;
pub mod chunk;
pub mod data_layout;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod filter;
pub mod group;
pub mod heap;
pub mod io;
pub mod link;
pub mod object_header;
pub mod reader;
pub mod superblock;
pub mod value;

pub use attribute::Attribute;
pub use builder::{FileBuilder, Options};
pub use chunk::ChunkGrid;
pub use dataspace::Dataspace;
pub use datatype::Datatype;
pub use error::{Hdf5Error, Result};
pub use filter::FilterPipeline;
pub use link::Link;
pub use object_header::ObjectKind;
pub use reader::FileOwner;
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::ByteOrder;

    #[test]
    fn end_to_end_smallest_float_dataset() {
        let mut builder = FileBuilder::new();
        builder
            .create_dataset("/value", Datatype::Float { size: 8, order: ByteOrder::Little }, Dataspace::scalar(), 1.5f64.to_le_bytes().to_vec())
            .unwrap();
        let bytes = builder.build_to_bytes().unwrap();

        let mut owner = FileOwner::from_bytes(bytes).unwrap();
        let (datatype, dataspace, data) = owner.read_dataset("/value").unwrap();
        assert_eq!(datatype, Datatype::Float { size: 8, order: ByteOrder::Little });
        assert_eq!(dataspace.kind, dataspace::DataspaceKind::Scalar);
        assert_eq!(f64::from_le_bytes(data.try_into().unwrap()), 1.5);
    }
}
