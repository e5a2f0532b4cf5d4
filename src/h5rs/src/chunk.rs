//! Chunk grid engine. Enumerates chunk origins across an N-d grid via
//! linear-index iteration with carry, rather than per-dimension recursion
//!, and sizes partial boundary chunks against the dataset's
//! true extents.

use crate::error::{Hdf5Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGrid {
    pub dataset_dims: Vec<u64>,
    pub chunk_dims: Vec<u64>,
}

impl ChunkGrid {
    pub fn new(dataset_dims: Vec<u64>, chunk_dims: Vec<u64>) -> Result<ChunkGrid> {
        if dataset_dims.len() != chunk_dims.len() {
            return Err(Hdf5Error::InvalidChunkDimensions {
                operation: "ChunkGrid::new",
                details: format!("dataset rank {} does not match chunk rank {}", dataset_dims.len(), chunk_dims.len()),
                recovery_hints: vec!["chunk dimensions must have the same rank as the dataspace".into()],
            });
        }
        if chunk_dims.contains(&0) {
            return Err(Hdf5Error::InvalidChunkDimensions {
                operation: "ChunkGrid::new",
                details: "chunk dimensions must be non-zero in every axis".into(),
                recovery_hints: vec![],
            });
        }
        if let Some(axis) = chunk_dims.iter().zip(&dataset_dims).position(|(c, d)| c > d) {
            return Err(Hdf5Error::InvalidChunkDimensions {
                operation: "ChunkGrid::new",
                details: format!(
                    "chunk dimension {} on axis {axis} exceeds dataset dimension {}",
                    chunk_dims[axis], dataset_dims[axis]
                ),
                recovery_hints: vec!["chunk dimensions must not exceed the dataset's dimensions".into()],
            });
        }
        Ok(ChunkGrid { dataset_dims, chunk_dims })
    }

    pub fn rank(&self) -> usize {
        self.dataset_dims.len()
    }

    /// Number of chunks along each axis, rounding up for partial boundary chunks.
    pub fn chunks_per_axis(&self) -> Vec<u64> {
        self.dataset_dims
            .iter()
            .zip(&self.chunk_dims)
            .map(|(&d, &c)| d.div_ceil(c))
            .collect()
    }

    pub fn total_chunks(&self) -> u64 {
        self.chunks_per_axis().iter().product()
    }

    /// The scaled coordinates (chunk-grid index per axis) for every chunk in
    /// the grid, in row-major (C) order, produced via linear-index iteration
    /// with carry rather than nested recursion.
    pub fn all_scaled_coords(&self) -> Vec<Vec<u64>> {
        let per_axis = self.chunks_per_axis();
        let total = self.total_chunks();
        let rank = self.rank();
        let mut out = Vec::with_capacity(total as usize);

        for linear in 0..total {
            let mut remainder = linear;
            let mut coords = vec![0u64; rank];
            for axis in (0..rank).rev() {
                let extent = per_axis[axis].max(1);
                coords[axis] = remainder % extent;
                remainder /= extent;
            }
            out.push(coords);
        }
        out
    }

    /// True element extents of the chunk at `scaled_coords`, clipped to the
    /// dataset's actual dimensions for boundary chunks.
    pub fn chunk_extent(&self, scaled_coords: &[u64]) -> Vec<u64> {
        scaled_coords
            .iter()
            .zip(&self.chunk_dims)
            .zip(&self.dataset_dims)
            .map(|((&coord, &chunk_dim), &dataset_dim)| {
                let start = coord * chunk_dim;
                (dataset_dim.saturating_sub(start)).min(chunk_dim)
            })
            .collect()
    }

    pub fn full_chunk_element_count(&self) -> u64 {
        self.chunk_dims.iter().product()
    }

    /// Byte offset, in the full (unpartitioned) chunk buffer, of the element
    /// at logical coordinates `within_chunk` — used when scattering a
    /// partial boundary chunk's real data into a full-size zero-filled chunk
    /// buffer before handing it to the filter pipeline.
    pub fn linear_offset_within_chunk(&self, within_chunk: &[u64]) -> u64 {
        row_major_offset(within_chunk, &self.chunk_dims)
    }

    /// Suggests chunk dimensions for `dataset_dims` and `element_size`,
    /// targeting `target_chunk_bytes` per chunk by shrinking each axis with
    /// the *n*-th root scaling factor computed through the standard
    /// `f64::powf`.
    pub fn auto_chunk_dims(dataset_dims: &[u64], element_size: u64, target_chunk_bytes: u64) -> Vec<u64> {
        let rank = dataset_dims.len();
        if rank == 0 {
            return vec![];
        }
        let dataset_bytes: u64 = dataset_dims.iter().product::<u64>() * element_size;
        if dataset_bytes <= target_chunk_bytes {
            return dataset_dims.to_vec();
        }

        let ratio = target_chunk_bytes as f64 / dataset_bytes as f64;
        let per_axis_scale = ratio.powf(1.0 / rank as f64);

        dataset_dims
            .iter()
            .map(|&d| ((d as f64 * per_axis_scale).round() as u64).clamp(1, d))
            .collect()
    }
}

/// Row-major (C-order) linear element offset of `coords` within an array of
/// shape `dims`. Shared by chunk-local and whole-dataset indexing so the two
/// never drift apart.
pub fn row_major_offset(coords: &[u64], dims: &[u64]) -> u64 {
    let mut offset = 0u64;
    for (i, &coord) in coords.iter().enumerate() {
        let stride: u64 = dims[i + 1..].iter().product();
        offset += coord * stride;
    }
    offset
}

/// Decomposes a linear row-major index back into per-axis coordinates for an
/// array of shape `extent`.
pub fn row_major_coords(mut linear: u64, extent: &[u64]) -> Vec<u64> {
    let rank = extent.len();
    let mut coords = vec![0u64; rank];
    for axis in (0..rank).rev() {
        let e = extent[axis].max(1);
        coords[axis] = linear % e;
        linear /= e;
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerates_every_chunk_exactly_once() {
        let grid = ChunkGrid::new(vec![10, 10], vec![4, 4]).unwrap();
        let coords = grid.all_scaled_coords();
        assert_eq!(coords.len(), 9); // ceil(10/4)=3 per axis, 3*3=9
        let unique: std::collections::HashSet<_> = coords.iter().cloned().collect();
        assert_eq!(unique.len(), 9);
    }

    #[test]
    fn boundary_chunk_is_clipped() {
        let grid = ChunkGrid::new(vec![10, 10], vec![4, 4]).unwrap();
        assert_eq!(grid.chunk_extent(&[2, 2]), vec![2, 2]); // last row/col: 10 - 8 = 2
        assert_eq!(grid.chunk_extent(&[0, 0]), vec![4, 4]);
    }

    #[test]
    fn rejects_zero_chunk_dims() {
        assert!(ChunkGrid::new(vec![10], vec![0]).is_err());
    }

    #[test]
    fn rejects_chunk_dim_exceeding_dataset_dim() {
        assert!(ChunkGrid::new(vec![10], vec![11]).is_err());
    }

    #[test]
    fn accepts_chunk_dim_equal_to_dataset_dim() {
        let grid = ChunkGrid::new(vec![10, 10], vec![10, 10]).unwrap();
        assert_eq!(grid.chunks_per_axis(), vec![1, 1]);
    }

    #[test]
    fn auto_chunk_dims_shrinks_toward_target() {
        let dims = ChunkGrid::auto_chunk_dims(&[1000, 1000], 8, 1 << 20);
        let bytes = dims.iter().product::<u64>() * 8;
        assert!(bytes <= 1 << 20);
        assert!(dims.iter().all(|&d| d >= 1));
    }

    #[test]
    fn auto_chunk_dims_keeps_small_datasets_whole() {
        let dims = ChunkGrid::auto_chunk_dims(&[4, 4], 8, 1 << 20);
        assert_eq!(dims, vec![4, 4]);
    }
}
