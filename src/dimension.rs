//! Layer dimensions and the per-layer dimension table
//!
//! Dimensions live in a dense vector and are addressed by [`DimId`], which is
//! stable for the lifetime of a layer. Tables derived for inner cluster levels
//! keep the same ids, so per-dimension records can be indexed the same way at
//! every level.

use serde::{Deserialize, Serialize};

/// Index of a dimension inside its layer's [`DimensionTable`]
pub type DimId = usize;

/// Well-known dimension names used by convolution and GEMM layers
pub mod names {
    pub const INPUT_BATCH: &str = "N";
    pub const GROUP: &str = "G";
    pub const OUTPUT_CHANNEL: &str = "K";
    pub const INPUT_CHANNEL: &str = "C";
    pub const WEIGHT_HEIGHT: &str = "R";
    pub const WEIGHT_WIDTH: &str = "S";
    pub const INPUT_HEIGHT: &str = "Y";
    pub const INPUT_WIDTH: &str = "X";
    pub const OUTPUT_HEIGHT: &str = "Y'";
    pub const OUTPUT_WIDTH: &str = "X'";
}

/// A single named loop dimension of a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDimension {
    pub name: String,
    pub size: i64,
    pub outer_stride: i64,
    pub inner_stride: i64,
}

impl LayerDimension {
    pub fn new(name: impl Into<String>, size: i64, outer_stride: i64, inner_stride: i64) -> Self {
        Self {
            name: name.into(),
            size,
            outer_stride,
            inner_stride,
        }
    }
}

/// Sliding-window relation between two dimensions
///
/// `reference` is the slid-over (input) side, `sliding` the filter side and
/// `output` the derived output dimension, when the layer has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapPair {
    pub reference: DimId,
    pub sliding: DimId,
    pub output: Option<DimId>,
}

/// Dimension table of one layer (or of one sub-cluster of that layer)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionTable {
    dims: Vec<LayerDimension>,
    overlaps: Vec<OverlapPair>,
}

impl DimensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dimension and return its id. Re-adding a name replaces the entry.
    pub fn add(&mut self, dim: LayerDimension) -> DimId {
        if let Some(id) = self.index_of(&dim.name) {
            self.dims[id] = dim;
            id
        } else {
            self.dims.push(dim);
            self.dims.len() - 1
        }
    }

    /// Register a sliding-window relation, by dimension name
    pub fn add_overlap(&mut self, reference: &str, sliding: &str, output: Option<&str>) -> bool {
        let (Some(reference), Some(sliding)) = (self.index_of(reference), self.index_of(sliding)) else {
            return false;
        };
        let output = output.and_then(|name| self.index_of(name));
        self.overlaps.push(OverlapPair {
            reference,
            sliding,
            output,
        });
        true
    }

    pub fn index_of(&self, name: &str) -> Option<DimId> {
        self.dims.iter().position(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn get(&self, id: DimId) -> &LayerDimension {
        &self.dims[id]
    }

    pub fn name(&self, id: DimId) -> &str {
        &self.dims[id].name
    }

    pub fn size(&self, id: DimId) -> i64 {
        self.dims[id].size
    }

    pub fn set_size(&mut self, id: DimId, size: i64) {
        self.dims[id].size = size;
    }

    pub fn outer_stride(&self, id: DimId) -> i64 {
        self.dims[id].outer_stride
    }

    pub fn inner_stride(&self, id: DimId) -> i64 {
        self.dims[id].inner_stride
    }

    pub fn iter(&self) -> impl Iterator<Item = (DimId, &LayerDimension)> {
        self.dims.iter().enumerate()
    }

    pub fn overlaps(&self) -> &[OverlapPair] {
        &self.overlaps
    }

    fn overlap_of(&self, id: DimId) -> Option<&OverlapPair> {
        self.overlaps
            .iter()
            .find(|o| o.reference == id || o.sliding == id)
    }

    /// True for both sides of a sliding-window relation
    pub fn is_overlapped(&self, id: DimId) -> bool {
        self.overlap_of(id).is_some()
    }

    /// True for the filter side of a sliding-window relation
    pub fn is_sliding(&self, id: DimId) -> bool {
        self.overlaps.iter().any(|o| o.sliding == id)
    }

    /// The other side of the sliding-window relation `id` takes part in
    pub fn overlapping_dim(&self, id: DimId) -> Option<DimId> {
        self.overlap_of(id).map(|o| if o.reference == id { o.sliding } else { o.reference })
    }

    /// Output dimension derived from a slid-over input dimension
    pub fn output_dim(&self, id: DimId) -> Option<DimId> {
        self.overlaps
            .iter()
            .find(|o| o.reference == id)
            .and_then(|o| o.output)
    }

    /// True if `id` is the derived output side of some relation
    pub fn is_output_dim(&self, id: DimId) -> bool {
        self.overlaps.iter().any(|o| o.output == Some(id))
    }

    /// Recompute every output dimension from its input and filter extents
    pub fn refresh_output_sizes(&mut self) {
        let overlaps = self.overlaps.clone();
        for pair in overlaps {
            if let Some(output) = pair.output {
                let stride = self.outer_stride(pair.reference).max(1);
                let size = (self.size(pair.reference) - self.size(pair.sliding) + stride) / stride;
                self.set_size(output, size.max(0));
            }
        }
    }
}

impl std::fmt::Display for DimensionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", dim.name, dim.size)?;
        }
        Ok(())
    }
}
