//! One level of the spatial cluster hierarchy
//!
//! A [`ClusterUnit`] owns the dimension, directive and tensor tables of its
//! level and, on construction, locates the spatial directives and works out
//! how the outermost spatial dimension splits into full sweeps and a
//! boundary (edge) sweep over the sub-clusters.

use crate::dimension::DimensionTable;
use crate::directive::{Directive, DirectiveTable};
use crate::error::{AnalysisError, AnalysisResult};
use crate::hardware::NocModel;
use crate::tensor::TensorTable;

/// Integer division rounding towards positive infinity for positive divisors
///
/// Matches truncating division followed by a bump when a remainder exists,
/// so negative dividends behave like the truncating form.
pub(crate) fn ceil_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 {
        q + 1
    } else {
        q
    }
}

#[derive(Debug, Clone)]
pub struct ClusterUnit {
    level: usize,
    num_clusters: i64,
    dimensions: DimensionTable,
    dataflow: DirectiveTable,
    tensors: TensorTable,
    noc: NocModel,

    upper_spatial_idx: usize,
    lower_spatial_idx: Option<usize>,
    inner_temporal_idx: usize,

    num_spatial_edge_clusters: i64,
    num_edge_spatial_iterations: i64,
    num_steady_spatial_iterations: i64,
}

impl ClusterUnit {
    /// Build the unit for one level and run the spatial preprocessing
    ///
    /// Directives on derived output dimensions are rewritten to their input
    /// dimensions first.
    pub fn new(
        level: usize,
        num_clusters: i64,
        mut dataflow: DirectiveTable,
        dimensions: DimensionTable,
        tensors: TensorTable,
        noc: NocModel,
    ) -> AnalysisResult<Self> {
        if num_clusters < 1 {
            return Err(AnalysisError::cluster_size(format!(
                "level {} has {} sub-clusters",
                level, num_clusters
            )));
        }

        dataflow.convert_to_input_centric(&dimensions);
        Self::validate(level, &dataflow, &dimensions)?;

        let mut unit = Self {
            level,
            num_clusters,
            dimensions,
            dataflow,
            tensors,
            noc,
            upper_spatial_idx: 0,
            lower_spatial_idx: None,
            inner_temporal_idx: 0,
            num_spatial_edge_clusters: 1,
            num_edge_spatial_iterations: 0,
            num_steady_spatial_iterations: 1,
        };

        // Spatial map positions are needed by everything below
        unit.analyze_spatial_map_idx()?;
        unit.analyze_inner_temporal_map_idx();
        unit.analyze_spatial_edge_case();

        log::debug!(
            "Cluster level {}: {} sub-clusters, dataflow [{}], spatial edge clusters {}, edge iterations {}",
            unit.level,
            unit.num_clusters,
            unit.dataflow.describe(&unit.dimensions),
            unit.num_spatial_edge_clusters,
            unit.num_edge_spatial_iterations
        );

        Ok(unit)
    }

    fn validate(level: usize, dataflow: &DirectiveTable, dims: &DimensionTable) -> AnalysisResult<()> {
        for directive in dataflow {
            if directive.dim >= dims.len() {
                return Err(AnalysisError::unknown_dim(format!("#{}", directive.dim)));
            }
            if directive.size < 1 || directive.offset < 1 {
                return Err(AnalysisError::InvalidDirective {
                    level,
                    message: format!(
                        "{}({},{}) {} needs a positive size and offset",
                        directive.class,
                        directive.size,
                        directive.offset,
                        dims.name(directive.dim)
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Number of sub-clusters, or the number active in the spatial edge sweep
    pub fn num_clusters(&self, spatial_edge: bool) -> i64 {
        if spatial_edge {
            self.num_spatial_edge_clusters
        } else {
            self.num_clusters
        }
    }

    pub fn dimensions(&self) -> &DimensionTable {
        &self.dimensions
    }

    pub fn dataflow(&self) -> &DirectiveTable {
        &self.dataflow
    }

    pub fn tensors(&self) -> &TensorTable {
        &self.tensors
    }

    pub fn noc(&self) -> &NocModel {
        &self.noc
    }

    /// Index of the outermost spatial directive
    pub fn upper_spatial_map_idx(&self) -> usize {
        self.upper_spatial_idx
    }

    /// Index of the second spatial directive, if the level has one
    pub fn lower_spatial_map_idx(&self) -> Option<usize> {
        self.lower_spatial_idx
    }

    /// Innermost temporal directive below the outer spatial map that is not
    /// fully unrolled (the spatial map itself when there is none)
    pub fn inner_temporal_map_idx(&self) -> usize {
        self.inner_temporal_idx
    }

    pub fn num_edge_spatial_iterations(&self) -> i64 {
        self.num_edge_spatial_iterations
    }

    pub fn num_steady_spatial_iterations(&self) -> i64 {
        self.num_steady_spatial_iterations
    }

    pub fn has_spatial_edge_case(&self) -> bool {
        self.num_edge_spatial_iterations > 0
    }

    /// Product over directives of the per-directive iteration counts
    pub fn num_total_iterations(&self) -> i64 {
        self.dataflow
            .iter()
            .map(|directive| self.directive_iterations(directive))
            .product()
    }

    fn directive_iterations(&self, directive: &Directive) -> i64 {
        let dims = &self.dimensions;
        let mut dim_size = dims.size(directive.dim);

        if dims.is_overlapped(directive.dim) && !dims.is_sliding(directive.dim) {
            if let Some(sliding) = dims.overlapping_dim(directive.dim) {
                // compares this directive's own tile with the filter extent
                let sliding_size = dims.size(sliding);
                if directive.size == sliding_size {
                    dim_size = dim_size - sliding_size + 1;
                }
            }
        }

        if directive.is_spatial() {
            ceil_div(dim_size, directive.offset * self.num_clusters)
        } else {
            ceil_div(dim_size, directive.offset)
        }
    }

    fn analyze_spatial_map_idx(&mut self) -> AnalysisResult<()> {
        let mut upper = None;
        let mut lower = None;

        for (idx, directive) in self.dataflow.iter().enumerate() {
            if !directive.is_spatial() {
                continue;
            }
            if upper.is_none() {
                upper = Some(idx);
            } else if lower.is_none() {
                lower = Some(idx);
            } else {
                return Err(AnalysisError::MultiParallelismInSingleCluster { level: self.level });
            }
        }

        self.upper_spatial_idx = upper.ok_or(AnalysisError::NoSpatialMap { level: self.level })?;
        self.lower_spatial_idx = lower;
        Ok(())
    }

    fn analyze_inner_temporal_map_idx(&mut self) {
        let mut inner = self.upper_spatial_idx;
        for idx in self.upper_spatial_idx..self.dataflow.len() {
            let directive = self.dataflow.at(idx);
            if directive.is_temporal() {
                let unrolled = directive.size >= self.dimensions.size(directive.dim);
                if !unrolled {
                    inner = idx;
                }
            }
        }
        self.inner_temporal_idx = inner;
    }

    fn analyze_spatial_edge_case(&mut self) {
        let directive = *self.dataflow.at(self.upper_spatial_idx);
        let dim_size = self.dimensions.size(directive.dim);
        let map_size = directive.size;
        let map_ofs = directive.offset;
        let clusters = self.num_clusters;

        self.num_spatial_edge_clusters = 0;
        self.num_edge_spatial_iterations = 0;

        let full_coverage = map_ofs * (clusters - 1) + map_size;

        if dim_size >= full_coverage {
            // TODO: the remainder below is taken from the last full sweep's
            // offsets, not its coverage; check against published results
            self.num_steady_spatial_iterations = ((dim_size - map_size) / map_ofs + 1) / clusters - 1;
            let steady = self.num_steady_spatial_iterations;
            let total_coverage = ((steady + 1) * clusters - 1) * map_ofs + map_size;
            let remaining = if dim_size == total_coverage {
                0
            } else {
                dim_size - (steady + 1) * clusters * map_ofs
            };

            if remaining != 0 {
                self.num_edge_spatial_iterations = 1;
                self.num_spatial_edge_clusters = if remaining < map_size {
                    1
                } else {
                    ceil_div(remaining - map_size, map_ofs) + 1
                };
            }
        } else {
            self.num_edge_spatial_iterations = 1;
            self.num_spatial_edge_clusters = if dim_size > map_size {
                let mut edge = ceil_div(dim_size - map_size, map_ofs) + 1;
                if dim_size <= (edge - 1) * map_ofs {
                    edge -= 1;
                }
                edge
            } else {
                1
            };
        }
    }
}
