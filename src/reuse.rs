//! Reuse analysis: per-PE and per-level data volumes of one cluster level
//!
//! On construction every mapped dimension gets a [`DimReuse`] record with
//! the number of elements a tile maps, how many of them are new relative
//! to the previous tile (unique) and how many carry over (reused), once for
//! full tiles and once for the trailing partial tile. Output dimensions of
//! sliding windows get records derived from their input and filter sides.
//!
//! Every volume query is a product over directives of one of those counts.
//! Which count a directive contributes depends on its directive class, its
//! iteration state and the position of the processing element inside the
//! spatial sweep ([`PeRole`]).

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterUnit;
use crate::dimension::{DimId, DimensionTable};
use crate::directive::Directive;
use crate::error::{AnalysisError, AnalysisResult};
use crate::iteration::{IterationPosition, IterationState, IterationStatus};
use crate::tensor::Tensor;

/// Mapping sizes of one dimension at one cluster level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DimReuse {
    pub mapped: i64,
    pub unique: i64,
    pub reused: i64,
    pub mapped_edge: i64,
    pub unique_edge: i64,
    pub reused_edge: i64,
}

/// Position of a processing element inside a spatial sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeRole {
    /// First PE of the sweep; it always loads its whole tile
    pub first: bool,
    /// Last PE of an edge sweep that only receives a partial tile
    pub sp_edge_edge: bool,
}

impl PeRole {
    pub const FIRST: PeRole = PeRole {
        first: true,
        sp_edge_edge: false,
    };
    pub const FIRST_EDGE_EDGE: PeRole = PeRole {
        first: true,
        sp_edge_edge: true,
    };
    pub const OTHER: PeRole = PeRole {
        first: false,
        sp_edge_edge: false,
    };
    pub const OTHER_EDGE_EDGE: PeRole = PeRole {
        first: false,
        sp_edge_edge: true,
    };
}

impl Default for PeRole {
    fn default() -> Self {
        PeRole::FIRST
    }
}

/// Which per-dimension count a directive contributes to a product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Count {
    Mapped,
    MappedEdge,
    Unique,
    UniqueEdge,
    /// Unique count, or nothing when it is zero
    UniqueOrSkip,
    /// Edge unique count, or nothing when it is zero
    UniqueEdgeOrSkip,
    Skip,
}

impl Count {
    fn mapped(edge: bool) -> Self {
        if edge {
            Count::MappedEdge
        } else {
            Count::Mapped
        }
    }

    fn unique(edge: bool) -> Self {
        if edge {
            Count::UniqueEdge
        } else {
            Count::Unique
        }
    }
}

/// Temporal tile: the partial tile on edge states, the full tile otherwise
fn temporal_slice(state: &IterationState) -> Count {
    Count::mapped(state.is_edge())
}

/// Spatial tile of a PE, which is partial only for the edge-of-edge PE
fn spatial_slice(state: &IterationState, role: PeRole) -> Count {
    match state.position {
        IterationPosition::Init => Count::mapped(state.is_edge() && role.sp_edge_edge),
        IterationPosition::Steady => Count::Mapped,
        IterationPosition::Edge => Count::mapped(role.sp_edge_edge),
    }
}

/// How the sub-clusters of a level split for one tensor and status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpatialSpan {
    /// Some spatial directive of the level touches the tensor
    mapped: bool,
    /// One of those directives is on a partial sweep
    edge: bool,
    /// The last of those directives ends in an edge-of-edge PE
    sp_edge_edge: bool,
}

/// PE counts of an edge sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EdgeSplit {
    head: PeRole,
    full: i64,
    edge_edge: i64,
}

/// Weighted term that skips the query when nothing is weighted
fn weighted<F>(count: i64, volume: F) -> AnalysisResult<i64>
where
    F: FnOnce() -> AnalysisResult<i64>,
{
    if count == 0 {
        Ok(0)
    } else {
        Ok(count * volume()?)
    }
}

#[derive(Debug, Clone)]
pub struct ReuseAnalysis<'a> {
    cluster: &'a ClusterUnit,
    /// Indexed by dimension id; `None` for dimensions without a record
    records: Vec<Option<DimReuse>>,
    trace: bool,
}

impl<'a> ReuseAnalysis<'a> {
    /// Build the mapping records of `cluster`; `trace` logs every spatial
    /// aggregation decision at debug level
    pub fn new(cluster: &'a ClusterUnit, trace: bool) -> Self {
        let mut analysis = Self {
            cluster,
            records: vec![None; cluster.dimensions().len()],
            trace,
        };
        analysis.analyze_input_mapping_sizes();
        analysis.analyze_output_mapping_sizes();

        let dims = cluster.dimensions();
        for (id, record) in analysis.records.iter().enumerate() {
            if let Some(r) = record {
                log::debug!(
                    "Level {} {}: mapped {}/{} unique {}/{} reused {}/{}",
                    cluster.level(),
                    dims.name(id),
                    r.mapped,
                    r.mapped_edge,
                    r.unique,
                    r.unique_edge,
                    r.reused,
                    r.reused_edge
                );
            }
        }

        analysis
    }

    pub fn cluster(&self) -> &ClusterUnit {
        self.cluster
    }

    pub fn record(&self, dim: DimId) -> Option<&DimReuse> {
        self.records.get(dim).and_then(|r| r.as_ref())
    }

    fn value(&self, dim: DimId, count: Count) -> i64 {
        let r = self.record(dim).copied().unwrap_or_default();
        match count {
            Count::Mapped => r.mapped,
            Count::MappedEdge => r.mapped_edge,
            Count::Unique => r.unique,
            Count::UniqueEdge => r.unique_edge,
            Count::UniqueOrSkip if r.unique != 0 => r.unique,
            Count::UniqueEdgeOrSkip if r.unique_edge != 0 => r.unique_edge,
            Count::UniqueOrSkip | Count::UniqueEdgeOrSkip | Count::Skip => 1,
        }
    }

    fn analyze_input_mapping_sizes(&mut self) {
        let dims = self.cluster.dimensions();
        for directive in self.cluster.dataflow() {
            let dim_size = dims.size(directive.dim);
            let map_size = directive.size;
            let map_ofs = directive.offset;

            let num_steady = ((dim_size - map_size) / map_ofs).max(0);
            // the second term covers a first tile that overhangs the dimension
            let has_edge = num_steady * map_ofs + map_size < dim_size || map_size > dim_size;

            let mut record = DimReuse {
                mapped: map_size,
                unique: map_size.min(map_ofs),
                reused: (map_size - map_ofs).max(0),
                ..DimReuse::default()
            };

            if directive.is_temporal() && dim_size <= map_size {
                record.unique = 0;
                record.reused = map_size;
            }

            let mut edge_map_size = dim_size - (num_steady + 1) * map_ofs;
            if edge_map_size < 0 {
                edge_map_size = dim_size;
            }
            let out_of_bound = map_size - edge_map_size;

            record.mapped_edge = if has_edge { edge_map_size } else { map_size };
            record.unique_edge = (map_ofs - out_of_bound).max(0);
            record.reused_edge = if has_edge {
                record.mapped_edge - record.unique_edge
            } else {
                0
            };

            self.records[directive.dim] = Some(record);
        }
    }

    fn analyze_output_mapping_sizes(&mut self) {
        let dims = self.cluster.dimensions();
        for directive in self.cluster.dataflow() {
            let dim = directive.dim;
            if !dims.is_overlapped(dim) || dims.is_sliding(dim) {
                continue;
            }
            let (Some(sliding), Some(output)) = (dims.overlapping_dim(dim), dims.output_dim(dim)) else {
                continue;
            };

            let stride = dims.outer_stride(dim).max(1);
            let input = self.record(dim).copied().unwrap_or_default();
            let filter = self.record(sliding).copied().unwrap_or_default();
            let filter_size = dims.size(sliding);
            // output rows shared by two consecutive input tiles
            let repeated = if directive.size - directive.offset >= filter_size {
                Some((directive.size - directive.offset - filter_size) / stride + 1)
            } else {
                None
            };

            let mut record = DimReuse {
                mapped: (input.mapped - filter.mapped) / stride + 1,
                mapped_edge: ((input.mapped_edge - filter.mapped_edge + stride) / stride).max(0),
                ..DimReuse::default()
            };
            record.unique = record.mapped - repeated.unwrap_or(0);
            // with repeated rows the edge unique count is left at zero
            if repeated.is_none() {
                record.unique_edge = record.mapped_edge;
            }

            self.records[output] = Some(record);
        }
    }

    /// Elements of `tensor` mapped by one full tile of every coupled dimension
    pub fn mapped_volume(&self, tensor: &Tensor) -> i64 {
        tensor
            .coupled
            .iter()
            .filter_map(|&dim| self.record(dim))
            .map(|r| r.mapped)
            .product()
    }

    /// Dimension table seen by one sub-cluster in the given status
    pub fn construct_sub_cluster_dimension(&self, status: &IterationStatus, sp_edge_edge: bool) -> DimensionTable {
        let role = PeRole {
            first: true,
            sp_edge_edge,
        };
        let mut table = self.cluster.dimensions().clone();

        for (idx, directive) in self.cluster.dataflow().iter().enumerate() {
            let state = status.state(idx);
            let count = if directive.is_temporal() {
                temporal_slice(state)
            } else {
                spatial_slice(state, role)
            };
            table.set_size(directive.dim, self.value(directive.dim, count));
        }

        table.refresh_output_sizes();
        table
    }

    /// Elements of `tensor` held by one PE in the given status
    pub fn pe_mapped_volume(&self, tensor: &Tensor, status: &IterationStatus, role: PeRole) -> i64 {
        let edge_clusters = self.cluster.num_clusters(true);

        self.coupled_directives(tensor)
            .map(|(idx, directive)| {
                let state = status.state(idx);
                let count = if directive.is_temporal() {
                    temporal_slice(state)
                } else if state.is_edge() {
                    if edge_clusters == 1 && (role.first || role.sp_edge_edge) {
                        Count::MappedEdge
                    } else if edge_clusters > 1 {
                        Count::mapped(role.sp_edge_edge)
                    } else {
                        Count::Skip
                    }
                } else {
                    Count::Mapped
                };
                self.value(directive.dim, count)
            })
            .product()
    }

    /// Elements of `tensor` one PE has to fetch in the given status
    ///
    /// Zero when the directive that advanced is not coupled to the tensor.
    pub fn pe_ingress_volume(&self, tensor: &Tensor, status: &IterationStatus, role: PeRole) -> AnalysisResult<i64> {
        let Some(changing) = status.innermost_changing() else {
            return Ok(self.pe_mapped_volume(tensor, status, role));
        };
        let inited = self.is_tensor_inited(tensor, status, changing);
        let dims = self.cluster.dimensions();

        let mut tensor_changes = false;
        let mut volume = 1;

        for (idx, directive) in self.coupled_directives(tensor) {
            let state = status.state(idx);
            let is_changing = idx == changing;
            tensor_changes |= is_changing;

            let count = if directive.is_temporal() {
                match state.position {
                    IterationPosition::Init => temporal_slice(state),
                    IterationPosition::Steady | IterationPosition::Edge => {
                        if is_changing && !inited {
                            if self.value(directive.dim, Count::Unique) == 0 {
                                return Err(AnalysisError::ZeroUniqueElements {
                                    dimension: dims.name(directive.dim).to_string(),
                                });
                            }
                            Count::Unique
                        } else {
                            Count::Mapped
                        }
                    }
                }
            } else {
                let reload = match state.position {
                    IterationPosition::Init => !role.first && idx > changing,
                    IterationPosition::Steady | IterationPosition::Edge => !role.first && !inited && is_changing,
                };
                if reload {
                    Count::unique(role.sp_edge_edge)
                } else {
                    Count::mapped(role.sp_edge_edge)
                }
            };
            volume *= self.value(directive.dim, count);
        }

        Ok(if tensor_changes { volume } else { 0 })
    }

    /// Elements of `tensor` fetched by all sub-clusters of the level
    pub fn spatial_ingress_traffic(&self, tensor: &Tensor, status: &IterationStatus) -> AnalysisResult<i64> {
        let span = self.spatial_span(tensor, status, false);
        let clusters = self.cluster.num_clusters(false);

        if !span.mapped {
            self.trace_decision(tensor, "ingress: not spatially mapped");
            return self.pe_ingress_volume(tensor, status, PeRole::FIRST);
        }
        if !span.edge {
            self.trace_decision(tensor, &format!("ingress: full sweep over {} sub-clusters", clusters));
            return Ok(self.pe_ingress_volume(tensor, status, PeRole::FIRST)?
                + weighted(clusters - 1, || self.pe_ingress_volume(tensor, status, PeRole::OTHER))?);
        }

        let split = self.edge_split(span);
        self.trace_split(tensor, "ingress", split);
        Ok(self.pe_ingress_volume(tensor, status, split.head)?
            + weighted(split.full, || self.pe_ingress_volume(tensor, status, PeRole::OTHER))?
            + weighted(split.edge_edge, || {
                self.pe_ingress_volume(tensor, status, PeRole::OTHER_EDGE_EDGE)
            })?)
    }

    /// Elements of an input tensor mapped over all sub-clusters of the level
    pub fn input_spatial_mapping_size(&self, tensor: &Tensor, status: &IterationStatus) -> i64 {
        let span = self.spatial_span(tensor, status, false);
        let clusters = self.cluster.num_clusters(false);

        if !span.mapped || !span.edge {
            return clusters * self.pe_mapped_volume(tensor, status, PeRole::FIRST);
        }

        let split = self.edge_split(span);
        self.pe_mapped_volume(tensor, status, split.head)
            + split.full * self.pe_mapped_volume(tensor, status, PeRole::FIRST)
            + split.edge_edge * self.pe_mapped_volume(tensor, status, PeRole::OTHER_EDGE_EDGE)
    }

    /// Elements of the output tensor one PE writes in the given status
    ///
    /// With `partial_sums` the volume also multiplies in the reduction
    /// dimensions, giving the number of partial sums produced.
    pub fn pe_egress_volume(
        &self,
        tensor: &Tensor,
        status: &IterationStatus,
        partial_sums: bool,
        role: PeRole,
        consider_reuse_at_edge: bool,
    ) -> i64 {
        let dims = self.cluster.dimensions();
        let dataflow = self.cluster.dataflow();
        let mut volume = 1;

        if partial_sums {
            for (idx, directive) in dataflow.iter().enumerate() {
                if tensor.is_coupled(directive.dim) {
                    continue;
                }
                let state = status.state(idx);
                let count = if directive.is_temporal() {
                    temporal_slice(state)
                } else {
                    spatial_slice(state, role)
                };
                volume *= self.value(directive.dim, count);
            }
        }

        for &dim in &tensor.coupled {
            let Some(idx) = dataflow.index_of(dim) else {
                continue;
            };
            let directive = dataflow.at(idx);
            let state = status.state(idx);
            let actual = dims.output_dim(dim).unwrap_or(dim);

            let count = if partial_sums {
                if directive.is_temporal() {
                    temporal_slice(state)
                } else {
                    spatial_slice(state, role)
                }
            } else if directive.is_temporal() {
                match state.position {
                    IterationPosition::Init => temporal_slice(state),
                    IterationPosition::Steady => Count::Unique,
                    IterationPosition::Edge => Count::UniqueEdge,
                }
            } else {
                match state.position {
                    IterationPosition::Init if state.is_edge() => self.edge_sweep_egress(role, consider_reuse_at_edge),
                    IterationPosition::Init | IterationPosition::Steady => {
                        if role.first {
                            Count::Mapped
                        } else {
                            Count::UniqueOrSkip
                        }
                    }
                    IterationPosition::Edge => self.edge_sweep_egress(role, consider_reuse_at_edge),
                }
            };
            volume *= self.value(actual, count);
        }

        volume
    }

    fn edge_sweep_egress(&self, role: PeRole, consider_reuse_at_edge: bool) -> Count {
        let edge_clusters = self.cluster.num_clusters(true);
        if edge_clusters == 1 {
            Count::mapped(role.sp_edge_edge)
        } else if edge_clusters > 1 {
            if role.first {
                Count::Mapped
            } else if role.sp_edge_edge {
                if consider_reuse_at_edge {
                    Count::UniqueEdgeOrSkip
                } else {
                    Count::MappedEdge
                }
            } else {
                Count::Unique
            }
        } else {
            Count::Skip
        }
    }

    /// Output elements written by all sub-clusters of the level
    pub fn spatial_egress_traffic(&self, tensor: &Tensor, status: &IterationStatus) -> i64 {
        let span = self.spatial_span(tensor, status, false);
        let clusters = self.cluster.num_clusters(false);
        let egress = |role| self.pe_egress_volume(tensor, status, false, role, true);

        if !span.mapped {
            self.trace_decision(tensor, "egress: not spatially mapped");
            return egress(PeRole::FIRST);
        }
        if !span.edge {
            self.trace_decision(tensor, &format!("egress: full sweep over {} sub-clusters", clusters));
            return egress(PeRole::FIRST) + (clusters - 1) * egress(PeRole::OTHER);
        }

        let split = self.edge_split(span);
        self.trace_split(tensor, "egress", split);
        egress(split.head) + split.full * egress(PeRole::OTHER) + split.edge_edge * egress(PeRole::OTHER_EDGE_EDGE)
    }

    /// Partial sums produced along the critical path (the first PE)
    pub fn critical_path_partial_sums(&self, tensor: &Tensor, status: &IterationStatus) -> i64 {
        let span = self.spatial_span(tensor, status, false);
        let role = if span.mapped && span.edge {
            self.edge_split(span).head
        } else {
            PeRole::FIRST
        };
        self.pe_egress_volume(tensor, status, true, role, true)
    }

    /// Elements of an output tensor mapped over all sub-clusters of the level
    ///
    /// For partial sums every spatial directive of the level counts, coupled
    /// to the output or not.
    pub fn output_spatial_mapping_size(&self, tensor: &Tensor, status: &IterationStatus, for_partial_sums: bool) -> i64 {
        let span = self.spatial_span(tensor, status, for_partial_sums);
        let clusters = self.cluster.num_clusters(false);
        let egress = |role, consider| self.pe_egress_volume(tensor, status, for_partial_sums, role, consider);

        if !span.mapped || !span.edge {
            return clusters * egress(PeRole::FIRST, true);
        }

        let split = self.edge_split(span);
        egress(split.head, true)
            + split.full * egress(PeRole::FIRST, true)
            + split.edge_edge * egress(PeRole::OTHER_EDGE_EDGE, false)
    }

    /// Whether a spatial directive of this level splits `tensor` across
    /// sub-clusters; otherwise every sub-cluster receives the same data
    pub fn is_spatially_mapped(&self, tensor: &Tensor) -> bool {
        self.coupled_directives(tensor).any(|(_, directive)| directive.is_spatial())
    }

    /// Whether an inner coupled directive restarts at Init, so the tensor is
    /// loaded afresh rather than slid
    pub fn is_tensor_inited(&self, tensor: &Tensor, status: &IterationStatus, changing: usize) -> bool {
        self.cluster
            .dataflow()
            .iter()
            .enumerate()
            .skip(changing + 1)
            .any(|(idx, directive)| {
                let state = status.state(idx);
                state.is_init() && tensor.is_coupled(directive.dim) && !state.unrolled
            })
    }

    fn coupled_directives<'t>(&'t self, tensor: &'t Tensor) -> impl Iterator<Item = (usize, &'t Directive)> + 't {
        self.cluster
            .dataflow()
            .iter()
            .enumerate()
            .filter(move |(_, directive)| tensor.is_coupled(directive.dim))
    }

    fn spatial_span(&self, tensor: &Tensor, status: &IterationStatus, all_spatial: bool) -> SpatialSpan {
        let dataflow = self.cluster.dataflow();
        let mut span = SpatialSpan {
            mapped: false,
            edge: false,
            sp_edge_edge: false,
        };
        let mut last_state = None;

        for &dim in &tensor.coupled {
            let Some(idx) = dataflow.index_of(dim) else {
                continue;
            };
            if dataflow.at(idx).is_spatial() {
                let state = status.state(idx);
                span.mapped = true;
                span.edge |= state.is_edge();
                last_state = Some(state);
            }
        }

        if all_spatial {
            for (idx, directive) in dataflow.iter().enumerate() {
                if directive.is_spatial() {
                    let state = status.state(idx);
                    span.mapped = true;
                    span.edge |= state.is_edge();
                    last_state = Some(state);
                }
            }
        }

        span.sp_edge_edge = last_state.map(|s| s.sp_edge_edge).unwrap_or(false);
        span
    }

    fn edge_split(&self, span: SpatialSpan) -> EdgeSplit {
        let edge_clusters = self.cluster.num_clusters(true);
        let head = if edge_clusters == 1 && span.sp_edge_edge {
            PeRole::FIRST_EDGE_EDGE
        } else {
            PeRole::FIRST
        };

        if edge_clusters > 1 {
            let edge_edge = i64::from(span.sp_edge_edge);
            EdgeSplit {
                head,
                full: (edge_clusters - edge_edge - 1).max(0),
                edge_edge,
            }
        } else {
            EdgeSplit {
                head,
                full: 0,
                edge_edge: 0,
            }
        }
    }

    fn trace_decision(&self, tensor: &Tensor, message: &str) {
        if self.trace {
            log::debug!("[level {}] {}: {}", self.cluster.level(), tensor.name, message);
        }
    }

    fn trace_split(&self, tensor: &Tensor, kind: &str, split: EdgeSplit) {
        if self.trace {
            log::debug!(
                "[level {}] {}: {} edge sweep over {} sub-clusters, head {:?}, full {}, edge-edge {}",
                self.cluster.level(),
                tensor.name,
                kind,
                self.cluster.num_clusters(true),
                split.head,
                split.full,
                split.edge_edge
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::LayerType;
    use crate::dimension::LayerDimension;
    use crate::directive::DirectiveTable;
    use crate::hardware::NocModel;
    use crate::iteration::IterationAnalysis;
    use crate::tensor::{DataClass, TensorTable};
    use pretty_assertions::assert_eq;

    fn gemm_cluster(m: i64, n: i64, k: i64, directives: Vec<Directive>, clusters: i64) -> ClusterUnit {
        let mut dims = DimensionTable::new();
        dims.add(LayerDimension::new("M", m, 1, 1));
        dims.add(LayerDimension::new("N", n, 1, 1));
        dims.add(LayerDimension::new("K", k, 1, 1));
        let tensors = TensorTable::for_layer(LayerType::Gemm, false, &dims);
        ClusterUnit::new(
            0,
            clusters,
            DirectiveTable::new(directives),
            dims,
            tensors,
            NocModel::new(32, 1, true),
        )
        .unwrap()
    }

    // M = 0, N = 1, K = 2
    fn weight_stationary(m: i64) -> ClusterUnit {
        gemm_cluster(
            m,
            4,
            4,
            vec![
                Directive::spatial(0, 1, 1),
                Directive::temporal(2, 2, 2),
                Directive::temporal(1, 2, 2),
            ],
            4,
        )
    }

    fn tensor(unit: &ClusterUnit, class: DataClass) -> Tensor {
        unit.tensors().by_class(class).unwrap().clone()
    }

    fn conv_cluster(y_tile: i64, y_ofs: i64) -> ClusterUnit {
        let mut dims = DimensionTable::new();
        dims.add(LayerDimension::new("K", 2, 1, 1));
        dims.add(LayerDimension::new("R", 3, 1, 1));
        dims.add(LayerDimension::new("Y", 10, 1, 1));
        dims.add(LayerDimension::new("Y'", 8, 1, 1));
        dims.add_overlap("Y", "R", Some("Y'"));
        let tensors = TensorTable::for_layer(LayerType::Conv, false, &dims);
        ClusterUnit::new(
            0,
            2,
            DirectiveTable::new(vec![
                Directive::spatial(0, 1, 1),
                Directive::temporal(1, 3, 3),
                Directive::temporal(2, y_tile, y_ofs),
            ]),
            dims,
            tensors,
            NocModel::new(32, 1, true),
        )
        .unwrap()
    }

    #[test]
    fn test_exact_multiple_records() {
        let unit = gemm_cluster(1, 1, 8, vec![Directive::spatial(0, 1, 1), Directive::temporal(2, 4, 4)], 1);
        let reuse = ReuseAnalysis::new(&unit, false);
        let k = reuse.record(2).unwrap();
        assert_eq!((k.mapped, k.unique, k.reused), (4, 4, 0));
        assert_eq!(k.mapped_edge, 4);
        assert_eq!(k.reused_edge, 0);
    }

    #[test]
    fn test_remainder_records() {
        let unit = gemm_cluster(1, 1, 10, vec![Directive::spatial(0, 1, 1), Directive::temporal(2, 4, 4)], 1);
        let reuse = ReuseAnalysis::new(&unit, false);
        let k = reuse.record(2).unwrap();
        assert_eq!(k.mapped_edge, 2);
        assert_eq!(k.unique_edge, 2);
    }

    #[test]
    fn test_unrolled_temporal_record() {
        let unit = gemm_cluster(1, 1, 4, vec![Directive::spatial(0, 1, 1), Directive::temporal(2, 4, 4)], 1);
        let reuse = ReuseAnalysis::new(&unit, false);
        let k = reuse.record(2).unwrap();
        assert_eq!((k.mapped, k.unique, k.reused), (4, 0, 4));
    }

    #[test]
    fn test_conv_output_records() {
        let unit = conv_cluster(3, 1);
        let reuse = ReuseAnalysis::new(&unit, false);
        let out = reuse.record(3).unwrap();
        assert_eq!((out.mapped, out.unique), (1, 1));
        assert_eq!((out.mapped_edge, out.unique_edge), (1, 1));

        let unit = conv_cluster(6, 2);
        let reuse = ReuseAnalysis::new(&unit, false);
        let out = reuse.record(3).unwrap();
        // 6 input rows give 4 output rows; 2 of them are new per step
        assert_eq!((out.mapped, out.unique), (4, 2));
        assert_eq!(out.mapped_edge, 4);
        assert_eq!(out.unique_edge, 0);
    }

    #[test]
    fn test_sub_cluster_dimension() {
        let unit = conv_cluster(6, 2);
        let reuse = ReuseAnalysis::new(&unit, false);
        let analysis = IterationAnalysis::new(&unit);
        let sub = reuse.construct_sub_cluster_dimension(&analysis.statuses()[0], false);

        assert_eq!(sub.size(0), 1);
        assert_eq!(sub.size(1), 3);
        assert_eq!(sub.size(2), 6);
        assert_eq!(sub.size(3), 4);
        assert!(sub.is_overlapped(2));
    }

    #[test]
    fn test_ingress_follows_changing_dimension() {
        let unit = weight_stationary(4);
        let reuse = ReuseAnalysis::new(&unit, false);
        let analysis = IterationAnalysis::new(&unit);
        let input = tensor(&unit, DataClass::Input);
        let filter = tensor(&unit, DataClass::Weight);
        let statuses = analysis.statuses();

        // M: Init; K: Init, Steady; N: Init, Steady
        assert_eq!(statuses.len(), 4);

        // first step: everything is loaded
        assert_eq!(reuse.pe_ingress_volume(&input, &statuses[0], PeRole::FIRST).unwrap(), 2);
        assert_eq!(reuse.pe_ingress_volume(&filter, &statuses[0], PeRole::FIRST).unwrap(), 4);

        // N advances: the input does not depend on N
        assert_eq!(reuse.pe_ingress_volume(&input, &statuses[1], PeRole::FIRST).unwrap(), 0);
        assert_eq!(reuse.pe_ingress_volume(&filter, &statuses[1], PeRole::FIRST).unwrap(), 4);

        // K advances: new input columns; the filter restarts N so it reloads
        assert_eq!(reuse.pe_ingress_volume(&input, &statuses[2], PeRole::FIRST).unwrap(), 2);
        assert!(reuse.is_tensor_inited(&filter, &statuses[2], 1));
        assert_eq!(reuse.pe_ingress_volume(&filter, &statuses[2], PeRole::FIRST).unwrap(), 4);
    }

    #[test]
    fn test_spatial_ingress_traffic() {
        let unit = weight_stationary(4);
        let reuse = ReuseAnalysis::new(&unit, false);
        let analysis = IterationAnalysis::new(&unit);
        let input = tensor(&unit, DataClass::Input);
        let filter = tensor(&unit, DataClass::Weight);
        let status = &analysis.statuses()[2];

        // each of the 4 PEs fetches 2 new elements of its own row
        assert_eq!(reuse.spatial_ingress_traffic(&input, status).unwrap(), 8);
        // the filter is shared by all PEs
        assert_eq!(reuse.spatial_ingress_traffic(&filter, status).unwrap(), 4);
    }

    #[test]
    fn test_egress_and_partial_sums() {
        let unit = weight_stationary(4);
        let reuse = ReuseAnalysis::new(&unit, false);
        let analysis = IterationAnalysis::new(&unit);
        let output = tensor(&unit, DataClass::Output);
        let status = &analysis.statuses()[1];

        assert_eq!(reuse.pe_egress_volume(&output, status, false, PeRole::FIRST, true), 2);
        assert_eq!(reuse.spatial_egress_traffic(&output, status), 8);
        // K is a reduction dimension: 2 partial sums per output element
        assert_eq!(reuse.critical_path_partial_sums(&output, status), 4);
        assert_eq!(reuse.output_spatial_mapping_size(&output, status, false), 8);
        assert_eq!(reuse.output_spatial_mapping_size(&output, status, true), 16);
    }

    #[test]
    fn test_spatial_edge_mapping_size() {
        // 6 rows over 4 PEs: a full sweep, then 2 active PEs
        let unit = weight_stationary(6);
        assert_eq!(unit.num_clusters(true), 2);
        let reuse = ReuseAnalysis::new(&unit, false);
        let analysis = IterationAnalysis::new(&unit);
        let input = tensor(&unit, DataClass::Input);

        let init = &analysis.statuses()[0];
        assert_eq!(reuse.input_spatial_mapping_size(&input, init), 8);

        let edge = analysis
            .statuses()
            .iter()
            .find(|s| s.state(0).position == IterationPosition::Edge && s.state(1).is_init() && s.state(2).is_init())
            .unwrap();
        assert_eq!(reuse.input_spatial_mapping_size(&input, edge), 4);
    }

    #[test]
    fn test_mapped_volume() {
        let unit = weight_stationary(4);
        let reuse = ReuseAnalysis::new(&unit, false);
        assert_eq!(reuse.mapped_volume(&tensor(&unit, DataClass::Input)), 2);
        assert_eq!(reuse.mapped_volume(&tensor(&unit, DataClass::Weight)), 4);
        assert_eq!(reuse.mapped_volume(&tensor(&unit, DataClass::Output)), 2);

        assert!(reuse.is_spatially_mapped(&tensor(&unit, DataClass::Input)));
        assert!(!reuse.is_spatially_mapped(&tensor(&unit, DataClass::Weight)));
    }

    #[test]
    fn test_volumes_non_negative() {
        for unit in [weight_stationary(4), weight_stationary(6), weight_stationary(3), conv_cluster(3, 1), conv_cluster(6, 2)] {
            let reuse = ReuseAnalysis::new(&unit, true);
            let analysis = IterationAnalysis::new(&unit);
            for status in analysis.statuses() {
                for tensor in unit.tensors() {
                    assert!(reuse.mapped_volume(tensor) >= 0);
                    if tensor.is_output() {
                        assert!(reuse.spatial_egress_traffic(tensor, status) >= 0);
                        assert!(reuse.critical_path_partial_sums(tensor, status) >= 0);
                        assert!(reuse.output_spatial_mapping_size(tensor, status, true) >= 0);
                    } else {
                        assert!(reuse.spatial_ingress_traffic(tensor, status).unwrap() >= 0);
                        assert!(reuse.input_spatial_mapping_size(tensor, status) >= 0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_first_pe_maps_at_least_as_much() {
        for unit in [weight_stationary(4), weight_stationary(6), conv_cluster(6, 2)] {
            let reuse = ReuseAnalysis::new(&unit, false);
            let analysis = IterationAnalysis::new(&unit);
            for status in analysis.statuses() {
                for tensor in unit.tensors() {
                    assert!(
                        reuse.pe_mapped_volume(tensor, status, PeRole::FIRST)
                            >= reuse.pe_mapped_volume(tensor, status, PeRole::OTHER)
                    );
                }
            }
        }
    }

    #[test]
    fn test_queries_are_repeatable() {
        let unit = weight_stationary(6);
        let first = ReuseAnalysis::new(&unit, false);
        let second = ReuseAnalysis::new(&unit, false);
        let analysis = IterationAnalysis::new(&unit);
        let input = tensor(&unit, DataClass::Input);
        let output = tensor(&unit, DataClass::Output);

        for status in analysis.statuses() {
            let a = first.spatial_ingress_traffic(&input, status).unwrap();
            assert_eq!(a, first.spatial_ingress_traffic(&input, status).unwrap());
            assert_eq!(a, second.spatial_ingress_traffic(&input, status).unwrap());
            assert_eq!(
                first.spatial_egress_traffic(&output, status),
                second.spatial_egress_traffic(&output, status)
            );
        }
    }

    #[test]
    fn test_no_edge_uses_steady_counts() {
        let unit = weight_stationary(4);
        let reuse = ReuseAnalysis::new(&unit, false);
        let analysis = IterationAnalysis::new(&unit);
        let input = tensor(&unit, DataClass::Input);

        assert!(analysis.statuses().iter().all(|s| s.iter().all(|st| !st.is_edge())));
        for status in analysis.statuses() {
            assert_eq!(
                reuse.input_spatial_mapping_size(&input, status),
                unit.num_clusters(false) * reuse.pe_mapped_volume(&input, status, PeRole::FIRST)
            );
        }
    }
}
