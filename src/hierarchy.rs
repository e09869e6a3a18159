//! Cluster hierarchy of one layer
//!
//! Levels are built outer to inner. Each inner level sees the dimension
//! extents of one sub-cluster of the level above (its first, all-Init tile),
//! so `Sz(D)` in an inner level resolves to the tile size handed down.

use crate::analyzer::{LayerModel, LevelSpec};
use crate::cluster::ClusterUnit;
use crate::dimension::DimensionTable;
use crate::directive::{Directive, DirectiveClass, DirectiveTable};
use crate::error::{AnalysisError, AnalysisResult};
use crate::hardware::HardwareConfig;
use crate::iteration::IterationAnalysis;
use crate::reuse::ReuseAnalysis;

/// One built level: the cluster unit and its iteration table
#[derive(Debug, Clone)]
pub struct ClusterLevel {
    unit: ClusterUnit,
    iterations: IterationAnalysis,
    logical: bool,
}

impl ClusterLevel {
    pub fn unit(&self) -> &ClusterUnit {
        &self.unit
    }

    pub fn iterations(&self) -> &IterationAnalysis {
        &self.iterations
    }

    /// Declared with `Cluster(n, L)`
    pub fn is_logical(&self) -> bool {
        self.logical
    }

    /// Reuse records of this level
    pub fn reuse(&self, trace: bool) -> ReuseAnalysis<'_> {
        ReuseAnalysis::new(&self.unit, trace)
    }
}

#[derive(Debug, Clone)]
pub struct ClusterHierarchy {
    levels: Vec<ClusterLevel>,
}

impl ClusterHierarchy {
    /// Build every cluster level of `model` for the given hardware
    pub fn build(model: &LayerModel, hardware: &HardwareConfig) -> AnalysisResult<Self> {
        let top_clusters = Self::top_level_clusters(&model.levels, hardware.num_pes)?;
        let mut levels = Vec::with_capacity(model.levels.len());
        let mut dims = model.dimensions.clone();

        for (level, spec) in model.levels.iter().enumerate() {
            let clusters = spec.cluster_size.unwrap_or(top_clusters);
            let dataflow = Self::resolve_directives(spec, &dims)?;

            let unit = ClusterUnit::new(
                level,
                clusters,
                dataflow,
                dims,
                model.tensors.clone(),
                hardware.noc_for_level(level),
            )?;
            let iterations = IterationAnalysis::new(&unit);
            dims = Self::sub_cluster_dimensions(&unit, &iterations);

            levels.push(ClusterLevel {
                unit,
                iterations,
                logical: spec.logical,
            });
        }

        Ok(Self { levels })
    }

    /// Sub-clusters of the outermost level: the PEs divided by every inner
    /// cluster size
    fn top_level_clusters(levels: &[LevelSpec], num_pes: i64) -> AnalysisResult<i64> {
        let mut inner = 1i64;
        for size in levels.iter().filter_map(|l| l.cluster_size) {
            if size < 1 {
                return Err(AnalysisError::cluster_size(format!("Cluster({}) must be positive", size)));
            }
            inner *= size;
        }

        let top = num_pes / inner;
        if top < 1 {
            return Err(AnalysisError::cluster_size(format!(
                "{} PEs cannot host clusters of {} PEs",
                num_pes, inner
            )));
        }
        Ok(top)
    }

    /// Resolve names and size expressions against this level's extents
    fn resolve_directives(spec: &LevelSpec, dims: &DimensionTable) -> AnalysisResult<DirectiveTable> {
        let mut directives = Vec::with_capacity(spec.directives.len());
        for decl in &spec.directives {
            let dim = dims
                .index_of(&decl.dim)
                .ok_or_else(|| AnalysisError::unknown_dim(decl.dim.clone()))?;
            let size = decl.size.eval(dims)?;
            let offset = decl.offset.eval(dims)?;
            directives.push(match decl.class {
                DirectiveClass::TemporalMap => Directive::temporal(dim, size, offset),
                DirectiveClass::SpatialMap => Directive::spatial(dim, size, offset),
            });
        }

        let mut table = DirectiveTable::new(directives);
        table.convert_to_input_centric(dims);
        table.complete_with(dims);
        Ok(table)
    }

    /// Extents one sub-cluster sees, never larger than this level's
    fn sub_cluster_dimensions(unit: &ClusterUnit, iterations: &IterationAnalysis) -> DimensionTable {
        let dims = unit.dimensions();
        let statuses = iterations.statuses();
        let Some(first) = statuses.iter().find(|s| s.is_all_init()).or_else(|| statuses.first()) else {
            return dims.clone();
        };

        let mut sub = ReuseAnalysis::new(unit, false).construct_sub_cluster_dimension(first, false);
        for (id, dim) in dims.iter() {
            sub.set_size(id, sub.size(id).min(dim.size));
        }
        sub
    }

    pub fn levels(&self) -> &[ClusterLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Sub-cluster counts of every level, outermost first
    pub fn cluster_sizes(&self) -> Vec<i64> {
        self.levels.iter().map(|l| l.unit.num_clusters(false)).collect()
    }
}
