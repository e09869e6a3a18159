//! Iteration states of each directive and the iteration status table
//!
//! Every directive of a cluster level goes through at most three phases:
//! the first tile (Init), repeated full tiles (Steady) and a final partial
//! tile (Edge). An [`IterationStatus`] picks one phase per directive; the
//! status table lists every combination with the number of times it occurs.

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterUnit;
use crate::dimension::{DimId, DimensionTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IterationPosition {
    Init,
    Steady,
    Edge,
}

impl std::fmt::Display for IterationPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IterationPosition::Init => write!(f, "Init"),
            IterationPosition::Steady => write!(f, "Steady"),
            IterationPosition::Edge => write!(f, "Edge"),
        }
    }
}

/// One phase of one directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationState {
    pub dim: DimId,
    pub position: IterationPosition,
    pub occurrence: i64,
    /// The tile (or spatial coverage) spans the whole dimension
    pub unrolled: bool,
    /// The tile (or spatial coverage) overhangs the dimension
    pub edge: bool,
    /// A spatial edge sweep whose last sub-cluster gets a partial tile
    pub sp_edge_edge: bool,
}

impl IterationState {
    pub fn new(dim: DimId, position: IterationPosition, occurrence: i64, unrolled: bool, edge: bool) -> Self {
        Self {
            dim,
            position,
            occurrence,
            unrolled,
            edge,
            sp_edge_edge: false,
        }
    }

    pub fn with_sp_edge_edge(mut self, sp_edge_edge: bool) -> Self {
        self.sp_edge_edge = sp_edge_edge;
        self
    }

    /// Whether this phase works on a partial tile
    ///
    /// Either the first tile already overhangs the dimension, or this is the
    /// trailing Edge phase.
    pub fn is_edge(&self) -> bool {
        self.edge || self.position == IterationPosition::Edge
    }

    pub fn is_init(&self) -> bool {
        self.position == IterationPosition::Init
    }
}

/// One combination of iteration states, one per directive, in directive order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationStatus {
    states: Vec<IterationState>,
    occurrence: i64,
}

impl IterationStatus {
    pub fn new(states: Vec<IterationState>) -> Self {
        let occurrence = states.iter().map(|s| s.occurrence).product();
        Self { states, occurrence }
    }

    pub fn occurrence(&self) -> i64 {
        self.occurrence
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State of the directive at `idx`
    pub fn state(&self, idx: usize) -> &IterationState {
        &self.states[idx]
    }

    pub fn find(&self, dim: DimId) -> Option<&IterationState> {
        self.states.iter().find(|s| s.dim == dim)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IterationState> {
        self.states.iter()
    }

    /// Innermost directive whose state is not Init, i.e. the directive that
    /// advanced to reach this status
    pub fn innermost_changing(&self) -> Option<usize> {
        self.states.iter().rposition(|s| !s.is_init())
    }

    pub fn is_all_init(&self) -> bool {
        self.states.iter().all(|s| s.is_init())
    }

    pub fn describe(&self, dims: &DimensionTable) -> String {
        self.states
            .iter()
            .map(|s| {
                let mut label = format!("{}:{}", dims.name(s.dim), s.position);
                if s.edge {
                    label.push('*');
                }
                if s.sp_edge_edge {
                    label.push('+');
                }
                label
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Iteration states of every directive of one cluster level
#[derive(Debug, Clone)]
pub struct IterationAnalysis {
    states: Vec<Vec<IterationState>>,
    table: Vec<IterationStatus>,
}

impl IterationAnalysis {
    pub fn new(cluster: &ClusterUnit) -> Self {
        let states = Self::analyze_iteration_states(cluster);
        let table = Self::construct_status_table(&states);

        log::debug!(
            "Cluster level {}: {} iteration statuses, {} total occurrences",
            cluster.level(),
            table.len(),
            table.iter().map(|s| s.occurrence()).sum::<i64>()
        );

        Self { states, table }
    }

    /// States of the directive at `idx`, in Init, Steady, Edge order
    pub fn states_of(&self, idx: usize) -> &[IterationState] {
        &self.states[idx]
    }

    pub fn statuses(&self) -> &[IterationStatus] {
        &self.table
    }

    pub fn total_occurrences(&self) -> i64 {
        self.table.iter().map(|s| s.occurrence()).sum()
    }

    fn analyze_iteration_states(cluster: &ClusterUnit) -> Vec<Vec<IterationState>> {
        let dims = cluster.dimensions();
        let mut all_states = Vec::with_capacity(cluster.dataflow().len());

        for directive in cluster.dataflow() {
            let dim = directive.dim;
            let dim_size = dims.size(dim);
            let map_size = directive.size;
            let map_ofs = directive.offset;
            let mut states = Vec::with_capacity(3);

            if directive.is_temporal() {
                let init_unroll = dim_size <= map_size;
                let init_edge = dim_size < map_size;
                states.push(IterationState::new(dim, IterationPosition::Init, 1, init_unroll, init_edge));

                // TODO: revisit the steady count when the tile equals the
                // dimension; it currently relies on the floor reaching zero
                let num_steady = (dim_size - map_size) / map_ofs;
                if map_size < dim_size && num_steady > 0 {
                    states.push(IterationState::new(dim, IterationPosition::Steady, num_steady, false, false));
                }

                if !init_edge && num_steady * map_ofs + map_size < dim_size {
                    states.push(IterationState::new(dim, IterationPosition::Edge, 1, false, false));
                }
            } else {
                let clusters = cluster.num_clusters(false);
                let coverage = map_size + map_ofs * (clusters - 1);
                let init_unroll = dim_size <= coverage;
                let init_edge = dim_size < coverage;
                let init_sp_edge_edge = Self::has_partial_sub_cluster(dim_size, map_size, map_ofs) && init_edge;
                states.push(
                    IterationState::new(dim, IterationPosition::Init, 1, init_unroll, init_edge)
                        .with_sp_edge_edge(init_sp_edge_edge),
                );

                let num_steady = if dim_size > coverage {
                    ((dim_size - map_size) / map_ofs + 1) / clusters - 1
                } else {
                    0
                };
                if num_steady > 0 {
                    states.push(IterationState::new(dim, IterationPosition::Steady, num_steady, false, false));
                }

                if dim_size > coverage {
                    let total_coverage = ((num_steady + 1) * clusters - 1) * map_ofs + map_size;
                    let remaining = if dim_size == total_coverage {
                        0
                    } else {
                        dim_size - (num_steady + 1) * clusters * map_ofs
                    };
                    if remaining != 0 {
                        let sp_edge_edge = remaining < map_size
                            || Self::has_partial_sub_cluster(dim_size, map_size, map_ofs);
                        states.push(
                            IterationState::new(dim, IterationPosition::Edge, 1, false, false)
                                .with_sp_edge_edge(sp_edge_edge),
                        );
                    }
                }
            }

            all_states.push(states);
        }

        all_states
    }

    /// Whether the last sub-cluster to receive a tile only gets part of one
    fn has_partial_sub_cluster(dim_size: i64, map_size: i64, map_ofs: i64) -> bool {
        if dim_size < map_size {
            true
        } else {
            let full_clusters = (dim_size - map_size) / map_ofs + 1;
            dim_size > full_clusters * map_ofs
        }
    }

    /// Cartesian product of the state lists, last directive varying fastest
    fn construct_status_table(states: &[Vec<IterationState>]) -> Vec<IterationStatus> {
        let num_cases: usize = states.iter().map(|s| s.len()).product();
        let mut indices = vec![0usize; states.len()];
        let mut table = Vec::with_capacity(num_cases);

        for _ in 0..num_cases {
            let combination = states
                .iter()
                .zip(&indices)
                .map(|(list, &i)| list[i])
                .collect();
            table.push(IterationStatus::new(combination));

            for dim in (0..states.len()).rev() {
                indices[dim] += 1;
                if indices[dim] < states[dim].len() {
                    break;
                }
                indices[dim] = 0;
            }
        }

        table
    }
}

impl std::fmt::Display for IterationAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (case, status) in self.table.iter().enumerate() {
            write!(f, "case {} x{}:", case, status.occurrence())?;
            for state in status.iter() {
                write!(f, " {}", state.position)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
