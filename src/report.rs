//! Layer and network reports
//!
//! Every iteration status of every cluster level is evaluated once; level
//! totals weight each status by its occurrence count.

use serde::{Deserialize, Serialize};

use crate::analyzer::LayerModel;
use crate::ast::LayerType;
use crate::energy::{memory_energy, Operation, Quantization, ENERGY_COST_PER_BIT};
use crate::error::AnalysisResult;
use crate::hardware::HardwareConfig;
use crate::hierarchy::{ClusterHierarchy, ClusterLevel};
use crate::tensor::DataClass;

/// Volumes of one tensor in one iteration status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorTraffic {
    pub tensor: String,
    pub data_class: DataClass,
    /// Elements delivered to (inputs) or written back from (output) the
    /// sub-clusters
    pub traffic: i64,
    /// Elements put on the NoC for `traffic`, after multicast
    pub injected: i64,
    /// Elements held by all sub-clusters together
    pub mapping_size: i64,
    /// Partial sums along the critical path; outputs only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_sums: Option<i64>,
}

/// One iteration status of a level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case: usize,
    pub occurrence: i64,
    pub states: String,
    pub tensors: Vec<TensorTraffic>,
    pub noc_cycles: i64,
}

impl CaseReport {
    pub fn traffic_of(&self, data_class: DataClass) -> i64 {
        self.tensors
            .iter()
            .filter(|t| t.data_class == data_class)
            .map(|t| t.traffic)
            .sum()
    }
}

/// One cluster level, totals weighted by occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelReport {
    pub level: usize,
    pub num_clusters: i64,
    pub edge_clusters: i64,
    pub logical: bool,
    pub dataflow: String,
    pub dimensions: String,
    pub total_iterations: i64,
    pub total_occurrences: i64,
    pub ingress: i64,
    pub injected_ingress: i64,
    pub egress: i64,
    pub partial_sums: i64,
    pub noc_cycles: i64,
    pub cases: Vec<CaseReport>,
}

impl LevelReport {
    /// Evaluate every iteration status of `level`
    pub fn build(level: &ClusterLevel, trace: bool) -> AnalysisResult<Self> {
        let unit = level.unit();
        let reuse = level.reuse(trace);
        let dims = unit.dimensions();
        let clusters = unit.num_clusters(false);
        let mut cases = Vec::with_capacity(level.iterations().statuses().len());

        for (case, status) in level.iterations().statuses().iter().enumerate() {
            let mut tensors = Vec::new();
            for tensor in unit.tensors() {
                let entry = if tensor.is_output() {
                    let traffic = reuse.spatial_egress_traffic(tensor, status);
                    TensorTraffic {
                        tensor: tensor.name.clone(),
                        data_class: tensor.data_class,
                        traffic,
                        injected: traffic,
                        mapping_size: reuse.output_spatial_mapping_size(tensor, status, false),
                        partial_sums: Some(reuse.critical_path_partial_sums(tensor, status)),
                    }
                } else {
                    let traffic = reuse.spatial_ingress_traffic(tensor, status)?;
                    // unsplit tensors go to every sub-cluster
                    let receivers = if reuse.is_spatially_mapped(tensor) { 1 } else { clusters };
                    TensorTraffic {
                        tensor: tensor.name.clone(),
                        data_class: tensor.data_class,
                        traffic,
                        injected: unit.noc().injected_volume(traffic, receivers),
                        mapping_size: reuse.input_spatial_mapping_size(tensor, status),
                        partial_sums: None,
                    }
                };
                tensors.push(entry);
            }

            let volume: i64 = tensors.iter().map(|t| t.injected).sum();
            cases.push(CaseReport {
                case,
                occurrence: status.occurrence(),
                states: status.describe(dims),
                noc_cycles: unit.noc().transfer_delay(volume),
                tensors,
            });
        }

        let ingress = weighted(&cases, |c| input_volume(c, false));
        let injected_ingress = weighted(&cases, |c| input_volume(c, true));
        let egress = weighted(&cases, |c| c.traffic_of(DataClass::Output));
        let partial_sums = weighted(&cases, |c| c.tensors.iter().filter_map(|t| t.partial_sums).sum());
        let noc_cycles = weighted(&cases, |c| c.noc_cycles);

        Ok(Self {
            level: unit.level(),
            num_clusters: clusters,
            edge_clusters: unit.num_clusters(true),
            logical: level.is_logical(),
            dataflow: unit.dataflow().describe(dims),
            dimensions: dims.to_string(),
            total_iterations: unit.num_total_iterations(),
            total_occurrences: level.iterations().total_occurrences(),
            ingress,
            injected_ingress,
            egress,
            partial_sums,
            noc_cycles,
            cases,
        })
    }
}

/// Sum of a per-case value times the case's occurrence count
fn weighted<F>(cases: &[CaseReport], value: F) -> i64
where
    F: Fn(&CaseReport) -> i64,
{
    cases.iter().map(|c| value(c) * c.occurrence).sum()
}

fn input_volume(case: &CaseReport, injected: bool) -> i64 {
    case.tensors
        .iter()
        .filter(|t| t.data_class != DataClass::Output)
        .map(|t| if injected { t.injected } else { t.traffic })
        .sum()
}

/// Energy estimate of one layer, in nJ
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EnergyReport {
    pub mac: f64,
    pub l2_read: f64,
    pub l2_write: f64,
    pub noc: f64,
}

impl EnergyReport {
    pub fn total(&self) -> f64 {
        self.mac + self.l2_read + self.l2_write + self.noc
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerReport {
    pub name: String,
    pub layer_type: LayerType,
    pub quantization: Quantization,
    pub num_macs: i64,
    pub levels: Vec<LevelReport>,
    pub energy: EnergyReport,
}

impl LayerReport {
    pub fn build(model: &LayerModel, hierarchy: &ClusterHierarchy, hardware: &HardwareConfig, trace: bool) -> AnalysisResult<Self> {
        let levels = hierarchy
            .levels()
            .iter()
            .map(|level| LevelReport::build(level, trace))
            .collect::<AnalysisResult<Vec<_>>>()?;

        let q = model.quantization;
        let l2_elements = hardware.l2_size.max(0) as u64;
        // the outermost level reads from and writes back to the global buffer
        let (l2_reads, l2_writes) = levels
            .first()
            .map(|top| (top.ingress, top.egress))
            .unwrap_or((0, 0));
        let noc_elements: i64 = levels.iter().map(|l| l.injected_ingress + l.egress).sum();
        let noc_bits = noc_elements.max(0) as f64 * q.bit_size() as f64;

        let energy = EnergyReport {
            mac: model.num_macs as f64 * q.mac_energy(),
            l2_read: l2_reads as f64 * memory_energy(l2_elements, q, Operation::Read),
            l2_write: l2_writes as f64 * memory_energy(l2_elements, q, Operation::Write),
            noc: noc_bits * q.hop_count() as f64 * ENERGY_COST_PER_BIT * 1e9,
        };

        log::info!(
            "Layer {}: {} levels, {} MACs, {:.3e} nJ",
            model.name,
            levels.len(),
            model.num_macs,
            energy.total()
        );

        Ok(Self {
            name: model.name.clone(),
            layer_type: model.layer_type,
            quantization: q,
            num_macs: model.num_macs,
            levels,
            energy,
        })
    }
}

/// Analysis results of a whole network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkReport {
    pub name: String,
    pub hardware: HardwareConfig,
    pub layers: Vec<LayerReport>,
}

impl NetworkReport {
    /// Export to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn total_macs(&self) -> i64 {
        self.layers.iter().map(|l| l.num_macs).sum()
    }

    pub fn total_energy(&self) -> f64 {
        self.layers.iter().map(|l| l.energy.total()).sum()
    }
}

impl std::fmt::Display for LevelReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Level {}: {} sub-clusters ({} in edge sweep){}",
            self.level,
            self.num_clusters,
            self.edge_clusters,
            if self.logical { ", logical" } else { "" }
        )?;
        writeln!(f, "  Dataflow: {}", self.dataflow)?;
        writeln!(f, "  Dimensions: {}", self.dimensions)?;
        writeln!(
            f,
            "  Iterations: {} ({} cases, {} occurrences)",
            self.total_iterations,
            self.cases.len(),
            self.total_occurrences
        )?;
        writeln!(f, "  Ingress: {} elements ({} injected)", self.ingress, self.injected_ingress)?;
        writeln!(f, "  Egress: {} elements", self.egress)?;
        writeln!(f, "  Partial sums: {}", self.partial_sums)?;
        write!(f, "  NoC cycles: {}", self.noc_cycles)
    }
}

impl std::fmt::Display for LayerReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Layer {} ({}, {:?})", self.name, self.layer_type, self.quantization)?;
        writeln!(f, "MACs: {}", self.num_macs)?;
        for level in &self.levels {
            writeln!(f, "{}", level)?;
        }
        write!(
            f,
            "Energy (nJ): MAC {:.3e}, L2 read {:.3e}, L2 write {:.3e}, NoC {:.3e}, total {:.3e}",
            self.energy.mac,
            self.energy.l2_read,
            self.energy.l2_write,
            self.energy.noc,
            self.energy.total()
        )
    }
}

impl std::fmt::Display for NetworkReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Network {}", self.name)?;
        writeln!(f, "========")?;
        writeln!(f, "{}", self.hardware)?;
        for layer in &self.layers {
            writeln!(f)?;
            writeln!(f, "{}", layer)?;
        }
        writeln!(f)?;
        write!(f, "Total MACs: {}, total energy: {:.3e} nJ", self.total_macs(), self.total_energy())
    }
}
