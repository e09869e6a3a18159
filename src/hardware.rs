//! Hardware description of the target accelerator
//!
//! The analysis engine only needs the number of processing elements; the
//! remaining fields feed the report (buffer energy, NoC estimates).

use serde::{Deserialize, Serialize};

/// Configuration of the target accelerator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Total number of processing elements
    pub num_pes: i64,
    /// Per-PE local buffer size (elements)
    pub l1_size: i64,
    /// Shared global buffer size (elements)
    pub l2_size: i64,
    /// NoC bandwidth (elements per cycle)
    pub noc_bandwidth: i64,
    /// NoC latency (cycles per transfer)
    pub noc_latency: i64,
    /// Whether the NoC can multicast one element to many sub-clusters
    pub noc_multicast: bool,
    /// Off-chip bandwidth (elements per cycle)
    pub offchip_bandwidth: i64,
    /// Vector width of each PE
    pub simd_width: i64,
}

impl HardwareConfig {
    pub fn new(num_pes: i64) -> Self {
        Self {
            num_pes,
            ..Self::default()
        }
    }

    /// NoC serving the given cluster level
    ///
    /// Every level uses the same interconnect parameters; level 0 also sees
    /// the off-chip bandwidth limit.
    pub fn noc_for_level(&self, level: usize) -> NocModel {
        let bandwidth = if level == 0 {
            self.noc_bandwidth.min(self.offchip_bandwidth.max(1))
        } else {
            self.noc_bandwidth
        };
        NocModel::new(bandwidth, self.noc_latency, self.noc_multicast)
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            num_pes: 256,
            l1_size: 512,
            l2_size: 108_000,
            noc_bandwidth: 32,
            noc_latency: 1,
            noc_multicast: true,
            offchip_bandwidth: 50,
            simd_width: 1,
        }
    }
}

/// Interconnect between one cluster level and its sub-clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NocModel {
    pub bandwidth: i64,
    pub latency: i64,
    pub multicast: bool,
}

impl NocModel {
    pub fn new(bandwidth: i64, latency: i64, multicast: bool) -> Self {
        Self {
            bandwidth: bandwidth.max(1),
            latency,
            multicast,
        }
    }

    /// Cycles to move `volume` elements across this NoC
    pub fn transfer_delay(&self, volume: i64) -> i64 {
        if volume <= 0 {
            return 0;
        }
        (volume + self.bandwidth - 1) / self.bandwidth + self.latency
    }

    /// Elements actually injected for `volume` elements fanned out to
    /// `receivers` sub-clusters
    pub fn injected_volume(&self, volume: i64, receivers: i64) -> i64 {
        if self.multicast {
            volume
        } else {
            volume * receivers.max(1)
        }
    }
}

impl std::fmt::Display for HardwareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Hardware")?;
        writeln!(f, "========")?;
        writeln!(f, "PEs: {} (SIMD width {})", self.num_pes, self.simd_width)?;
        writeln!(f, "L1: {} elements, L2: {} elements", self.l1_size, self.l2_size)?;
        write!(
            f,
            "NoC: {} elements/cycle, latency {}, multicast {}",
            self.noc_bandwidth, self.noc_latency, self.noc_multicast
        )
    }
}
