//! Technology lookup tables: data widths, SRAM energy and MAC cost
//!
//! Energies are in nJ per access (or per operation), leakage in mW.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Data format a layer is computed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Quantization {
    #[default]
    FP32,
    FP16,
    FP8,
    FP4,
    FP2,
    INT32,
    INT16,
    INT8,
    INT4,
    INT2,
}

impl Quantization {
    pub fn bit_size(&self) -> u64 {
        match self {
            Quantization::FP32 | Quantization::INT32 => 32,
            Quantization::FP16 | Quantization::INT16 => 16,
            Quantization::FP8 | Quantization::INT8 => 8,
            Quantization::FP4 | Quantization::INT4 => 4,
            Quantization::FP2 | Quantization::INT2 => 2,
        }
    }

    /// Average NoC hops travelled by one operand
    pub fn hop_count(&self) -> u64 {
        2
    }

    /// Area of one MAC unit (um^2)
    pub fn mac_area(&self) -> f64 {
        // integer division of the FP32 figure, as in the published tables
        (283 / (32 / self.bit_size())) as f64
    }

    /// Power of one MAC unit (mW)
    pub fn mac_power(&self) -> f64 {
        1.2223 / (32 / self.bit_size()) as f64
    }

    /// Energy of one MAC operation (nJ)
    pub fn mac_energy(&self) -> f64 {
        match self {
            Quantization::FP32 => 10.752e-3,
            Quantization::FP16 => 5.024e-3,
            Quantization::FP8 => 2.433297297e-3,
            Quantization::FP4 => 1.397423521e-3,
            Quantization::FP2 => (1.397423521 / 2.0) * 1e-3,
            Quantization::INT32 => 2.221124324e-3,
            Quantization::INT16 => 1.299524324e-3,
            Quantization::INT8 => 0.825924324e-3,
            Quantization::INT4 => 0.608324324e-3,
            Quantization::INT2 => 0.423756582e-3,
        }
    }
}

impl std::str::FromStr for Quantization {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FP32" => Ok(Quantization::FP32),
            "FP16" => Ok(Quantization::FP16),
            "FP8" => Ok(Quantization::FP8),
            "FP4" => Ok(Quantization::FP4),
            "FP2" => Ok(Quantization::FP2),
            "INT32" => Ok(Quantization::INT32),
            "INT16" => Ok(Quantization::INT16),
            "INT8" => Ok(Quantization::INT8),
            "INT4" => Ok(Quantization::INT4),
            "INT2" => Ok(Quantization::INT2),
            _ => Err(AnalysisError::UnsupportedQuantization { name: s.to_string() }),
        }
    }
}

/// Buffer access direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// SRAM macro characteristics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryParams {
    pub write_energy: f64,
    pub read_energy: f64,
    pub leakage_power: f64,
}

/// Energy per transmitted bit per hop (J)
pub const ENERGY_COST_PER_BIT: f64 = 0.1143e-12;

const LARGEST_MEMORY: u64 = 2_147_483_648;

/// (capacity in bytes, parameters), ascending
const MEMORY_TABLE: [(u64, MemoryParams); 23] = [
    (512, mem(2.73e-4, 2.91e-4, 5.81e-5)),
    (1024, mem(3.35e-4, 4.18e-4, 1.30558e-4)),
    (2048, mem(5.06e-4, 5.89e-4, 3.00498e-4)),
    (4096, mem(9.51e-4, 9.73e-4, 5.18707e-4)),
    (8192, mem(1.51e-3, 1.53e-3, 1.01401e-3)),
    (16384, mem(2.17e-3, 2.24e-3, 2.10329e-3)),
    (32768, mem(3.39e-3, 3.45e-3, 4.00746e-3)),
    (65536, mem(5.19e-3, 5.30e-3, 8.65728e-3)),
    (131072, mem(7.94e-3, 8.06e-3, 1.69947e-2)),
    (262144, mem(1.08e-2, 1.09e-2, 3.26368e-2)),
    (524288, mem(1.62e-2, 1.63e-2, 6.42241e-2)),
    (1048576, mem(2.22e-2, 2.23e-2, 1.25151e-1)),
    (2097152, mem(3.33e-2, 3.34e-2, 2.47646e-1)),
    (4194304, mem(4.59e-2, 4.60e-2, 4.87825e-1)),
    (8388608, mem(9.18e-2, 9.20e-2, 9.7565e-1)),
    (16777216, mem(1.836e-1, 1.84e-1, 1.9513)),
    (33554432, mem(3.672e-1, 3.68e-1, 3.9026)),
    (67108864, mem(7.344e-1, 7.36e-1, 7.8052)),
    (134217728, mem(1.4688, 1.472, 15.6104)),
    (268435456, mem(2.937, 2.944, 31.2208)),
    (536870912, mem(5.8752, 5.88, 62.4416)),
    (1073741824, mem(1.175e1, 1.176e1, 124.8832)),
    (LARGEST_MEMORY, mem(2.35e1, 2.352e1, 249.7664)),
];

const fn mem(write_energy: f64, read_energy: f64, leakage_power: f64) -> MemoryParams {
    MemoryParams {
        write_energy,
        read_energy,
        leakage_power,
    }
}

/// Smallest SRAM macro that holds `bytes`
pub fn memory_size(bytes: u64) -> u64 {
    MEMORY_TABLE
        .iter()
        .map(|(size, _)| *size)
        .find(|&size| size >= bytes)
        .unwrap_or(LARGEST_MEMORY)
}

pub fn memory_params(bytes: u64) -> MemoryParams {
    let size = memory_size(bytes);
    MEMORY_TABLE
        .iter()
        .find(|(s, _)| *s == size)
        .map(|(_, params)| *params)
        .unwrap_or(MEMORY_TABLE[MEMORY_TABLE.len() - 1].1)
}

/// Dynamic energy of one access to a buffer holding `num_elements` values
pub fn memory_energy(num_elements: u64, quantization: Quantization, operation: Operation) -> f64 {
    let bytes = num_elements * quantization.bit_size() / 8;
    let params = memory_params(bytes);
    match operation {
        Operation::Read => params.read_energy,
        Operation::Write => params.write_energy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_sizes() {
        assert_eq!(Quantization::FP32.bit_size(), 32);
        assert_eq!(Quantization::INT8.bit_size(), 8);
        assert_eq!(Quantization::FP2.bit_size(), 2);
        assert!("INT3".parse::<Quantization>().is_err());
        assert_eq!("int4".parse::<Quantization>().unwrap(), Quantization::INT4);
    }

    #[test]
    fn test_memory_size_lookup() {
        assert_eq!(memory_size(0), 512);
        assert_eq!(memory_size(512), 512);
        assert_eq!(memory_size(513), 1024);
        assert_eq!(memory_size(u64::MAX), LARGEST_MEMORY);
    }

    #[test]
    fn test_memory_energy() {
        // 128 INT32 values = 512 bytes
        assert_eq!(memory_energy(128, Quantization::INT32, Operation::Read), 2.91e-4);
        assert_eq!(memory_energy(128, Quantization::INT32, Operation::Write), 2.73e-4);
        // 1024 INT8 values = 1 KiB
        assert_eq!(memory_energy(1024, Quantization::INT8, Operation::Read), 4.18e-4);
    }

    #[test]
    fn test_mac_costs() {
        assert_eq!(Quantization::FP32.mac_area(), 283.0);
        assert_eq!(Quantization::FP16.mac_area(), 141.0);
        assert_eq!(Quantization::INT8.mac_area(), 70.0);
        assert!((Quantization::INT16.mac_power() - 1.2223 / 2.0).abs() < 1e-12);
        assert!(Quantization::INT8.mac_energy() < Quantization::FP32.mac_energy());
    }
}
