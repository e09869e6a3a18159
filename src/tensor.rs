//! Tensors and their coupled dimensions
//!
//! A tensor only depends on the dimensions it is coupled to; every other
//! dimension leaves its addressing unchanged (e.g. the output tensor of a
//! convolution does not depend on the reduction dimensions C, R and S).

use serde::{Deserialize, Serialize};

use crate::ast::LayerType;
use crate::dimension::{DimId, DimensionTable};

/// Operand role of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataClass {
    Input,
    Weight,
    Output,
}

/// Direction of a tensor relative to the compute units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorClass {
    InputTensor,
    OutputTensor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tensor {
    pub name: String,
    pub class: TensorClass,
    pub data_class: DataClass,
    /// Dimension names as declared by the layer wiring
    pub coupled_names: Vec<String>,
    /// Resolved ids of the coupled dimensions present in the layer
    pub coupled: Vec<DimId>,
}

impl Tensor {
    pub fn new(
        name: impl Into<String>,
        class: TensorClass,
        data_class: DataClass,
        coupled_names: &[&str],
        dims: &DimensionTable,
    ) -> Self {
        let coupled_names: Vec<String> = coupled_names.iter().map(|s| s.to_string()).collect();
        let coupled = coupled_names
            .iter()
            .filter_map(|name| dims.index_of(name))
            .collect();
        Self {
            name: name.into(),
            class,
            data_class,
            coupled_names,
            coupled,
        }
    }

    pub fn is_coupled(&self, dim: DimId) -> bool {
        self.coupled.contains(&dim)
    }

    pub fn is_output(&self) -> bool {
        self.class == TensorClass::OutputTensor
    }
}

/// All tensors of one layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorTable {
    tensors: Vec<Tensor>,
}

impl TensorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tensor: Tensor) {
        self.tensors.push(tensor);
    }

    /// Build the input/filter/output wiring of a layer type
    pub fn for_layer(layer_type: LayerType, batch: bool, dims: &DimensionTable) -> Self {
        let (input, weight, output): (&[&str], &[&str], &[&str]) = match (layer_type, batch) {
            (LayerType::Conv, true) => (
                &["N", "C", "Y", "X"],
                &["K", "C", "R", "S"],
                &["N", "K", "Y", "X"],
            ),
            (LayerType::Conv, false) => (&["C", "Y", "X"], &["K", "C", "R", "S"], &["K", "Y", "X"]),
            (LayerType::DsConv, true) => (&["N", "C", "Y", "X"], &["C", "R", "S"], &["N", "C", "Y", "X"]),
            (LayerType::DsConv, false) => (&["C", "Y", "X"], &["C", "R", "S"], &["C", "Y", "X"]),
            (LayerType::NgConv, true) => (
                &["N", "G", "C", "Y", "X"],
                &["G", "K", "C", "R", "S"],
                &["N", "G", "K", "C", "Y", "X"],
            ),
            (LayerType::NgConv, false) => (
                &["G", "C", "Y", "X"],
                &["G", "K", "C", "R", "S"],
                &["G", "K", "C", "Y", "X"],
            ),
            (LayerType::Gemm, _) => (&["M", "K"], &["K", "N"], &["M", "N"]),
        };

        let mut table = Self::new();
        table.add(Tensor::new("input", TensorClass::InputTensor, DataClass::Input, input, dims));
        table.add(Tensor::new("filter", TensorClass::InputTensor, DataClass::Weight, weight, dims));
        table.add(Tensor::new("output", TensorClass::OutputTensor, DataClass::Output, output, dims));
        table
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.tensors.iter()
    }

    pub fn by_class(&self, data_class: DataClass) -> Option<&Tensor> {
        self.tensors.iter().find(|t| t.data_class == data_class)
    }

    pub fn by_name(&self, name: &str) -> Option<&Tensor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    /// Number of elements of a tensor over the full layer extents
    pub fn tensor_size(&self, data_class: DataClass, dims: &DimensionTable) -> i64 {
        self.by_class(data_class)
            .map(|t| t.coupled.iter().map(|&d| dims.size(d)).product())
            .unwrap_or(0)
    }
}

impl<'a> IntoIterator for &'a TensorTable {
    type Item = &'a Tensor;
    type IntoIter = std::slice::Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::LayerDimension;

    fn dims(names: &[(&str, i64)]) -> DimensionTable {
        let mut table = DimensionTable::new();
        for (name, size) in names {
            table.add(LayerDimension::new(*name, *size, 1, 1));
        }
        table
    }

    #[test]
    fn test_conv_wiring() {
        let dims = dims(&[("K", 4), ("C", 2), ("R", 3), ("S", 3), ("Y", 10), ("X", 10)]);
        let tensors = TensorTable::for_layer(LayerType::Conv, false, &dims);

        let output = tensors.by_class(DataClass::Output).unwrap();
        assert!(output.is_output());
        assert!(output.is_coupled(dims.index_of("K").unwrap()));
        assert!(!output.is_coupled(dims.index_of("C").unwrap()));

        assert_eq!(tensors.tensor_size(DataClass::Weight, &dims), 4 * 2 * 3 * 3);
        assert_eq!(tensors.tensor_size(DataClass::Input, &dims), 2 * 10 * 10);
    }

    #[test]
    fn test_gemm_wiring() {
        let dims = dims(&[("M", 8), ("N", 6), ("K", 4)]);
        let tensors = TensorTable::for_layer(LayerType::Gemm, false, &dims);
        let filter = tensors.by_name("filter").unwrap();
        assert_eq!(filter.data_class, DataClass::Weight);
        assert_eq!(filter.coupled_names, vec!["K".to_string(), "N".to_string()]);
        assert_eq!(tensors.tensor_size(DataClass::Output, &dims), 48);
    }
}
