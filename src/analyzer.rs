//! Layer analyzer: resolves a parsed layer into its tables
//!
//! Builds the dimension table (deriving the missing side of each sliding
//! window), the sliding-window overlaps, the tensor wiring and the per-level
//! directive lists split at `Cluster(..)` entries.

use crate::ast::{DataflowItem, DirectiveDecl, Layer, LayerType};
use crate::dimension::{names, DimensionTable, LayerDimension};
use crate::energy::Quantization;
use crate::error::{AnalysisError, AnalysisResult};
use crate::tensor::TensorTable;

/// Directives of one cluster level, still unresolved
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSpec {
    /// Size of the `Cluster(n)` entry that opened this level; `None` for the
    /// outermost level
    pub cluster_size: Option<i64>,
    pub logical: bool,
    pub directives: Vec<DirectiveDecl>,
}

/// A layer with its dimensions, tensors and cluster levels resolved
#[derive(Debug, Clone)]
pub struct LayerModel {
    pub name: String,
    pub layer_type: LayerType,
    pub quantization: Quantization,
    pub dimensions: DimensionTable,
    pub tensors: TensorTable,
    pub levels: Vec<LevelSpec>,
    pub num_macs: i64,
}

/// Sliding window of a convolution along one axis
struct Window {
    input: &'static str,
    filter: &'static str,
    output: &'static str,
}

const WINDOWS: [Window; 2] = [
    Window {
        input: names::INPUT_WIDTH,
        filter: names::WEIGHT_WIDTH,
        output: names::OUTPUT_WIDTH,
    },
    Window {
        input: names::INPUT_HEIGHT,
        filter: names::WEIGHT_HEIGHT,
        output: names::OUTPUT_HEIGHT,
    },
];

/// Analyzer turning parsed layers into [`LayerModel`]s
#[derive(Debug, Default)]
pub struct LayerAnalyzer;

impl LayerAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze one layer
    pub fn analyze(&self, layer: &Layer) -> AnalysisResult<LayerModel> {
        check_unique_dimensions(layer)?;

        let dimensions = if layer.layer_type.is_convolution() {
            self.conv_dimensions(layer)?
        } else {
            self.plain_dimensions(layer)
        };

        let batch = layer.dimensions.iter().any(|(name, _)| name == names::INPUT_BATCH);
        let tensors = TensorTable::for_layer(layer.layer_type, batch, &dimensions);
        let levels = split_levels(&layer.dataflow);
        let num_macs = layer.dimensions.iter().map(|(_, size)| *size).product();

        log::debug!(
            "Layer {} ({}): dimensions [{}], {} cluster levels, {} MACs",
            layer.name,
            layer.layer_type,
            dimensions,
            levels.len(),
            num_macs
        );

        Ok(LayerModel {
            name: layer.name.clone(),
            layer_type: layer.layer_type,
            quantization: layer.quantization,
            dimensions,
            tensors,
            levels,
            num_macs,
        })
    }

    fn plain_dimensions(&self, layer: &Layer) -> DimensionTable {
        let mut table = DimensionTable::new();
        for (name, size) in &layer.dimensions {
            let stride = layer.stride_of(name);
            table.add(LayerDimension::new(name.clone(), *size, stride, 1));
        }
        table
    }

    /// Declared dimensions plus the derived side of every sliding window
    fn conv_dimensions(&self, layer: &Layer) -> AnalysisResult<DimensionTable> {
        let mut table = DimensionTable::new();
        let declared = |name: &str| {
            layer
                .dimensions
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, size)| *size)
        };

        for window in &WINDOWS {
            if declared(window.input).is_some() && declared(window.output).is_some() {
                return Err(AnalysisError::DoubleDimDefinition {
                    name: window.input.to_string(),
                });
            }
        }

        for (name, size) in &layer.dimensions {
            let stride = WINDOWS
                .iter()
                .find(|w| name.as_str() == w.input || name.as_str() == w.output)
                .map(|w| layer.stride_of(w.input))
                .unwrap_or(1);
            table.add(LayerDimension::new(name.clone(), *size, stride, 1));
        }

        for window in &WINDOWS {
            let stride = layer.stride_of(window.input).max(1);
            let filter = || declared(window.filter).ok_or_else(|| AnalysisError::unknown_dim(window.filter));

            match (declared(window.input), declared(window.output)) {
                (Some(input), None) => {
                    let output = (input - filter()?) / stride + 1;
                    table.add(LayerDimension::new(window.output, output, stride, 1));
                }
                (None, Some(output)) => {
                    let input = (output - 1) * stride + filter()?;
                    table.add(LayerDimension::new(window.input, input, stride, 1));
                }
                _ => {}
            }

            if table.add_overlap(window.input, window.filter, Some(window.output)) {
                log::debug!(
                    "Layer {}: {} slides over {} producing {}",
                    layer.name,
                    window.filter,
                    window.input,
                    window.output
                );
            }
        }

        Ok(table)
    }
}

fn check_unique_dimensions(layer: &Layer) -> AnalysisResult<()> {
    for (idx, (name, _)) in layer.dimensions.iter().enumerate() {
        if layer.dimensions[..idx].iter().any(|(seen, _)| seen == name) {
            return Err(AnalysisError::DuplicateDimension { name: name.clone() });
        }
    }
    Ok(())
}

/// Split a dataflow block into cluster levels, outermost first
pub fn split_levels(dataflow: &[DataflowItem]) -> Vec<LevelSpec> {
    let mut levels = vec![LevelSpec {
        cluster_size: None,
        logical: false,
        directives: Vec::new(),
    }];

    for item in dataflow {
        match item {
            DataflowItem::Map(decl) => {
                if let Some(level) = levels.last_mut() {
                    level.directives.push(decl.clone());
                }
            }
            DataflowItem::Cluster { size, logical } => levels.push(LevelSpec {
                cluster_size: Some(*size),
                logical: *logical,
                directives: Vec::new(),
            }),
        }
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::tensor::DataClass;
    use pretty_assertions::assert_eq;

    fn analyze(source: &str) -> AnalysisResult<LayerModel> {
        let network = parse(source)?;
        LayerAnalyzer::new().analyze(&network.layers[0])
    }

    #[test]
    fn test_derive_output_side() {
        let model = analyze(
            "Layer C { Type: CONV Stride { Y: 2 } Dimensions { K: 4, C: 2, R: 3, S: 3, Y: 11, X: 10 } \
             Dataflow { SpatialMap(1,1) K; } }",
        )
        .unwrap();
        let dims = &model.dimensions;

        let oy = dims.index_of("Y'").unwrap();
        let ox = dims.index_of("X'").unwrap();
        assert_eq!(dims.size(oy), 5);
        assert_eq!(dims.size(ox), 8);
        assert_eq!(dims.outer_stride(dims.index_of("Y").unwrap()), 2);

        let y = dims.index_of("Y").unwrap();
        let r = dims.index_of("R").unwrap();
        assert_eq!(dims.overlapping_dim(y), Some(r));
        assert_eq!(dims.output_dim(y), Some(oy));
        assert_eq!(model.num_macs, 4 * 2 * 3 * 3 * 11 * 10);
    }

    #[test]
    fn test_derive_input_side() {
        let model = analyze(
            "Layer C { Type: CONV Dimensions { K: 4, C: 2, R: 3, S: 3, Y': 8, X': 8 } \
             Dataflow { SpatialMap(1,1) K; } }",
        )
        .unwrap();
        let dims = &model.dimensions;
        assert_eq!(dims.size(dims.index_of("Y").unwrap()), 10);
        assert_eq!(dims.size(dims.index_of("X").unwrap()), 10);
    }

    #[test]
    fn test_double_definition() {
        let result = analyze(
            "Layer C { Type: CONV Dimensions { K: 4, R: 3, S: 3, Y: 10, Y': 8 } \
             Dataflow { SpatialMap(1,1) K; } }",
        );
        assert!(matches!(result, Err(AnalysisError::DoubleDimDefinition { .. })));
    }

    #[test]
    fn test_duplicate_dimension() {
        let result = analyze(
            "Layer G { Type: GEMM Dimensions { M: 4, N: 4, K: 4, K: 8 } \
             Dataflow { SpatialMap(1,1) M; TemporalMap(2,2) K; } }",
        );
        match result {
            Err(AnalysisError::DuplicateDimension { name }) => assert_eq!(name, "K"),
            other => panic!("expected DuplicateDimension, got {:?}", other.map(|m| m.num_macs)),
        }

        let conv = analyze(
            "Layer C { Type: CONV Dimensions { K: 4, C: 2, R: 3, S: 3, Y: 10, X: 10, Y: 12 } \
             Dataflow { SpatialMap(1,1) K; } }",
        );
        assert!(matches!(conv, Err(AnalysisError::DuplicateDimension { .. })));
    }

    #[test]
    fn test_missing_filter_dimension() {
        let result = analyze("Layer C { Type: CONV Dimensions { K: 4, Y: 10 } Dataflow { SpatialMap(1,1) K; } }");
        assert!(matches!(result, Err(AnalysisError::UnknownDimension { .. })));
    }

    #[test]
    fn test_gemm_has_no_overlap() {
        let model = analyze(
            "Layer G { Type: GEMM Dimensions { M: 8, N: 6, K: 4 } \
             Dataflow { SpatialMap(1,1) M; TemporalMap(2,2) K; } }",
        )
        .unwrap();
        assert!(model.dimensions.overlaps().is_empty());
        assert_eq!(model.dimensions.len(), 3);
        assert_eq!(model.num_macs, 192);
        assert_eq!(model.tensors.tensor_size(DataClass::Output, &model.dimensions), 48);
    }

    #[test]
    fn test_batch_wiring() {
        let model = analyze(
            "Layer C { Type: CONV Dimensions { N: 2, K: 4, C: 2, R: 1, S: 1, Y: 4, X: 4 } \
             Dataflow { SpatialMap(1,1) K; } }",
        )
        .unwrap();
        let input = model.tensors.by_class(DataClass::Input).unwrap();
        assert_eq!(input.coupled_names[0], "N");
    }

    #[test]
    fn test_split_levels() {
        let model = analyze(
            "Layer G { Type: GEMM Dimensions { M: 8, N: 6, K: 4 } Dataflow { \
             SpatialMap(2,2) M; TemporalMap(2,2) K; Cluster(4, P); SpatialMap(1,1) N; Cluster(2); SpatialMap(1,1) K; } }",
        )
        .unwrap();

        let sizes: Vec<Option<i64>> = model.levels.iter().map(|l| l.cluster_size).collect();
        assert_eq!(sizes, vec![None, Some(4), Some(2)]);
        assert_eq!(model.levels[0].directives.len(), 2);
        assert_eq!(model.levels[1].directives[0].dim, "N");
    }
}
