//! Dataflow Cost Model
//!
//! Analytical reuse and iteration analysis of dataflows mapped onto
//! hierarchical spatial accelerators. A dataflow description (layers, their
//! dimensions and a list of temporal/spatial mapping directives per cluster
//! level) is turned into per-level iteration statuses and, for each status,
//! the data each tensor moves between a level and its sub-clusters.
//!
//! # Example
//!
//! ```rust
//! use dataflow_cost_model::{analyze_source, HardwareConfig};
//!
//! let source = "Layer fc { Type: GEMM Dimensions { M: 4, N: 4, K: 4 } \
//!               Dataflow { SpatialMap(1,1) M; TemporalMap(2,2) K; } }";
//! let report = analyze_source(source, &HardwareConfig::new(4)).unwrap();
//! assert_eq!(report.layers[0].num_macs, 64);
//! println!("{}", report);
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod analyzer;
pub mod dimension;
pub mod directive;
pub mod tensor;
pub mod cluster;
pub mod iteration;
pub mod reuse;
pub mod hierarchy;
pub mod report;
pub mod energy;
pub mod hardware;
pub mod config;
pub mod error;

pub use analyzer::{LayerAnalyzer, LayerModel};
pub use ast::{Layer, LayerType, Network};
pub use cluster::ClusterUnit;
pub use dimension::{DimId, DimensionTable, LayerDimension};
pub use directive::{Directive, DirectiveClass, DirectiveTable};
pub use error::{AnalysisError, AnalysisResult};
pub use hardware::{HardwareConfig, NocModel};
pub use hierarchy::ClusterHierarchy;
pub use iteration::{IterationAnalysis, IterationPosition, IterationState, IterationStatus};
pub use parser::{parse, Parser};
pub use report::{LayerReport, NetworkReport};
pub use reuse::{DimReuse, PeRole, ReuseAnalysis};
pub use tensor::{DataClass, Tensor, TensorTable};

/// Knobs of one analysis run
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisOptions {
    /// Log every spatial aggregation decision at debug level
    pub trace: bool,
}

/// Analyze every layer of a parsed network
///
/// The first failing layer aborts the run; no partial report is returned.
pub fn analyze_network(
    network: &Network,
    hardware: &HardwareConfig,
    options: AnalysisOptions,
) -> AnalysisResult<NetworkReport> {
    let analyzer = LayerAnalyzer::new();
    let mut layers = Vec::with_capacity(network.layers.len());

    for layer in &network.layers {
        let model = analyzer.analyze(layer)?;
        let hierarchy = ClusterHierarchy::build(&model, hardware)?;
        layers.push(LayerReport::build(&model, &hierarchy, hardware, options.trace)?);
    }

    Ok(NetworkReport {
        name: network.name.clone(),
        hardware: hardware.clone(),
        layers,
    })
}

/// Parse and analyze a dataflow description
pub fn analyze_source(source: &str, hardware: &HardwareConfig) -> AnalysisResult<NetworkReport> {
    analyze_source_with(source, hardware, AnalysisOptions::default())
}

pub fn analyze_source_with(
    source: &str,
    hardware: &HardwareConfig,
    options: AnalysisOptions,
) -> AnalysisResult<NetworkReport> {
    let network = parse(source)?;
    analyze_network(&network, hardware, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETWORK: &str = "Network demo {
        Layer CONV1 {
            Type: CONV
            Quantization: INT8
            Dimensions { K: 4, C: 2, R: 3, S: 3, Y: 10, X: 10 }
            Dataflow {
                SpatialMap(1,1) K;
                TemporalMap(2,2) C;
                TemporalMap(Sz(R),Sz(R)) R;
                TemporalMap(Sz(S),Sz(S)) S;
                TemporalMap(Sz(R),1) Y;
                TemporalMap(Sz(S),1) X;
                Cluster(2, P);
                SpatialMap(1,1) C;
            }
        }
        Layer FC {
            Type: GEMM
            Dimensions { M: 8, N: 8, K: 8 }
            Dataflow { SpatialMap(1,1) M; TemporalMap(4,4) K; }
        }
    }";

    #[test]
    fn test_analyze_network() {
        let report = analyze_source(NETWORK, &HardwareConfig::new(8)).unwrap();
        assert_eq!(report.name, "demo");
        assert_eq!(report.layers.len(), 2);

        let conv = &report.layers[0];
        assert_eq!(conv.levels.len(), 2);
        assert_eq!(conv.levels[0].num_clusters, 4);
        assert_eq!(conv.levels[1].num_clusters, 2);
        for level in &conv.levels {
            assert!(level.ingress > 0);
            assert!(level.egress > 0);
            assert!(level.cases.iter().all(|c| c.occurrence > 0));
        }

        assert_eq!(report.layers[1].num_macs, 512);
        assert_eq!(report.total_macs(), conv.num_macs + 512);
    }

    #[test]
    fn test_trace_does_not_change_results() {
        let hardware = HardwareConfig::new(8);
        let plain = analyze_source(NETWORK, &hardware).unwrap();
        let traced = analyze_source_with(NETWORK, &hardware, AnalysisOptions { trace: true }).unwrap();
        assert_eq!(plain, traced);
    }

    #[test]
    fn test_demo_description() {
        let hardware = config::from_toml(include_str!("../demos/dfcost.toml")).unwrap();
        let report = analyze_source(include_str!("../demos/conv_gemm.m"), &hardware).unwrap();
        assert_eq!(report.layers.len(), 2);
        assert_eq!(report.layers[0].levels.len(), 2);
        assert_eq!(report.layers[0].levels[0].num_clusters, 16);
    }

    #[test]
    fn test_errors_abort_the_run() {
        let source = "Layer A { Type: GEMM Dimensions { M: 4, N: 4, K: 4 } Dataflow { SpatialMap(1,1) M; } } \
                      Layer B { Type: GEMM Dimensions { M: 4, N: 4, K: 4 } Dataflow { TemporalMap(1,1) M; } }";
        let result = analyze_source(source, &HardwareConfig::new(4));
        assert!(matches!(result, Err(AnalysisError::NoSpatialMap { level: 0 })));
    }
}
