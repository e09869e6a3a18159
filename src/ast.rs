//! Syntax tree of the dataflow description language

use serde::{Deserialize, Serialize};

use crate::dimension::DimensionTable;
use crate::directive::DirectiveClass;
use crate::energy::Quantization;
use crate::error::{AnalysisError, AnalysisResult};

/// A complete description: a named network of layers
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    pub name: String,
    pub layers: Vec<Layer>,
}

/// Layer operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerType {
    /// Regular convolution
    Conv,
    /// Depth-wise separable convolution
    DsConv,
    /// Grouped convolution
    NgConv,
    /// Matrix multiplication
    Gemm,
}

impl LayerType {
    pub fn is_convolution(&self) -> bool {
        !matches!(self, LayerType::Gemm)
    }
}

impl std::str::FromStr for LayerType {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CONV" => Ok(LayerType::Conv),
            "DSCONV" => Ok(LayerType::DsConv),
            "NGCONV" => Ok(LayerType::NgConv),
            "GEMM" => Ok(LayerType::Gemm),
            _ => Err(AnalysisError::UnsupportedLayerType { name: s.to_string() }),
        }
    }
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerType::Conv => write!(f, "CONV"),
            LayerType::DsConv => write!(f, "DSCONV"),
            LayerType::NgConv => write!(f, "NGCONV"),
            LayerType::Gemm => write!(f, "GEMM"),
        }
    }
}

/// One layer block
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub layer_type: LayerType,
    pub quantization: Quantization,
    /// `Stride { X: 2, Y: 2 }` entries
    pub strides: Vec<(String, i64)>,
    /// `Dimensions { K: 64, ... }` entries, in declaration order
    pub dimensions: Vec<(String, i64)>,
    pub dataflow: Vec<DataflowItem>,
}

impl Layer {
    pub fn stride_of(&self, dim: &str) -> i64 {
        self.strides
            .iter()
            .find(|(name, _)| name == dim)
            .map(|(_, stride)| *stride)
            .unwrap_or(1)
    }
}

/// Entry of a `Dataflow { ... }` block
#[derive(Debug, Clone, PartialEq)]
pub enum DataflowItem {
    /// `TemporalMap(size, offset) Dim;` or `SpatialMap(size, offset) Dim;`
    Map(DirectiveDecl),
    /// `Cluster(size[, P|L]);` opens the next (inner) cluster level
    Cluster { size: i64, logical: bool },
}

/// A directive as written, before dimension names and sizes are resolved
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveDecl {
    pub class: DirectiveClass,
    pub size: SizeExpr,
    pub offset: SizeExpr,
    pub dim: String,
}

/// Tile size or offset expression
#[derive(Debug, Clone, PartialEq)]
pub enum SizeExpr {
    Literal(i64),
    /// `Sz(Dim)`: extent of a dimension at the directive's cluster level
    Sz(String),
    Add(Box<SizeExpr>, Box<SizeExpr>),
    Sub(Box<SizeExpr>, Box<SizeExpr>),
}

impl SizeExpr {
    pub fn eval(&self, dims: &DimensionTable) -> AnalysisResult<i64> {
        match self {
            SizeExpr::Literal(n) => Ok(*n),
            SizeExpr::Sz(name) => dims
                .index_of(name)
                .map(|id| dims.size(id))
                .ok_or_else(|| AnalysisError::unknown_dim(name.clone())),
            SizeExpr::Add(l, r) => Ok(l.eval(dims)? + r.eval(dims)?),
            SizeExpr::Sub(l, r) => Ok(l.eval(dims)? - r.eval(dims)?),
        }
    }
}

impl std::fmt::Display for SizeExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeExpr::Literal(n) => write!(f, "{}", n),
            SizeExpr::Sz(name) => write!(f, "Sz({})", name),
            SizeExpr::Add(l, r) => write!(f, "{}+{}", l, r),
            SizeExpr::Sub(l, r) => write!(f, "{}-{}", l, r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::LayerDimension;

    #[test]
    fn test_size_expr_eval() {
        let mut dims = DimensionTable::new();
        dims.add(LayerDimension::new("R", 3, 1, 1));

        let expr = SizeExpr::Sub(
            Box::new(SizeExpr::Add(
                Box::new(SizeExpr::Literal(8)),
                Box::new(SizeExpr::Sz("R".to_string())),
            )),
            Box::new(SizeExpr::Literal(1)),
        );
        assert_eq!(expr.eval(&dims).unwrap(), 10);
        assert_eq!(expr.to_string(), "8+Sz(R)-1");

        let missing = SizeExpr::Sz("Q".to_string());
        assert!(matches!(
            missing.eval(&dims),
            Err(AnalysisError::UnknownDimension { .. })
        ));
    }

    #[test]
    fn test_layer_type_from_str() {
        assert_eq!("conv".parse::<LayerType>().unwrap(), LayerType::Conv);
        assert_eq!("GEMM".parse::<LayerType>().unwrap(), LayerType::Gemm);
        assert!("LSTM".parse::<LayerType>().is_err());
    }
}
