//! Error types for the dataflow cost model

use thiserror::Error;

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Analysis errors
///
/// Every variant is fatal for the run that produced it: callers abort the
/// whole analysis instead of emitting partial results.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Lexer error at position {position}: {message}")]
    LexerError { position: usize, message: String },

    #[error("Parser error: {message}")]
    ParseError { message: String },

    #[error("Unknown dimension: {name}")]
    UnknownDimension { name: String },

    #[error("Dimension {name} is defined twice (input and output side)")]
    DoubleDimDefinition { name: String },

    #[error("Dimension {name} is declared more than once")]
    DuplicateDimension { name: String },

    #[error("Unsupported layer type: {name}")]
    UnsupportedLayerType { name: String },

    #[error("Unsupported quantization type: {name}")]
    UnsupportedQuantization { name: String },

    #[error("No spatial map in cluster level {level}")]
    NoSpatialMap { level: usize },

    #[error("More than two spatial maps in cluster level {level}")]
    MultiParallelismInSingleCluster { level: usize },

    #[error("Invalid directive in cluster level {level}: {message}")]
    InvalidDirective { level: usize, message: String },

    #[error("Invalid cluster size: {message}")]
    InvalidClusterSize { message: String },

    #[error("Unique element count of dimension {dimension} is zero")]
    ZeroUniqueElements { dimension: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    pub fn parse_error(msg: impl Into<String>) -> Self {
        AnalysisError::ParseError { message: msg.into() }
    }

    pub fn unknown_dim(name: impl Into<String>) -> Self {
        AnalysisError::UnknownDimension { name: name.into() }
    }

    pub fn cluster_size(msg: impl Into<String>) -> Self {
        AnalysisError::InvalidClusterSize { message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AnalysisError::Config { message: msg.into() }
    }
}
