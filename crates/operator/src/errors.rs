//! Error types emitted by the sequence mask operator.

use thiserror::Error;

/// Failures surfaced while configuring, validating or running the operator.
///
/// Shape and dtype problems are detected before any kernel runs, so an error
/// never comes with a partially written output.
#[derive(Debug, Error)]
pub enum MaskError {
    /// Rank, batch size or input arity does not match the contract.
    #[error("invalid shape: {context}")]
    Shape { context: String },
    /// The data dtype is outside the supported floating-point set.
    #[error("unsupported dtype {requested}")]
    UnsupportedDType { requested: String },
    /// A sequence length fell outside `[0, steps]` under
    /// [`LengthPolicy::Reject`](crate::LengthPolicy::Reject).
    #[error("sequence length {length} for batch {batch} is outside [0, {steps}]")]
    OutOfRangeLength {
        batch: usize,
        length: i64,
        steps: usize,
    },
    #[error("invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),
    /// The requested backend cannot serve the tensors' device.
    #[error("backend unavailable: {message}")]
    Backend { message: String },
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

impl MaskError {
    pub fn shape(context: impl Into<String>) -> Self {
        Self::Shape {
            context: context.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(vec![message.into()])
    }
}

pub type Result<T> = std::result::Result<T, MaskError>;
