use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum NNError {
    // Construction errors
    InvalidOperationConfiguration(String),
    InvalidLayerConfiguration(String),
    EmptyNetwork,
    LossNotSet,
    MissingBuilderField(String),

    // Shape errors
    InvalidInputShape(String),
    InvalidWeightShape(String),
    InvalidBiasShape(String),
    LayerShapeMismatch(String),

    // Sequencing errors
    MissingForwardState(String),

    // Wrapped per-layer failures
    ComputationError(String),
}

impl fmt::Display for NNError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NNError::InvalidOperationConfiguration(msg) => {
                write!(f, "Invalid operation configuration: {}", msg)
            }
            NNError::InvalidLayerConfiguration(msg) => {
                write!(f, "Invalid layer configuration: {}", msg)
            }
            NNError::EmptyNetwork => write!(f, "Network has no layers"),
            NNError::LossNotSet => write!(f, "Loss not set. Provide a loss instance or a loss kind"),
            NNError::MissingBuilderField(msg) => write!(f, "Missing builder field: {}", msg),
            NNError::InvalidInputShape(msg) => write!(f, "Invalid input shape: {}", msg),
            NNError::InvalidWeightShape(msg) => write!(f, "Invalid weight shape: {}", msg),
            NNError::InvalidBiasShape(msg) => write!(f, "Invalid bias shape: {}", msg),
            NNError::LayerShapeMismatch(msg) => write!(f, "Layer shape mismatch: {}", msg),
            NNError::MissingForwardState(msg) => {
                write!(f, "Missing forward state: {}", msg)
            }
            NNError::ComputationError(msg) => write!(f, "Computation error: {}", msg),
        }
    }
}

impl Error for NNError {}

pub type Result<T> = std::result::Result<T, NNError>;
