// src/core.rs
pub mod builders;
pub mod init;
pub mod layers;
pub mod losses;
pub mod network;
pub mod operations;
pub mod optimizers;
pub mod render;

// Re-export commonly used items
pub use builders::{
    LayerBuilder, LossBuilder, NetworkBuilder, OperationBuilder, DEFAULT_KEEP_PROBABILITY,
};
pub use init::glorot_uniform;
pub use layers::{DenseDropLayer, DenseLayer, Layer, LayerKind};
pub use losses::{Loss, LossKind};
pub use network::{Network, NetworkKind};
pub use operations::{
    BiasAdd, Dropout, LinearActivation, Operation, OperationKind, SigmoidActivation,
    SigmoidParamActivation, TanhActivation, WeightMultiply,
};
pub use optimizers::{Optimizer, Sgd};
