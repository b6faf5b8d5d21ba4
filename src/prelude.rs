pub use serde::{Deserialize, Serialize};

pub use ndarray::*;
pub use ndarray_rand::rand_distr::Uniform;
pub use ndarray_rand::RandomExt;

pub use crate::error::*;

// Internal re-exports
pub use crate::core::{
    glorot_uniform, BiasAdd, DenseDropLayer, DenseLayer, Dropout, Layer, LayerBuilder, LayerKind,
    LinearActivation, Loss, LossBuilder, LossKind, Network, NetworkBuilder, NetworkKind,
    Operation, OperationBuilder, OperationKind, Optimizer, Sgd, SigmoidActivation,
    SigmoidParamActivation, TanhActivation, WeightMultiply,
};
