use std::fmt;

use crate::core::init::glorot_uniform;
use crate::core::operations::{
    BiasAdd, Dropout, Operation, OperationKind, SigmoidParamActivation, WeightMultiply,
};
use crate::core::optimizers::Optimizer;
use crate::core::render;
use crate::prelude::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Dense,
    DenseDrop,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Dense => "Dense",
            LayerKind::DenseDrop => "DenseDrop",
        }
    }
}

/// weight . bias . activation
///
/// Threads data through its operation sequence forward and the reverse
/// sequence backward, presenting one shape-checked unit to the network.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DenseLayer {
    inputs_count: usize,
    size: usize,
    operations: Vec<Operation>,
    output: Option<Array2<f64>>,
}

impl DenseLayer {
    /// Fresh layer with Glorot-uniform weights and a zero bias.
    pub fn new(inputs_count: usize, size: usize, activation: OperationKind) -> Result<Self> {
        if inputs_count == 0 || size == 0 {
            return Err(NNError::InvalidLayerConfiguration(
                "layer dimensions must be greater than 0".to_string(),
            ));
        }
        let weight = WeightMultiply::new(glorot_uniform(inputs_count, size))?;
        let bias = BiasAdd::new(Array1::zeros(size))?;
        let act = if activation == OperationKind::SigmoidParamActivation {
            Operation::SigmoidParamActivation(SigmoidParamActivation::new(Array1::ones(size))?)
        } else {
            Operation::activation(activation)?
        };
        Self::from_parts(weight, bias, act)
    }

    /// Assembles a layer from explicit operations, validating that their
    /// shapes agree.
    pub fn from_parts(weight: WeightMultiply, bias: BiasAdd, activation: Operation) -> Result<Self> {
        let inputs_count = weight.w.nrows();
        let size = weight.w.ncols();
        if bias.b.len() != size {
            return Err(NNError::InvalidBiasShape(format!(
                "bias length {} does not match layer size {}",
                bias.b.len(),
                size
            )));
        }
        if !activation.kind().is_activation() {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "{} is not an activation operation",
                activation.kind().as_str()
            )));
        }
        if let Operation::SigmoidParamActivation(act) = &activation {
            if act.p.len() != size {
                return Err(NNError::InvalidLayerConfiguration(format!(
                    "sigmoid-param coefficient length {} does not match layer size {}",
                    act.p.len(),
                    size
                )));
            }
        }
        Ok(Self {
            inputs_count,
            size,
            operations: vec![
                Operation::WeightMultiply(weight),
                Operation::BiasAdd(bias),
                activation,
            ],
            output: None,
        })
    }
}

/// weight . bias . activation . dropout
///
/// The training-time variant; dropout is appended after the activation at
/// construction. There is no runtime train/eval toggle.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DenseDropLayer {
    inputs_count: usize,
    size: usize,
    operations: Vec<Operation>,
    output: Option<Array2<f64>>,
}

impl DenseDropLayer {
    pub fn new(
        inputs_count: usize,
        size: usize,
        activation: OperationKind,
        keep_probability: f64,
    ) -> Result<Self> {
        let dense = DenseLayer::new(inputs_count, size, activation)?;
        let dropout = Dropout::new(keep_probability)?;
        let mut operations = dense.operations;
        operations.push(Operation::Dropout(dropout));
        Ok(Self {
            inputs_count,
            size,
            operations,
            output: None,
        })
    }

    pub fn from_parts(
        weight: WeightMultiply,
        bias: BiasAdd,
        activation: Operation,
        dropout: Dropout,
    ) -> Result<Self> {
        let dense = DenseLayer::from_parts(weight, bias, activation)?;
        let mut operations = dense.operations;
        operations.push(Operation::Dropout(dropout));
        Ok(Self {
            inputs_count: dense.inputs_count,
            size: dense.size,
            operations,
            output: None,
        })
    }
}

/// One unit of the network's layer stack.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Layer {
    Dense(DenseLayer),
    DenseDrop(DenseDropLayer),
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Dense(_) => LayerKind::Dense,
            Layer::DenseDrop(_) => LayerKind::DenseDrop,
        }
    }

    pub fn is(&self, kind: LayerKind) -> bool {
        self.kind() == kind
    }

    pub fn inputs_count(&self) -> usize {
        match self {
            Layer::Dense(l) => l.inputs_count,
            Layer::DenseDrop(l) => l.inputs_count,
        }
    }

    /// Neuron count, i.e. the width of this layer's output.
    pub fn size(&self) -> usize {
        match self {
            Layer::Dense(l) => l.size,
            Layer::DenseDrop(l) => l.size,
        }
    }

    pub fn operations(&self) -> &[Operation] {
        match self {
            Layer::Dense(l) => &l.operations,
            Layer::DenseDrop(l) => &l.operations,
        }
    }

    /// The most recent forward output, if any.
    pub fn output(&self) -> Option<&Array2<f64>> {
        match self {
            Layer::Dense(l) => l.output.as_ref(),
            Layer::DenseDrop(l) => l.output.as_ref(),
        }
    }

    fn parts_mut(&mut self) -> (&mut Vec<Operation>, &mut Option<Array2<f64>>) {
        match self {
            Layer::Dense(l) => (&mut l.operations, &mut l.output),
            Layer::DenseDrop(l) => (&mut l.operations, &mut l.output),
        }
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.inputs_count() {
            return Err(NNError::InvalidInputShape(format!(
                "layer expects {} input columns, got {}",
                self.inputs_count(),
                x.ncols()
            )));
        }
        let (operations, output) = self.parts_mut();
        let mut a = x.clone();
        for op in operations.iter_mut() {
            a = op.forward(&a)?;
        }
        *output = Some(a.clone());
        Ok(a)
    }

    pub fn backward(&mut self, dy: &Array2<f64>) -> Result<Array2<f64>> {
        let out_dim = match self.output() {
            Some(out) => out.dim(),
            None => {
                return Err(NNError::MissingForwardState(
                    "layer backward called before forward".into(),
                ))
            }
        };
        if dy.dim() != out_dim {
            return Err(NNError::LayerShapeMismatch(format!(
                "layer gradient shape {:?} does not match output shape {:?}",
                dy.dim(),
                out_dim
            )));
        }
        let (operations, _) = self.parts_mut();
        let mut d = dy.clone();
        for op in operations.iter_mut().rev() {
            d = op.backward(&d)?;
        }
        Ok(d)
    }

    pub fn apply_optim(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        let (operations, _) = self.parts_mut();
        for op in operations.iter_mut() {
            op.apply_optim(optimizer)?;
        }
        Ok(())
    }

    pub fn count_parameters(&self) -> usize {
        self.operations().iter().map(|op| op.count_parameters()).sum()
    }

    pub fn equal(&self, other: &Layer) -> bool {
        self.kind() == other.kind()
            && self.inputs_count() == other.inputs_count()
            && self.size() == other.size()
            && self.operations().len() == other.operations().len()
            && self
                .operations()
                .iter()
                .zip(other.operations().iter())
                .all(|(a, b)| a.equal(b))
            && self.output() == other.output()
    }

    pub fn equal_approx(&self, other: &Layer) -> bool {
        self.kind() == other.kind()
            && self.inputs_count() == other.inputs_count()
            && self.size() == other.size()
            && self.operations().len() == other.operations().len()
            && self
                .operations()
                .iter()
                .zip(other.operations().iter())
                .all(|(a, b)| a.equal_approx(b))
            && crate::utils::approx_mat_opt(self.output(), other.output())
    }

    fn describe(&self, full: bool) -> Vec<(&'static str, String)> {
        let ops = self
            .operations()
            .iter()
            .map(|op| if full { op.pretty() } else { op.short() })
            .collect::<Vec<_>>()
            .join(if full { "\n" } else { ", " });
        vec![
            ("inputs", format!("{}", self.inputs_count())),
            ("size", format!("{}", self.size())),
            ("operations", ops),
            ("output", render::mat_opt(self.output(), full)),
        ]
    }

    pub fn pretty(&self) -> String {
        render::pretty(self.kind().as_str(), &self.describe(true))
    }

    pub fn short(&self) -> String {
        render::short(
            self.kind().as_str(),
            &format!("{}->{}", self.inputs_count(), self.size()),
        )
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            render::compact(self.kind().as_str(), &self.describe(false))
        )
    }
}
