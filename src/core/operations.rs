use std::fmt;

use fastapprox::fast::tanh as faster_tanh;
use rand::Rng;

use crate::core::optimizers::Optimizer;
use crate::core::render;
use crate::prelude::*;
use crate::utils::{approx, approx_mat, approx_mat_opt, approx_vec, approx_vec_opt};

/// Kind tag for the closed set of operation variants.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    WeightMultiply,
    BiasAdd,
    LinearActivation,
    SigmoidActivation,
    TanhActivation,
    SigmoidParamActivation,
    Dropout,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::WeightMultiply => "WeightMultiply",
            OperationKind::BiasAdd => "BiasAdd",
            OperationKind::LinearActivation => "Linear",
            OperationKind::SigmoidActivation => "Sigmoid",
            OperationKind::TanhActivation => "Tanh",
            OperationKind::SigmoidParamActivation => "SigmoidParam",
            OperationKind::Dropout => "Dropout",
        }
    }

    /// Activation kinds are the ones a layer may place after its bias add.
    pub fn is_activation(&self) -> bool {
        matches!(
            self,
            OperationKind::LinearActivation
                | OperationKind::SigmoidActivation
                | OperationKind::TanhActivation
                | OperationKind::SigmoidParamActivation
        )
    }
}

/// y = x . W
///
/// The forward record (input and output) is set by `forward` and consumed
/// by `backward`; its absence is the sequencing-error signal. The weight
/// gradient survives `backward` so `apply_optim` can read it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WeightMultiply {
    pub w: Array2<f64>,
    input: Option<Array2<f64>>,
    output: Option<Array2<f64>>,
    grad: Option<Array2<f64>>,
}

impl WeightMultiply {
    pub fn new(w: Array2<f64>) -> Result<Self> {
        if w.nrows() == 0 || w.ncols() == 0 {
            return Err(NNError::InvalidWeightShape(format!(
                "weight matrix dimensions must be greater than 0, got {}x{}",
                w.nrows(),
                w.ncols()
            )));
        }
        Ok(Self {
            w,
            input: None,
            output: None,
            grad: None,
        })
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.w.nrows() {
            return Err(NNError::InvalidInputShape(format!(
                "weight multiply expects {} input columns, got {}",
                self.w.nrows(),
                x.ncols()
            )));
        }
        let y = x.dot(&self.w);
        self.input = Some(x.clone());
        self.output = Some(y.clone());
        Ok(y)
    }

    pub fn backward(&mut self, dy: &Array2<f64>) -> Result<Array2<f64>> {
        let (x, y) = match (self.input.take(), self.output.take()) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(NNError::MissingForwardState(
                    "weight multiply backward called before forward".into(),
                ))
            }
        };
        if dy.dim() != y.dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "weight multiply gradient shape {:?} does not match output shape {:?}",
                dy.dim(),
                y.dim()
            )));
        }
        self.grad = Some(x.t().dot(dy));
        Ok(dy.dot(&self.w.t()))
    }

    pub fn apply_optim(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        let dw = self.grad.as_ref().ok_or_else(|| {
            NNError::MissingForwardState(
                "weight multiply has no cached gradient; run backward first".into(),
            )
        })?;
        self.w = optimizer.update_weights(&self.w, dw);
        Ok(())
    }
}

/// y = x + b, with b broadcast over rows.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BiasAdd {
    pub b: Array1<f64>,
    output: Option<Array2<f64>>,
    grad: Option<Array1<f64>>,
}

impl BiasAdd {
    pub fn new(b: Array1<f64>) -> Result<Self> {
        if b.is_empty() {
            return Err(NNError::InvalidBiasShape(
                "bias vector must not be empty".into(),
            ));
        }
        Ok(Self {
            b,
            output: None,
            grad: None,
        })
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.b.len() {
            return Err(NNError::InvalidBiasShape(format!(
                "bias length {} does not match input columns {}",
                self.b.len(),
                x.ncols()
            )));
        }
        let y = x + &self.b;
        self.output = Some(y.clone());
        Ok(y)
    }

    pub fn backward(&mut self, dy: &Array2<f64>) -> Result<Array2<f64>> {
        let y = self.output.take().ok_or_else(|| {
            NNError::MissingForwardState("bias add backward called before forward".into())
        })?;
        if dy.dim() != y.dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "bias add gradient shape {:?} does not match output shape {:?}",
                dy.dim(),
                y.dim()
            )));
        }
        self.grad = Some(dy.sum_axis(Axis(0)));
        Ok(dy.clone())
    }

    pub fn apply_optim(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        let db = self.grad.as_ref().ok_or_else(|| {
            NNError::MissingForwardState(
                "bias add has no cached gradient; run backward first".into(),
            )
        })?;
        self.b = optimizer.update_params(&self.b, db);
        Ok(())
    }
}

/// Identity activation. Carries no parameters; its record exists only to
/// enforce the forward-before-backward ordering.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LinearActivation {
    output: Option<Array2<f64>>,
}

impl LinearActivation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.output = Some(x.clone());
        Ok(x.clone())
    }

    pub fn backward(&mut self, dy: &Array2<f64>) -> Result<Array2<f64>> {
        let y = self.output.take().ok_or_else(|| {
            NNError::MissingForwardState("linear activation backward called before forward".into())
        })?;
        if dy.dim() != y.dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "linear activation gradient shape {:?} does not match output shape {:?}",
                dy.dim(),
                y.dim()
            )));
        }
        Ok(dy.clone())
    }
}

/// y = 1 / (1 + e^-x). The derivative is reconstructed from the cached
/// output: f'(x) = y(1 - y).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SigmoidActivation {
    output: Option<Array2<f64>>,
}

impl SigmoidActivation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let y = x.mapv(|z| 1.0 / (1.0 + (-z).exp()));
        self.output = Some(y.clone());
        Ok(y)
    }

    pub fn backward(&mut self, dy: &Array2<f64>) -> Result<Array2<f64>> {
        let y = self.output.take().ok_or_else(|| {
            NNError::MissingForwardState("sigmoid backward called before forward".into())
        })?;
        if dy.dim() != y.dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "sigmoid gradient shape {:?} does not match output shape {:?}",
                dy.dim(),
                y.dim()
            )));
        }
        let d = y.mapv(|s| s * (1.0 - s));
        Ok(dy * &d)
    }
}

/// y = tanh(x). The derivative is computed from the cached input.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TanhActivation {
    input: Option<Array2<f64>>,
}

impl TanhActivation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.input = Some(x.clone());
        Ok(x.mapv(|z| z.tanh()))
    }

    pub fn backward(&mut self, dy: &Array2<f64>) -> Result<Array2<f64>> {
        let z = self.input.take().ok_or_else(|| {
            NNError::MissingForwardState("tanh backward called before forward".into())
        })?;
        if dy.dim() != z.dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "tanh gradient shape {:?} does not match input shape {:?}",
                dy.dim(),
                z.dim()
            )));
        }
        let d = z.mapv(|z| {
            let t = faster_tanh(z as f32) as f64;
            1.0 - t * t
        });
        Ok(dy * &d)
    }
}

/// Sigmoid with a learnable per-output-unit coefficient scaling the
/// exponent: y_ij = 1 / (1 + e^(-p_j * x_ij)).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SigmoidParamActivation {
    pub p: Array1<f64>,
    input: Option<Array2<f64>>,
    output: Option<Array2<f64>>,
    grad: Option<Array1<f64>>,
}

impl SigmoidParamActivation {
    pub fn new(p: Array1<f64>) -> Result<Self> {
        if p.is_empty() {
            return Err(NNError::InvalidOperationConfiguration(
                "sigmoid-param coefficient vector must not be empty".into(),
            ));
        }
        Ok(Self {
            p,
            input: None,
            output: None,
            grad: None,
        })
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.p.len() {
            return Err(NNError::InvalidInputShape(format!(
                "sigmoid-param expects {} input columns, got {}",
                self.p.len(),
                x.ncols()
            )));
        }
        let z = x * &self.p;
        let y = z.mapv(|z| 1.0 / (1.0 + (-z).exp()));
        self.input = Some(x.clone());
        self.output = Some(y.clone());
        Ok(y)
    }

    pub fn backward(&mut self, dy: &Array2<f64>) -> Result<Array2<f64>> {
        let (x, y) = match (self.input.take(), self.output.take()) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(NNError::MissingForwardState(
                    "sigmoid-param backward called before forward".into(),
                ))
            }
        };
        if dy.dim() != y.dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "sigmoid-param gradient shape {:?} does not match output shape {:?}",
                dy.dim(),
                y.dim()
            )));
        }
        // dL/dx_ij = dy_ij * p_j * y(1-y); dL/dp_j = sum_i dy_ij * x_ij * y(1-y)
        let scaled = dy * &y.mapv(|s| s * (1.0 - s));
        self.grad = Some((&scaled * &x).sum_axis(Axis(0)));
        Ok(scaled * &self.p)
    }

    pub fn apply_optim(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        let dp = self.grad.as_ref().ok_or_else(|| {
            NNError::MissingForwardState(
                "sigmoid-param has no cached gradient; run backward first".into(),
            )
        })?;
        self.p = optimizer.update_params(&self.p, dp);
        Ok(())
    }
}

/// Inverted dropout: at forward, a Bernoulli keep-mask is drawn per element
/// and surviving activations are rescaled by 1/keep_probability so the
/// expected magnitude is preserved. Backward re-applies the same mask.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Dropout {
    pub keep_probability: f64,
    mask: Option<Array2<f64>>,
    output: Option<Array2<f64>>,
}

impl Dropout {
    pub fn new(keep_probability: f64) -> Result<Self> {
        if !(keep_probability > 0.0 && keep_probability <= 1.0) {
            return Err(NNError::InvalidOperationConfiguration(format!(
                "keep probability must be in (0, 1], got {}",
                keep_probability
            )));
        }
        Ok(Self {
            keep_probability,
            mask: None,
            output: None,
        })
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut rng = rand::thread_rng();
        let mask = Array2::from_shape_simple_fn(x.raw_dim(), || {
            if rng.gen::<f64>() < self.keep_probability {
                1.0
            } else {
                0.0
            }
        });
        let y = (x * &mask) / self.keep_probability;
        self.mask = Some(mask);
        self.output = Some(y.clone());
        Ok(y)
    }

    pub fn backward(&mut self, dy: &Array2<f64>) -> Result<Array2<f64>> {
        let (mask, y) = match (self.mask.take(), self.output.take()) {
            (Some(mask), Some(y)) => (mask, y),
            _ => {
                return Err(NNError::MissingForwardState(
                    "dropout backward called before forward".into(),
                ))
            }
        };
        if dy.dim() != y.dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "dropout gradient shape {:?} does not match output shape {:?}",
                dy.dim(),
                y.dim()
            )));
        }
        Ok((dy * &mask) / self.keep_probability)
    }
}

/// The atomic differentiable unit of the pipeline. Closed over the variant
/// set; construction goes through the per-variant constructors or the
/// operation builder.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Operation {
    WeightMultiply(WeightMultiply),
    BiasAdd(BiasAdd),
    LinearActivation(LinearActivation),
    SigmoidActivation(SigmoidActivation),
    TanhActivation(TanhActivation),
    SigmoidParamActivation(SigmoidParamActivation),
    Dropout(Dropout),
}

impl Operation {
    /// Parameterless activation factory; sigmoid-param needs its
    /// coefficient vector and goes through `SigmoidParamActivation::new`.
    pub fn activation(kind: OperationKind) -> Result<Operation> {
        match kind {
            OperationKind::LinearActivation => {
                Ok(Operation::LinearActivation(LinearActivation::new()))
            }
            OperationKind::SigmoidActivation => {
                Ok(Operation::SigmoidActivation(SigmoidActivation::new()))
            }
            OperationKind::TanhActivation => Ok(Operation::TanhActivation(TanhActivation::new())),
            other => Err(NNError::InvalidOperationConfiguration(format!(
                "{} is not a parameterless activation kind",
                other.as_str()
            ))),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::WeightMultiply(_) => OperationKind::WeightMultiply,
            Operation::BiasAdd(_) => OperationKind::BiasAdd,
            Operation::LinearActivation(_) => OperationKind::LinearActivation,
            Operation::SigmoidActivation(_) => OperationKind::SigmoidActivation,
            Operation::TanhActivation(_) => OperationKind::TanhActivation,
            Operation::SigmoidParamActivation(_) => OperationKind::SigmoidParamActivation,
            Operation::Dropout(_) => OperationKind::Dropout,
        }
    }

    pub fn is(&self, kind: OperationKind) -> bool {
        self.kind() == kind
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Operation::WeightMultiply(op) => op.forward(x),
            Operation::BiasAdd(op) => op.forward(x),
            Operation::LinearActivation(op) => op.forward(x),
            Operation::SigmoidActivation(op) => op.forward(x),
            Operation::TanhActivation(op) => op.forward(x),
            Operation::SigmoidParamActivation(op) => op.forward(x),
            Operation::Dropout(op) => op.forward(x),
        }
    }

    pub fn backward(&mut self, dy: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Operation::WeightMultiply(op) => op.backward(dy),
            Operation::BiasAdd(op) => op.backward(dy),
            Operation::LinearActivation(op) => op.backward(dy),
            Operation::SigmoidActivation(op) => op.backward(dy),
            Operation::TanhActivation(op) => op.backward(dy),
            Operation::SigmoidParamActivation(op) => op.backward(dy),
            Operation::Dropout(op) => op.backward(dy),
        }
    }

    /// No-op for stateless variants; parameterized variants delegate the
    /// update rule to the injected optimizer.
    pub fn apply_optim(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        match self {
            Operation::WeightMultiply(op) => op.apply_optim(optimizer),
            Operation::BiasAdd(op) => op.apply_optim(optimizer),
            Operation::SigmoidParamActivation(op) => op.apply_optim(optimizer),
            _ => Ok(()),
        }
    }

    pub fn count_parameters(&self) -> usize {
        match self {
            Operation::WeightMultiply(op) => op.w.len(),
            Operation::BiasAdd(op) => op.b.len(),
            Operation::SigmoidParamActivation(op) => op.p.len(),
            _ => 0,
        }
    }

    pub fn equal(&self, other: &Operation) -> bool {
        match (self, other) {
            (Operation::WeightMultiply(a), Operation::WeightMultiply(b)) => {
                a.w == b.w && a.input == b.input && a.output == b.output && a.grad == b.grad
            }
            (Operation::BiasAdd(a), Operation::BiasAdd(b)) => {
                a.b == b.b && a.output == b.output && a.grad == b.grad
            }
            (Operation::LinearActivation(a), Operation::LinearActivation(b)) => {
                a.output == b.output
            }
            (Operation::SigmoidActivation(a), Operation::SigmoidActivation(b)) => {
                a.output == b.output
            }
            (Operation::TanhActivation(a), Operation::TanhActivation(b)) => a.input == b.input,
            (Operation::SigmoidParamActivation(a), Operation::SigmoidParamActivation(b)) => {
                a.p == b.p && a.input == b.input && a.output == b.output && a.grad == b.grad
            }
            (Operation::Dropout(a), Operation::Dropout(b)) => {
                a.keep_probability == b.keep_probability
                    && a.mask == b.mask
                    && a.output == b.output
            }
            _ => false,
        }
    }

    pub fn equal_approx(&self, other: &Operation) -> bool {
        match (self, other) {
            (Operation::WeightMultiply(a), Operation::WeightMultiply(b)) => {
                approx_mat(&a.w, &b.w)
                    && approx_mat_opt(a.input.as_ref(), b.input.as_ref())
                    && approx_mat_opt(a.output.as_ref(), b.output.as_ref())
                    && approx_mat_opt(a.grad.as_ref(), b.grad.as_ref())
            }
            (Operation::BiasAdd(a), Operation::BiasAdd(b)) => {
                approx_vec(&a.b, &b.b)
                    && approx_mat_opt(a.output.as_ref(), b.output.as_ref())
                    && approx_vec_opt(a.grad.as_ref(), b.grad.as_ref())
            }
            (Operation::LinearActivation(a), Operation::LinearActivation(b)) => {
                approx_mat_opt(a.output.as_ref(), b.output.as_ref())
            }
            (Operation::SigmoidActivation(a), Operation::SigmoidActivation(b)) => {
                approx_mat_opt(a.output.as_ref(), b.output.as_ref())
            }
            (Operation::TanhActivation(a), Operation::TanhActivation(b)) => {
                approx_mat_opt(a.input.as_ref(), b.input.as_ref())
            }
            (Operation::SigmoidParamActivation(a), Operation::SigmoidParamActivation(b)) => {
                approx_vec(&a.p, &b.p)
                    && approx_mat_opt(a.input.as_ref(), b.input.as_ref())
                    && approx_mat_opt(a.output.as_ref(), b.output.as_ref())
                    && approx_vec_opt(a.grad.as_ref(), b.grad.as_ref())
            }
            (Operation::Dropout(a), Operation::Dropout(b)) => {
                approx(a.keep_probability, b.keep_probability)
                    && approx_mat_opt(a.mask.as_ref(), b.mask.as_ref())
                    && approx_mat_opt(a.output.as_ref(), b.output.as_ref())
            }
            _ => false,
        }
    }

    fn describe(&self, full: bool) -> Vec<(&'static str, String)> {
        match self {
            Operation::WeightMultiply(op) => vec![
                ("w", render::mat_opt(Some(&op.w), full)),
                ("input", render::mat_opt(op.input.as_ref(), full)),
                ("output", render::mat_opt(op.output.as_ref(), full)),
                ("grad", render::mat_opt(op.grad.as_ref(), full)),
            ],
            Operation::BiasAdd(op) => vec![
                ("b", render::vec_opt(Some(&op.b), full)),
                ("output", render::mat_opt(op.output.as_ref(), full)),
                ("grad", render::vec_opt(op.grad.as_ref(), full)),
            ],
            Operation::LinearActivation(op) => {
                vec![("output", render::mat_opt(op.output.as_ref(), full))]
            }
            Operation::SigmoidActivation(op) => {
                vec![("output", render::mat_opt(op.output.as_ref(), full))]
            }
            Operation::TanhActivation(op) => {
                vec![("input", render::mat_opt(op.input.as_ref(), full))]
            }
            Operation::SigmoidParamActivation(op) => vec![
                ("p", render::vec_opt(Some(&op.p), full)),
                ("input", render::mat_opt(op.input.as_ref(), full)),
                ("output", render::mat_opt(op.output.as_ref(), full)),
                ("grad", render::vec_opt(op.grad.as_ref(), full)),
            ],
            Operation::Dropout(op) => vec![
                ("keep", format!("{}", op.keep_probability)),
                ("mask", render::mat_opt(op.mask.as_ref(), full)),
                ("output", render::mat_opt(op.output.as_ref(), full)),
            ],
        }
    }

    pub fn pretty(&self) -> String {
        render::pretty(self.kind().as_str(), &self.describe(true))
    }

    pub fn short(&self) -> String {
        let detail = match self {
            Operation::WeightMultiply(op) => render::mat_summary(&op.w),
            Operation::BiasAdd(op) => format!("{}", op.b.len()),
            Operation::SigmoidParamActivation(op) => format!("{}", op.p.len()),
            Operation::Dropout(op) => format!("{}", op.keep_probability),
            _ => String::new(),
        };
        render::short(self.kind().as_str(), &detail)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            render::compact(self.kind().as_str(), &self.describe(false))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::optimizers::Sgd;
    use ndarray::array;

    #[test]
    fn test_weight_multiply_forward() {
        let mut op = WeightMultiply::new(array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let y = op.forward(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert_eq!(y, array![[7.0, 10.0], [15.0, 22.0]]);
    }

    #[test]
    fn test_weight_multiply_backward_gradients() {
        let mut op = WeightMultiply::new(array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        op.forward(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();

        let dx = op.backward(&array![[1.0, 1.0], [1.0, 1.0]]).unwrap();
        // dx = dy . W^t
        assert_eq!(dx, array![[3.0, 7.0], [3.0, 7.0]]);
        // dW = x^t . dy
        assert_eq!(op.grad.unwrap(), array![[4.0, 4.0], [6.0, 6.0]]);
    }

    #[test]
    fn test_weight_multiply_backward_before_forward() {
        let mut op = WeightMultiply::new(array![[1.0]]).unwrap();
        let err = op.backward(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, NNError::MissingForwardState(_)));
    }

    #[test]
    fn test_weight_multiply_backward_consumes_record() {
        let mut op = WeightMultiply::new(array![[1.0]]).unwrap();
        op.forward(&array![[2.0]]).unwrap();
        op.backward(&array![[1.0]]).unwrap();
        // The record is gone; a second backward is a sequencing error.
        let err = op.backward(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, NNError::MissingForwardState(_)));
    }

    #[test]
    fn test_weight_multiply_rejects_input_width() {
        let mut op = WeightMultiply::new(array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let err = op.forward(&array![[1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(err, NNError::InvalidInputShape(_)));
    }

    #[test]
    fn test_weight_multiply_apply_optim() {
        let mut op = WeightMultiply::new(array![[1.0], [1.0]]).unwrap();
        op.forward(&array![[1.0, 2.0]]).unwrap();
        op.backward(&array![[1.0]]).unwrap();

        let mut sgd = Sgd::new(0.1);
        op.apply_optim(&mut sgd).unwrap();
        // dW = x^t . dy = [[1], [2]]
        assert_eq!(op.w, array![[0.9], [0.8]]);
    }

    #[test]
    fn test_weight_multiply_apply_optim_without_backward() {
        let mut op = WeightMultiply::new(array![[1.0]]).unwrap();
        let mut sgd = Sgd::new(0.1);
        let err = op.apply_optim(&mut sgd).unwrap_err();
        assert!(matches!(err, NNError::MissingForwardState(_)));
    }

    #[test]
    fn test_bias_add_broadcast_and_column_sums() {
        let mut op = BiasAdd::new(array![10.0, 20.0]).unwrap();
        let y = op.forward(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert_eq!(y, array![[11.0, 22.0], [13.0, 24.0]]);

        let dx = op.backward(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert_eq!(dx, array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(op.grad.unwrap(), array![4.0, 6.0]);
    }

    #[test]
    fn test_bias_add_rejects_length_mismatch() {
        let mut op = BiasAdd::new(array![1.0, 2.0, 3.0]).unwrap();
        let err = op.forward(&array![[1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, NNError::InvalidBiasShape(_)));
    }

    #[test]
    fn test_sigmoid_values() {
        let mut op = SigmoidActivation::new();
        let y = op.forward(&array![[0.0]]).unwrap();
        assert!((y[[0, 0]] - 0.5).abs() < 1e-12);

        // f'(0) = 0.25
        let dx = op.backward(&array![[1.0]]).unwrap();
        assert!((dx[[0, 0]] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_tanh_backward_matches_cached_input() {
        let mut op = TanhActivation::new();
        let z = array![[0.3, -0.7]];
        op.forward(&z).unwrap();
        let dx = op.backward(&array![[1.0, 1.0]]).unwrap();

        // Same approximation the backward path uses.
        let expected = z.mapv(|z| {
            let t = faster_tanh(z as f32) as f64;
            1.0 - t * t
        });
        assert_eq!(dx, expected);
    }

    #[test]
    fn test_linear_is_identity_both_ways() {
        let mut op = LinearActivation::new();
        let x = array![[1.0, -2.0]];
        assert_eq!(op.forward(&x).unwrap(), x);
        assert_eq!(op.backward(&array![[3.0, 4.0]]).unwrap(), array![[3.0, 4.0]]);
    }

    #[test]
    fn test_sigmoid_param_forward_and_gradients() {
        let mut op = SigmoidParamActivation::new(array![2.0]).unwrap();
        let y = op.forward(&array![[0.0]]).unwrap();
        assert!((y[[0, 0]] - 0.5).abs() < 1e-12);

        let dx = op.backward(&array![[1.0]]).unwrap();
        // dx = dy * p * y(1-y) = 2 * 0.25
        assert!((dx[[0, 0]] - 0.5).abs() < 1e-12);
        // dp = dy * x * y(1-y) = 0 at x = 0
        assert!((op.grad.unwrap()[0]).abs() < 1e-12);
    }

    #[test]
    fn test_sigmoid_param_apply_optim_updates_coefficients() {
        let mut op = SigmoidParamActivation::new(array![1.0]).unwrap();
        op.forward(&array![[1.0]]).unwrap();
        op.backward(&array![[1.0]]).unwrap();

        let before = op.p.clone();
        let mut sgd = Sgd::new(0.5);
        op.apply_optim(&mut sgd).unwrap();
        assert_ne!(op.p, before);
    }

    #[test]
    fn test_dropout_rejects_bad_keep_probability() {
        assert!(Dropout::new(0.0).is_err());
        assert!(Dropout::new(1.5).is_err());
        assert!(Dropout::new(1.0).is_ok());
    }

    #[test]
    fn test_dropout_full_keep_is_identity() {
        let mut op = Dropout::new(1.0).unwrap();
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(op.forward(&x).unwrap(), x);
    }

    #[test]
    fn test_dropout_backward_reuses_forward_mask() {
        let mut op = Dropout::new(0.5).unwrap();
        let x = Array2::ones((4, 4));
        let y = op.forward(&x).unwrap();

        let dx = op.backward(&Array2::ones((4, 4))).unwrap();
        // Exactly the elements zeroed at forward are zeroed in the gradient.
        assert_eq!(dx, y);
    }

    #[test]
    fn test_dropout_preserves_expected_magnitude() {
        let keep = 0.8;
        let mut op = Dropout::new(keep).unwrap();
        let x = Array2::ones((20, 20));

        let trials = 200;
        let mut total = 0.0;
        for _ in 0..trials {
            let y = op.forward(&x).unwrap();
            total += y.sum() / y.len() as f64;
        }
        let mean = total / trials as f64;
        // Inverted-dropout rescale keeps the expectation at the undropped value.
        assert!((mean - 1.0).abs() < 0.05, "mean activation {}", mean);
    }

    #[test]
    fn test_operation_copy_isolation() {
        let mut original =
            Operation::WeightMultiply(WeightMultiply::new(array![[1.0], [2.0]]).unwrap());
        let copy = original.clone();
        assert!(original.equal(&copy));

        original.forward(&array![[1.0, 1.0]]).unwrap();
        // Mutating the original's cached state leaves the copy untouched.
        assert!(!original.equal(&copy));
        if let Operation::WeightMultiply(op) = &copy {
            assert!(op.input.is_none());
        }
    }

    #[test]
    fn test_operation_kind_dispatch() {
        let op = Operation::activation(OperationKind::SigmoidActivation).unwrap();
        assert!(op.is(OperationKind::SigmoidActivation));
        assert!(!op.is(OperationKind::TanhActivation));
        assert!(Operation::activation(OperationKind::Dropout).is_err());
    }

    #[test]
    fn test_operation_equal_approx_tolerates_epsilon() {
        let a = Operation::BiasAdd(BiasAdd::new(array![1.0]).unwrap());
        let b = Operation::BiasAdd(BiasAdd::new(array![1.0 + 0.5e-8]).unwrap());
        assert!(!a.equal(&b));
        assert!(a.equal_approx(&b));
    }

    #[test]
    fn test_operation_renderings() {
        let op = Operation::WeightMultiply(WeightMultiply::new(array![[1.0, 2.0]]).unwrap());
        assert_eq!(op.short(), "WeightMultiply(1x2)");
        assert_eq!(format!("{}", op), "WeightMultiply {w: 1x2, input: -, output: -, grad: -}");
        assert!(op.pretty().contains('\n'));
    }
}
