use std::fmt;

use crate::core::render;
use crate::prelude::*;
use crate::utils::{approx_mat_opt, approx_opt};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    Mse,
}

impl LossKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LossKind::Mse => "MSE",
        }
    }
}

// Each kind is an (output, gradient) function pair over cached targets and
// predictions; forward/backward dispatch on the kind tag.

/// L = sum((y - t)^2) / (2N), N = row count. The 1/2 factor cancels the
/// power rule's 2 in the gradient and is part of the numeric contract;
/// do not fold it away.
fn mse_output(targets: &Array2<f64>, predictions: &Array2<f64>) -> f64 {
    let n = targets.nrows() as f64;
    (predictions - targets).mapv(|d| d * d).sum() / (2.0 * n)
}

/// dL/dy = (y - t) / N
fn mse_gradient(targets: &Array2<f64>, predictions: &Array2<f64>) -> Array2<f64> {
    let n = targets.nrows() as f64;
    (predictions - targets) / n
}

/// Terminal node of the pipeline: scores predictions against targets and
/// seeds the backward pass.
///
/// Two states: before any forward (nothing cached) and forward-computed
/// (targets, predictions and the scalar loss cached). `backward` is only
/// valid in the second state.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Loss {
    kind: LossKind,
    targets: Option<Array2<f64>>,
    predictions: Option<Array2<f64>>,
    last_loss: Option<f64>,
    last_gradient: Option<Array2<f64>>,
}

impl Loss {
    pub fn new(kind: LossKind) -> Self {
        Self {
            kind,
            targets: None,
            predictions: None,
            last_loss: None,
            last_gradient: None,
        }
    }

    pub fn mse() -> Self {
        Self::new(LossKind::Mse)
    }

    pub fn kind(&self) -> LossKind {
        self.kind
    }

    pub fn is(&self, kind: LossKind) -> bool {
        self.kind == kind
    }

    /// Scores `predictions` against `targets`; both are cached for the
    /// backward pass. Shapes must match exactly.
    pub fn forward(&mut self, targets: &Array2<f64>, predictions: &Array2<f64>) -> Result<f64> {
        if targets.dim() != predictions.dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "target shape {:?} does not match prediction shape {:?}",
                targets.dim(),
                predictions.dim()
            )));
        }
        let l = match self.kind {
            LossKind::Mse => mse_output(targets, predictions),
        };
        self.targets = Some(targets.clone());
        self.predictions = Some(predictions.clone());
        self.last_loss = Some(l);
        self.last_gradient = None;
        Ok(l)
    }

    /// Gradient of the last computed loss with respect to the predictions.
    pub fn backward(&mut self) -> Result<Array2<f64>> {
        let (targets, predictions) = match (&self.targets, &self.predictions) {
            (Some(t), Some(y)) => (t, y),
            _ => {
                return Err(NNError::MissingForwardState(
                    "loss backward requires cached targets and predictions; run forward first"
                        .into(),
                ))
            }
        };
        let d = match self.kind {
            LossKind::Mse => mse_gradient(targets, predictions),
        };
        self.last_gradient = Some(d.clone());
        Ok(d)
    }

    /// The last scalar loss, if a forward has run.
    pub fn last_loss(&self) -> Option<f64> {
        self.last_loss
    }

    pub fn equal(&self, other: &Loss) -> bool {
        self.kind == other.kind
            && self.targets == other.targets
            && self.predictions == other.predictions
            && self.last_loss == other.last_loss
            && self.last_gradient == other.last_gradient
    }

    pub fn equal_approx(&self, other: &Loss) -> bool {
        self.kind == other.kind
            && approx_mat_opt(self.targets.as_ref(), other.targets.as_ref())
            && approx_mat_opt(self.predictions.as_ref(), other.predictions.as_ref())
            && approx_opt(self.last_loss, other.last_loss)
            && approx_mat_opt(self.last_gradient.as_ref(), other.last_gradient.as_ref())
    }

    fn describe(&self, full: bool) -> Vec<(&'static str, String)> {
        vec![
            ("targets", render::mat_opt(self.targets.as_ref(), full)),
            (
                "predictions",
                render::mat_opt(self.predictions.as_ref(), full),
            ),
            (
                "loss",
                match self.last_loss {
                    Some(l) => format!("{}", l),
                    None => "-".to_string(),
                },
            ),
            (
                "gradient",
                render::mat_opt(self.last_gradient.as_ref(), full),
            ),
        ]
    }

    pub fn pretty(&self) -> String {
        render::pretty(self.kind.as_str(), &self.describe(true))
    }

    pub fn short(&self) -> String {
        render::short(self.kind.as_str(), "")
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            render::compact(self.kind.as_str(), &self.describe(false))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mse_forward_value() {
        let mut loss = Loss::mse();
        let t = array![[4.0], [5.0], [6.0]];
        let y = array![[1.0], [2.0], [3.0]];
        let l = loss.forward(&t, &y).unwrap();
        // ((1-4)^2 + (2-5)^2 + (3-6)^2) / 2 / 3
        assert!((l - 4.5).abs() < 1e-12);
        assert_eq!(loss.last_loss(), Some(l));
    }

    #[test]
    fn test_mse_backward_value() {
        let mut loss = Loss::mse();
        let t = array![[4.0], [5.0], [6.0]];
        let y = array![[1.0], [2.0], [3.0]];
        loss.forward(&t, &y).unwrap();
        let d = loss.backward().unwrap();
        assert_eq!(d, array![[-1.0], [-1.0], [-1.0]]);
    }

    #[test]
    fn test_mse_rejects_shape_mismatch() {
        let mut loss = Loss::mse();
        let t = array![[1.0], [2.0], [3.0]];
        let y = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let err = loss.forward(&t, &y).unwrap_err();
        assert!(matches!(err, NNError::LayerShapeMismatch(_)));
    }

    #[test]
    fn test_mse_backward_before_forward() {
        let mut loss = Loss::mse();
        let err = loss.backward().unwrap_err();
        assert!(matches!(err, NNError::MissingForwardState(_)));
    }

    #[test]
    fn test_loss_copy_isolation() {
        let mut original = Loss::mse();
        let copy = original.clone();
        assert!(original.equal(&copy));

        original
            .forward(&array![[1.0]], &array![[2.0]])
            .unwrap();
        assert!(!original.equal(&copy));
        assert!(copy.last_loss().is_none());
    }

    #[test]
    fn test_loss_equal_approx() {
        let mut a = Loss::mse();
        let mut b = Loss::mse();
        a.forward(&array![[1.0]], &array![[2.0]]).unwrap();
        b.forward(&array![[1.0]], &array![[2.0 + 0.5e-8]]).unwrap();
        assert!(!a.equal(&b));
        assert!(a.equal_approx(&b));
    }

    #[test]
    fn test_loss_renderings() {
        let mut loss = Loss::mse();
        assert_eq!(loss.short(), "MSE");
        loss.forward(&array![[1.0]], &array![[2.0]]).unwrap();
        let compact = format!("{}", loss);
        assert!(compact.contains("loss: 0.5"));
        assert!(loss.pretty().contains("targets"));
    }
}
