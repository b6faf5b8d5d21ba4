use crate::prelude::*;

/// Update rule injected into `apply_optim`. Given a parameter and its
/// cached gradient, an implementor returns the updated parameter; the
/// pipeline never inspects the rule itself.
///
/// `&mut self` leaves room for stateful rules (momentum, Adam) without
/// changing the seam.
pub trait Optimizer {
    fn update_weights(&mut self, param: &Array2<f64>, grad: &Array2<f64>) -> Array2<f64>;
    fn update_params(&mut self, param: &Array1<f64>, grad: &Array1<f64>) -> Array1<f64>;
}

/// Plain stochastic gradient descent with optional symmetric gradient
/// clipping applied before the step.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Sgd {
    pub learning_rate: f64,
    pub clip: Option<f64>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            clip: None,
        }
    }

    pub fn with_clip(learning_rate: f64, clip: f64) -> Self {
        Self {
            learning_rate,
            clip: Some(clip),
        }
    }

    fn clipped(&self, g: f64) -> f64 {
        match self.clip {
            Some(c) => g.clamp(-c, c),
            None => g,
        }
    }
}

impl Optimizer for Sgd {
    fn update_weights(&mut self, param: &Array2<f64>, grad: &Array2<f64>) -> Array2<f64> {
        param - &grad.mapv(|g| self.learning_rate * self.clipped(g))
    }

    fn update_params(&mut self, param: &Array1<f64>, grad: &Array1<f64>) -> Array1<f64> {
        param - &grad.mapv(|g| self.learning_rate * self.clipped(g))
    }
}
