use std::fmt;

use crate::core::builders::NetworkBuilder;
use crate::core::layers::Layer;
use crate::core::losses::Loss;
use crate::core::optimizers::Optimizer;
use crate::core::render;
use crate::prelude::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    FeedForward,
}

impl NetworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkKind::FeedForward => "FeedForward",
        }
    }
}

/// An ordered stack of layers and one loss, driven as an explicit
/// four-call protocol: `forward`, `loss`, `backward`, `apply_optim`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
    loss: Loss,
}

impl Network {
    /// Validates the stack and takes deep copies of the loss and every
    /// layer, so the network never aliases caller-owned state.
    pub fn new(layers: &[Layer], loss: &Loss) -> Result<Self> {
        if layers.is_empty() {
            return Err(NNError::EmptyNetwork);
        }
        for i in 1..layers.len() {
            if layers[i].inputs_count() != layers[i - 1].size() {
                return Err(NNError::InvalidLayerConfiguration(format!(
                    "layer {} expects {} inputs but layer {} has size {}",
                    i,
                    layers[i].inputs_count(),
                    i - 1,
                    layers[i - 1].size()
                )));
            }
        }
        Ok(Self {
            layers: layers.to_vec(),
            loss: loss.clone(),
        })
    }

    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::new()
    }

    pub fn kind(&self) -> NetworkKind {
        NetworkKind::FeedForward
    }

    pub fn is(&self, kind: NetworkKind) -> bool {
        self.kind() == kind
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Threads a copy of `x` through the layer stack in order and returns
    /// the final layer's output.
    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut a = x.clone();
        for (i, layer) in self.layers.iter_mut().enumerate() {
            a = layer.forward(&a).map_err(|e| {
                NNError::ComputationError(format!("forward through layer {}: {}", i, e))
            })?;
        }
        Ok(a)
    }

    /// Scores the last layer's cached output against `targets`.
    pub fn loss(&mut self, targets: &Array2<f64>) -> Result<f64> {
        let predictions = match self.layers.last().and_then(|l| l.output()) {
            Some(out) => out.clone(),
            None => {
                return Err(NNError::MissingForwardState(
                    "network loss requires a completed forward pass".into(),
                ))
            }
        };
        self.loss.forward(targets, &predictions)
    }

    /// Pulls the seed gradient from the loss and threads it through the
    /// layers in reverse, returning the gradient at the input boundary.
    pub fn backward(&mut self) -> Result<Array2<f64>> {
        let mut d = self.loss.backward()?;
        for (i, layer) in self.layers.iter_mut().enumerate().rev() {
            d = layer.backward(&d).map_err(|e| {
                NNError::ComputationError(format!("backward through layer {}: {}", i, e))
            })?;
        }
        Ok(d)
    }

    /// Visits every layer in forward order, letting the optimizer update
    /// each parameterized operation in place.
    pub fn apply_optim(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.apply_optim(optimizer).map_err(|e| {
                NNError::ComputationError(format!("optimizing layer {}: {}", i, e))
            })?;
        }
        Ok(())
    }

    /// Runs the four-call protocol for `epochs` epochs and returns the
    /// last epoch's loss.
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        targets: &Array2<f64>,
        optimizer: &mut dyn Optimizer,
        epochs: usize,
        verbose: bool,
    ) -> Result<f64> {
        let mut last = 0.0;
        for epoch in 0..epochs {
            self.forward(x)?;
            last = self.loss(targets)?;
            if verbose {
                println!("Epoch: {}/{} loss: {}", epoch + 1, epochs, last);
            }
            self.backward()?;
            self.apply_optim(optimizer)?;
        }
        Ok(last)
    }

    /// Inference pass on a throwaway copy; the network's own cached state
    /// is left untouched.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.clone().forward(x)
    }

    /// Loss of `predict(x)` against `targets`, also on throwaway copies.
    pub fn evaluate(&self, x: &Array2<f64>, targets: &Array2<f64>) -> Result<f64> {
        let predictions = self.predict(x)?;
        self.loss.clone().forward(targets, &predictions)
    }

    pub fn count_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.count_parameters()).sum()
    }

    /// Keras-style parameter-count table.
    pub fn summary(&self) -> String {
        let mut res = format!("\nModel {}\n", self.kind().as_str());
        res.push_str("-------------------------------------------------------------\n");
        res.push_str("Layer (Type)\t\t Output shape\t\t No.of params\n");
        for layer in self.layers.iter() {
            res.push_str(&format!(
                "{}\t\t\t  (None, {})\t\t  {}\n",
                layer.kind().as_str(),
                layer.size(),
                layer.count_parameters()
            ));
        }
        res.push_str("-------------------------------------------------------------\n");
        res.push_str(&format!("Total params: {}\n", self.count_parameters()));
        res
    }

    pub fn equal(&self, other: &Network) -> bool {
        self.layers.len() == other.layers.len()
            && self
                .layers
                .iter()
                .zip(other.layers.iter())
                .all(|(a, b)| a.equal(b))
            && self.loss.equal(&other.loss)
    }

    pub fn equal_approx(&self, other: &Network) -> bool {
        self.layers.len() == other.layers.len()
            && self
                .layers
                .iter()
                .zip(other.layers.iter())
                .all(|(a, b)| a.equal_approx(b))
            && self.loss.equal_approx(&other.loss)
    }

    fn describe(&self, full: bool) -> Vec<(&'static str, String)> {
        let layers = self
            .layers
            .iter()
            .map(|l| if full { l.pretty() } else { l.short() })
            .collect::<Vec<_>>()
            .join(if full { "\n" } else { ", " });
        vec![
            ("layers", layers),
            (
                "loss",
                if full {
                    self.loss.pretty()
                } else {
                    self.loss.short()
                },
            ),
        ]
    }

    pub fn pretty(&self) -> String {
        render::pretty(self.kind().as_str(), &self.describe(true))
    }

    pub fn short(&self) -> String {
        render::short(
            self.kind().as_str(),
            &format!("{} layers", self.layers.len()),
        )
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            render::compact(self.kind().as_str(), &self.describe(false))
        )
    }
}
