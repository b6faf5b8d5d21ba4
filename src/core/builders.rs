use crate::core::init::glorot_uniform;
use crate::core::layers::{DenseDropLayer, DenseLayer, Layer, LayerKind};
use crate::core::losses::{Loss, LossKind};
use crate::core::network::Network;
use crate::core::operations::{
    BiasAdd, Dropout, Operation, OperationKind, SigmoidParamActivation, WeightMultiply,
};
use crate::prelude::*;

/// Keep probability used when a dropout slot is requested without one.
pub const DEFAULT_KEEP_PROBABILITY: f64 = 0.8;

/// Staged configuration for a single operation. Every slot is optional
/// until `build`, which resolves explicit values first and synthesizes the
/// rest from the kind plus whatever shape information was given.
#[derive(Debug, Clone, Default)]
pub struct OperationBuilder {
    kind: Option<OperationKind>,
    weights: Option<Array2<f64>>,
    shape: Option<(usize, usize)>,
    bias: Option<Array1<f64>>,
    coefficients: Option<Array1<f64>>,
    width: Option<usize>,
    keep_probability: Option<f64>,
}

impl OperationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: OperationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn weights(mut self, weights: Array2<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn shape(mut self, rows: usize, cols: usize) -> Self {
        self.shape = Some((rows, cols));
        self
    }

    pub fn bias(mut self, bias: Array1<f64>) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn coefficients(mut self, coefficients: Array1<f64>) -> Self {
        self.coefficients = Some(coefficients);
        self
    }

    /// Width of the bias or coefficient vector to synthesize.
    pub fn width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    pub fn keep_probability(mut self, keep_probability: f64) -> Self {
        self.keep_probability = Some(keep_probability);
        self
    }

    pub fn build(self) -> Result<Operation> {
        let kind = self
            .kind
            .ok_or_else(|| NNError::MissingBuilderField("operation kind".into()))?;
        match kind {
            OperationKind::WeightMultiply => {
                let w = match (self.weights, self.shape) {
                    (Some(w), Some((rows, cols))) => {
                        if w.dim() != (rows, cols) {
                            return Err(NNError::InvalidWeightShape(format!(
                                "explicit weights are {}x{} but shape says {}x{}",
                                w.nrows(),
                                w.ncols(),
                                rows,
                                cols
                            )));
                        }
                        w
                    }
                    (Some(w), None) => w,
                    (None, Some((rows, cols))) => glorot_uniform(rows, cols),
                    (None, None) => {
                        return Err(NNError::MissingBuilderField(
                            "weight multiply needs explicit weights or a shape".into(),
                        ))
                    }
                };
                Ok(Operation::WeightMultiply(WeightMultiply::new(w)?))
            }
            OperationKind::BiasAdd => {
                let b = match (self.bias, self.width) {
                    (Some(b), _) => b,
                    (None, Some(width)) => Array1::zeros(width),
                    (None, None) => {
                        return Err(NNError::MissingBuilderField(
                            "bias add needs an explicit bias or a width".into(),
                        ))
                    }
                };
                Ok(Operation::BiasAdd(BiasAdd::new(b)?))
            }
            OperationKind::SigmoidParamActivation => {
                let p = match (self.coefficients, self.width) {
                    (Some(p), _) => p,
                    (None, Some(width)) => Array1::ones(width),
                    (None, None) => {
                        return Err(NNError::MissingBuilderField(
                            "sigmoid-param needs explicit coefficients or a width".into(),
                        ))
                    }
                };
                Ok(Operation::SigmoidParamActivation(SigmoidParamActivation::new(p)?))
            }
            OperationKind::Dropout => {
                let keep = self.keep_probability.unwrap_or(DEFAULT_KEEP_PROBABILITY);
                Ok(Operation::Dropout(Dropout::new(keep)?))
            }
            kind => Operation::activation(kind),
        }
    }
}

/// Staged configuration for one layer. Either holds an explicit `Layer`
/// or the parts to synthesize one: dimensions, weight/bias values, an
/// activation kind and, for the dropout variant, a keep probability.
#[derive(Debug, Clone, Default)]
pub struct LayerBuilder {
    kind: Option<LayerKind>,
    layer: Option<Layer>,
    inputs: Option<usize>,
    size: Option<usize>,
    weights: Option<Array2<f64>>,
    bias: Option<Array1<f64>>,
    activation: Option<OperationKind>,
    coefficients: Option<Array1<f64>>,
    keep_probability: Option<f64>,
}

impl LayerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: LayerKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Explicit instance; wins over every other slot at build time.
    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn inputs(mut self, inputs: usize) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn weights(mut self, weights: Array2<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn bias(mut self, bias: Array1<f64>) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn activation(mut self, activation: OperationKind) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn coefficients(mut self, coefficients: Array1<f64>) -> Self {
        self.coefficients = Some(coefficients);
        self
    }

    pub fn keep_probability(mut self, keep_probability: f64) -> Self {
        self.keep_probability = Some(keep_probability);
        self
    }

    pub fn build(self) -> Result<Layer> {
        if let Some(layer) = self.layer {
            return Ok(layer);
        }

        // Dimensions: explicit, or inferred from explicit parameter values.
        let inputs = self
            .inputs
            .or_else(|| self.weights.as_ref().map(|w| w.nrows()))
            .ok_or_else(|| {
                NNError::MissingBuilderField("layer inputs count is not inferrable".into())
            })?;
        let size = self
            .size
            .or_else(|| self.weights.as_ref().map(|w| w.ncols()))
            .or_else(|| self.bias.as_ref().map(|b| b.len()))
            .ok_or_else(|| NNError::MissingBuilderField("layer size is not inferrable".into()))?;

        let w = match self.weights {
            Some(w) => {
                if w.dim() != (inputs, size) {
                    return Err(NNError::InvalidWeightShape(format!(
                        "explicit weights are {}x{} but the layer is {}x{}",
                        w.nrows(),
                        w.ncols(),
                        inputs,
                        size
                    )));
                }
                w
            }
            None => glorot_uniform(inputs, size),
        };
        let weight = WeightMultiply::new(w)?;
        let bias = BiasAdd::new(self.bias.unwrap_or_else(|| Array1::zeros(size)))?;

        let activation_kind = self.activation.unwrap_or(OperationKind::LinearActivation);
        if !activation_kind.is_activation() {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "{} is not an activation kind",
                activation_kind.as_str()
            )));
        }
        let activation = if activation_kind == OperationKind::SigmoidParamActivation {
            let p = self.coefficients.unwrap_or_else(|| Array1::ones(size));
            Operation::SigmoidParamActivation(SigmoidParamActivation::new(p)?)
        } else {
            Operation::activation(activation_kind)?
        };

        let kind = self.kind.unwrap_or({
            if self.keep_probability.is_some() {
                LayerKind::DenseDrop
            } else {
                LayerKind::Dense
            }
        });
        match kind {
            LayerKind::Dense => Ok(Layer::Dense(DenseLayer::from_parts(weight, bias, activation)?)),
            LayerKind::DenseDrop => {
                let keep = self.keep_probability.unwrap_or(DEFAULT_KEEP_PROBABILITY);
                let dropout = Dropout::new(keep)?;
                Ok(Layer::DenseDrop(DenseDropLayer::from_parts(
                    weight, bias, activation, dropout,
                )?))
            }
        }
    }
}

/// Staged configuration for the loss slot.
#[derive(Debug, Clone, Default)]
pub struct LossBuilder {
    kind: Option<LossKind>,
    loss: Option<Loss>,
}

impl LossBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: LossKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn loss(mut self, loss: Loss) -> Self {
        self.loss = Some(loss);
        self
    }

    pub fn build(self) -> Result<Loss> {
        if let Some(loss) = self.loss {
            return Ok(loss);
        }
        match self.kind {
            Some(kind) => Ok(Loss::new(kind)),
            None => Err(NNError::LossNotSet),
        }
    }
}

/// Staged configuration for a whole network: an indexed list of layer
/// slots plus the loss slot. Slots may be configured in any order; the
/// list grows on demand, so layer `i` can be touched before layers
/// `0..i-1` exist.
#[derive(Debug, Clone, Default)]
pub struct NetworkBuilder {
    layers: Vec<LayerBuilder>,
    loss: LossBuilder,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, index: usize) -> &mut LayerBuilder {
        if index >= self.layers.len() {
            self.layers.resize_with(index + 1, LayerBuilder::new);
        }
        // Internal contract, not a user-facing error path.
        assert!(index < self.layers.len(), "layer slot list out of sync");
        &mut self.layers[index]
    }

    /// Explicit instance for slot `index`.
    pub fn layer(mut self, index: usize, layer: Layer) -> Self {
        let slot = self.slot(index);
        *slot = std::mem::take(slot).layer(layer);
        self
    }

    pub fn layer_kind(mut self, index: usize, kind: LayerKind) -> Self {
        let slot = self.slot(index);
        *slot = std::mem::take(slot).kind(kind);
        self
    }

    pub fn layer_inputs(mut self, index: usize, inputs: usize) -> Self {
        let slot = self.slot(index);
        *slot = std::mem::take(slot).inputs(inputs);
        self
    }

    pub fn layer_size(mut self, index: usize, size: usize) -> Self {
        let slot = self.slot(index);
        *slot = std::mem::take(slot).size(size);
        self
    }

    pub fn layer_weights(mut self, index: usize, weights: Array2<f64>) -> Self {
        let slot = self.slot(index);
        *slot = std::mem::take(slot).weights(weights);
        self
    }

    pub fn layer_bias(mut self, index: usize, bias: Array1<f64>) -> Self {
        let slot = self.slot(index);
        *slot = std::mem::take(slot).bias(bias);
        self
    }

    pub fn layer_activation(mut self, index: usize, activation: OperationKind) -> Self {
        let slot = self.slot(index);
        *slot = std::mem::take(slot).activation(activation);
        self
    }

    pub fn layer_coefficients(mut self, index: usize, coefficients: Array1<f64>) -> Self {
        let slot = self.slot(index);
        *slot = std::mem::take(slot).coefficients(coefficients);
        self
    }

    pub fn layer_keep_probability(mut self, index: usize, keep_probability: f64) -> Self {
        let slot = self.slot(index);
        *slot = std::mem::take(slot).keep_probability(keep_probability);
        self
    }

    /// Appends a dense layer slot after the last configured one.
    pub fn add_dense(self, inputs: usize, size: usize, activation: OperationKind) -> Self {
        let index = self.layers.len();
        self.layer_inputs(index, inputs)
            .layer_size(index, size)
            .layer_activation(index, activation)
    }

    /// Appends a dense-dropout layer slot after the last configured one.
    pub fn add_dense_drop(
        self,
        inputs: usize,
        size: usize,
        activation: OperationKind,
        keep_probability: f64,
    ) -> Self {
        let index = self.layers.len();
        self.layer_inputs(index, inputs)
            .layer_size(index, size)
            .layer_activation(index, activation)
            .layer_keep_probability(index, keep_probability)
    }

    pub fn loss(mut self, loss: Loss) -> Self {
        self.loss = self.loss.loss(loss);
        self
    }

    pub fn loss_kind(mut self, kind: LossKind) -> Self {
        self.loss = self.loss.kind(kind);
        self
    }

    pub fn build(self) -> Result<Network> {
        if self.layers.is_empty() {
            return Err(NNError::EmptyNetwork);
        }
        let mut layers = Vec::with_capacity(self.layers.len());
        for (i, builder) in self.layers.into_iter().enumerate() {
            let layer = builder.build().map_err(|e| {
                NNError::InvalidLayerConfiguration(format!("layer {}: {}", i, e))
            })?;
            layers.push(layer);
        }
        let loss = self.loss.build()?;
        Network::new(&layers, &loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_operation_builder_requires_kind() {
        let err = OperationBuilder::new().build().unwrap_err();
        assert!(matches!(err, NNError::MissingBuilderField(_)));
    }

    #[test]
    fn test_operation_builder_weight_from_shape() {
        let op = OperationBuilder::new()
            .kind(OperationKind::WeightMultiply)
            .shape(3, 4)
            .build()
            .unwrap();
        if let Operation::WeightMultiply(op) = op {
            assert_eq!(op.w.dim(), (3, 4));
        } else {
            panic!("expected a weight multiply");
        }
    }

    #[test]
    fn test_operation_builder_rejects_conflicting_shape() {
        let err = OperationBuilder::new()
            .kind(OperationKind::WeightMultiply)
            .weights(array![[1.0, 2.0]])
            .shape(2, 2)
            .build()
            .unwrap_err();
        assert!(matches!(err, NNError::InvalidWeightShape(_)));
    }

    #[test]
    fn test_operation_builder_bias_defaults_to_zeros() {
        let op = OperationBuilder::new()
            .kind(OperationKind::BiasAdd)
            .width(3)
            .build()
            .unwrap();
        if let Operation::BiasAdd(op) = op {
            assert_eq!(op.b, Array1::zeros(3));
        } else {
            panic!("expected a bias add");
        }
    }

    #[test]
    fn test_operation_builder_dropout_default_keep() {
        let op = OperationBuilder::new()
            .kind(OperationKind::Dropout)
            .build()
            .unwrap();
        if let Operation::Dropout(op) = op {
            assert_eq!(op.keep_probability, DEFAULT_KEEP_PROBABILITY);
        } else {
            panic!("expected a dropout");
        }
    }

    #[test]
    fn test_operation_builder_sigmoid_param_defaults_to_ones() {
        let op = OperationBuilder::new()
            .kind(OperationKind::SigmoidParamActivation)
            .width(2)
            .build()
            .unwrap();
        if let Operation::SigmoidParamActivation(op) = op {
            assert_eq!(op.p, Array1::ones(2));
        } else {
            panic!("expected a sigmoid-param activation");
        }
    }

    #[test]
    fn test_layer_builder_infers_dimensions_from_weights() {
        let layer = LayerBuilder::new()
            .weights(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])
            .build()
            .unwrap();
        assert_eq!(layer.inputs_count(), 2);
        assert_eq!(layer.size(), 3);
        assert!(layer.is(LayerKind::Dense));
        // Unset activation defaults to the identity.
        assert!(layer.operations()[2].is(OperationKind::LinearActivation));
    }

    #[test]
    fn test_layer_builder_without_shape_information() {
        let err = LayerBuilder::new()
            .activation(OperationKind::TanhActivation)
            .build()
            .unwrap_err();
        assert!(matches!(err, NNError::MissingBuilderField(_)));
    }

    #[test]
    fn test_layer_builder_keep_probability_implies_dropout_variant() {
        let layer = LayerBuilder::new()
            .inputs(2)
            .size(2)
            .keep_probability(0.6)
            .build()
            .unwrap();
        assert!(layer.is(LayerKind::DenseDrop));
        assert_eq!(layer.operations().len(), 4);
    }

    #[test]
    fn test_layer_builder_explicit_instance_wins() {
        let explicit = LayerBuilder::new().inputs(5).size(7).build().unwrap();
        let layer = LayerBuilder::new()
            .inputs(1)
            .size(1)
            .layer(explicit.clone())
            .build()
            .unwrap();
        assert!(layer.equal(&explicit));
    }

    #[test]
    fn test_loss_builder_from_kind() {
        let loss = LossBuilder::new().kind(LossKind::Mse).build().unwrap();
        assert!(loss.is(LossKind::Mse));
    }

    #[test]
    fn test_loss_builder_empty_fails() {
        let err = LossBuilder::new().build().unwrap_err();
        assert!(matches!(err, NNError::LossNotSet));
    }

    #[test]
    fn test_network_builder_requires_layers_and_loss() {
        let err = NetworkBuilder::new().build().unwrap_err();
        assert!(matches!(err, NNError::EmptyNetwork));

        let err = NetworkBuilder::new()
            .add_dense(2, 1, OperationKind::LinearActivation)
            .build()
            .unwrap_err();
        assert!(matches!(err, NNError::LossNotSet));
    }

    #[test]
    fn test_network_builder_chained_stack() {
        let net = Network::builder()
            .add_dense(1, 20, OperationKind::TanhActivation)
            .add_dense(20, 10, OperationKind::TanhActivation)
            .add_dense(10, 1, OperationKind::LinearActivation)
            .loss_kind(LossKind::Mse)
            .build()
            .unwrap();
        assert_eq!(net.layers().len(), 3);
        assert_eq!(net.layers()[1].inputs_count(), 20);
    }

    #[test]
    fn test_network_builder_out_of_order_slots() {
        // Configure layer 1 before layer 0; the slot list grows on demand.
        let net = NetworkBuilder::new()
            .layer_size(1, 2)
            .layer_inputs(1, 3)
            .layer_inputs(0, 4)
            .layer_size(0, 3)
            .loss_kind(LossKind::Mse)
            .build()
            .unwrap();
        assert_eq!(net.layers()[0].inputs_count(), 4);
        assert_eq!(net.layers()[1].size(), 2);
    }

    #[test]
    fn test_network_builder_wraps_slot_errors_with_index() {
        let err = NetworkBuilder::new()
            .layer_inputs(0, 2)
            .layer_size(0, 2)
            .layer_size(1, 3)
            .loss_kind(LossKind::Mse)
            .build()
            .unwrap_err();
        match err {
            NNError::InvalidLayerConfiguration(msg) => assert!(msg.contains("layer 1")),
            other => panic!("expected a construction error, got {:?}", other),
        }
    }

    #[test]
    fn test_network_builder_adjacency_still_checked() {
        let err = NetworkBuilder::new()
            .add_dense(2, 3, OperationKind::TanhActivation)
            .add_dense(5, 1, OperationKind::LinearActivation)
            .loss_kind(LossKind::Mse)
            .build()
            .unwrap_err();
        assert!(matches!(err, NNError::InvalidLayerConfiguration(_)));
    }

    #[test]
    fn test_builder_equivalence_with_explicit_construction() {
        let w0 = array![[0.1, 0.2], [0.3, 0.4]];
        let b0 = array![0.5, -0.5];
        let w1 = array![[1.0], [-1.0]];
        let b1 = array![0.0];

        let explicit = {
            let l0 = DenseLayer::from_parts(
                WeightMultiply::new(w0.clone()).unwrap(),
                BiasAdd::new(b0.clone()).unwrap(),
                Operation::activation(OperationKind::SigmoidActivation).unwrap(),
            )
            .unwrap();
            let l1 = DenseLayer::from_parts(
                WeightMultiply::new(w1.clone()).unwrap(),
                BiasAdd::new(b1.clone()).unwrap(),
                Operation::activation(OperationKind::LinearActivation).unwrap(),
            )
            .unwrap();
            Network::new(&[Layer::Dense(l0), Layer::Dense(l1)], &Loss::mse()).unwrap()
        };

        let built = Network::builder()
            .layer_weights(0, w0)
            .layer_bias(0, b0)
            .layer_activation(0, OperationKind::SigmoidActivation)
            .layer_weights(1, w1)
            .layer_bias(1, b1)
            .layer_activation(1, OperationKind::LinearActivation)
            .loss_kind(LossKind::Mse)
            .build()
            .unwrap();

        assert!(explicit.equal_approx(&built));
        assert!(explicit.equal(&built));
    }
}
