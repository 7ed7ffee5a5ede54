//! Meta-modules: layers whose forward pass can run on an external parameter map.
//!
//! An inner loop adapts a copy of the parameters instead of mutating the
//! model, so every module here takes an optional [`MetaParams`] in
//! [`MetaModule::forward_with`]. With `None` the module's own variables are
//! used.

use crate::error::{MetaError, Result};
use crate::params::MetaParams;
use candle_core::{Device, Tensor, Var};
use candle_nn::Module;
use serde::{Deserialize, Serialize};

/// A model exposing its trainable parameters by name.
///
/// Only types implementing this trait can be passed to
/// [`gradient_update_parameters`](crate::gradient::gradient_update_parameters).
pub trait MetaModule {
    /// Trainable parameters in registration order.
    fn meta_named_parameters(&self) -> MetaParams;

    /// Forward pass using `params` when given, the module's own parameters otherwise.
    fn forward_with(&self, input: &Tensor, params: Option<&MetaParams>) -> Result<Tensor>;

    /// Forward pass with the module's own parameters.
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.forward_with(input, None)
    }
}

/// Activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// ReLU activation.
    Relu,
    /// GELU activation (tanh approximation).
    Gelu,
    /// Sigmoid activation.
    Sigmoid,
    /// Tanh activation.
    Tanh,
    /// No activation (identity).
    Linear,
}

impl Activation {
    /// Apply the activation element-wise.
    pub fn apply(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = match self {
            Activation::Relu => xs.relu()?,
            Activation::Gelu => xs.gelu()?,
            Activation::Sigmoid => candle_nn::ops::sigmoid(xs)?,
            Activation::Tanh => xs.tanh()?,
            Activation::Linear => xs.clone(),
        };
        Ok(ys)
    }
}

/// Fully connected layer `y = x W^T + b`.
#[derive(Debug, Clone)]
pub struct MetaLinear {
    weight: Var,
    bias: Option<Var>,
}

impl MetaLinear {
    /// Create a layer with weights drawn uniformly from `±1/sqrt(input_dim)`.
    pub fn new(input_dim: usize, output_dim: usize, has_bias: bool, device: &Device) -> Result<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(MetaError::NeuralNetwork(format!(
                "Layer has zero dimension: input={}, output={}",
                input_dim, output_dim
            )));
        }

        let bound = 1.0 / (input_dim as f32).sqrt();
        let weight = Var::rand(-bound, bound, (output_dim, input_dim), device)?;
        let bias = if has_bias {
            Some(Var::rand(-bound, bound, output_dim, device)?)
        } else {
            None
        };

        Ok(Self { weight, bias })
    }

    /// Build a layer from existing variables (weight is `[out, in]`).
    pub fn from_vars(weight: Var, bias: Option<Var>) -> Self {
        Self { weight, bias }
    }

    /// Weight variable.
    pub fn weight(&self) -> &Var {
        &self.weight
    }

    /// Bias variable, if any.
    pub fn bias(&self) -> Option<&Var> {
        self.bias.as_ref()
    }

    fn linear(weight: &Tensor, bias: Option<&Tensor>, input: &Tensor) -> Result<Tensor> {
        let layer = candle_nn::Linear::new(weight.clone(), bias.cloned());
        Ok(layer.forward(input)?)
    }
}

impl MetaModule for MetaLinear {
    fn meta_named_parameters(&self) -> MetaParams {
        let mut params = MetaParams::new();
        params.insert_var("weight", self.weight.clone());
        if let Some(bias) = &self.bias {
            params.insert_var("bias", bias.clone());
        }
        params
    }

    fn forward_with(&self, input: &Tensor, params: Option<&MetaParams>) -> Result<Tensor> {
        let Some(params) = params else {
            return Self::linear(
                self.weight.as_tensor(),
                self.bias.as_ref().map(Var::as_tensor),
                input,
            );
        };

        let weight = params
            .tensor("weight")
            .ok_or_else(|| MetaError::NeuralNetwork("Missing parameter 'weight'".to_string()))?;
        let bias = match &self.bias {
            Some(_) => Some(params.tensor("bias").ok_or_else(|| {
                MetaError::NeuralNetwork("Missing parameter 'bias'".to_string())
            })?),
            None => None,
        };
        Self::linear(weight, bias, input)
    }
}

/// Layer configuration for [`MetaSequentialBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    /// Input dimension.
    pub input_dim: usize,
    /// Output dimension.
    pub output_dim: usize,
    /// Whether the layer has bias.
    pub has_bias: bool,
    /// Activation applied after the layer.
    pub activation: Activation,
}

/// Stack of dense layers, parameters named `layers.{i}.weight` / `layers.{i}.bias`.
#[derive(Debug, Clone)]
pub struct MetaSequential {
    layers: Vec<(MetaLinear, Activation)>,
}

impl MetaSequential {
    /// Create the network described by `configs`.
    pub fn new(configs: &[LayerConfig], device: &Device) -> Result<Self> {
        if configs.is_empty() {
            return Err(MetaError::NeuralNetwork("No layers in network".to_string()));
        }

        for (i, pair) in configs.windows(2).enumerate() {
            if pair[0].output_dim != pair[1].input_dim {
                return Err(MetaError::NeuralNetwork(format!(
                    "Layer {} output ({}) does not match layer {} input ({})",
                    i,
                    pair[0].output_dim,
                    i + 1,
                    pair[1].input_dim
                )));
            }
        }

        let layers = configs
            .iter()
            .map(|config| {
                let layer =
                    MetaLinear::new(config.input_dim, config.output_dim, config.has_bias, device)?;
                Ok((layer, config.activation))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { layers })
    }

    /// Get the number of layers in the network.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    fn prefix(index: usize) -> String {
        format!("layers.{}", index)
    }
}

impl MetaModule for MetaSequential {
    fn meta_named_parameters(&self) -> MetaParams {
        let mut params = MetaParams::new();
        for (i, (layer, _)) in self.layers.iter().enumerate() {
            let prefix = Self::prefix(i);
            for (name, param) in layer.meta_named_parameters().iter() {
                params.insert(format!("{}.{}", prefix, name), param.clone());
            }
        }
        params
    }

    fn forward_with(&self, input: &Tensor, params: Option<&MetaParams>) -> Result<Tensor> {
        let mut current = input.clone();
        for (i, (layer, activation)) in self.layers.iter().enumerate() {
            let sub = params.map(|params| params.subdict(&Self::prefix(i)));
            current = layer.forward_with(&current, sub.as_ref())?;
            current = activation.apply(&current)?;
        }
        Ok(current)
    }
}

/// Builder for creating [`MetaSequential`] networks.
pub struct MetaSequentialBuilder {
    layers: Vec<LayerConfig>,
}

impl MetaSequentialBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a dense layer.
    pub fn dense(
        mut self,
        input_dim: usize,
        output_dim: usize,
        has_bias: bool,
        activation: Activation,
    ) -> Self {
        self.layers.push(LayerConfig {
            input_dim,
            output_dim,
            has_bias,
            activation,
        });
        self
    }

    /// Layer configurations collected so far.
    pub fn layers(&self) -> &[LayerConfig] {
        &self.layers
    }

    /// Build the network on the given device.
    pub fn build(self, device: &Device) -> Result<MetaSequential> {
        MetaSequential::new(&self.layers, device)
    }
}

impl Default for MetaSequentialBuilder {
    fn default() -> Self {
        Self::new()
    }
}
