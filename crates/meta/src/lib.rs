//! Gradient-based meta-learning helpers on top of candle.
//!
//! This crate provides the pieces an inner adaptation loop (MAML-style) needs
//! around a candle model: an accuracy metric, device placement for nested
//! tensor collections, an array-to-tensor transform, and a one-step gradient
//! update over a model's meta-parameters.

#![deny(missing_docs, unsafe_code)]

/// Compute device selection and placement of tensor collections.
pub mod device;

/// Error types for meta-learning operations.
pub mod error;

/// One-step gradient descent on meta-parameters.
pub mod gradient;

/// Evaluation metrics.
pub mod metrics;

/// Meta-modules and activations.
pub mod nn;

/// Ordered parameter maps.
pub mod params;

/// Sample transforms.
pub mod transforms;

pub use device::{resolve_device, tensors_to_cpu, tensors_to_device, TensorTree, ToDevice};
pub use error::{MetaError, Result};
pub use gradient::{
    enable_second_order, gradient_update_parameters, second_order_enabled, StepSize, StepValue,
};
pub use metrics::compute_accuracy;
pub use nn::{Activation, LayerConfig, MetaLinear, MetaModule, MetaSequential, MetaSequentialBuilder};
pub use params::{MetaParameter, MetaParams};
pub use transforms::{Float32Element, ToTensor1D, Transform};
