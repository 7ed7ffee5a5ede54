//! Compute device selection and placement of tensor collections.

use crate::error::{MetaError, Result};
use crate::params::{MetaParameter, MetaParams};
use candle_core::{Device, Tensor};
use metagrad_core::{DeviceConfig, DeviceKind};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use tracing::info;

/// Create the device described by `config`.
///
/// `Auto` prefers CUDA, then Metal, and falls back to the CPU.
pub fn resolve_device(config: &DeviceConfig) -> Result<Device> {
    let device = match config.kind {
        DeviceKind::Cpu => Device::Cpu,
        DeviceKind::Cuda => new_cuda(config.index)?,
        DeviceKind::Metal => new_metal(config.index)?,
        DeviceKind::Auto => {
            if candle_core::utils::cuda_is_available() {
                new_cuda(config.index)?
            } else if candle_core::utils::metal_is_available() {
                new_metal(config.index)?
            } else {
                Device::Cpu
            }
        }
    };

    info!(requested = %config.kind, device = ?device.location(), "resolved compute device");
    Ok(device)
}

fn new_cuda(index: usize) -> Result<Device> {
    Device::new_cuda(index)
        .map_err(|e| MetaError::Device(format!("Failed to create CUDA device: {}", e)))
}

fn new_metal(index: usize) -> Result<Device> {
    Device::new_metal(index)
        .map_err(|e| MetaError::Device(format!("Failed to create Metal device: {}", e)))
}

/// Values that can be relocated onto a compute device.
///
/// Containers recurse into their elements and keep their type and order.
pub trait ToDevice: Sized {
    /// Copy of `self` with every tensor placed on `device`.
    fn place_on(&self, device: &Device) -> Result<Self>;
}

impl ToDevice for Tensor {
    fn place_on(&self, device: &Device) -> Result<Self> {
        Ok(self.to_device(device)?)
    }
}

impl ToDevice for MetaParameter {
    fn place_on(&self, device: &Device) -> Result<Self> {
        self.to_device(device)
    }
}

impl ToDevice for MetaParams {
    fn place_on(&self, device: &Device) -> Result<Self> {
        self.iter()
            .map(|(name, param)| Ok((name.to_string(), param.place_on(device)?)))
            .collect()
    }
}

impl<T: ToDevice> ToDevice for Vec<T> {
    fn place_on(&self, device: &Device) -> Result<Self> {
        self.iter().map(|item| item.place_on(device)).collect()
    }
}

impl<A: ToDevice, B: ToDevice> ToDevice for (A, B) {
    fn place_on(&self, device: &Device) -> Result<Self> {
        Ok((self.0.place_on(device)?, self.1.place_on(device)?))
    }
}

impl<A: ToDevice, B: ToDevice, C: ToDevice> ToDevice for (A, B, C) {
    fn place_on(&self, device: &Device) -> Result<Self> {
        Ok((
            self.0.place_on(device)?,
            self.1.place_on(device)?,
            self.2.place_on(device)?,
        ))
    }
}

impl<K, T> ToDevice for HashMap<K, T>
where
    K: Clone + Eq + Hash,
    T: ToDevice,
{
    fn place_on(&self, device: &Device) -> Result<Self> {
        self.iter()
            .map(|(key, value)| Ok((key.clone(), value.place_on(device)?)))
            .collect()
    }
}

impl<K, T> ToDevice for BTreeMap<K, T>
where
    K: Clone + Ord,
    T: ToDevice,
{
    fn place_on(&self, device: &Device) -> Result<Self> {
        self.iter()
            .map(|(key, value)| Ok((key.clone(), value.place_on(device)?)))
            .collect()
    }
}

/// Nested collection of tensors whose layout is only known at runtime,
/// e.g. a batch assembled by a data loader.
#[derive(Debug, Clone)]
pub enum TensorTree {
    /// A tensor leaf.
    Tensor(Tensor),
    /// Ordered, growable sequence.
    List(Vec<TensorTree>),
    /// Ordered, fixed-arity sequence.
    Tuple(Vec<TensorTree>),
    /// Name-keyed mapping that keeps insertion order.
    Dict(Vec<(String, TensorTree)>),
    /// Name-keyed mapping without order.
    Map(HashMap<String, TensorTree>),
    /// Plain number carried alongside tensors.
    Scalar(f64),
    /// Text carried alongside tensors.
    Text(String),
}

impl TensorTree {
    /// Name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            TensorTree::Tensor(_) => "tensor",
            TensorTree::List(_) => "list",
            TensorTree::Tuple(_) => "tuple",
            TensorTree::Dict(_) => "dict",
            TensorTree::Map(_) => "map",
            TensorTree::Scalar(_) => "scalar",
            TensorTree::Text(_) => "text",
        }
    }

    /// The tensor of a leaf.
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            TensorTree::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    /// Look up a key in a `Dict` or `Map`.
    pub fn get(&self, key: &str) -> Option<&TensorTree> {
        match self {
            TensorTree::Dict(entries) => entries
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
            TensorTree::Map(entries) => entries.get(key),
            _ => None,
        }
    }
}

impl From<Tensor> for TensorTree {
    fn from(tensor: Tensor) -> Self {
        TensorTree::Tensor(tensor)
    }
}

impl ToDevice for TensorTree {
    fn place_on(&self, device: &Device) -> Result<Self> {
        match self {
            TensorTree::Tensor(tensor) => Ok(TensorTree::Tensor(tensor.place_on(device)?)),
            TensorTree::List(items) => Ok(TensorTree::List(items.place_on(device)?)),
            TensorTree::Tuple(items) => Ok(TensorTree::Tuple(items.place_on(device)?)),
            TensorTree::Dict(entries) => entries
                .iter()
                .map(|(name, value)| Ok((name.clone(), value.place_on(device)?)))
                .collect::<Result<Vec<_>>>()
                .map(TensorTree::Dict),
            TensorTree::Map(entries) => Ok(TensorTree::Map(entries.place_on(device)?)),
            TensorTree::Scalar(_) | TensorTree::Text(_) => Err(MetaError::Unsupported(format!(
                "cannot place a {} on a device",
                self.kind()
            ))),
        }
    }
}

/// Place a tensor or a (nested) collection of tensors on `device`.
pub fn tensors_to_device<T: ToDevice>(tensors: &T, device: &Device) -> Result<T> {
    tensors.place_on(device)
}

/// Place a tensor or a (nested) collection of tensors on the CPU.
pub fn tensors_to_cpu<T: ToDevice>(tensors: &T) -> Result<T> {
    tensors.place_on(&Device::Cpu)
}
