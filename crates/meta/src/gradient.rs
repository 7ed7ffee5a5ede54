//! One step of gradient descent on meta-parameters.

use crate::error::{MetaError, Result};
use crate::nn::MetaModule;
use crate::params::{MetaParameter, MetaParams};
use candle_core::Tensor;
use metagrad_core::constants::{DEFAULT_STEP_SIZE, SECOND_ORDER_ENV};
use std::cell::Cell;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A single step value: a plain scalar or a tensor broadcast against the gradient.
#[derive(Debug, Clone)]
pub enum StepValue {
    /// Fixed scalar.
    Scalar(f64),
    /// Tensor step, e.g. a learned per-element learning rate.
    Tensor(Tensor),
}

/// Step size of a gradient update.
#[derive(Debug, Clone)]
pub enum StepSize {
    /// Same step for every parameter.
    Uniform(StepValue),
    /// Step looked up by parameter name.
    PerParameter(HashMap<String, StepValue>),
}

impl StepSize {
    /// Uniform scalar step.
    pub fn scalar(value: f64) -> Self {
        StepSize::Uniform(StepValue::Scalar(value))
    }

    /// Per-parameter scalar steps.
    pub fn per_parameter<I, K>(steps: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        StepSize::PerParameter(
            steps
                .into_iter()
                .map(|(name, step)| (name.into(), StepValue::Scalar(step)))
                .collect(),
        )
    }

    fn for_parameter(&self, name: &str) -> Result<&StepValue> {
        match self {
            StepSize::Uniform(step) => Ok(step),
            StepSize::PerParameter(steps) => steps
                .get(name)
                .ok_or_else(|| MetaError::MissingStepSize(name.to_string())),
        }
    }
}

impl Default for StepSize {
    fn default() -> Self {
        StepSize::scalar(DEFAULT_STEP_SIZE)
    }
}

impl From<f64> for StepSize {
    fn from(value: f64) -> Self {
        StepSize::scalar(value)
    }
}

impl From<Tensor> for StepSize {
    fn from(value: Tensor) -> Self {
        StepSize::Uniform(StepValue::Tensor(value))
    }
}

impl From<HashMap<String, f64>> for StepSize {
    fn from(steps: HashMap<String, f64>) -> Self {
        StepSize::per_parameter(steps)
    }
}

impl From<HashMap<String, StepValue>> for StepSize {
    fn from(steps: HashMap<String, StepValue>) -> Self {
        StepSize::PerParameter(steps)
    }
}

impl StepValue {
    fn scale(&self, grad: &Tensor) -> Result<Tensor> {
        match self {
            StepValue::Scalar(step) => Ok(grad.affine(*step, 0.0)?),
            StepValue::Tensor(step) => {
                let step = step.to_device(grad.device())?.to_dtype(grad.dtype())?;
                Ok(grad.broadcast_mul(&step)?)
            }
        }
    }
}

/// Let candle keep the graph of gradients so full-order updates see
/// second-order terms.
///
/// candle reads the switch once per thread at its first backward pass, so
/// call this before any gradient is computed, typically at start-up.
/// It writes a process environment variable, which is not synchronized with
/// concurrent readers: call it before spawning other threads.
pub fn enable_second_order() {
    std::env::set_var(SECOND_ORDER_ENV, "1");
}

/// Whether the switch read by candle is set in the environment.
///
/// This reports the environment only. A thread that already ran a backward
/// pass before the switch was set keeps detaching gradients regardless.
pub fn second_order_enabled() -> bool {
    match std::env::var(SECOND_ORDER_ENV) {
        Ok(value) => !value.is_empty() && value != "0",
        Err(_) => false,
    }
}

/// Whether full-order gradients can be produced on the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SecondOrder {
    Available,
    NotEnabled,
    EnabledTooLate,
}

thread_local! {
    // switch state seen by the first backward pass of this thread
    static SWITCH_AT_FIRST_BACKWARD: Cell<Option<bool>> = const { Cell::new(None) };
}

/// Record `enabled` as candle's cached value if no backward pass ran yet on
/// this thread, and report what the next backward pass will do.
///
/// Only backward passes started by [`gradient_update_parameters`] are seen.
fn second_order_state(enabled: bool) -> SecondOrder {
    let cached = SWITCH_AT_FIRST_BACKWARD.with(|seen| match seen.get() {
        Some(cached) => cached,
        None => {
            seen.set(Some(enabled));
            enabled
        }
    });
    match (cached, enabled) {
        (true, _) => SecondOrder::Available,
        (false, true) => SecondOrder::EnabledTooLate,
        (false, false) => SecondOrder::NotEnabled,
    }
}

/// Update the meta-parameters with one step of gradient descent on `loss`.
///
/// When `params` is `None` the model's own parameters are used; passing the
/// result of a previous call runs several inner-loop steps. Each returned
/// entry is `param - step * grad`, in the order of `params`.
///
/// With `first_order` the gradients are detached and the update behaves as a
/// constant shift. Otherwise the gradients keep their graph, provided
/// [`enable_second_order`] was called before the first backward pass of the
/// thread; if it was not, a warning is logged and the gradients are detached
/// as in the first-order case.
pub fn gradient_update_parameters<M>(
    model: &M,
    loss: &Tensor,
    params: Option<&MetaParams>,
    step_size: &StepSize,
    first_order: bool,
) -> Result<MetaParams>
where
    M: MetaModule + ?Sized,
{
    if loss.elem_count() != 1 {
        return Err(MetaError::Shape(format!(
            "loss must be a scalar, got shape {:?}",
            loss.dims()
        )));
    }

    let owned;
    let params = match params {
        Some(params) => params,
        None => {
            owned = model.meta_named_parameters();
            &owned
        }
    };

    let keep_graph = match second_order_state(second_order_enabled()) {
        _ if first_order => false,
        SecondOrder::Available => true,
        SecondOrder::NotEnabled => {
            warn!(
                "full-order update requested but {} is not set; gradients are constants",
                SECOND_ORDER_ENV
            );
            false
        }
        SecondOrder::EnabledTooLate => {
            warn!(
                "{} was set after this thread's first backward pass; gradients are constants",
                SECOND_ORDER_ENV
            );
            false
        }
    };

    let grads = loss.backward()?;

    let mut updated = MetaParams::new();
    for (name, param) in params.iter() {
        let grad = grads
            .get(param.anchor())
            .ok_or_else(|| MetaError::UnusedParameter(name.to_string()))?;
        let grad = if keep_graph {
            grad.clone()
        } else {
            grad.detach()
        };

        let step = step_size.for_parameter(name)?;
        let value = param.value().sub(&step.scale(&grad)?)?;
        updated.insert(name, MetaParameter::from_tensor(value)?);
    }

    debug!(
        parameters = updated.len(),
        first_order,
        keep_graph,
        "applied gradient update to meta-parameters"
    );

    Ok(updated)
}
