//! Evaluation metrics for adapted models.

use crate::error::{MetaError, Result};
use candle_core::{DType, Tensor};

/// Fraction of rows whose highest-scoring class equals the target label.
///
/// `logits` is `[batch, classes]` and `targets` holds one integer label per
/// row. Gradients are not tracked; the result is a plain `f32` in `[0, 1]`.
pub fn compute_accuracy(logits: &Tensor, targets: &Tensor) -> Result<f32> {
    let logits = logits.detach();
    let targets = targets.detach();

    if logits.rank() != 2 {
        return Err(MetaError::Shape(format!(
            "logits must be [batch, classes], got {:?}",
            logits.dims()
        )));
    }
    if targets.rank() != 1 {
        return Err(MetaError::Shape(format!(
            "targets must be [batch], got {:?}",
            targets.dims()
        )));
    }

    let (batch, classes) = logits.dims2()?;
    if batch != targets.dim(0)? {
        return Err(MetaError::Shape(format!(
            "batch size mismatch: {} logits rows, {} targets",
            batch,
            targets.dim(0)?
        )));
    }
    if batch == 0 || classes == 0 {
        return Err(MetaError::Shape(
            "cannot compute accuracy of an empty batch".to_string(),
        ));
    }

    let predictions = logits.argmax(1)?;
    let targets = targets
        .to_device(logits.device())?
        .to_dtype(DType::U32)?;

    let accuracy = predictions
        .eq(&targets)?
        .to_dtype(DType::F32)?
        .mean_all()?
        .to_scalar::<f32>()?;

    Ok(accuracy)
}
