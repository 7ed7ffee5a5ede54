//! Synthetic few-shot classification tasks.
//!
//! Each task draws one Gaussian blob per class in the plane. The support set
//! is what the inner loop adapts on; the query set measures the result.

use candle_core::{DType, Tensor};
use metagrad::{Result, ToTensor1D, Transform};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::StandardNormal;

/// Spread of class centers around the origin.
const CENTER_RANGE: f32 = 2.0;

/// Standard deviation of samples around their class center.
const SAMPLE_STD: f32 = 0.5;

/// Number of input features.
pub const FEATURE_DIM: usize = 2;

/// Labelled examples of one split.
#[derive(Debug, Clone)]
pub struct Split {
    /// `[n, FEATURE_DIM]` features.
    pub features: Array2<f32>,
    /// `[n]` class labels.
    pub labels: Array1<u32>,
}

/// A binary classification task with support and query splits.
#[derive(Debug, Clone)]
pub struct SyntheticTask {
    /// Class centers, one row per class.
    pub centers: Array2<f32>,
    /// Adaptation examples.
    pub support: Split,
    /// Evaluation examples.
    pub query: Split,
}

/// Tensors of one split: `(features, labels)`.
pub type SplitTensors = (Tensor, Tensor);

impl SyntheticTask {
    /// Number of classes per task.
    pub const NUM_CLASSES: usize = 2;

    /// Draw a task with `shots` support and `queries` query examples per class.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R, shots: usize, queries: usize) -> Self {
        let centers = Array2::from_shape_fn((Self::NUM_CLASSES, FEATURE_DIM), |_| {
            rng.gen_range(-CENTER_RANGE..CENTER_RANGE)
        });
        let support = Self::draw_split(rng, &centers, shots);
        let query = Self::draw_split(rng, &centers, queries);
        Self {
            centers,
            support,
            query,
        }
    }

    fn draw_split<R: Rng + ?Sized>(rng: &mut R, centers: &Array2<f32>, per_class: usize) -> Split {
        let n = per_class * Self::NUM_CLASSES;
        let labels = Array1::from_shape_fn(n, |i| (i / per_class.max(1)) as u32);
        let mut features = Array2::zeros((n, FEATURE_DIM));
        for (i, mut row) in features.rows_mut().into_iter().enumerate() {
            let class = labels[i] as usize;
            for (j, value) in row.iter_mut().enumerate() {
                let noise: f32 = rng.sample(StandardNormal);
                *value = centers[[class, j]] + noise * SAMPLE_STD;
            }
        }
        Split { features, labels }
    }

    /// Convert both splits to CPU tensors, labels as `u32`.
    pub fn to_tensors(&self) -> Result<(SplitTensors, SplitTensors)> {
        Ok((split_tensors(&self.support)?, split_tensors(&self.query)?))
    }
}

fn split_tensors(split: &Split) -> Result<SplitTensors> {
    let transform = ToTensor1D;
    let features = transform.apply(&split.features)?;
    let labels = transform.apply(&split.labels)?.to_dtype(DType::U32)?;
    Ok((features, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn splits_have_balanced_labels() {
        let mut rng = StdRng::seed_from_u64(7);
        let task = SyntheticTask::sample(&mut rng, 3, 4);

        assert_eq!(task.support.features.dim(), (6, FEATURE_DIM));
        assert_eq!(task.query.features.dim(), (8, FEATURE_DIM));
        assert_eq!(task.support.labels.to_vec(), vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(task.query.labels.iter().filter(|&&l| l == 1).count(), 4);
    }

    #[test]
    fn same_seed_gives_same_task() {
        let a = SyntheticTask::sample(&mut StdRng::seed_from_u64(42), 2, 2);
        let b = SyntheticTask::sample(&mut StdRng::seed_from_u64(42), 2, 2);
        assert_eq!(a.centers, b.centers);
        assert_eq!(a.support.features, b.support.features);
    }

    #[test]
    fn tensors_keep_split_shapes() {
        let task = SyntheticTask::sample(&mut StdRng::seed_from_u64(1), 5, 10);
        let ((sx, sy), (qx, qy)) = task.to_tensors().unwrap();
        assert_eq!(sx.dims(), &[10, FEATURE_DIM]);
        assert_eq!(sy.dims(), &[10]);
        assert_eq!(sy.dtype(), DType::U32);
        assert_eq!(qx.dims(), &[20, FEATURE_DIM]);
        assert_eq!(qy.to_vec1::<u32>().unwrap()[19], 1);
        assert!(sx.device().is_cpu());
    }

    #[test]
    fn samples_scatter_around_their_class_center() {
        let task = SyntheticTask::sample(&mut StdRng::seed_from_u64(5), 200, 1);
        for class in 0..SyntheticTask::NUM_CLASSES {
            let rows = task.support.features.slice(ndarray::s![class * 200..(class + 1) * 200, ..]);
            for j in 0..FEATURE_DIM {
                let column = rows.column(j);
                let mean = column.mean().unwrap();
                let std = column.std(1.0);
                assert!((mean - task.centers[[class, j]]).abs() < 0.15, "mean {}", mean);
                assert!((std - SAMPLE_STD).abs() < 0.1, "std {}", std);
            }
        }
        assert!(task.centers.iter().all(|c| c.abs() <= CENTER_RANGE));
    }
}
