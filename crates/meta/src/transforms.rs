//! Data transforms applied before samples reach a model.

use crate::error::Result;
use candle_core::{Device, Tensor};
use ndarray::{ArrayBase, Data, Dimension};
use std::fmt;

/// A stateless conversion applied to each sample.
pub trait Transform<Input> {
    /// Converted sample.
    type Output;

    /// Apply the transform.
    fn apply(&self, input: Input) -> Result<Self::Output>;
}

/// Element types that coerce to `f32`.
pub trait Float32Element: Copy {
    /// Convert to `f32` with `as` semantics.
    fn to_f32(self) -> f32;
}

macro_rules! impl_float32_element {
    ($($t:ty),*) => {
        $(
            impl Float32Element for $t {
                fn to_f32(self) -> f32 {
                    self as f32
                }
            }
        )*
    };
}

impl_float32_element!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

impl Float32Element for bool {
    fn to_f32(self) -> f32 {
        if self {
            1.0
        } else {
            0.0
        }
    }
}

/// Convert an `ndarray` array of any rank into an `f32` CPU tensor of the same shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToTensor1D;

impl ToTensor1D {
    /// Convert `array`, reading elements in logical row-major order.
    pub fn call<A, S, D>(&self, array: &ArrayBase<S, D>) -> Result<Tensor>
    where
        A: Float32Element,
        S: Data<Elem = A>,
        D: Dimension,
    {
        let shape = array.shape().to_vec();
        let data: Vec<f32> = array.iter().map(|&x| x.to_f32()).collect();
        Ok(Tensor::from_vec(data, shape, &Device::Cpu)?)
    }
}

impl<'a, A, S, D> Transform<&'a ArrayBase<S, D>> for ToTensor1D
where
    A: Float32Element,
    S: Data<Elem = A>,
    D: Dimension,
{
    type Output = Tensor;

    fn apply(&self, input: &'a ArrayBase<S, D>) -> Result<Tensor> {
        self.call(input)
    }
}

impl fmt::Display for ToTensor1D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ToTensor1D()")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use ndarray::{arr0, arr1, arr2, Array3};

    #[test]
    fn integer_vector_becomes_f32_tensor() {
        let tensor = ToTensor1D.apply(&arr1(&[1i32, -2, 3])).unwrap();
        assert_eq!(tensor.dtype(), DType::F32);
        assert_eq!(tensor.dims(), &[3]);
        assert_eq!(tensor.to_vec1::<f32>().unwrap(), vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn rank_three_shape_is_preserved() {
        let array = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as f64);
        let tensor = ToTensor1D.apply(&array).unwrap();
        assert_eq!(tensor.dims(), &[2, 3, 4]);
        assert_eq!(tensor.dtype(), DType::F32);

        let values = tensor.to_vec3::<f32>().unwrap();
        assert_eq!(values[1][2][3], 123.0);
        assert_eq!(values[0][1][0], 10.0);
    }

    #[test]
    fn transposed_view_is_read_in_logical_order() {
        let array = arr2(&[[1u8, 2, 3], [4, 5, 6]]);
        let tensor = ToTensor1D.call(&array.t()).unwrap();
        assert_eq!(tensor.dims(), &[3, 2]);
        assert_eq!(
            tensor.to_vec2::<f32>().unwrap(),
            vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]
        );
    }

    #[test]
    fn zero_dimensional_array_becomes_scalar_tensor() {
        let tensor = ToTensor1D.apply(&arr0(2.5f64)).unwrap();
        assert_eq!(tensor.rank(), 0);
        assert_eq!(tensor.to_scalar::<f32>().unwrap(), 2.5);
    }

    #[test]
    fn boolean_mask_becomes_zero_one() {
        let tensor = ToTensor1D.apply(&arr1(&[true, false, true])).unwrap();
        assert_eq!(tensor.to_vec1::<f32>().unwrap(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn display_is_type_name() {
        assert_eq!(ToTensor1D.to_string(), "ToTensor1D()");
        assert_eq!(format!("{}", ToTensor1D::default()), "ToTensor1D()");
    }
}
