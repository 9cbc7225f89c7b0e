use num_traits::{Float, NumAssignOps};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Element type of every tensor in the engine. The reference element
/// type is `f32`; `f64` is supported for tests and experiments.
pub trait DType:
    'static + Copy + Debug + Float + NumAssignOps + Serialize + DeserializeOwned
{
    const ZERO: Self;
    const ONE: Self;
    fn from_f64(val: f64) -> Self;
    fn from_usize(val: usize) -> Self;
    fn to_f64(self) -> f64;
}

macro_rules! impl_dtype {
    ($ty:ty) => {
        impl DType for $ty {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            #[inline]
            fn from_f64(val: f64) -> Self {
                val as $ty
            }
            #[inline]
            fn from_usize(val: usize) -> Self {
                val as $ty
            }
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_dtype!(f32);
impl_dtype!(f64);
