use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::tensor::Shape;
use rand::Rng;
use rand::distributions::Distribution;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};
use std::slice::{ChunksExact, ChunksExactMut};

/// Flat row-major buffer plus the shape describing how to interpret it.
///
/// Invariant: `data.len() == shape.len()`. Layers own their tensors
/// exclusively and overwrite the same buffer every forward/backward
/// call; a buffer is valid until the next call that changes batch size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor<T>", bound(deserialize = "T: DType"))]
pub struct Tensor<T: DType> {
    data: Vec<T>,
    shape: Shape,
}

impl<T: DType> Tensor<T> {
    pub fn from_vec<S: Into<Shape>>(data: Vec<T>, shape: S) -> Self {
        let shape = shape.into();
        assert_eq!(
            data.len(),
            shape.len(),
            "mismatched buffer length {} for shape {shape}",
            data.len(),
        );
        Tensor { data, shape }
    }

    pub fn zeroed<S: Into<Shape>>(shape: S) -> Self {
        Self::filled(T::ZERO, shape)
    }

    pub fn filled<S: Into<Shape>>(value: T, shape: S) -> Self {
        let shape = shape.into();
        Tensor {
            data: vec![value; shape.len()],
            shape,
        }
    }

    pub fn from_distribution<R, D, S>(rng: &mut R, dist: D, shape: S) -> Self
    where
        R: Rng,
        D: Distribution<f64>,
        S: Into<Shape>,
    {
        let shape = shape.into();
        let data = dist
            .sample_iter(rng)
            .take(shape.len())
            .map(T::from_f64)
            .collect();
        Tensor { data, shape }
    }

    pub fn from_vec_1d(data: Vec<T>) -> Self {
        let len = data.len();
        Tensor::from_vec(data, [len])
    }

    pub fn from_vec_2d<const N: usize>(vec: Vec<[T; N]>) -> Self {
        let rows = vec.len();
        let data: Vec<T> = vec.into_iter().flatten().collect();
        Tensor::from_vec(data, [rows, N])
    }

    pub fn from_vec_3d<const H: usize, const W: usize>(vec: Vec<[[T; W]; H]>) -> Self {
        let rows = vec.len();
        let data: Vec<T> = vec.into_iter().flatten().flatten().collect();
        Tensor::from_vec(data, [rows, H, W])
    }

    pub fn from_vec_4d<const C: usize, const H: usize, const W: usize>(
        vec: Vec<[[[T; W]; H]; C]>,
    ) -> Self {
        let rows = vec.len();
        let data: Vec<T> = vec.into_iter().flatten().flatten().flatten().collect();
        Tensor::from_vec(data, [rows, C, H, W])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Reinterprets the buffer under a different shape in place. The
    /// element count must not change.
    pub fn reshape<S: Into<Shape>>(&mut self, shape: S) -> Result<()> {
        let shape = shape.into();
        if shape.len() != self.data.len() {
            return Err(Error::ShapeMismatch {
                from: self.shape.clone(),
                to: shape,
            });
        }
        self.shape = shape;
        Ok(())
    }

    /// Returns a copy of this tensor under a different shape.
    pub fn reshaped<S: Into<Shape>>(&self, shape: S) -> Result<Tensor<T>> {
        let mut t = self.clone();
        t.reshape(shape)?;
        Ok(t)
    }

    /// Resizes the batch axis, reusing the buffer. Grows with zeros;
    /// never shrinks capacity.
    pub fn resize_first_axis(&mut self, size: usize) {
        if self.shape.first() != size {
            self.shape = self.shape.with_first(size);
            self.data.resize(self.shape.len(), T::ZERO);
        }
    }

    #[inline]
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    #[inline]
    pub fn fill_zero(&mut self) {
        self.data.fill(T::ZERO);
    }

    /// Iterates slices along the leading (batch) axis.
    pub fn rows(&self) -> ChunksExact<'_, T> {
        let stride = self.data.len() / self.shape.first();
        self.data.chunks_exact(stride)
    }

    pub fn rows_mut(&mut self) -> ChunksExactMut<'_, T> {
        let stride = self.data.len() / self.shape.first();
        self.data.chunks_exact_mut(stride)
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

/// Linear offset into a rank-4 `[batch, channels, height, width]` buffer.
#[inline]
pub fn index4(dims: (usize, usize, usize, usize), n: usize, c: usize, h: usize, w: usize) -> usize {
    ((n * dims.1 + c) * dims.2 + h) * dims.3 + w
}

impl<T: DType> AsRef<[T]> for Tensor<T> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        &self.data
    }
}

impl<T: DType> AsMut<[T]> for Tensor<T> {
    #[inline]
    fn as_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: DType> Index<usize> for Tensor<T> {
    type Output = T;
    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T: DType> IndexMut<usize> for Tensor<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}

impl<'a, T: DType> IntoIterator for &'a Tensor<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl<'a, T: DType> IntoIterator for &'a mut Tensor<T> {
    type Item = &'a mut T;
    type IntoIter = std::slice::IterMut<'a, T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter_mut()
    }
}

#[derive(Deserialize)]
struct RawTensor<T> {
    data: Vec<T>,
    shape: Shape,
}

impl<T: DType> TryFrom<RawTensor<T>> for Tensor<T> {
    type Error = Error;
    fn try_from(raw: RawTensor<T>) -> Result<Self> {
        if raw.data.len() != raw.shape.len() {
            return Err(Error::ShapeMismatch {
                from: Shape::from([raw.data.len()]),
                to: raw.shape,
            });
        }
        Ok(Tensor {
            data: raw.data,
            shape: raw.shape,
        })
    }
}

/// Builds a tensor from a nested literal, inferring the shape from the
/// nesting depth and the length of each level.
#[macro_export]
macro_rules! tensor {
    ($([$([$([$($x:expr),* $(,)?]),+ $(,)?]),+ $(,)?]),+ $(,)?) => {
        $crate::tensor::Tensor::from_vec_4d(vec![$([$([$([$($x,)*],)*],)*],)*])
    };
    ($([$([$($x:expr),* $(,)?]),+ $(,)?]),+ $(,)?) => {
        $crate::tensor::Tensor::from_vec_3d(vec![$([$([$($x,)*],)*],)*])
    };
    ($([$($x:expr),* $(,)?]),+ $(,)?) => {
        $crate::tensor::Tensor::from_vec_2d(vec![$([$($x,)*],)*])
    };
    ($($x:expr),* $(,)?) => {
        $crate::tensor::Tensor::from_vec_1d(vec![$($x,)*])
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tensor;

    #[test]
    fn buffer_length_matches_shape() {
        let t = Tensor::<f32>::zeroed([2, 3, 4]);
        assert_eq!(t.len(), t.shape().len());
    }

    #[test]
    fn macro_infers_shape_from_nesting() {
        let t1 = tensor![1.0f32, 2.0, 3.0];
        assert_eq!(t1.shape(), &Shape::from([3]));
        let t2 = tensor![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        assert_eq!(t2.shape(), &Shape::from([3, 2]));
        assert_eq!(t2.as_ref(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t3 = tensor![[[1.0f32, 2.0], [3.0, 4.0]]];
        assert_eq!(t3.shape(), &Shape::from([1, 2, 2]));
    }

    #[test]
    fn reshape_preserves_buffer() {
        let mut t = tensor![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        t.reshape([6]).unwrap();
        assert_eq!(t.shape(), &Shape::from([6]));
        assert_eq!(t.as_ref(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn reshape_rejects_mismatched_count() {
        let mut t = Tensor::<f32>::zeroed([2, 3]);
        let err = t.reshape([7]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert_eq!(
            err.to_string(),
            "cannot reshape tensor of shape (2, 3) into (7)"
        );
    }

    #[test]
    fn resize_first_axis_grows_with_zeros() {
        let mut t = tensor![[1.0f32, 2.0]];
        t.resize_first_axis(3);
        assert_eq!(t.shape(), &Shape::from([3, 2]));
        assert_eq!(t.as_ref(), &[1.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn rank4_offsets() {
        let dims = (2, 3, 4, 5);
        assert_eq!(index4(dims, 0, 0, 0, 0), 0);
        assert_eq!(index4(dims, 0, 0, 0, 4), 4);
        assert_eq!(index4(dims, 0, 0, 1, 0), 5);
        assert_eq!(index4(dims, 0, 1, 0, 0), 20);
        assert_eq!(index4(dims, 1, 0, 0, 0), 60);
    }

    #[test]
    fn serde_round_trip() {
        let t = tensor![[1.0f32, 2.0], [3.0, 4.0]];
        let json = serde_json::to_string(&t).unwrap();
        let back: Tensor<f32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn serde_rejects_invalid_buffer() {
        let json = r#"{"data":[1.0,2.0,3.0],"shape":[2,2]}"#;
        assert!(serde_json::from_str::<Tensor<f32>>(json).is_err());
    }
}
