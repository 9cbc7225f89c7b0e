use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Write};
use std::ops::Index;

pub const MAX_RANK: usize = 6;

/// Ordered list of positive dimension sizes, one per tensor axis.
/// The leading axis is the batch axis by convention.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        debug_assert!(!dims.is_empty() && dims.len() <= MAX_RANK);
        debug_assert!(dims.iter().all(|&d| d > 0));
        Shape(dims)
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total element count of a tensor with this shape.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the leading (batch) axis.
    #[inline]
    pub fn first(&self) -> usize {
        self.0[0]
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn with_first(&self, size: usize) -> Shape {
        let mut dims = self.0.clone();
        dims[0] = size;
        Shape(dims)
    }

    pub fn without_first(&self) -> &[usize] {
        &self.0[1..]
    }

    /// Collapses every trailing axis into one, viewing the tensor as a
    /// `(batch, features)` matrix.
    #[inline]
    pub fn as_2d(&self) -> (usize, usize) {
        (self.first(), self.0[1..].iter().product())
    }

    /// Promotes to rank 4 `[batch, channels, height, width]` by inserting
    /// unit axes after the batch axis, or collapses leading extra axes.
    pub fn as_4d(&self) -> (usize, usize, usize, usize) {
        let d = &self.0;
        match d.len() {
            1 => (d[0], 1, 1, 1),
            2 => (d[0], 1, 1, d[1]),
            3 => (d[0], 1, d[1], d[2]),
            4 => (d[0], d[1], d[2], d[3]),
            n => {
                let lead: usize = d[..n - 3].iter().product();
                (lead, d[n - 3], d[n - 2], d[n - 1])
            }
        }
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_char('(')?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            Display::fmt(d, f)?;
        }
        f.write_char(')')
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl Index<usize> for Shape {
    type Output = usize;
    #[inline]
    fn index(&self, index: usize) -> &usize {
        &self.0[index]
    }
}
