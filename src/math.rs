use crate::dtype::DType;
use crate::tensor::Tensor;

/// Element types with a gemm kernel. Backed by `matrixmultiply`.
pub trait DTypeOps: DType {
    /// `c = alpha * a * b + beta * c`, with either operand optionally
    /// transposed. Dimension pairs are `(rows, cols)` pre-transpose.
    #[allow(clippy::too_many_arguments)]
    fn matrix_multiply(
        alpha: Self,
        a: &[Self],
        a_dims: (usize, usize),
        ta: bool,
        b: &[Self],
        b_dims: (usize, usize),
        tb: bool,
        beta: Self,
        c: &mut [Self],
        c_dims: (usize, usize),
    );
}

macro_rules! implement_dtype_ops {
    ($t:ident, $g:ident) => {
        impl DTypeOps for $t {
            fn matrix_multiply(
                alpha: Self,
                a: &[Self],
                (a_rows, a_cols): (usize, usize),
                ta: bool,
                b: &[Self],
                (b_rows, b_cols): (usize, usize),
                tb: bool,
                beta: Self,
                c: &mut [Self],
                c_dims: (usize, usize),
            ) {
                assert_eq!(a.len(), a_rows * a_cols);
                assert_eq!(b.len(), b_rows * b_cols);
                let (m, k, rsa, csa) = if ta {
                    (a_cols, a_rows, 1, a_cols as isize)
                } else {
                    (a_rows, a_cols, a_cols as isize, 1)
                };
                let n = if tb {
                    assert_eq!(b_cols, k);
                    b_rows
                } else {
                    assert_eq!(b_rows, k);
                    b_cols
                };
                let (rsb, csb) = if tb { (1, b_cols as isize) } else { (b_cols as isize, 1) };
                assert_eq!(c_dims, (m, n));
                assert_eq!(c.len(), m * n);
                unsafe {
                    matrixmultiply::$g(
                        m,
                        k,
                        n,
                        alpha,
                        a.as_ptr(),
                        rsa,
                        csa,
                        b.as_ptr(),
                        rsb,
                        csb,
                        beta,
                        c.as_mut_ptr(),
                        n as isize,
                        1,
                    );
                }
            }
        }
    };
}

implement_dtype_ops!(f32, sgemm);
implement_dtype_ops!(f64, dgemm);

/// Gemm over tensors, collapsing trailing axes so any tensor is treated
/// as a `(batch, features)` matrix.
pub fn matmul<T: DTypeOps>(
    alpha: T,
    a: &Tensor<T>,
    ta: bool,
    b: &Tensor<T>,
    tb: bool,
    beta: T,
    c: &mut Tensor<T>,
) {
    let a_dims = a.shape().as_2d();
    let b_dims = b.shape().as_2d();
    let c_dims = c.shape().as_2d();
    T::matrix_multiply(
        alpha,
        a.as_ref(),
        a_dims,
        ta,
        b.as_ref(),
        b_dims,
        tb,
        beta,
        c.as_mut(),
        c_dims,
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tensor;
    use approx::assert_abs_diff_eq;

    #[test]
    fn matmul_plain() {
        let a = tensor![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let b = tensor![[7.0f32, 8.0], [9.0, 10.0], [11.0, 12.0]];
        let mut c = Tensor::filled(99.0f32, [2, 2]);
        matmul(1.0, &a, false, &b, false, 0.0, &mut c);
        assert_abs_diff_eq!(c.as_ref(), [58.0, 64.0, 139.0, 154.0].as_slice());
    }

    #[test]
    fn matmul_transpose_b() {
        // x (2x3) * w^t (3x2), w stored as (2, 3): the dense forward shape
        let x = tensor![[1.0f32, 0.0, 2.0], [0.0, 1.0, 1.0]];
        let w = tensor![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let mut y = Tensor::zeroed([2, 2]);
        matmul(1.0, &x, false, &w, true, 0.0, &mut y);
        assert_abs_diff_eq!(y.as_ref(), [7.0, 16.0, 5.0, 11.0].as_slice());
    }

    #[test]
    fn matmul_transpose_a_accumulates() {
        // e^t (2x3)^t -> (3x2) times x (2x2)... keep it square and check beta
        let e = tensor![[1.0f32, 2.0], [3.0, 4.0]];
        let x = tensor![[1.0f32, 1.0], [0.0, 2.0]];
        let mut g = Tensor::filled(1.0f32, [2, 2]);
        matmul(0.5, &e, true, &x, false, 2.0, &mut g);
        // e^t * x = [[1, 7], [2, 10]], scaled by 0.5 plus 2 * ones
        assert_abs_diff_eq!(g.as_ref(), [2.5, 5.5, 3.0, 7.0].as_slice());
    }

    #[test]
    fn matmul_f64() {
        let a = tensor![[1.0f64, 2.0], [3.0, 4.0]];
        let b = tensor![[5.0f64, 6.0], [7.0, 8.0]];
        let mut c = Tensor::zeroed([2, 2]);
        matmul(1.0, &a, false, &b, false, 0.0, &mut c);
        assert_abs_diff_eq!(c.as_ref(), [19.0, 22.0, 43.0, 50.0].as_slice());
    }
}
