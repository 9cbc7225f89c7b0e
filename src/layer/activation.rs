use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::math::DTypeOps;
use crate::record::LayerRecord;
use crate::tensor::{Shape, Tensor};
use rand::rngs::StdRng;
use std::str::FromStr;

/// Elementwise activation as its own layer.
///
/// The derivative is evaluated at the layer output for sigmoid and tanh
/// (using `f'(x) = g(f(x))`) and at the layer input for the relu family;
/// `basis` caches whichever of the two the function needs.
#[derive(Debug)]
pub struct ActivationLayer<T: DTypeOps> {
    activation: Activation,
    basis: Tensor<T>,
    output: Tensor<T>,
}

impl<T: DTypeOps> ActivationLayer<T> {
    pub fn new(activation: Activation) -> Self {
        ActivationLayer {
            activation,
            basis: Tensor::zeroed([1]),
            output: Tensor::zeroed([1]),
        }
    }

    pub fn from_record(record: LayerRecord<T>) -> Result<Self> {
        let Some(name) = record.activation else {
            return Err(Error::UninitializedLayer {
                layer: "activation",
                missing: "activation",
            });
        };
        Ok(ActivationLayer::new(Activation::from_str(&name)?))
    }
}

impl<T: DTypeOps> Layer<T> for ActivationLayer<T> {
    fn init(&mut self, input_shape: &Shape, _rng: &mut StdRng) -> Result<Shape> {
        self.basis = Tensor::zeroed(input_shape.clone());
        self.output = Tensor::zeroed(input_shape.clone());
        Ok(input_shape.clone())
    }

    fn reset(&mut self, batches: usize) {
        self.basis.resize_first_axis(batches);
        self.output.resize_first_axis(batches);
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>> {
        if self.output.shape() != input.shape() {
            self.basis = Tensor::zeroed(input.shape().clone());
            self.output = Tensor::zeroed(input.shape().clone());
        }
        for (o, &x) in self.output.as_mut().iter_mut().zip(input.as_ref()) {
            *o = self.activation.activate(x);
        }
        let source = if self.activation.output_basis() {
            self.output.as_ref()
        } else {
            input.as_ref()
        };
        self.basis.as_mut().copy_from_slice(source);
        Ok(&self.output)
    }

    fn backward(&mut self, error: &Tensor<T>, _rate: T) -> Result<Tensor<T>> {
        debug_assert_eq!(error.len(), self.basis.len());
        let mut grad = Tensor::zeroed(error.shape().clone());
        for ((g, &b), &e) in grad
            .as_mut()
            .iter_mut()
            .zip(self.basis.as_ref())
            .zip(error.as_ref())
        {
            *g = self.activation.prime(b, e);
        }
        Ok(grad)
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn to_record(&self) -> LayerRecord<T> {
        let mut record = LayerRecord::new("activation");
        record.activation = Some(self.activation.name().into());
        record
    }
}

/// Softmax over each batch row.
#[derive(Debug)]
pub struct SoftmaxLayer<T: DTypeOps> {
    output: Tensor<T>,
}

impl<T: DTypeOps> SoftmaxLayer<T> {
    pub fn new() -> Self {
        SoftmaxLayer {
            output: Tensor::zeroed([1]),
        }
    }
}

impl<T: DTypeOps> Default for SoftmaxLayer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DTypeOps> Layer<T> for SoftmaxLayer<T> {
    fn init(&mut self, input_shape: &Shape, _rng: &mut StdRng) -> Result<Shape> {
        self.output = Tensor::zeroed(input_shape.clone());
        Ok(input_shape.clone())
    }

    fn reset(&mut self, batches: usize) {
        self.output.resize_first_axis(batches);
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>> {
        if self.output.shape() != input.shape() {
            self.output = Tensor::zeroed(input.shape().clone());
        }
        for (out, row) in self.output.rows_mut().zip(input.rows()) {
            let mut sum = T::ZERO;
            for (o, &x) in out.iter_mut().zip(row) {
                *o = x.exp();
                sum += *o;
            }
            for o in out.iter_mut() {
                *o /= sum;
            }
        }
        Ok(&self.output)
    }

    fn backward(&mut self, error: &Tensor<T>, _rate: T) -> Result<Tensor<T>> {
        debug_assert_eq!(error.len(), self.output.len());
        let mut grad = Tensor::zeroed(error.shape().clone());
        // full Jacobian-vector product, O(n^2) per batch row
        for ((g, out), err) in grad
            .rows_mut()
            .zip(self.output.rows())
            .zip(error.rows())
        {
            for (x, gx) in g.iter_mut().enumerate() {
                let ox = out[x];
                let mut sum = T::ZERO;
                for (y, &ey) in err.iter().enumerate() {
                    let jac = if x == y { ox * (T::ONE - ox) } else { -ox * out[y] };
                    sum += jac * ey;
                }
                *gx = sum;
            }
        }
        Ok(grad)
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn to_record(&self) -> LayerRecord<T> {
        LayerRecord::new("softmax")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tensor;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn relu_prime_uses_the_input() {
        let mut layer = ActivationLayer::new(Activation::Relu);
        layer.init(&Shape::from([1, 4]), &mut rng()).unwrap();
        let input = tensor![[-2.0f32, -0.5, 0.5, 2.0]];
        let out = layer.forward(&input).unwrap();
        assert_eq!(out.as_ref(), &[0.0, 0.0, 0.5, 2.0]);

        let error = tensor![[1.0f32, 1.0, 1.0, 1.0]];
        let grad = layer.backward(&error, 0.1).unwrap();
        // error passes where the input was positive, exact zero elsewhere
        assert_eq!(grad.as_ref(), &[0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn sigmoid_prime_uses_the_output() {
        let mut layer = ActivationLayer::new(Activation::Sigmoid);
        layer.init(&Shape::from([1, 1]), &mut rng()).unwrap();
        let out = layer.forward(&tensor![[0.0f32]]).unwrap();
        assert_abs_diff_eq!(out[0], 0.5);
        let grad = layer.backward(&tensor![[1.0f32]], 0.1).unwrap();
        // o * (1 - o) at o = 0.5
        assert_abs_diff_eq!(grad[0], 0.25);
    }

    #[test]
    fn softmax_rows_are_distributions() {
        let mut layer = SoftmaxLayer::new();
        layer.init(&Shape::from([2, 3]), &mut rng()).unwrap();
        let input = tensor![[1.0f32, 2.0, 3.0], [-1.0, 0.0, 1.0]];
        let out = layer.forward(&input).unwrap();
        for row in out.rows() {
            let sum: f32 = row.iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-6);
            assert!(row.iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn softmax_jacobian_rows_cancel_uniform_error() {
        // J^t * 1 = 0 for every softmax row
        let mut layer = SoftmaxLayer::new();
        layer.init(&Shape::from([1, 3]), &mut rng()).unwrap();
        layer.forward(&tensor![[0.2f32, -1.0, 0.7]]).unwrap();
        let grad = layer.backward(&tensor![[1.0f32, 1.0, 1.0]], 0.1).unwrap();
        for &g in grad.as_ref() {
            assert_abs_diff_eq!(g, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn record_round_trip_keeps_the_function() {
        let layer = ActivationLayer::<f32>::new(Activation::Selu);
        let record = layer.to_record();
        assert_eq!(record.activation.as_deref(), Some("selu"));
        let restored = ActivationLayer::<f32>::from_record(record).unwrap();
        assert_eq!(restored.activation, Activation::Selu);
    }

    #[test]
    fn record_without_activation_is_rejected() {
        let record = LayerRecord::<f32>::new("activation");
        assert!(matches!(
            ActivationLayer::from_record(record),
            Err(Error::UninitializedLayer { layer: "activation", .. })
        ));
    }
}
