use crate::error::{Error, Result};
use crate::init::Init;
use crate::layer::Layer;
use crate::math::{DTypeOps, matmul};
use crate::record::LayerRecord;
use crate::tensor::{Shape, Tensor};
use rand::rngs::StdRng;

/// Fully-connected layer: `output = input * weights^t + biases`.
///
/// No activation function is applied here; compose an activation layer
/// after it. Inputs of any rank are treated as `(batch, features)` by
/// collapsing the trailing axes.
#[derive(Debug)]
pub struct DenseLayer<T: DTypeOps> {
    output_size: usize,
    init: Init,
    /// Shape of the most recent input, pre-collapse; the gradient
    /// returned by `backward` is reshaped back to it.
    input_shape: Shape,
    input: Tensor<T>,
    weights: Tensor<T>,
    biases: Tensor<T>,
    output: Tensor<T>,
}

impl<T: DTypeOps> DenseLayer<T> {
    pub fn new(output_size: usize, init: Init) -> Self {
        DenseLayer {
            output_size,
            init,
            input_shape: Shape::from([1]),
            input: Tensor::zeroed([1]),
            weights: Tensor::zeroed([1]),
            biases: Tensor::zeroed([1]),
            output: Tensor::zeroed([1]),
        }
    }

    pub fn weights(&self) -> &Tensor<T> {
        &self.weights
    }

    pub fn biases(&self) -> &Tensor<T> {
        &self.biases
    }

    pub fn from_record(record: LayerRecord<T>) -> Result<Self> {
        let (Some(weights), Some(biases)) = (record.weights, record.biases) else {
            return Err(Error::UninitializedLayer {
                layer: "dense",
                missing: "weights or biases",
            });
        };
        let output_size = weights.shape().first();
        let in_features = weights.shape()[1];
        Ok(DenseLayer {
            output_size,
            init: Init::Xavier,
            input_shape: Shape::from([1, in_features]),
            input: Tensor::zeroed([1, in_features]),
            weights,
            biases,
            output: Tensor::zeroed([1, output_size]),
        })
    }

    fn ensure_buffers(&mut self, batches: usize, features: usize) {
        if self.input.shape().as_2d() != (batches, features) {
            self.input = Tensor::zeroed([batches, features]);
        }
        if self.output.shape().as_2d() != (batches, self.output_size) {
            self.output = Tensor::zeroed([batches, self.output_size]);
        }
    }
}

impl<T: DTypeOps> Layer<T> for DenseLayer<T> {
    fn init(&mut self, input_shape: &Shape, rng: &mut StdRng) -> Result<Shape> {
        let (batches, in_features) = input_shape.as_2d();
        self.input_shape = input_shape.clone();
        self.weights = self
            .init
            .sample([self.output_size, in_features], in_features, self.output_size, rng);
        self.biases = Tensor::zeroed([self.output_size]);
        self.ensure_buffers(batches, in_features);
        Ok(Shape::from([batches, self.output_size]))
    }

    fn reset(&mut self, batches: usize) {
        let features = self.weights.shape()[self.weights.shape().rank() - 1];
        self.ensure_buffers(batches, features);
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>> {
        let (batches, features) = input.shape().as_2d();
        let in_features = self.weights.shape()[1];
        if features != in_features {
            return Err(Error::ShapeMismatch {
                from: input.shape().clone(),
                to: Shape::from([batches, in_features]),
            });
        }
        self.input_shape = input.shape().clone();
        self.ensure_buffers(batches, features);
        self.input.as_mut().copy_from_slice(input.as_ref());

        matmul(
            T::ONE,
            &self.input,
            false,
            &self.weights,
            true,
            T::ZERO,
            &mut self.output,
        );
        // broadcast the bias across the batch axis by cycling its index
        let size = self.output_size;
        for (i, o) in self.output.as_mut().iter_mut().enumerate() {
            *o += self.biases[i % size];
        }
        Ok(&self.output)
    }

    fn backward(&mut self, error: &Tensor<T>, rate: T) -> Result<Tensor<T>> {
        let (batches, _) = error.shape().as_2d();
        debug_assert_eq!(error.shape().as_2d(), (batches, self.output_size));

        // dL/dX = dL/dY * W, against the pre-update weights
        let mut input_grad = Tensor::zeroed(self.input.shape().clone());
        matmul(T::ONE, error, false, &self.weights, false, T::ZERO, &mut input_grad);

        // dL/dW = dL/dY^t * X
        let mut weight_grad = Tensor::zeroed(self.weights.shape().clone());
        matmul(T::ONE, error, true, &self.input, false, T::ZERO, &mut weight_grad);
        for (w, &g) in self.weights.as_mut().iter_mut().zip(weight_grad.as_ref()) {
            *w -= g * rate;
        }

        let size = self.output_size;
        for (i, &e) in error.as_ref().iter().enumerate() {
            self.biases[i % size] -= e * rate;
        }

        input_grad.reshape(self.input_shape.with_first(batches))?;
        Ok(input_grad)
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn to_record(&self) -> LayerRecord<T> {
        let mut record = LayerRecord::new("dense");
        record.output_size = Some(vec![self.output_size]);
        record.weights = Some(self.weights.clone());
        record.biases = Some(self.biases.clone());
        record
    }
}
