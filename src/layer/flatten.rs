use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::math::DTypeOps;
use crate::record::LayerRecord;
use crate::tensor::{Shape, Tensor};
use rand::rngs::StdRng;

/// Reinterprets the trailing axes of the input under a configured shape.
/// Pure reshape in both directions; values pass through untouched.
#[derive(Debug)]
pub struct FlattenLayer<T: DTypeOps> {
    /// Target shape, batch axis excluded.
    size: Shape,
    input_shape: Shape,
    output: Tensor<T>,
}

impl<T: DTypeOps> FlattenLayer<T> {
    pub fn new(size: Shape) -> Self {
        FlattenLayer {
            size,
            input_shape: Shape::from([1]),
            output: Tensor::zeroed([1]),
        }
    }

    pub fn from_record(record: LayerRecord<T>) -> Result<Self> {
        let Some(size) = record.size else {
            return Err(Error::UninitializedLayer {
                layer: "flatten",
                missing: "size",
            });
        };
        Ok(FlattenLayer::new(Shape::new(size)))
    }

    fn output_shape(&self, input_shape: &Shape) -> Result<Shape> {
        let features: usize = input_shape.without_first().iter().product();
        if features != self.size.len() {
            return Err(Error::InvalidFlatten {
                from: Shape::from(input_shape.without_first()),
                to: self.size.clone(),
            });
        }
        let mut dims = Vec::with_capacity(1 + self.size.rank());
        dims.push(input_shape.first());
        dims.extend_from_slice(self.size.dims());
        Ok(Shape::new(dims))
    }
}

impl<T: DTypeOps> Layer<T> for FlattenLayer<T> {
    fn init(&mut self, input_shape: &Shape, _rng: &mut StdRng) -> Result<Shape> {
        let out = self.output_shape(input_shape)?;
        self.input_shape = input_shape.clone();
        self.output = Tensor::zeroed(out.clone());
        Ok(out)
    }

    fn reset(&mut self, batches: usize) {
        self.output.resize_first_axis(batches);
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>> {
        let out = self.output_shape(input.shape())?;
        self.input_shape = input.shape().clone();
        self.output = input.reshaped(out)?;
        Ok(&self.output)
    }

    fn backward(&mut self, error: &Tensor<T>, _rate: T) -> Result<Tensor<T>> {
        error.reshaped(self.input_shape.with_first(error.shape().first()))
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn to_record(&self) -> LayerRecord<T> {
        let mut record = LayerRecord::new("flatten");
        record.size = Some(self.size.dims().to_vec());
        record
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tensor;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn round_trip_restores_input_shape() {
        let mut layer = FlattenLayer::new(Shape::from([12]));
        layer.init(&Shape::from([2, 3, 2, 2]), &mut rng()).unwrap();
        let input = Tensor::filled(0.5f32, [2, 3, 2, 2]);
        let out = layer.forward(&input).unwrap();
        assert_eq!(out.shape(), &Shape::from([2, 12]));
        assert_eq!(out.as_ref(), input.as_ref());

        let error = Tensor::filled(1.0f32, [2, 12]);
        let grad = layer.backward(&error, 0.1).unwrap();
        assert_eq!(grad.shape(), input.shape());
        assert_eq!(grad.as_ref(), error.as_ref());
    }

    #[test]
    fn incompatible_size_is_rejected() {
        let mut layer = FlattenLayer::<f32>::new(Shape::from([10]));
        let err = layer.init(&Shape::from([1, 3, 4]), &mut rng()).unwrap_err();
        assert_eq!(err.to_string(), "cannot flatten shape (3, 4) into (10)");
    }

    #[test]
    fn record_keeps_the_target_shape() {
        let layer = FlattenLayer::<f32>::new(Shape::from([3, 4]));
        let record = layer.to_record();
        assert_eq!(record.size.as_deref(), Some([3usize, 4].as_slice()));
        let restored = FlattenLayer::<f32>::from_record(record).unwrap();
        assert_eq!(restored.size, Shape::from([3, 4]));
    }

    #[test]
    fn values_pass_through_unchanged() {
        let mut layer = FlattenLayer::new(Shape::from([4]));
        layer.init(&Shape::from([1, 2, 2]), &mut rng()).unwrap();
        let input = tensor![[[1.0f32, 2.0], [3.0, 4.0]]];
        let out = layer.forward(&input).unwrap();
        assert_eq!(out.as_ref(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
