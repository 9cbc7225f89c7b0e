use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::math::DTypeOps;
use crate::record::LayerRecord;
use crate::tensor::{Shape, Tensor, index4};
use rand::rngs::StdRng;

/// Max pooling over the spatial axes of a `[batch, channels, height,
/// width]` tensor. Window size equals the stride, so windows tile the
/// input exactly; a stride that does not divide the spatial size is
/// rejected with `InvalidPool`.
///
/// Each `forward` records the flat input offset of every window winner
/// and `backward` routes the full gradient back through those offsets,
/// leaving the rest of the input gradient zero.
#[derive(Debug)]
pub struct MaxPool2DLayer<T: DTypeOps> {
    strides: (usize, usize),
    indices: Vec<usize>,
    input_shape: Shape,
    output: Tensor<T>,
}

impl<T: DTypeOps> MaxPool2DLayer<T> {
    pub fn new(strides: (usize, usize)) -> Self {
        MaxPool2DLayer {
            strides,
            indices: Vec::new(),
            input_shape: Shape::from([1]),
            output: Tensor::zeroed([1]),
        }
    }

    pub fn from_record(record: LayerRecord<T>) -> Result<Self> {
        let Some([sy, sx]) = record.strides.as_deref() else {
            return Err(Error::UninitializedLayer {
                layer: "pool",
                missing: "strides",
            });
        };
        Ok(MaxPool2DLayer::new((*sy, *sx)))
    }

    fn resolve_dims(
        &self,
        (n, c, h, w): (usize, usize, usize, usize),
    ) -> Result<(usize, usize, usize, usize)> {
        let (sy, sx) = self.strides;
        if sy == 0 || sx == 0 || h % sy != 0 || w % sx != 0 {
            return Err(Error::InvalidPool {
                input: Shape::from([n, c, h, w]),
                strides: self.strides,
            });
        }
        Ok((n, c, h / sy, w / sx))
    }
}

impl<T: DTypeOps> Layer<T> for MaxPool2DLayer<T> {
    fn init(&mut self, input_shape: &Shape, _rng: &mut StdRng) -> Result<Shape> {
        let (n, c, ho, wo) = self.resolve_dims(input_shape.as_4d())?;
        self.input_shape = input_shape.clone();
        self.output = Tensor::zeroed([n, c, ho, wo]);
        self.indices = vec![0; self.output.len()];
        Ok(Shape::from([n, c, ho, wo]))
    }

    fn reset(&mut self, batches: usize) {
        self.output.resize_first_axis(batches);
        self.indices.resize(self.output.len(), 0);
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>> {
        let dims = input.shape().as_4d();
        let (n, c, ho, wo) = self.resolve_dims(dims)?;
        self.input_shape = input.shape().clone();
        if self.output.shape().as_4d() != (n, c, ho, wo) {
            self.output = Tensor::zeroed([n, c, ho, wo]);
            self.indices = vec![0; self.output.len()];
        }
        let (sy, sx) = self.strides;
        let odims = (n, c, ho, wo);
        let src = input.as_ref();
        let out = self.output.as_mut();
        for b in 0..n {
            for ch in 0..c {
                for oh in 0..ho {
                    for ow in 0..wo {
                        let mut best = index4(dims, b, ch, oh * sy, ow * sx);
                        for i in 0..sy {
                            for j in 0..sx {
                                let idx = index4(dims, b, ch, oh * sy + i, ow * sx + j);
                                if src[idx] > src[best] {
                                    best = idx;
                                }
                            }
                        }
                        let oi = index4(odims, b, ch, oh, ow);
                        self.indices[oi] = best;
                        out[oi] = src[best];
                    }
                }
            }
        }
        Ok(&self.output)
    }

    fn backward(&mut self, error: &Tensor<T>, _rate: T) -> Result<Tensor<T>> {
        debug_assert_eq!(error.len(), self.indices.len());
        let mut dinput = Tensor::zeroed(self.input_shape.clone());
        for (&idx, &e) in self.indices.iter().zip(error.as_ref()) {
            dinput[idx] += e;
        }
        Ok(dinput)
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn to_record(&self) -> LayerRecord<T> {
        let mut record = LayerRecord::new("pool");
        record.strides = Some(vec![self.strides.0, self.strides.1]);
        if self.output.shape().rank() == 4 {
            record.output_size = Some(self.output.shape().without_first().to_vec());
        }
        record
    }
}
