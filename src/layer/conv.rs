use crate::error::{Error, Result};
use crate::init::Init;
use crate::layer::Layer;
use crate::math::DTypeOps;
use crate::record::LayerRecord;
use crate::tensor::{Shape, Tensor, index4};
use rand::rngs::StdRng;

/// Direct 2-D convolution over `[batch, channels, height, width]`
/// tensors with explicit zero padding. No im2col, no FFT; the kernel is
/// applied by plain nested loops.
///
/// Kernel layout is `[out_channels, in_channels, kernel_h, kernel_w]`
/// and strides are `(stride_h, stride_w)`.
#[derive(Debug)]
pub struct Conv2DLayer<T: DTypeOps> {
    strides: (usize, usize),
    padding: usize,
    init: Init,
    /// Keeps a loaded or configured kernel through `init`.
    preset: bool,
    kernel: Tensor<T>,
    biases: Tensor<T>,
    input_shape: Shape,
    padded: Tensor<T>,
    output: Tensor<T>,
}

impl<T: DTypeOps> Conv2DLayer<T> {
    pub fn new(
        kernel_size: Shape,
        strides: (usize, usize),
        padding: usize,
        init: Init,
        kernel: Option<Tensor<T>>,
    ) -> Self {
        debug_assert_eq!(kernel_size.rank(), 4);
        let preset = kernel.is_some();
        let kernel = kernel.unwrap_or_else(|| Tensor::zeroed(kernel_size.clone()));
        debug_assert_eq!(kernel.shape(), &kernel_size);
        let out_c = kernel_size.first();
        Conv2DLayer {
            strides,
            padding,
            init,
            preset,
            kernel,
            biases: Tensor::zeroed([out_c]),
            input_shape: Shape::from([1]),
            padded: Tensor::zeroed([1]),
            output: Tensor::zeroed([1]),
        }
    }

    pub fn kernel(&self) -> &Tensor<T> {
        &self.kernel
    }

    pub fn from_record(record: LayerRecord<T>) -> Result<Self> {
        let (Some(kernel), Some(biases)) = (record.kernel, record.biases) else {
            return Err(Error::UninitializedLayer {
                layer: "conv",
                missing: "kernel or biases",
            });
        };
        let strides = match record.strides.as_deref() {
            Some([sy, sx]) => (*sy, *sx),
            _ => (1, 1),
        };
        Ok(Conv2DLayer {
            strides,
            padding: record.padding.unwrap_or(0),
            init: Init::Kaiming,
            preset: true,
            input_shape: Shape::from([1]),
            padded: Tensor::zeroed([1]),
            output: Tensor::zeroed([1]),
            kernel,
            biases,
        })
    }

    /// Padded and output dims for an input of `(batches, channels, h, w)`.
    fn resolve_dims(
        &self,
        (n, c, h, w): (usize, usize, usize, usize),
    ) -> Result<((usize, usize, usize, usize), (usize, usize, usize, usize))> {
        let (out_c, in_c, kh, kw) = self.kernel.shape().as_4d();
        let hp = h + 2 * self.padding;
        let wp = w + 2 * self.padding;
        if c != in_c || hp < kh || wp < kw {
            return Err(Error::ShapeMismatch {
                from: Shape::from([n, c, hp, wp]),
                to: self.kernel.shape().clone(),
            });
        }
        let ho = 1 + (hp - kh) / self.strides.0;
        let wo = 1 + (wp - kw) / self.strides.1;
        Ok(((n, c, hp, wp), (n, out_c, ho, wo)))
    }

    fn ensure_buffers(&mut self, dims: (usize, usize, usize, usize)) -> Result<()> {
        let (pdims, odims) = self.resolve_dims(dims)?;
        if self.padded.shape().as_4d() != pdims {
            self.padded = Tensor::zeroed([pdims.0, pdims.1, pdims.2, pdims.3]);
        }
        if self.output.shape().as_4d() != odims {
            self.output = Tensor::zeroed([odims.0, odims.1, odims.2, odims.3]);
        }
        Ok(())
    }
}

impl<T: DTypeOps> Layer<T> for Conv2DLayer<T> {
    fn init(&mut self, input_shape: &Shape, rng: &mut StdRng) -> Result<Shape> {
        let dims = input_shape.as_4d();
        self.input_shape = input_shape.clone();
        let (out_c, in_c, kh, kw) = self.kernel.shape().as_4d();
        if !self.preset {
            let fan_in = in_c * kh * kw;
            let fan_out = out_c * kh * kw;
            self.kernel = self
                .init
                .sample(self.kernel.shape().clone(), fan_in, fan_out, rng);
        }
        self.biases = Tensor::zeroed([out_c]);
        self.ensure_buffers(dims)?;
        let (n, oc, ho, wo) = self.output.shape().as_4d();
        Ok(Shape::from([n, oc, ho, wo]))
    }

    fn reset(&mut self, batches: usize) {
        self.padded.resize_first_axis(batches);
        self.output.resize_first_axis(batches);
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>> {
        let dims = input.shape().as_4d();
        self.input_shape = input.shape().clone();
        self.ensure_buffers(dims)?;
        let (n, c, h, w) = dims;
        let p = self.padding;
        let pdims = self.padded.shape().as_4d();

        if p > 0 {
            self.padded.fill_zero();
            let src = input.as_ref();
            let dst = self.padded.as_mut();
            for b in 0..n {
                for ch in 0..c {
                    for row in 0..h {
                        let from = index4(dims, b, ch, row, 0);
                        let to = index4(pdims, b, ch, row + p, p);
                        dst[to..to + w].copy_from_slice(&src[from..from + w]);
                    }
                }
            }
        } else {
            self.padded.as_mut().copy_from_slice(input.as_ref());
        }

        let Conv2DLayer {
            strides: (sy, sx),
            kernel,
            biases,
            padded,
            output,
            ..
        } = self;
        let kdims = kernel.shape().as_4d();
        let (_, out_c, ho, wo) = output.shape().as_4d();
        let odims = (n, out_c, ho, wo);
        let kernel = kernel.as_ref();
        let padded = padded.as_ref();
        let out = output.as_mut();
        // only biases[0] seeds the accumulator; updates still land per channel
        let bias = biases[0];
        for b in 0..n {
            for oc in 0..out_c {
                for oh in 0..ho {
                    for ow in 0..wo {
                        let mut sum = bias;
                        for ic in 0..kdims.1 {
                            for i in 0..kdims.2 {
                                for j in 0..kdims.3 {
                                    let pi = index4(pdims, b, ic, oh * *sy + i, ow * *sx + j);
                                    let ki = index4(kdims, oc, ic, i, j);
                                    sum += padded[pi] * kernel[ki];
                                }
                            }
                        }
                        out[index4(odims, b, oc, oh, ow)] = sum;
                    }
                }
            }
        }
        Ok(&self.output)
    }

    fn backward(&mut self, error: &Tensor<T>, rate: T) -> Result<Tensor<T>> {
        let (sy, sx) = self.strides;
        let p = self.padding;
        let pdims = self.padded.shape().as_4d();
        let kdims = self.kernel.shape().as_4d();
        let odims = self.output.shape().as_4d();
        debug_assert_eq!(error.shape().as_4d(), odims);
        let (n, out_c, ho, wo) = odims;
        let (_, in_c, kh, kw) = kdims;
        let err = error.as_ref();
        let padded = self.padded.as_ref();

        // input gradient against the pre-update kernel
        let mut dpadded = Tensor::<T>::zeroed([pdims.0, pdims.1, pdims.2, pdims.3]);
        {
            let kernel = self.kernel.as_ref();
            let dp = dpadded.as_mut();
            for b in 0..n {
                for oc in 0..out_c {
                    for oh in 0..ho {
                        for ow in 0..wo {
                            let e = err[index4(odims, b, oc, oh, ow)];
                            for ic in 0..in_c {
                                for i in 0..kh {
                                    for j in 0..kw {
                                        let pi = index4(pdims, b, ic, oh * sy + i, ow * sx + j);
                                        dp[pi] += kernel[index4(kdims, oc, ic, i, j)] * e;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        for oc in 0..out_c {
            for ic in 0..in_c {
                for i in 0..kh {
                    for j in 0..kw {
                        let mut sum = T::ZERO;
                        for b in 0..n {
                            for oh in 0..ho {
                                for ow in 0..wo {
                                    let pi = index4(pdims, b, ic, oh * sy + i, ow * sx + j);
                                    sum += padded[pi] * err[index4(odims, b, oc, oh, ow)];
                                }
                            }
                        }
                        self.kernel[index4(kdims, oc, ic, i, j)] -= sum * rate;
                    }
                }
            }
        }

        for oc in 0..out_c {
            let mut sum = T::ZERO;
            for b in 0..n {
                for oh in 0..ho {
                    for ow in 0..wo {
                        sum += err[index4(odims, b, oc, oh, ow)];
                    }
                }
            }
            self.biases[oc] -= sum * rate;
        }

        // strip the padding border off the returned gradient
        let (_, c, hp, wp) = pdims;
        let h = hp - 2 * p;
        let w = wp - 2 * p;
        let mut dinput = Tensor::<T>::zeroed(self.input_shape.with_first(n));
        if p > 0 {
            let dims = (n, c, h, w);
            let src = dpadded.as_ref();
            let dst = dinput.as_mut();
            for b in 0..n {
                for ch in 0..c {
                    for row in 0..h {
                        let from = index4(pdims, b, ch, row + p, p);
                        let to = index4(dims, b, ch, row, 0);
                        dst[to..to + w].copy_from_slice(&src[from..from + w]);
                    }
                }
            }
        } else {
            dinput.as_mut().copy_from_slice(dpadded.as_ref());
        }
        Ok(dinput)
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn to_record(&self) -> LayerRecord<T> {
        let mut record = LayerRecord::new("conv");
        record.kernel = Some(self.kernel.clone());
        record.biases = Some(self.biases.clone());
        record.strides = Some(vec![self.strides.0, self.strides.1]);
        record.padding = Some(self.padding);
        if self.padded.shape().rank() == 4 {
            record.padded_size = Some(self.padded.shape().without_first().to_vec());
            record.output_size = Some(self.output.shape().without_first().to_vec());
        }
        record
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tensor;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    fn identity_kernel() -> Tensor<f32> {
        // 1x1x1x1 kernel with weight 1: convolution is a copy
        tensor![[[[1.0f32]]]]
    }

    #[test]
    fn output_size_formula() {
        // unpadded: 1 + (6 - 3) / 1 = 4
        let mut layer = Conv2DLayer::<f32>::new(Shape::from([2, 1, 3, 3]), (1, 1), 0, Init::Kaiming, None);
        let mut rng = StdRng::seed_from_u64(0);
        let out = layer.init(&Shape::from([1, 1, 6, 6]), &mut rng).unwrap();
        assert_eq!(out, Shape::from([1, 2, 4, 4]));

        // padded: 1 + (6 + 2 - 3) / 2 = 3
        let mut layer = Conv2DLayer::<f32>::new(Shape::from([1, 1, 3, 3]), (2, 2), 1, Init::Kaiming, None);
        let out = layer.init(&Shape::from([1, 1, 6, 6]), &mut rng).unwrap();
        assert_eq!(out, Shape::from([1, 1, 3, 3]));
    }

    #[test]
    fn known_kernel_known_sums() {
        // 2x2 ones-kernel over a 3x3 ramp: each output is a window sum
        let kernel = tensor![[[[1.0f32, 1.0], [1.0, 1.0]]]];
        let mut layer = Conv2DLayer::new(Shape::from([1, 1, 2, 2]), (1, 1), 0, Init::Kaiming, Some(kernel));
        let mut rng = StdRng::seed_from_u64(0);
        layer.init(&Shape::from([1, 1, 3, 3]), &mut rng).unwrap();
        let input = tensor![[[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]]];
        let out = layer.forward(&input).unwrap();
        assert_abs_diff_eq!(out.as_ref(), [12.0f32, 16.0, 24.0, 28.0].as_slice());
    }

    #[test]
    fn padding_copies_into_interior() {
        let mut layer = Conv2DLayer::new(Shape::from([1, 1, 1, 1]), (1, 1), 1, Init::Kaiming, Some(identity_kernel()));
        let mut rng = StdRng::seed_from_u64(0);
        layer.init(&Shape::from([1, 1, 2, 2]), &mut rng).unwrap();
        let input = tensor![[[[1.0f32, 2.0], [3.0, 4.0]]]];
        let out = layer.forward(&input).unwrap();
        assert_eq!(out.shape(), &Shape::from([1, 1, 4, 4]));
        // interior holds the input, the border stays zero
        assert_abs_diff_eq!(
            out.as_ref(),
            [
                0.0f32, 0.0, 0.0, 0.0, //
                0.0, 1.0, 2.0, 0.0, //
                0.0, 3.0, 4.0, 0.0, //
                0.0, 0.0, 0.0, 0.0,
            ]
            .as_slice()
        );
    }

    #[test]
    fn backward_returns_unpadded_gradient() {
        let mut layer = Conv2DLayer::<f32>::new(Shape::from([1, 1, 3, 3]), (1, 1), 1, Init::Kaiming, None);
        let mut rng = StdRng::seed_from_u64(3);
        let out_shape = layer.init(&Shape::from([2, 1, 4, 4]), &mut rng).unwrap();
        let input = Tensor::filled(0.5f32, [2, 1, 4, 4]);
        layer.forward(&input).unwrap();
        let error = Tensor::filled(0.1f32, out_shape);
        let grad = layer.backward(&error, 0.01).unwrap();
        assert_eq!(grad.shape(), input.shape());
    }

    #[test]
    fn kernel_update_matches_hand_gradient() {
        let mut layer = Conv2DLayer::new(Shape::from([1, 1, 1, 1]), (1, 1), 0, Init::Kaiming, Some(identity_kernel()));
        let mut rng = StdRng::seed_from_u64(0);
        layer.init(&Shape::from([1, 1, 2, 2]), &mut rng).unwrap();
        let input = tensor![[[[1.0f32, 2.0], [3.0, 4.0]]]];
        layer.forward(&input).unwrap();
        let error = tensor![[[[1.0f32, 1.0], [1.0, 1.0]]]];
        let grad = layer.backward(&error, 0.1).unwrap();
        // dK = sum(input * error) = 10, so kernel becomes 1 - 10 * 0.1
        assert_abs_diff_eq!(layer.kernel()[0], 0.0);
        // input gradient uses the pre-update kernel value of 1
        assert_abs_diff_eq!(grad.as_ref(), [1.0f32, 1.0, 1.0, 1.0].as_slice());
        // bias collects the summed error
        assert_abs_diff_eq!(layer.biases[0], -0.4);
    }

    #[test]
    fn mismatched_channels_rejected() {
        let mut layer = Conv2DLayer::<f32>::new(Shape::from([1, 3, 2, 2]), (1, 1), 0, Init::Kaiming, None);
        let mut rng = StdRng::seed_from_u64(0);
        let err = layer.init(&Shape::from([1, 2, 4, 4]), &mut rng).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn record_round_trip_is_bit_identical() {
        let mut layer = Conv2DLayer::<f32>::new(Shape::from([2, 1, 3, 3]), (1, 1), 1, Init::Kaiming, None);
        let mut rng = StdRng::seed_from_u64(11);
        layer.init(&Shape::from([1, 1, 5, 5]), &mut rng).unwrap();
        let input: Tensor<f32> =
            Init::Uniform.sample([1, 1, 5, 5], 25, 25, &mut StdRng::seed_from_u64(12));
        let expected = layer.forward(&input).unwrap().clone();

        let json = serde_json::to_string(&layer.to_record()).unwrap();
        let record: LayerRecord<f32> = serde_json::from_str(&json).unwrap();
        let mut restored = Conv2DLayer::from_record(record).unwrap();
        let out = restored.forward(&input).unwrap();
        assert_eq!(out.as_ref(), expected.as_ref());
    }
}
