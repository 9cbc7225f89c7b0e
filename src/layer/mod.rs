mod activation;
mod conv;
mod dense;
mod flatten;
mod pool;

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::init::Init;
use crate::math::DTypeOps;
use crate::record::LayerRecord;
use crate::tensor::{Shape, Tensor};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

pub use activation::{ActivationLayer, SoftmaxLayer};
pub use conv::Conv2DLayer;
pub use dense::DenseLayer;
pub use flatten::FlattenLayer;
pub use pool::MaxPool2DLayer;

/// Contract every layer implements.
///
/// Call order is `init` once, then any number of `forward`/`backward`
/// cycles. `forward` returns the layer-owned output buffer, valid until
/// the next call that changes batch size. `backward` returns the
/// gradient to feed the preceding layer and applies the plain SGD
/// update to this layer's parameters in place; the returned gradient is
/// always computed against the pre-update weights.
pub trait Layer<T: DTypeOps> {
    /// Resolves the output shape from the input shape (batch axis
    /// included) and allocates parameters and scratch buffers.
    fn init(&mut self, input_shape: &Shape, rng: &mut StdRng) -> Result<Shape>;

    /// Resizes batch-dependent buffers for a new batch size.
    fn reset(&mut self, batches: usize);

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>>;

    fn backward(&mut self, error: &Tensor<T>, rate: T) -> Result<Tensor<T>>;

    /// Output of the most recent `forward`.
    fn output(&self) -> &Tensor<T>;

    /// Shape of the most recent `forward` output.
    fn output_shape(&self) -> &Shape {
        self.output().shape()
    }

    fn to_record(&self) -> LayerRecord<T>;
}

/// Layer descriptor consumed at network construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
#[serde(bound(serialize = "T: DTypeOps", deserialize = "T: DTypeOps"))]
pub enum LayerConfig<T: DTypeOps> {
    Dense {
        size: usize,
        #[serde(default)]
        init: Init,
    },
    Conv {
        /// Kernel shape `[out_channels, in_channels, kernel_h, kernel_w]`.
        kernel_size: Shape,
        #[serde(default = "default_strides")]
        strides: (usize, usize),
        #[serde(default)]
        padding: usize,
        #[serde(default = "default_conv_init")]
        init: Init,
        /// Pre-set kernel values; skips random initialization.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kernel: Option<Tensor<T>>,
    },
    Pool {
        strides: (usize, usize),
    },
    Flatten {
        size: Shape,
    },
    Activation {
        activation: Activation,
    },
    Softmax,
}

fn default_strides() -> (usize, usize) {
    (1, 1)
}

fn default_conv_init() -> Init {
    Init::Kaiming
}

impl<T: DTypeOps> LayerConfig<T> {
    pub fn dense(size: usize) -> Self {
        LayerConfig::Dense {
            size,
            init: Init::Xavier,
        }
    }

    pub fn conv<S: Into<Shape>>(kernel_size: S, strides: (usize, usize), padding: usize) -> Self {
        LayerConfig::Conv {
            kernel_size: kernel_size.into(),
            strides,
            padding,
            init: Init::Kaiming,
            kernel: None,
        }
    }

    pub fn pool(strides: (usize, usize)) -> Self {
        LayerConfig::Pool { strides }
    }

    pub fn flatten<S: Into<Shape>>(size: S) -> Self {
        LayerConfig::Flatten { size: size.into() }
    }

    pub fn activation(activation: Activation) -> Self {
        LayerConfig::Activation { activation }
    }

    pub fn softmax() -> Self {
        LayerConfig::Softmax
    }
}

/// Closed sum over every supported layer type. Configuration-driven
/// instantiation happens through [`ConcreteLayer::from_config`] and
/// [`ConcreteLayer::from_record`]; there is no runtime type erasure.
#[derive(Debug)]
pub enum ConcreteLayer<T: DTypeOps> {
    Dense(DenseLayer<T>),
    Conv(Conv2DLayer<T>),
    Pool(MaxPool2DLayer<T>),
    Flatten(FlattenLayer<T>),
    Activation(ActivationLayer<T>),
    Softmax(SoftmaxLayer<T>),
}

impl<T: DTypeOps> ConcreteLayer<T> {
    pub fn from_config(config: LayerConfig<T>) -> Self {
        match config {
            LayerConfig::Dense { size, init } => ConcreteLayer::Dense(DenseLayer::new(size, init)),
            LayerConfig::Conv {
                kernel_size,
                strides,
                padding,
                init,
                kernel,
            } => ConcreteLayer::Conv(Conv2DLayer::new(kernel_size, strides, padding, init, kernel)),
            LayerConfig::Pool { strides } => ConcreteLayer::Pool(MaxPool2DLayer::new(strides)),
            LayerConfig::Flatten { size } => ConcreteLayer::Flatten(FlattenLayer::new(size)),
            LayerConfig::Activation { activation } => {
                ConcreteLayer::Activation(ActivationLayer::new(activation))
            }
            LayerConfig::Softmax => ConcreteLayer::Softmax(SoftmaxLayer::new()),
        }
    }

    pub fn from_record(record: LayerRecord<T>) -> Result<Self> {
        match record.layer_type.as_str() {
            "dense" => Ok(ConcreteLayer::Dense(DenseLayer::from_record(record)?)),
            "conv" => Ok(ConcreteLayer::Conv(Conv2DLayer::from_record(record)?)),
            "pool" => Ok(ConcreteLayer::Pool(MaxPool2DLayer::from_record(record)?)),
            "flatten" => Ok(ConcreteLayer::Flatten(FlattenLayer::from_record(record)?)),
            "activation" => Ok(ConcreteLayer::Activation(ActivationLayer::from_record(
                record,
            )?)),
            "softmax" => Ok(ConcreteLayer::Softmax(SoftmaxLayer::new())),
            other => {
                let mut name = String::from(other);
                if let Some(first) = name.get_mut(..1) {
                    first.make_ascii_uppercase();
                }
                Err(Error::UnsupportedLayerType(name))
            }
        }
    }

    fn inner(&self) -> &dyn Layer<T> {
        match self {
            ConcreteLayer::Dense(inner) => inner,
            ConcreteLayer::Conv(inner) => inner,
            ConcreteLayer::Pool(inner) => inner,
            ConcreteLayer::Flatten(inner) => inner,
            ConcreteLayer::Activation(inner) => inner,
            ConcreteLayer::Softmax(inner) => inner,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Layer<T> {
        match self {
            ConcreteLayer::Dense(inner) => inner,
            ConcreteLayer::Conv(inner) => inner,
            ConcreteLayer::Pool(inner) => inner,
            ConcreteLayer::Flatten(inner) => inner,
            ConcreteLayer::Activation(inner) => inner,
            ConcreteLayer::Softmax(inner) => inner,
        }
    }
}

impl<T: DTypeOps> Layer<T> for ConcreteLayer<T> {
    fn init(&mut self, input_shape: &Shape, rng: &mut StdRng) -> Result<Shape> {
        self.inner_mut().init(input_shape, rng)
    }

    fn reset(&mut self, batches: usize) {
        self.inner_mut().reset(batches)
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>> {
        self.inner_mut().forward(input)
    }

    fn backward(&mut self, error: &Tensor<T>, rate: T) -> Result<Tensor<T>> {
        self.inner_mut().backward(error, rate)
    }

    fn output(&self) -> &Tensor<T> {
        self.inner().output()
    }

    fn to_record(&self) -> LayerRecord<T> {
        self.inner().to_record()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_layer_tag_is_rejected() {
        let record = LayerRecord::<f32>::new("recurrent");
        let err = ConcreteLayer::from_record(record).unwrap_err();
        assert_eq!(
            err.to_string(),
            "RecurrentLayer not implemented for this backend"
        );
    }
}
