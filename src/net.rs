use crate::cost::Cost;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::layer::{ConcreteLayer, Layer, LayerConfig};
use crate::math::DTypeOps;
use crate::record::NetworkRecord;
use crate::tensor::{Shape, Tensor};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Network description: layer stack, cost function and optional fixed
/// per-sample input shape (batch axis excluded). When `input` is absent
/// the shape is taken from the first training tensor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "T: DTypeOps", deserialize = "T: DTypeOps"))]
pub struct NetworkConfig<T: DTypeOps> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Shape>,
    pub layers: Vec<LayerConfig<T>>,
    #[serde(default)]
    pub cost: Cost,
    #[serde(default)]
    pub silent: bool,
}

impl<T: DTypeOps> NetworkConfig<T> {
    pub fn new(layers: Vec<LayerConfig<T>>, cost: Cost) -> Self {
        NetworkConfig {
            input: None,
            layers,
            cost,
            silent: false,
        }
    }
}

/// One training example set: `inputs` and `outputs` share their leading
/// batch axis.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(serialize = "T: DType", deserialize = "T: DType"))]
pub struct DataSet<T: DType> {
    pub inputs: Tensor<T>,
    pub outputs: Tensor<T>,
}

/// Sequential network trained by plain SGD.
///
/// Lifecycle: constructed from a [`NetworkConfig`], shapes resolved and
/// parameters allocated on the first `train`/`predict` call (or an
/// explicit [`Network::initialize`]), then forward/backward cycles
/// repeat. Layers run in declaration order forward and reverse order
/// backward; each `backward` returns the gradient handed to its
/// predecessor.
#[derive(Debug)]
pub struct Network<T: DTypeOps> {
    input: Option<Shape>,
    layers: Vec<ConcreteLayer<T>>,
    cost: Cost,
    silent: bool,
    rng: StdRng,
    initialized: bool,
}

impl<T: DTypeOps> Network<T> {
    pub fn new(config: NetworkConfig<T>) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic parameter initialization for a fixed seed.
    pub fn seeded(config: NetworkConfig<T>, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: NetworkConfig<T>, rng: StdRng) -> Self {
        Network {
            input: config.input,
            layers: config
                .layers
                .into_iter()
                .map(ConcreteLayer::from_config)
                .collect(),
            cost: config.cost,
            silent: config.silent,
            rng,
            initialized: false,
        }
    }

    /// Appends a layer. Only meaningful before initialization.
    pub fn add_layer(&mut self, config: LayerConfig<T>) {
        debug_assert!(!self.initialized);
        self.layers.push(ConcreteLayer::from_config(config));
    }

    pub fn cost(&self) -> Cost {
        self.cost
    }

    pub fn layers(&self) -> &[ConcreteLayer<T>] {
        &self.layers
    }

    /// Resolves every layer's shapes from `input_shape` (batch axis
    /// included) and allocates parameters.
    pub fn initialize(&mut self, input_shape: &Shape) -> Result<()> {
        let mut shape = input_shape.clone();
        let rng = &mut self.rng;
        for layer in &mut self.layers {
            shape = layer.init(&shape, rng)?;
        }
        self.initialized = true;
        Ok(())
    }

    fn ensure_initialized(&mut self, data_shape: &Shape) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let shape = match &self.input {
            Some(dims) => {
                let mut v = Vec::with_capacity(1 + dims.rank());
                v.push(data_shape.first());
                v.extend_from_slice(dims.dims());
                Shape::new(v)
            }
            None => data_shape.clone(),
        };
        self.initialize(&shape)
    }

    /// Threads `input` through every layer and returns the final output,
    /// valid until the next call on this network.
    pub fn feed_forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>> {
        let mut layers = self.layers.iter_mut();
        let Some(first) = layers.next() else {
            return Err(Error::UninitializedLayer {
                layer: "network",
                missing: "layers",
            });
        };
        let mut current = first.forward(input)?;
        for layer in layers {
            current = layer.forward(current)?;
        }
        Ok(current)
    }

    /// Walks the layers in reverse, handing each the gradient produced
    /// by its successor.
    pub fn backpropagate(&mut self, error: &Tensor<T>, rate: T) -> Result<()> {
        let mut error = error.clone();
        for layer in self.layers.iter_mut().rev() {
            error = layer.backward(&error, rate)?;
        }
        Ok(())
    }

    /// Runs `epochs` passes of SGD over `datasets` in order. Each
    /// dataset's forward pass seeds the output error with
    /// `cost.prime(prediction, target)` before the backward walk.
    pub fn train(&mut self, datasets: &[DataSet<T>], epochs: usize, rate: T) -> Result<()> {
        if let Some(first) = datasets.first() {
            self.ensure_initialized(first.inputs.shape())?;
        }
        let cost = self.cost;
        let silent = self.silent;
        for epoch in 0..epochs {
            let mut total = T::ZERO;
            for set in datasets {
                let error = {
                    let output = self.feed_forward(&set.inputs)?;
                    debug_assert_eq!(output.len(), set.outputs.len());
                    let mut error = Tensor::zeroed(output.shape().clone());
                    for ((e, &p), &t) in error
                        .as_mut()
                        .iter_mut()
                        .zip(output.as_ref())
                        .zip(set.outputs.as_ref())
                    {
                        *e = cost.prime(p, t);
                    }
                    if !silent {
                        for (prow, trow) in output.rows().zip(set.outputs.rows()) {
                            total += cost.cost(prow, trow);
                        }
                    }
                    error
                };
                self.backpropagate(&error, rate)?;
            }
            if !silent {
                info!("epoch {}/{epochs}: cost {:?}", epoch + 1, total);
            }
        }
        Ok(())
    }

    /// Resizes batch-dependent buffers to the query batch and runs a
    /// single forward pass.
    pub fn predict(&mut self, input: &Tensor<T>) -> Result<Tensor<T>> {
        self.ensure_initialized(input.shape())?;
        let batches = input.shape().first();
        for layer in &mut self.layers {
            layer.reset(batches);
        }
        Ok(self.feed_forward(input)?.clone())
    }

    pub fn to_record(&self) -> NetworkRecord<T> {
        NetworkRecord {
            input: self.input.as_ref().map(|s| s.dims().to_vec()),
            layers: self.layers.iter().map(|layer| layer.to_record()).collect(),
            cost: self.cost.name().into(),
        }
    }

    pub fn from_record(record: NetworkRecord<T>) -> Result<Self> {
        let layers = record
            .layers
            .into_iter()
            .map(ConcreteLayer::from_record)
            .collect::<Result<Vec<_>>>()?;
        Ok(Network {
            input: record.input.map(Shape::new),
            layers,
            cost: record.cost.parse()?,
            silent: false,
            rng: StdRng::from_entropy(),
            initialized: true,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_record())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_record(serde_json::from_str(json)?)
    }
}
