use crate::dtype::DType;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Serialized form of a single layer. One schema for every layer type;
/// fields that do not apply stay `None` and are omitted from the JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "T: DType", deserialize = "T: DType"))]
pub struct LayerRecord<T: DType> {
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_size: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_size: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Tensor<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biases: Option<Tensor<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<Tensor<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strides: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padded_size: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<String>,
}

impl<T: DType> LayerRecord<T> {
    /// A record with only the type tag set.
    pub fn new(layer_type: &str) -> Self {
        LayerRecord {
            layer_type: layer_type.into(),
            output_size: None,
            input_size: None,
            weights: None,
            biases: None,
            kernel: None,
            strides: None,
            padding: None,
            padded_size: None,
            size: None,
            activation: None,
        }
    }
}

/// Serialized form of a whole network.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "T: DType", deserialize = "T: DType"))]
pub struct NetworkRecord<T: DType> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Vec<usize>>,
    pub layers: Vec<LayerRecord<T>>,
    pub cost: String,
}
