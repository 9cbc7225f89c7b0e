use crate::tensor::Shape;

/// Everything here is a programmer or configuration error detected at
/// construction, `init`, or record-import time. Nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot reshape tensor of shape {from} into {to}")]
    ShapeMismatch { from: Shape, to: Shape },

    #[error("{0}Layer not implemented for this backend")]
    UnsupportedLayerType(String),

    #[error("imported {layer} layer must be initialized: missing {missing}")]
    UninitializedLayer {
        layer: &'static str,
        missing: &'static str,
    },

    #[error(
        "unknown activation function: {0}. Available: \"linear\", \"sigmoid\", \"tanh\", \
         \"relu\", \"relu6\", \"leakyrelu\", \"elu\", \"selu\""
    )]
    UnknownActivation(String),

    #[error("unknown cost function: {0}. Available: \"crossentropy\", \"hinge\", \"mse\"")]
    UnknownCost(String),

    #[error("cannot pool shape {input} with stride ({sy}, {sx})", sy = .strides.0, sx = .strides.1)]
    InvalidPool { input: Shape, strides: (usize, usize) },

    #[error("cannot flatten shape {from} into {to}")]
    InvalidFlatten { from: Shape, to: Shape },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
