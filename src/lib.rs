pub mod activation;
pub mod cost;
pub mod dtype;
pub mod error;
pub mod init;
pub mod layer;
pub mod math;
pub mod net;
pub mod record;
pub mod tensor;

pub use crate::activation::Activation;
pub use crate::cost::Cost;
pub use crate::error::{Error, Result};
pub use crate::init::Init;
pub use crate::layer::LayerConfig;
pub use crate::net::{DataSet, Network, NetworkConfig};
pub use crate::tensor::{Shape, Tensor};
