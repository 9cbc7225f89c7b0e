use crate::dtype::DType;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Elementwise activation functions: a scalar `activate` plus its
/// derivative with the upstream error folded in.
///
/// The derivative's evaluation point differs per function and the layer
/// code relies on it: sigmoid and tanh are differentiated at the
/// *output* (`f'(x) = g(f(x))`), the relu family and elu/selu at the
/// *input*.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Sigmoid,
    Tanh,
    Relu,
    Relu6,
    LeakyRelu,
    Elu,
    Selu,
}

const SELU_SCALE: f64 = 1.0507;

impl Activation {
    #[inline]
    pub fn activate<T: DType>(self, x: T) -> T {
        match self {
            Activation::Linear => x,
            Activation::Sigmoid => T::ONE / (T::ONE + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.max(T::ZERO),
            Activation::Relu6 => x.max(T::ZERO).min(T::from_f64(6.0)),
            Activation::LeakyRelu => {
                if x > T::ZERO {
                    x
                } else {
                    T::from_f64(0.01) * x
                }
            }
            Activation::Elu => {
                if x >= T::ZERO {
                    x
                } else {
                    x.exp() - T::ONE
                }
            }
            Activation::Selu => {
                if x >= T::ZERO {
                    x
                } else {
                    T::from_f64(SELU_SCALE) * (x.exp() - T::ONE)
                }
            }
        }
    }

    /// Derivative at `val` times the upstream `error`. `val` must be the
    /// activation output for sigmoid/tanh and the activation input for
    /// every other function (see [`Activation::output_basis`]).
    #[inline]
    pub fn prime<T: DType>(self, val: T, error: T) -> T {
        match self {
            Activation::Linear => error,
            Activation::Sigmoid => val * (T::ONE - val) * error,
            Activation::Tanh => (T::ONE - val * val) * error,
            Activation::Relu | Activation::Relu6 => {
                if val > T::ZERO {
                    error
                } else {
                    T::ZERO
                }
            }
            Activation::LeakyRelu => {
                if val > T::ZERO {
                    error
                } else {
                    T::from_f64(0.01) * error
                }
            }
            Activation::Elu => {
                if val > T::ZERO {
                    error
                } else {
                    val.exp() * error
                }
            }
            Activation::Selu => {
                if val > T::ZERO {
                    error
                } else {
                    T::from_f64(SELU_SCALE) * val.exp() * error
                }
            }
        }
    }

    /// Whether `prime` expects the activation *output* rather than the
    /// input as its evaluation point.
    #[inline]
    pub fn output_basis(self) -> bool {
        matches!(self, Activation::Sigmoid | Activation::Tanh)
    }

    pub fn name(self) -> &'static str {
        match self {
            Activation::Linear => "linear",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
            Activation::Relu6 => "relu6",
            Activation::LeakyRelu => "leakyrelu",
            Activation::Elu => "elu",
            Activation::Selu => "selu",
        }
    }
}

impl Display for Activation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        Ok(match s {
            "linear" => Activation::Linear,
            "sigmoid" => Activation::Sigmoid,
            "tanh" => Activation::Tanh,
            "relu" => Activation::Relu,
            "relu6" => Activation::Relu6,
            "leakyrelu" => Activation::LeakyRelu,
            "elu" => Activation::Elu,
            "selu" => Activation::Selu,
            other => return Err(Error::UnknownActivation(other.into())),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn relu_prime_passes_error_for_positive_input_only() {
        for x in [-3.5f32, -0.001, 0.0, 0.7, 42.0] {
            let d = Activation::Relu.prime(x, 2.5);
            if x > 0.0 {
                assert_eq!(d, 2.5);
            } else {
                assert_eq!(d, 0.0);
            }
        }
    }

    #[test]
    fn sigmoid_prime_uses_output_value() {
        let out: f32 = Activation::Sigmoid.activate(0.0);
        assert_abs_diff_eq!(out, 0.5);
        // derivative at x=0 is 0.25, evaluated through the output
        assert_abs_diff_eq!(Activation::Sigmoid.prime(out, 1.0), 0.25);
        assert!(Activation::Sigmoid.output_basis());
        assert!(!Activation::Relu.output_basis());
    }

    #[test]
    fn relu6_clamps() {
        assert_eq!(Activation::Relu6.activate(7.5f32), 6.0);
        assert_eq!(Activation::Relu6.activate(-1.0f32), 0.0);
        assert_eq!(Activation::Relu6.activate(3.0f32), 3.0);
    }

    #[test]
    fn leaky_relu_scales_negative_error() {
        assert_abs_diff_eq!(Activation::LeakyRelu.prime(-1.0f32, 2.0), 0.02);
        assert_abs_diff_eq!(Activation::LeakyRelu.prime(1.0f32, 2.0), 2.0);
    }

    #[test]
    fn elu_is_continuous_at_zero() {
        let eps = 1e-4f64;
        let lo = Activation::Elu.activate(-eps);
        let hi = Activation::Elu.activate(eps);
        assert_abs_diff_eq!(lo, hi, epsilon = 1e-3);
    }

    #[test]
    fn parse_names() {
        assert_eq!("selu".parse::<Activation>().unwrap(), Activation::Selu);
        let err = "swish".parse::<Activation>().unwrap_err();
        assert!(err.to_string().contains("unknown activation"));
    }
}
