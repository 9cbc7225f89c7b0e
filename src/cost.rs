use crate::dtype::DType;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Network-level cost functions. `cost` aggregates one batch row into a
/// scalar; `prime` is the per-element error seed for backpropagation,
/// called as `prime(prediction, target)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cost {
    #[default]
    #[serde(rename = "crossentropy")]
    CrossEntropy,
    Hinge,
    Mse,
}

impl Cost {
    pub fn cost<T: DType>(self, y_hat: &[T], y: &[T]) -> T {
        debug_assert_eq!(y_hat.len(), y.len());
        match self {
            Cost::CrossEntropy => {
                let mut sum = T::ZERO;
                for (&p, &t) in y_hat.iter().zip(y) {
                    sum += p * t;
                }
                -sum.ln()
            }
            Cost::Hinge => {
                let two = T::from_f64(2.0);
                let mut max = T::neg_infinity();
                for (&p, &t) in y_hat.iter().zip(y) {
                    let value = t - (T::ONE - two * t) * p;
                    if value > max {
                        max = value;
                    }
                }
                max
            }
            Cost::Mse => {
                let mut sum = T::ZERO;
                for (&p, &t) in y_hat.iter().zip(y) {
                    let diff = p - t;
                    sum += diff * diff;
                }
                sum / T::from_usize(y_hat.len())
            }
        }
    }

    #[inline]
    pub fn prime<T: DType>(self, y_hat: T, y: T) -> T {
        match self {
            // canonical softmax/sigmoid-paired form
            Cost::CrossEntropy | Cost::Mse => y_hat - y,
            Cost::Hinge => {
                if T::from_f64(2.0) * y * y_hat < T::ONE {
                    -y * y_hat
                } else {
                    T::ZERO
                }
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Cost::CrossEntropy => "crossentropy",
            Cost::Hinge => "hinge",
            Cost::Mse => "mse",
        }
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Cost {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        Ok(match s {
            "crossentropy" => Cost::CrossEntropy,
            "hinge" => Cost::Hinge,
            "mse" => Cost::Mse,
            other => return Err(Error::UnknownCost(other.into())),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cross_entropy_prime_is_difference() {
        assert_abs_diff_eq!(Cost::CrossEntropy.prime(0.8f32, 1.0), -0.2);
        assert_abs_diff_eq!(Cost::CrossEntropy.prime(0.3f32, 0.0), 0.3);
    }

    #[test]
    fn cross_entropy_cost_penalizes_wrong_class() {
        let target = [0.0f32, 1.0, 0.0];
        let good = [0.05f32, 0.9, 0.05];
        let bad = [0.7f32, 0.2, 0.1];
        assert!(Cost::CrossEntropy.cost(&good, &target) < Cost::CrossEntropy.cost(&bad, &target));
    }

    #[test]
    fn hinge_prime_branches_on_margin() {
        // 2 * y * y_hat < 1 -> subgradient, otherwise zero
        assert_abs_diff_eq!(Cost::Hinge.prime(0.2f32, 1.0), -0.2);
        assert_abs_diff_eq!(Cost::Hinge.prime(0.9f32, 1.0), 0.0);
        assert_abs_diff_eq!(Cost::Hinge.prime(0.9f32, -1.0), 0.9);
    }

    #[test]
    fn mse_cost_is_mean_of_squares() {
        let y_hat = [1.0f32, 3.0];
        let y = [0.0f32, 1.0];
        assert_abs_diff_eq!(Cost::Mse.cost(&y_hat, &y), 2.5);
    }

    #[test]
    fn parse_names() {
        assert_eq!("hinge".parse::<Cost>().unwrap(), Cost::Hinge);
        assert!(matches!(
            "huber".parse::<Cost>(),
            Err(Error::UnknownCost(_))
        ));
    }
}
