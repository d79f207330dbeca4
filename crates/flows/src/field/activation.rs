use std::{fmt, str::FromStr};

use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Elementwise nonlinearity applied between the layers of a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nonlinearity {
    #[default]
    Tanh,
    Relu,
    Softplus,
    Elu,
    /// `x·σ(x)`.
    Swish,
    Square,
    Identity,
}

impl Nonlinearity {
    pub const ALL: [Nonlinearity; 7] = [
        Nonlinearity::Tanh,
        Nonlinearity::Relu,
        Nonlinearity::Softplus,
        Nonlinearity::Elu,
        Nonlinearity::Swish,
        Nonlinearity::Square,
        Nonlinearity::Identity,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Nonlinearity::Tanh => "tanh",
            Nonlinearity::Relu => "relu",
            Nonlinearity::Softplus => "softplus",
            Nonlinearity::Elu => "elu",
            Nonlinearity::Swish => "swish",
            Nonlinearity::Square => "square",
            Nonlinearity::Identity => "identity",
        }
    }

    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Nonlinearity::Tanh => x.tanh(),
            Nonlinearity::Relu => x.max(0.0),
            // Stable for large |x|.
            Nonlinearity::Softplus => x.max(0.0) + (-x.abs()).exp().ln_1p(),
            Nonlinearity::Elu => {
                if x > 0.0 {
                    x
                } else {
                    x.exp_m1()
                }
            }
            Nonlinearity::Swish => x * sigmoid(x),
            Nonlinearity::Square => x * x,
            Nonlinearity::Identity => x,
        }
    }

    #[must_use]
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Nonlinearity::Tanh => 1.0 - x.tanh().powi(2),
            Nonlinearity::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Nonlinearity::Softplus => sigmoid(x),
            Nonlinearity::Elu => {
                if x > 0.0 {
                    1.0
                } else {
                    x.exp()
                }
            }
            Nonlinearity::Swish => {
                let s = sigmoid(x);
                s + x * s * (1.0 - s)
            }
            Nonlinearity::Square => 2.0 * x,
            Nonlinearity::Identity => 1.0,
        }
    }

    /// Activates `pre` in place and scales each tangent by the derivative at
    /// `pre`.
    pub(crate) fn activate<D: Dimension>(
        self,
        pre: &mut Array<f64, D>,
        tangents: &mut [Array<f64, D>],
    ) {
        if self == Nonlinearity::Identity {
            return;
        }
        if !tangents.is_empty() {
            let slope = pre.mapv(|x| self.derivative(x));
            for tangent in tangents.iter_mut() {
                *tangent *= &slope;
            }
        }
        pre.mapv_inplace(|x| self.apply(x));
    }
}

impl fmt::Display for Nonlinearity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Nonlinearity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Nonlinearity::ALL
            .into_iter()
            .find(|n| n.name() == s)
            .ok_or_else(|| ConfigError::UnknownNonlinearity(s.to_owned()))
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
