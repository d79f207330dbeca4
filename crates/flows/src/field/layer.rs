use std::{fmt, str::FromStr};

use cnflow_core::{Module, Param, Parameter};
use ndarray::{Array1, Array2, ArrayView2, Ix1, Ix2, s};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use super::activation::sigmoid;
use crate::ConfigError;

/// How a layer mixes the time/context vector `[t, c]` into its output.
///
/// With `x` the layer input and `tc = [t, c]`:
///
/// | Type           | Output                                   |
/// |----------------|------------------------------------------|
/// | `ignore`       | `xW + b`                                 |
/// | `concat`       | `[x, tc]W + b`                           |
/// | `concat_v2`    | `xW + b + tc·U`                          |
/// | `squash`       | `(xW + b) ⊙ σ(tc·G + g)`                 |
/// | `scale`        | `(xW + b) ⊙ (tc·G + g)`                  |
/// | `concatsquash` | `(xW + b) ⊙ σ(tc·G + g) + tc·U`          |
/// | `concatscale`  | `(xW + b) ⊙ (tc·G + g) + tc·U`           |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerType {
    #[serde(rename = "ignore")]
    Ignore,
    #[serde(rename = "concat")]
    Concat,
    #[serde(rename = "concat_v2")]
    ConcatV2,
    #[serde(rename = "squash")]
    Squash,
    #[serde(rename = "scale")]
    Scale,
    #[default]
    #[serde(rename = "concatsquash")]
    ConcatSquash,
    #[serde(rename = "concatscale")]
    ConcatScale,
}

impl LayerType {
    pub const ALL: [LayerType; 7] = [
        LayerType::Ignore,
        LayerType::Concat,
        LayerType::ConcatV2,
        LayerType::Squash,
        LayerType::Scale,
        LayerType::ConcatSquash,
        LayerType::ConcatScale,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            LayerType::Ignore => "ignore",
            LayerType::Concat => "concat",
            LayerType::ConcatV2 => "concat_v2",
            LayerType::Squash => "squash",
            LayerType::Scale => "scale",
            LayerType::ConcatSquash => "concatsquash",
            LayerType::ConcatScale => "concatscale",
        }
    }

    fn gate(self) -> Option<Gate> {
        match self {
            LayerType::Squash | LayerType::ConcatSquash => Some(Gate::Sigmoid),
            LayerType::Scale | LayerType::ConcatScale => Some(Gate::Linear),
            _ => None,
        }
    }

    fn has_shift(self) -> bool {
        matches!(
            self,
            LayerType::ConcatV2 | LayerType::ConcatSquash | LayerType::ConcatScale
        )
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayerType::ALL
            .into_iter()
            .find(|layer| layer.name() == s)
            .ok_or_else(|| ConfigError::UnknownLayerType(s.to_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Sigmoid,
    Linear,
}

/// An affine map `xW + b` with `W` stored as `(in, out)`.
#[derive(Debug, Clone)]
struct Linear {
    weight: Param<Ix2>,
    bias: Option<Param<Ix1>>,
}

impl Linear {
    /// Draws weights and bias from `U(-1/√in, 1/√in)`.
    fn new(in_dim: usize, out_dim: usize, with_bias: bool, rng: &mut impl Rng) -> Self {
        let bound = 1.0 / (in_dim.max(1) as f64).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        let weight = Array2::from_shape_simple_fn((in_dim, out_dim), || dist.sample(rng));
        let bias = with_bias.then(|| Param::new(Array1::from_shape_simple_fn(out_dim, || dist.sample(rng))));
        Self {
            weight: Param::new(weight),
            bias,
        }
    }

    fn forward(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = x.dot(self.weight.value());
        if let Some(bias) = &self.bias {
            out += bias.value();
        }
        out
    }

    fn parameters(&self) -> impl Iterator<Item = &dyn Parameter> {
        std::iter::once(&self.weight as &dyn Parameter)
            .chain(self.bias.iter().map(|b| b as &dyn Parameter))
    }
}

/// One layer of an [`OdeNet`](super::OdeNet), conditioned on time and
/// context.
#[derive(Debug, Clone)]
pub struct DiffEqLayer {
    layer_type: LayerType,
    in_dim: usize,
    main: Linear,
    gate: Option<Linear>,
    shift: Option<Linear>,
}

impl DiffEqLayer {
    /// Creates a layer mapping `in_dim` features to `out_dim`, conditioned
    /// on a time/context vector of width `tc_dim`.
    pub fn new(
        layer_type: LayerType,
        in_dim: usize,
        out_dim: usize,
        tc_dim: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let main_in = if layer_type == LayerType::Concat {
            in_dim + tc_dim
        } else {
            in_dim
        };
        let main = Linear::new(main_in, out_dim, true, rng);
        let gate = layer_type
            .gate()
            .map(|_| Linear::new(tc_dim, out_dim, true, rng));
        let shift = layer_type
            .has_shift()
            .then(|| Linear::new(tc_dim, out_dim, false, rng));

        Self {
            layer_type,
            in_dim,
            main,
            gate,
            shift,
        }
    }

    #[must_use]
    pub fn layer_type(&self) -> LayerType {
        self.layer_type
    }

    #[must_use]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[must_use]
    pub fn out_dim(&self) -> usize {
        self.main.weight.value().ncols()
    }

    /// Applies the layer to `x` with time/context rows `tc`, pushing each
    /// tangent through the linear part in `x`.
    pub(crate) fn forward(
        &self,
        x: ArrayView2<'_, f64>,
        tc: ArrayView2<'_, f64>,
        tangents: &[Array2<f64>],
    ) -> (Array2<f64>, Vec<Array2<f64>>) {
        let weight = self.main.weight.value();
        let w_x = weight.slice(s![..self.in_dim, ..]);

        let mut out = x.dot(&w_x);
        if self.layer_type == LayerType::Concat {
            out += &tc.dot(&weight.slice(s![self.in_dim.., ..]));
        }
        if let Some(bias) = &self.main.bias {
            out += bias.value();
        }
        let mut tangents: Vec<_> = tangents.iter().map(|v| v.dot(&w_x)).collect();

        if let (Some(gate), Some(kind)) = (&self.gate, self.layer_type.gate()) {
            let mut scale = gate.forward(tc);
            if kind == Gate::Sigmoid {
                scale.mapv_inplace(sigmoid);
            }
            out *= &scale;
            for tangent in &mut tangents {
                *tangent *= &scale;
            }
        }
        if let Some(shift) = &self.shift {
            out += &shift.forward(tc);
        }

        (out, tangents)
    }
}

impl Module for DiffEqLayer {
    fn name(&self) -> &'static str {
        "DiffEqLayer"
    }

    fn parameters(&self) -> Vec<&dyn Parameter> {
        self.main
            .parameters()
            .chain(self.gate.iter().flat_map(Linear::parameters))
            .chain(self.shift.iter().flat_map(Linear::parameters))
            .collect()
    }
}
