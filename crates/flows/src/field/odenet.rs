use cnflow_core::Module;
use ndarray::{Array2, ArrayView2, s};
use rand::Rng;

use super::{DiffEqLayer, LayerType, Nonlinearity, VectorField, check_dims, check_layout, layer_shapes};
use crate::{ConfigError, ShapeError};

/// A plain vector field: a stack of [`DiffEqLayer`]s with its own weights.
///
/// Layers run `input_dim -> hidden_dims... -> input_dim`. Each layer sees the
/// time/context vector `[t, c]`, and the nonlinearity is applied between
/// layers but not after the last one.
#[derive(Debug, Clone)]
pub struct OdeNet {
    input_dim: usize,
    context_dim: usize,
    nonlinearity: Nonlinearity,
    layers: Vec<DiffEqLayer>,
}

impl OdeNet {
    /// Creates a field with freshly initialised weights.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `input_dim` is zero or `hidden_dims` is
    /// empty or contains a zero.
    pub fn new(
        input_dim: usize,
        hidden_dims: &[usize],
        context_dim: usize,
        layer_type: LayerType,
        nonlinearity: Nonlinearity,
        rng: &mut impl Rng,
    ) -> Result<Self, ConfigError> {
        check_dims(input_dim, hidden_dims)?;

        let layers = layer_shapes(input_dim, hidden_dims)
            .into_iter()
            .map(|(i, o)| DiffEqLayer::new(layer_type, i, o, 1 + context_dim, rng))
            .collect();

        Ok(Self {
            input_dim,
            context_dim,
            nonlinearity,
            layers,
        })
    }

    #[must_use]
    pub fn layers(&self) -> &[DiffEqLayer] {
        &self.layers
    }

    #[must_use]
    pub fn nonlinearity(&self) -> Nonlinearity {
        self.nonlinearity
    }

    /// Builds the `[t, c]` rows every layer is conditioned on.
    fn time_context(&self, t: f64, batch: usize, context: Option<ArrayView2<'_, f64>>) -> Array2<f64> {
        let mut tc = Array2::from_elem((batch, 1 + self.context_dim), t);
        if let Some(context) = context {
            // A single shared row broadcasts over the batch.
            tc.slice_mut(s![.., 1..]).assign(&context);
        }
        tc
    }
}

impl VectorField for OdeNet {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn context_dim(&self) -> usize {
        self.context_dim
    }

    fn velocity_with_jvp(
        &self,
        t: f64,
        z: ArrayView2<'_, f64>,
        context: Option<ArrayView2<'_, f64>>,
        directions: &[Array2<f64>],
    ) -> Result<(Array2<f64>, Vec<Array2<f64>>), ShapeError> {
        let context = check_layout(self.input_dim, self.context_dim, z, context)?;
        let tc = self.time_context(t, z.nrows(), context);

        let mut h = z.to_owned();
        let mut tangents = directions.to_vec();
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            (h, tangents) = layer.forward(h.view(), tc.view(), &tangents);
            if i < last {
                self.nonlinearity.activate(&mut h, &mut tangents);
            }
        }

        Ok((h, tangents))
    }
}

impl Module for OdeNet {
    fn name(&self) -> &'static str {
        "OdeNet"
    }

    fn children(&self) -> Vec<&dyn Module> {
        self.layers.iter().map(|layer| layer as &dyn Module).collect()
    }
}
