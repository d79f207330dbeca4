use std::cell::Cell;

use cnflow_core::OdeFunction;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::{FlowState, ShapeError, field::VectorField};

/// How the trace of the field's Jacobian is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Divergence {
    /// Exact trace from one Jacobian-vector product per feature.
    #[default]
    Exact,
    /// Hutchinson estimate `εᵀJε` from one Gaussian sample drawn per solve.
    Hutchinson,
}

/// The augmented ODE `dz/dt = f(t, z, c)`, `d logp/dt = -tr(∂f/∂z)`.
///
/// Every call to [`evaluate`](OdeFunction::evaluate) is counted, including
/// calls made by a solve that later fails.
pub(crate) struct CnfDynamics<'f, 'c> {
    field: &'f dyn VectorField,
    context: Option<ArrayView2<'c, f64>>,
    directions: Vec<Array2<f64>>,
    evaluations: Cell<usize>,
}

impl<'f, 'c> CnfDynamics<'f, 'c> {
    /// Prepares the dynamics for a batch of `batch` rows.
    pub(crate) fn new(
        field: &'f dyn VectorField,
        context: Option<ArrayView2<'c, f64>>,
        divergence: Divergence,
        batch: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let dim = field.input_dim();
        let directions = match divergence {
            Divergence::Exact => (0..dim)
                .map(|j| {
                    let mut basis = Array2::zeros((batch, dim));
                    basis.column_mut(j).fill(1.0);
                    basis
                })
                .collect(),
            Divergence::Hutchinson => {
                vec![Array2::from_shape_simple_fn((batch, dim), || rng.sample(StandardNormal))]
            }
        };

        Self {
            field,
            context,
            directions,
            evaluations: Cell::new(0),
        }
    }

    pub(crate) fn evaluations(&self) -> usize {
        self.evaluations.get()
    }
}

impl OdeFunction for CnfDynamics<'_, '_> {
    type State = FlowState;
    type Error = ShapeError;

    fn evaluate(&self, t: f64, state: &FlowState) -> Result<FlowState, ShapeError> {
        self.evaluations.set(self.evaluations.get() + 1);

        let (velocity, products) =
            self.field
                .velocity_with_jvp(t, state.z.view(), self.context, &self.directions)?;

        // Σ_d vᵀ(J v) over the directions, row by row. For the unit basis
        // this is exactly the trace.
        let mut divergence = Array1::zeros(state.batch());
        for (direction, product) in self.directions.iter().zip(&products) {
            divergence += &(direction * product).sum_axis(Axis(1));
        }

        Ok(FlowState {
            z: velocity,
            logp: -divergence,
        })
    }
}
