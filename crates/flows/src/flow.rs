use cnflow_core::Module;
use ndarray::ArrayView2;

use crate::{FlowError, FlowState};

/// Which way a stage is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Data space to base space.
    Forward,
    /// Base space back to data space.
    Inverse,
}

impl Direction {
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Inverse,
            Direction::Inverse => Direction::Forward,
        }
    }
}

/// An invertible transformation that tracks the change in log-density.
///
/// The context is borrowed for the duration of one call and is never
/// modified by a stage.
pub trait Flow: Module {
    /// Applies the transformation to `state` in `direction`.
    ///
    /// The stage's log-determinant term is subtracted from `state.logp` on
    /// the way forward and added back on the way in reverse.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError`] if the state or context has the wrong shape,
    /// or if an ODE solve fails.
    fn transform(
        &mut self,
        state: FlowState,
        context: Option<ArrayView2<'_, f64>>,
        direction: Direction,
    ) -> Result<FlowState, FlowError>;

    /// Switches between training and evaluation behaviour.
    fn set_training(&mut self, training: bool);

    /// Maps samples `x` forward, starting from a zero log-density delta.
    ///
    /// # Errors
    ///
    /// See [`transform`](Self::transform).
    fn forward(
        &mut self,
        x: ArrayView2<'_, f64>,
        context: Option<ArrayView2<'_, f64>>,
    ) -> Result<FlowState, FlowError> {
        self.transform(FlowState::new(x.to_owned()), context, Direction::Forward)
    }

    /// Maps samples `z` back, starting from a zero log-density delta.
    ///
    /// # Errors
    ///
    /// See [`transform`](Self::transform).
    fn inverse(
        &mut self,
        z: ArrayView2<'_, f64>,
        context: Option<ArrayView2<'_, f64>>,
    ) -> Result<FlowState, FlowError> {
        self.transform(FlowState::new(z.to_owned()), context, Direction::Inverse)
    }
}
