use std::fmt;

use cnflow_core::{LearnableNonNegative, Module, NonNegative, Parameter};
use cnflow_solvers::ode::{self, Method};
use ndarray::ArrayView2;
use rand::{SeedableRng, rngs::StdRng};
use tracing::trace;

use crate::{
    Direction, Flow, FlowError, FlowState,
    dynamics::{CnfDynamics, Divergence},
    field::{VectorField, check_layout},
};

/// How gradients are taken through a block's ODE solve.
///
/// The forward numerics are identical in both modes. The choice is recorded
/// for the gradient machinery that drives training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GradientMode {
    /// Solve a second, backward-in-time ODE for the gradients.
    #[default]
    Adjoint,
    /// Differentiate through every internal solver step.
    Direct,
}

/// Integration settings for one [`FlowBlock`].
#[derive(Debug, Clone, PartialEq)]
pub struct BlockConfig {
    pub time_length: NonNegative,
    pub train_t: bool,
    pub conditional: bool,
    pub method: Method,
    pub gradient: GradientMode,
    pub solver: ode::Config,
    pub train_divergence: Divergence,
    pub eval_divergence: Divergence,
}

impl BlockConfig {
    /// Creates a config with horizon `time_length` and default settings
    /// otherwise: trainable horizon, unconditional, adaptive `dopri5` with
    /// adjoint gradients, and exact divergence.
    #[must_use]
    pub fn new(time_length: NonNegative) -> Self {
        Self {
            time_length,
            train_t: true,
            conditional: false,
            method: Method::default(),
            gradient: GradientMode::default(),
            solver: ode::Config::default(),
            train_divergence: Divergence::Exact,
            eval_divergence: Divergence::Exact,
        }
    }
}

/// A continuous normalizing flow block.
///
/// Integrates its vector field over `[0, T]` on the way forward and over
/// `[T, 0]` on the way back. The horizon `T` is stored in a square-root
/// basis, so it never goes negative whatever updates are applied to it.
///
/// The block counts every field evaluation across calls until
/// [`reset_num_evals`](Self::reset_num_evals) is called.
pub struct FlowBlock {
    field: Box<dyn VectorField>,
    horizon: LearnableNonNegative,
    conditional: bool,
    method: Method,
    gradient: GradientMode,
    solver: ode::Config,
    train_divergence: Divergence,
    eval_divergence: Divergence,
    training: bool,
    num_evals: usize,
    rng: StdRng,
}

impl FlowBlock {
    /// Wraps `field` in a block. `seed` drives the Hutchinson samples.
    pub fn new(field: Box<dyn VectorField>, config: &BlockConfig, seed: u64) -> Self {
        let horizon = if config.train_t {
            LearnableNonNegative::new(config.time_length)
        } else {
            LearnableNonNegative::frozen(config.time_length)
        };

        Self {
            field,
            horizon,
            conditional: config.conditional,
            method: config.method,
            gradient: config.gradient,
            solver: config.solver,
            train_divergence: config.train_divergence,
            eval_divergence: config.eval_divergence,
            training: true,
            num_evals: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn field(&self) -> &dyn VectorField {
        self.field.as_ref()
    }

    /// The effective horizon `T`, the square of the stored parameter.
    #[must_use]
    pub fn end_time(&self) -> NonNegative {
        self.horizon.value()
    }

    #[must_use]
    pub fn horizon(&self) -> &LearnableNonNegative {
        &self.horizon
    }

    /// Moves the stored square-root horizon by `delta`, as an optimizer
    /// step would. Ignored when the horizon is frozen.
    pub fn apply_update(&mut self, delta: f64) {
        self.horizon.apply_update(delta);
    }

    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.conditional
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn gradient_mode(&self) -> GradientMode {
        self.gradient
    }

    #[must_use]
    pub fn solver_config(&self) -> &ode::Config {
        &self.solver
    }

    #[must_use]
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// The divergence estimator the next solve will use.
    #[must_use]
    pub fn divergence(&self) -> Divergence {
        if self.training {
            self.train_divergence
        } else {
            self.eval_divergence
        }
    }

    /// Field evaluations performed since construction or the last reset.
    #[must_use]
    pub fn num_evals(&self) -> usize {
        self.num_evals
    }

    pub fn reset_num_evals(&mut self) {
        self.num_evals = 0;
    }
}

impl Flow for FlowBlock {
    fn transform(
        &mut self,
        state: FlowState,
        context: Option<ArrayView2<'_, f64>>,
        direction: Direction,
    ) -> Result<FlowState, FlowError> {
        let context = if self.conditional { context } else { None };
        let context = check_layout(
            self.field.input_dim(),
            self.field.context_dim(),
            state.z.view(),
            context,
        )?;

        let end_time = self.end_time().into_inner();
        let t_span = match direction {
            Direction::Forward => [0.0, end_time],
            Direction::Inverse => [end_time, 0.0],
        };
        let divergence = self.divergence();

        let dynamics = CnfDynamics::new(
            self.field.as_ref(),
            context,
            divergence,
            state.batch(),
            &mut self.rng,
        );
        let result = ode::integrate(&dynamics, state, t_span, self.method, &self.solver);

        let evaluations = dynamics.evaluations();
        self.num_evals += evaluations;
        trace!(?direction, end_time, evaluations, "flow block solve");

        Ok(result?.state)
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

impl Module for FlowBlock {
    fn name(&self) -> &'static str {
        "FlowBlock"
    }

    fn children(&self) -> Vec<&dyn Module> {
        vec![self.field.as_ref() as &dyn Module]
    }

    fn parameters(&self) -> Vec<&dyn Parameter> {
        vec![self.horizon.param() as &dyn Parameter]
    }

    fn num_evals(&self) -> Option<usize> {
        Some(self.num_evals)
    }

    fn integration_time(&self) -> Option<f64> {
        Some(self.end_time().into_inner())
    }
}

impl fmt::Debug for FlowBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowBlock")
            .field("field", &self.field.name())
            .field("end_time", &self.end_time().into_inner())
            .field("train_t", &self.horizon.is_trainable())
            .field("conditional", &self.conditional)
            .field("method", &self.method)
            .field("gradient", &self.gradient)
            .field("training", &self.training)
            .field("num_evals", &self.num_evals)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
