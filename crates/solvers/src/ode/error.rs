use std::error::Error as StdError;

/// Errors that can occur during integration.
///
/// None of these are recoverable by the solver: a solve that cannot meet its
/// tolerances inside the step budget fails instead of returning a truncated
/// state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("ode function error: {0}")]
    Function(#[source] Box<dyn StdError + Send + Sync>),

    #[error("invalid integration span [{t0}, {t1}]")]
    InvalidSpan { t0: f64, t1: f64 },

    #[error("step budget of {steps} exhausted at t = {t}")]
    StepBudgetExhausted { t: f64, steps: usize },

    #[error("step size {step:e} underflowed at t = {t}")]
    StepSizeUnderflow { t: f64, step: f64 },

    #[error("state became non-finite at t = {t}")]
    NonFinite { t: f64 },
}

impl Error {
    pub(crate) fn function<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self::Function(Box::new(err))
    }
}
