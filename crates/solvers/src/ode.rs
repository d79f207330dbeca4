//! Explicit Runge-Kutta integration of [`OdeFunction`]s.
//!
//! # Methods
//!
//! - Fixed grid: [`Method::Euler`], [`Method::Midpoint`], [`Method::Rk4`].
//!   The span is split into `ceil(|t1 - t0| / step_size)` equal steps.
//! - Adaptive: [`Method::Bosh3`], [`Method::Dopri5`]. Embedded error
//!   estimates drive the step size so that the RMS of the local error, scaled
//!   by `atol + rtol·|y|`, stays at or below one.
//!
//! Integration runs in either direction: a span with `t1 < t0` integrates
//! backward in time, which is how flows invert themselves.
//!
//! # Failure
//!
//! A solve either reaches `t1` or fails. Running out of the step budget, a
//! step size underflow, and a non-finite state are all errors; the solver
//! never hands back a state short of `t1`.
//!
//! # Example
//!
//! ```
//! use cnflow_core::FnOde;
//! use cnflow_solvers::ode::{self, Config, Method};
//! use ndarray::{Array1, array};
//!
//! let decay = FnOde::new(|_t: f64, y: &Array1<f64>| -y);
//! let solution = ode::integrate(&decay, array![1.0], [0.0, 1.0], Method::Dopri5, &Config::default())?;
//!
//! assert!((solution.state[0] - (-1.0_f64).exp()).abs() < 1e-4);
//! # Ok::<(), cnflow_solvers::ode::Error>(())
//! ```

mod adaptive;
mod config;
mod error;
mod fixed;
mod method;
mod solution;
mod step;
mod tableau;

#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError};
pub use error::Error;
pub use method::{Method, ParseMethodError};
pub use solution::{Solution, Stats};

use cnflow_core::{OdeFunction, OdeState};
use tracing::warn;

/// Integrates `func` from `t_span[0]` to `t_span[1]` starting at `initial`.
///
/// # Errors
///
/// Returns an error if the span or the initial state is non-finite, if
/// `func` fails, or if the method cannot reach `t_span[1]` within the
/// configured step budget and tolerances.
pub fn integrate<F: OdeFunction>(
    func: &F,
    initial: F::State,
    t_span: [f64; 2],
    method: Method,
    config: &Config,
) -> Result<Solution<F::State>, Error> {
    let [t0, t1] = t_span;
    if !t0.is_finite() || !t1.is_finite() {
        return Err(Error::InvalidSpan { t0, t1 });
    }
    if !initial.is_finite() {
        return Err(Error::NonFinite { t: t0 });
    }
    if t0 == t1 {
        return Ok(Solution {
            state: initial,
            stats: Stats::default(),
        });
    }

    let tab = method.tableau();
    let result = match tab.b_err {
        Some(b_err) => adaptive::integrate(func, initial, t_span, tab, b_err, config),
        None => fixed::integrate(
            func,
            initial,
            t_span,
            tab,
            config.step_size(),
            config.max_steps(),
        ),
    };

    if let Err(err) = &result {
        warn!(%method, t0, t1, error = %err, "integration failed");
    }
    result
}
