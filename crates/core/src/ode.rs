use std::{convert::Infallible, marker::PhantomData};

use crate::OdeState;

/// Defines the right-hand side of an ODE, `dy/dt = f(t, y)`.
///
/// Implementors are queried by the solvers in `cnflow-solvers`, which only
/// ever see this trait. Each call to [`evaluate`](Self::evaluate) is one
/// function evaluation (NFE) from the solver's point of view.
pub trait OdeFunction {
    type State: OdeState;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the time derivative of `state` at time `t`.
    ///
    /// The returned value must have the same shape as `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the derivative cannot be computed.
    fn evaluate(&self, t: f64, state: &Self::State) -> Result<Self::State, Self::Error>;
}

/// Adapts an infallible closure `|t, y| -> dy/dt` into an [`OdeFunction`].
///
/// ```
/// use cnflow_core::{FnOde, OdeFunction};
/// use ndarray::array;
///
/// let decay = FnOde::new(|_t: f64, y: &ndarray::Array1<f64>| -y);
/// let dy = decay.evaluate(0.0, &array![2.0]).unwrap();
/// assert_eq!(dy, array![-2.0]);
/// ```
pub struct FnOde<F, S> {
    func: F,
    _state: PhantomData<fn() -> S>,
}

impl<F, S> FnOde<F, S>
where
    F: Fn(f64, &S) -> S,
    S: OdeState,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _state: PhantomData,
        }
    }
}

impl<F, S> OdeFunction for FnOde<F, S>
where
    F: Fn(f64, &S) -> S,
    S: OdeState,
{
    type State = S;
    type Error = Infallible;

    fn evaluate(&self, t: f64, state: &S) -> Result<S, Infallible> {
        Ok((self.func)(t, state))
    }
}
