use ndarray::{Array, Dimension, Zip};

/// A state type that explicit Runge-Kutta solvers can step.
///
/// Solvers never look inside a state. They only need to form linear
/// combinations of the state and its derivatives, measure the local error of
/// a step, and detect blow-ups. Derivatives share the state type, so
/// `dy/dt` for an `Array2<f64>` state is also an `Array2<f64>`.
pub trait OdeState: Clone {
    /// Returns a zero-valued state with the same shape as `self`.
    #[must_use]
    fn zeros_like(&self) -> Self;

    /// Returns `self + Σ cᵢ·kᵢ` for the given `(cᵢ, kᵢ)` terms.
    #[must_use]
    fn offset(&self, terms: &[(f64, &Self)]) -> Self;

    /// Returns the sum of squared scaled errors and the element count.
    ///
    /// Each element contributes `(eᵢ / (atol + rtol·max(|yᵢ|, |y'ᵢ|)))²`,
    /// where `y` is the state before the step and `y'` the state after it.
    /// Composite states add up the contributions of their parts.
    fn scaled_error(&self, error: &Self, next: &Self, atol: f64, rtol: f64) -> (f64, usize);

    /// Returns `true` if every element is finite.
    fn is_finite(&self) -> bool;

    /// Returns the RMS norm of the scaled error, the quantity compared to one
    /// when deciding whether an adaptive step is accepted.
    fn error_ratio(&self, error: &Self, next: &Self, atol: f64, rtol: f64) -> f64 {
        let (sum, count) = self.scaled_error(error, next, atol, rtol);
        if count == 0 {
            0.0
        } else {
            (sum / count as f64).sqrt()
        }
    }
}

impl<D: Dimension> OdeState for Array<f64, D> {
    fn zeros_like(&self) -> Self {
        Array::zeros(self.raw_dim())
    }

    fn offset(&self, terms: &[(f64, &Self)]) -> Self {
        let mut out = self.clone();
        for (coeff, term) in terms {
            if *coeff != 0.0 {
                out.scaled_add(*coeff, *term);
            }
        }
        out
    }

    fn scaled_error(&self, error: &Self, next: &Self, atol: f64, rtol: f64) -> (f64, usize) {
        let mut sum = 0.0;
        Zip::from(self).and(error).and(next).for_each(|&y, &e, &y_next| {
            let scale = atol + rtol * y.abs().max(y_next.abs());
            sum += (e / scale).powi(2);
        });
        (sum, self.len())
    }

    fn is_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}
