use cnflow_core::OdeState;
use ndarray::{Array1, Array2};

use crate::ShapeError;

/// The augmented state a flow transforms: samples plus their accumulated
/// log-density change.
///
/// `z` holds one sample per row. `logp` holds one entry per row, the running
/// `log p` delta that every stage adds its log-determinant term to.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowState {
    pub z: Array2<f64>,
    pub logp: Array1<f64>,
}

impl FlowState {
    /// Wraps samples with a zero log-density delta.
    pub fn new(z: Array2<f64>) -> Self {
        let logp = Array1::zeros(z.nrows());
        Self { z, logp }
    }

    /// Wraps samples with an existing log-density column.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::LogDensityRows`] if `logp` does not have one
    /// entry per row of `z`.
    pub fn with_logp(z: Array2<f64>, logp: Array1<f64>) -> Result<Self, ShapeError> {
        if logp.len() != z.nrows() {
            return Err(ShapeError::LogDensityRows {
                expected: z.nrows(),
                found: logp.len(),
            });
        }
        Ok(Self { z, logp })
    }

    /// Number of samples.
    pub fn batch(&self) -> usize {
        self.z.nrows()
    }

    /// Number of features per sample.
    pub fn width(&self) -> usize {
        self.z.ncols()
    }
}

impl OdeState for FlowState {
    fn zeros_like(&self) -> Self {
        Self {
            z: self.z.zeros_like(),
            logp: self.logp.zeros_like(),
        }
    }

    fn offset(&self, terms: &[(f64, &Self)]) -> Self {
        let mut out = self.clone();
        for (coeff, term) in terms {
            if *coeff != 0.0 {
                out.z.scaled_add(*coeff, &term.z);
                out.logp.scaled_add(*coeff, &term.logp);
            }
        }
        out
    }

    fn scaled_error(&self, error: &Self, next: &Self, atol: f64, rtol: f64) -> (f64, usize) {
        let (z_sum, z_count) = self.z.scaled_error(&error.z, &next.z, atol, rtol);
        let (p_sum, p_count) = self.logp.scaled_error(&error.logp, &next.logp, atol, rtol);
        (z_sum + p_sum, z_count + p_count)
    }

    fn is_finite(&self) -> bool {
        self.z.is_finite() && self.logp.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn new_state_starts_with_zero_log_density() {
        let state = FlowState::new(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);

        assert_eq!(state.batch(), 3);
        assert_eq!(state.width(), 2);
        assert_eq!(state.logp, array![0.0, 0.0, 0.0]);
    }

    #[test]
    fn log_density_must_match_batch() {
        let err = FlowState::with_logp(array![[1.0], [2.0]], array![0.0]).unwrap_err();
        assert_eq!(
            err,
            ShapeError::LogDensityRows {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn offset_moves_both_parts() {
        let y = FlowState::with_logp(array![[1.0, 1.0]], array![2.0]).unwrap();
        let k = FlowState::with_logp(array![[1.0, -1.0]], array![-4.0]).unwrap();

        let next = y.offset(&[(0.5, &k)]);

        assert_eq!(next.z, array![[1.5, 0.5]]);
        assert_relative_eq!(next.logp[0], 0.0);
    }

    #[test]
    fn error_counts_every_element() {
        let y = FlowState::new(array![[0.0, 0.0]]);
        let (_, count) = y.scaled_error(&y, &y, 1e-5, 1e-5);
        assert_eq!(count, 3);
    }

    #[test]
    fn non_finite_log_density_is_detected() {
        let state = FlowState::with_logp(array![[0.0]], array![f64::NAN]).unwrap();
        assert!(!state.is_finite());
    }
}
