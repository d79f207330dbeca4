use cnflow_core::{Module, Param, Parameter};
use ndarray::{Array1, ArrayView2, Axis, Ix1};
use tracing::trace;

use crate::{ConfigError, Direction, Flow, FlowError, FlowState, ShapeError};

/// An invertible normalization layer driven by moving statistics.
///
/// Normalizes with `used_mean`/`used_var` and applies a learned log-scale
/// `weight` and shift `bias`:
///
/// ```text
/// y = (x - mean) · exp(-½·ln(var + eps)) · exp(weight) + bias
/// ```
///
/// Outside training, and for every inverse, the used statistics are the
/// running ones. A training forward computes batch statistics, blends them
/// with the running ones according to `bn_lag`, and then folds them into the
/// running statistics with decay [`DECAY`](Self::DECAY). With `bn_lag = 0`
/// the blend keeps the running statistics unchanged.
#[derive(Debug, Clone)]
pub struct MovingBatchNorm {
    num_features: usize,
    bn_lag: f64,
    sync: bool,
    weight: Param<Ix1>,
    bias: Param<Ix1>,
    running_mean: Array1<f64>,
    running_var: Array1<f64>,
    step: u64,
    training: bool,
}

impl MovingBatchNorm {
    pub const EPS: f64 = 1e-4;
    pub const DECAY: f64 = 0.1;

    /// Creates a layer over `num_features` features.
    ///
    /// When `sync` is set, batch variances are taken as `E[x²] - E[x]²`, the
    /// form that merges across data-parallel replicas; otherwise the
    /// unbiased sample variance is used.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `num_features` is zero or `bn_lag` is
    /// outside `[0, 1)`.
    pub fn new(num_features: usize, bn_lag: f64, sync: bool) -> Result<Self, ConfigError> {
        if num_features == 0 {
            return Err(ConfigError::NonPositiveDim {
                field: "num_features",
            });
        }
        if !(0.0..1.0).contains(&bn_lag) {
            return Err(ConfigError::BnLag);
        }

        Ok(Self {
            num_features,
            bn_lag,
            sync,
            weight: Param::new(Array1::zeros(num_features)),
            bias: Param::new(Array1::zeros(num_features)),
            running_mean: Array1::zeros(num_features),
            running_var: Array1::ones(num_features),
            step: 0,
            training: true,
        })
    }

    #[must_use]
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    #[must_use]
    pub fn bn_lag(&self) -> f64 {
        self.bn_lag
    }

    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.sync
    }

    #[must_use]
    pub fn is_training(&self) -> bool {
        self.training
    }

    #[must_use]
    pub fn running_mean(&self) -> &Array1<f64> {
        &self.running_mean
    }

    #[must_use]
    pub fn running_var(&self) -> &Array1<f64> {
        &self.running_var
    }

    /// Number of training batches folded into the running statistics.
    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn weight(&self) -> &Param<Ix1> {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Param<Ix1> {
        &mut self.weight
    }

    pub fn bias(&self) -> &Param<Ix1> {
        &self.bias
    }

    pub fn bias_mut(&mut self) -> &mut Param<Ix1> {
        &mut self.bias
    }

    pub fn reset_running_stats(&mut self) {
        self.running_mean.fill(0.0);
        self.running_var.fill(1.0);
        self.step = 0;
    }

    /// Returns the statistics for a training batch and updates the running
    /// ones.
    fn training_stats(&mut self, x: ArrayView2<'_, f64>) -> (Array1<f64>, Array1<f64>) {
        let n = x.nrows() as f64;
        let batch_mean = x.sum_axis(Axis(0)) / n;
        let sum_sq = (&x - &batch_mean).mapv(|d| d * d).sum_axis(Axis(0));
        let ddof = if self.sync || x.nrows() < 2 { 0.0 } else { 1.0 };
        let batch_var = sum_sq / (n - ddof);

        let mut mean = self.running_mean.clone();
        let mut var = self.running_var.clone();
        if self.bn_lag > 0.0 {
            let lag = self.bn_lag;
            let correction = 1.0 - lag.powf((self.step + 1) as f64);
            mean = (&batch_mean * lag + &mean * (1.0 - lag)) / correction;
            var = (&batch_var * lag + &var * (1.0 - lag)) / correction;
        }

        let mean_shift = (&self.running_mean - &batch_mean) * Self::DECAY;
        let var_shift = (&self.running_var - &batch_var) * Self::DECAY;
        self.running_mean -= &mean_shift;
        self.running_var -= &var_shift;
        self.step += 1;
        trace!(step = self.step, "moving batch norm update");

        (mean, var)
    }

    /// Per-feature log-determinant of the forward map.
    fn log_det(&self, var: &Array1<f64>) -> Array1<f64> {
        var.mapv(|v| -0.5 * (v + Self::EPS).ln()) + self.weight.value()
    }
}

impl Flow for MovingBatchNorm {
    fn transform(
        &mut self,
        state: FlowState,
        _context: Option<ArrayView2<'_, f64>>,
        direction: Direction,
    ) -> Result<FlowState, FlowError> {
        if state.width() != self.num_features {
            return Err(ShapeError::StateWidth {
                expected: self.num_features,
                found: state.width(),
            }
            .into());
        }
        if state.batch() == 0 {
            return Ok(state);
        }

        let FlowState { z, logp } = state;
        let (mean, var) = if self.training && direction == Direction::Forward {
            self.training_stats(z.view())
        } else {
            (self.running_mean.clone(), self.running_var.clone())
        };

        let log_det = self.log_det(&var);
        let scale = log_det.mapv(f64::exp);
        let total = log_det.sum();

        let (z, logp) = match direction {
            Direction::Forward => ((z - &mean) * &scale + self.bias.value(), logp - total),
            Direction::Inverse => ((z - self.bias.value()) / &scale + &mean, logp + total),
        };
        Ok(FlowState { z, logp })
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

impl Module for MovingBatchNorm {
    fn name(&self) -> &'static str {
        "MovingBatchNorm"
    }

    fn parameters(&self) -> Vec<&dyn Parameter> {
        vec![&self.weight as &dyn Parameter, &self.bias]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;

    fn samples() -> ndarray::Array2<f64> {
        array![[1.0, -2.0], [3.0, 0.0], [5.0, 2.0], [7.0, 4.0]]
    }

    #[test]
    fn starts_as_near_identity() {
        let mut norm = MovingBatchNorm::new(2, 0.0, false).unwrap();
        norm.set_training(false);

        let out = norm.forward(samples().view(), None).unwrap();

        let s = (1.0 + MovingBatchNorm::EPS).powf(-0.5);
        assert_abs_diff_eq!(out.z, samples() * s, epsilon = 1e-12);
        assert_abs_diff_eq!(out.logp[0], -2.0 * s.ln(), epsilon = 1e-12);
    }

    #[test]
    fn inverse_undoes_forward() {
        let mut norm = MovingBatchNorm::new(2, 0.0, false).unwrap();
        norm.weight_mut().value_mut().assign(&array![0.3, -0.7]);
        norm.bias_mut().value_mut().assign(&array![1.5, -0.5]);
        norm.set_training(false);

        let forward = norm.forward(samples().view(), None).unwrap();
        let back = norm.inverse(forward.z.view(), None).unwrap();

        assert_abs_diff_eq!(back.z, samples(), epsilon = 1e-12);
        assert_abs_diff_eq!(back.logp, -&forward.logp, epsilon = 1e-12);
    }

    #[test]
    fn training_updates_running_statistics() {
        let mut norm = MovingBatchNorm::new(2, 0.0, false).unwrap();

        norm.forward(samples().view(), None).unwrap();

        // Batch mean [4, 1], unbiased batch variance [20/3, 20/3].
        assert_relative_eq!(norm.running_mean()[0], 0.1 * 4.0);
        assert_relative_eq!(norm.running_mean()[1], 0.1 * 1.0);
        assert_relative_eq!(norm.running_var()[0], 0.9 + 0.1 * 20.0 / 3.0);
        assert_eq!(norm.step(), 1);

        norm.set_training(false);
        norm.forward(samples().view(), None).unwrap();
        assert_eq!(norm.step(), 1);
    }

    #[test]
    fn zero_lag_normalizes_with_running_statistics() {
        let mut trained = MovingBatchNorm::new(2, 0.0, false).unwrap();
        let mut frozen = MovingBatchNorm::new(2, 0.0, false).unwrap();
        frozen.set_training(false);

        let a = trained.forward(samples().view(), None).unwrap();
        let b = frozen.forward(samples().view(), None).unwrap();

        assert_abs_diff_eq!(a.z, b.z, epsilon = 1e-12);
    }

    #[test]
    fn lag_blends_in_batch_statistics() {
        let mut norm = MovingBatchNorm::new(2, 0.5, true).unwrap();

        let out = norm.forward(samples().view(), None).unwrap();

        // First step: (0.5·batch + 0.5·running) / (1 - 0.5) = batch + running.
        // Synced variance is biased: [5, 5].
        let mean = array![4.0, 1.0];
        let var = array![6.0, 6.0];
        let expected = (samples() - &mean) / var.mapv(|v: f64| (v + MovingBatchNorm::EPS).sqrt());
        assert_abs_diff_eq!(out.z, expected, epsilon = 1e-12);
        assert!(norm.is_synced());
    }

    #[test]
    fn inverse_never_touches_statistics() {
        let mut norm = MovingBatchNorm::new(2, 0.0, false).unwrap();
        norm.inverse(samples().view(), None).unwrap();

        assert_eq!(norm.step(), 0);
        assert_eq!(norm.running_mean(), &array![0.0, 0.0]);
    }

    #[test]
    fn construction_is_validated() {
        assert!(matches!(
            MovingBatchNorm::new(0, 0.0, false),
            Err(ConfigError::NonPositiveDim { .. })
        ));
        assert!(matches!(
            MovingBatchNorm::new(3, 1.0, false),
            Err(ConfigError::BnLag)
        ));
        assert!(matches!(
            MovingBatchNorm::new(3, -0.1, false),
            Err(ConfigError::BnLag)
        ));
    }

    #[test]
    fn width_is_checked() {
        let mut norm = MovingBatchNorm::new(3, 0.0, false).unwrap();
        let err = norm.forward(samples().view(), None).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Shape(ShapeError::StateWidth {
                expected: 3,
                found: 2
            })
        ));
    }
}
