use super::*;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use cnflow_core::fold_parameters;
use ndarray::{Array1, Array2, array};

use crate::ShapeError;

/// `dz/dt = z ⊙ rates`, so `z(T) = z(0)·exp(rates·T)` and the log-density
/// drops by `T·Σ rates`. A context, when used, scales the rates by its first
/// entry.
struct Diagonal {
    rates: Array1<f64>,
    context_dim: usize,
}

impl Module for Diagonal {
    fn name(&self) -> &'static str {
        "Diagonal"
    }
}

impl VectorField for Diagonal {
    fn input_dim(&self) -> usize {
        self.rates.len()
    }

    fn context_dim(&self) -> usize {
        self.context_dim
    }

    fn velocity_with_jvp(
        &self,
        _t: f64,
        z: ArrayView2<'_, f64>,
        context: Option<ArrayView2<'_, f64>>,
        directions: &[Array2<f64>],
    ) -> Result<(Array2<f64>, Vec<Array2<f64>>), crate::ShapeError> {
        let scale = match (self.context_dim, context) {
            (0, None) => 1.0,
            (width, Some(context)) if width > 0 && context.ncols() == width => context[[0, 0]],
            (expected, context) => {
                return Err(ShapeError::ContextWidth {
                    expected,
                    found: context.map_or(0, |c| c.ncols()),
                });
            }
        };
        let rates = &self.rates * scale;
        let products = directions.iter().map(|v| v * &rates).collect();
        Ok((&z * &rates, products))
    }
}

fn config(time_length: f64) -> BlockConfig {
    let mut config = BlockConfig::new(NonNegative::new(time_length).unwrap());
    config.solver = ode::Config::new(1e-9, 1e-9).unwrap();
    config
}

fn block(rates: Array1<f64>, config: &BlockConfig) -> FlowBlock {
    let field = Diagonal {
        rates,
        context_dim: 0,
    };
    FlowBlock::new(Box::new(field), config, 0)
}

#[test]
fn forward_integrates_state_and_log_density() {
    let mut block = block(array![0.5, -1.0], &config(0.8));
    let x = array![[1.0, 2.0], [-3.0, 0.5]];

    let out = block.forward(x.view(), None).unwrap();

    let expected = array![[0.4_f64.exp(), 2.0 * (-0.8_f64).exp()], [
        -3.0 * 0.4_f64.exp(),
        0.5 * (-0.8_f64).exp()
    ]];
    assert_abs_diff_eq!(out.z, expected, epsilon = 1e-7);
    // -T·Σ rates = -0.8·(-0.5) = 0.4
    assert_abs_diff_eq!(out.logp, array![0.4, 0.4], epsilon = 1e-7);
}

#[test]
fn inverse_undoes_forward() {
    let mut block = block(array![0.7, -0.2, 1.1], &config(0.5));
    let x = array![[0.3, -1.2, 2.0]];

    let forward = block.forward(x.view(), None).unwrap();
    let back = block.inverse(forward.z.view(), None).unwrap();

    assert_abs_diff_eq!(back.z, x, epsilon = 1e-7);
    assert_abs_diff_eq!(back.logp, -&forward.logp, epsilon = 1e-7);
}

#[test]
fn evaluations_accumulate_until_reset() {
    let mut block = block(array![1.0], &config(1.0));
    let x = array![[1.0]];
    assert_eq!(block.num_evals(), 0);

    block.forward(x.view(), None).unwrap();
    let first = block.num_evals();
    block.forward(x.view(), None).unwrap();

    assert!(first > 0);
    assert_eq!(block.num_evals(), 2 * first);

    block.reset_num_evals();
    assert_eq!(block.num_evals(), 0);
}

#[test]
fn zero_horizon_is_the_identity() {
    let mut block = block(array![3.0, -2.0], &config(0.0));
    let x = array![[1.0, 2.0]];

    let out = block.forward(x.view(), None).unwrap();

    assert_eq!(out.z, x);
    assert_eq!(out.logp, array![0.0]);
    assert_eq!(block.num_evals(), 0);
}

#[test]
fn horizon_stays_non_negative_under_updates() {
    let mut block = block(array![1.0], &config(0.5));

    for delta in [-0.4, -1.5, 0.2, 0.9, -0.6] {
        block.apply_update(delta);
        assert!(block.end_time().into_inner() >= 0.0);
        assert_relative_eq!(block.end_time().into_inner(), block.horizon().raw().powi(2));
    }

    // A solve with the updated horizon still runs forward in time.
    let out = block.forward(array![[1.0]].view(), None).unwrap();
    assert!(out.z[[0, 0]] >= 1.0);
}

#[test]
fn fixed_horizon_is_not_trainable() {
    let mut frozen_config = config(0.5);
    frozen_config.train_t = false;
    let mut frozen = block(array![1.0], &frozen_config);
    let trainable = block(array![1.0], &config(0.5));

    frozen.apply_update(1.0);

    assert_relative_eq!(frozen.end_time().into_inner(), 0.5, epsilon = 1e-15);
    let trainable_count = |m: &dyn Module| {
        fold_parameters(m, 0, |acc, p| if p.requires_grad() { acc + p.numel() } else { acc })
    };
    assert_eq!(trainable_count(&frozen), 0);
    assert_eq!(trainable_count(&trainable), 1);
}

#[test]
fn unconditional_block_ignores_context() {
    let mut block = block(array![1.0], &config(0.1));
    let context = array![[1.0, 2.0, 3.0]];

    assert!(block.forward(array![[1.0]].view(), Some(context.view())).is_ok());
}

#[test]
fn conditional_block_requires_context() {
    let mut config = config(0.1);
    config.conditional = true;
    let field = Diagonal {
        rates: array![1.0],
        context_dim: 2,
    };
    let mut block = FlowBlock::new(Box::new(field), &config, 0);

    let err = block.forward(array![[1.0]].view(), None).unwrap_err();

    assert!(matches!(
        err,
        FlowError::Shape(ShapeError::MissingContext { expected: 2 })
    ));
    assert_eq!(block.num_evals(), 0);

    let context = array![[0.5, 0.5]];
    assert!(block.forward(array![[1.0]].view(), Some(context.view())).is_ok());
}

#[test]
fn conditional_block_withholds_context_from_fields_without_one() {
    let mut config = config(0.5);
    config.conditional = true;
    let mut block = block(array![1.0], &config);
    let context = array![[3.0, 4.0]];

    let out = block
        .forward(array![[1.0]].view(), Some(context.view()))
        .unwrap();

    assert_relative_eq!(out.z[[0, 0]], 0.5_f64.exp(), epsilon = 1e-7);
}

#[test]
fn context_only_needs_to_outlive_the_call() {
    let mut config = config(0.5);
    config.conditional = true;
    let field = Diagonal {
        rates: array![1.0],
        context_dim: 1,
    };
    let mut block = FlowBlock::new(Box::new(field), &config, 0);
    let x = array![[1.0]];

    for scale in [0.5, -1.0, 2.0] {
        let out = {
            let context = array![[scale]];
            block.forward(x.view(), Some(context.view())).unwrap()
        };
        assert_relative_eq!(out.z[[0, 0]], (0.5 * scale).exp(), epsilon = 1e-7);
        assert_relative_eq!(out.logp[0], -0.5 * scale, epsilon = 1e-7);
    }
}

#[test]
fn state_width_is_checked() {
    let mut block = block(array![1.0, 1.0], &config(0.1));

    let err = block
        .forward(Array2::zeros((4, 3)).view(), None)
        .unwrap_err();

    assert!(matches!(
        err,
        FlowError::Shape(ShapeError::StateWidth {
            expected: 2,
            found: 3
        })
    ));
}

#[test]
fn failed_solve_is_an_error_and_still_counts() {
    let mut config = config(1.0);
    config.solver = ode::Config::new(1e-12, 1e-12)
        .unwrap()
        .with_max_steps(1)
        .unwrap();
    let mut block = block(array![5.0], &config);

    let err = block.forward(array![[1.0]].view(), None).unwrap_err();

    assert!(matches!(
        err,
        FlowError::Solve(ode::Error::StepBudgetExhausted { .. })
    ));
    assert!(block.num_evals() > 0);
}

#[test]
fn divergence_follows_training_mode() {
    let mut config = config(0.1);
    config.train_divergence = Divergence::Hutchinson;
    let mut block = block(array![1.0], &config);

    assert!(block.is_training());
    assert_eq!(block.divergence(), Divergence::Hutchinson);

    block.set_training(false);
    assert_eq!(block.divergence(), Divergence::Exact);
}

#[test]
fn hutchinson_estimate_only_scales_the_log_density() {
    // With one feature, εᵀJε = ε²·rate, so only the sample magnitude varies.
    let mut config = config(0.2);
    config.train_divergence = Divergence::Hutchinson;
    let mut block = block(array![1.0], &config);

    let out = block.forward(array![[1.0]].view(), None).unwrap();

    assert_relative_eq!(out.z[[0, 0]], 0.2_f64.exp(), epsilon = 1e-7);
    assert!(out.logp[0] <= 0.0);
}

#[test]
fn debug_output_names_the_field() {
    let block = block(array![1.0], &config(0.5));
    let debug = format!("{block:?}");
    assert!(debug.contains("Diagonal"));
    assert!(debug.contains("end_time"));
}
