use std::convert::Infallible;

use approx::assert_relative_eq;
use cnflow_core::{FnOde, OdeFunction, OdeState};
use ndarray::{Array1, array};
use thiserror::Error;

use super::{Config, Error, Method, integrate};

fn decay() -> FnOde<impl Fn(f64, &Array1<f64>) -> Array1<f64>, Array1<f64>> {
    FnOde::new(|_t: f64, y: &Array1<f64>| -y)
}

fn config(tol: f64, step_size: f64) -> Config {
    Config::new(tol, tol)
        .and_then(|c| c.with_step_size(step_size))
        .unwrap()
}

#[test]
fn every_method_approximates_exponential_decay() {
    let expected = (-1.0_f64).exp();
    let cases = [
        (Method::Euler, 3e-3),
        (Method::Midpoint, 1e-4),
        (Method::Rk4, 1e-8),
        (Method::Bosh3, 1e-5),
        (Method::Dopri5, 1e-6),
    ];

    for (method, max_err) in cases {
        let solution = integrate(&decay(), array![1.0], [0.0, 1.0], method, &config(1e-8, 0.01))
            .expect("should integrate");
        let err = (solution.state[0] - expected).abs();
        assert!(err < max_err, "{method}: error {err} exceeds {max_err}");
    }
}

#[test]
fn backward_solve_undoes_forward_solve() {
    let rotation = FnOde::new(|_t: f64, y: &Array1<f64>| array![-y[1], y[0]]);
    let y0 = array![1.0, 0.5];
    let cfg = config(1e-9, 0.01);

    for method in [Method::Dopri5, Method::Bosh3, Method::Rk4] {
        let forward = integrate(&rotation, y0.clone(), [0.0, 2.0], method, &cfg).unwrap();
        let back = integrate(&rotation, forward.state, [2.0, 0.0], method, &cfg).unwrap();

        assert_relative_eq!(back.state[0], y0[0], epsilon = 1e-6);
        assert_relative_eq!(back.state[1], y0[1], epsilon = 1e-6);
    }
}

#[test]
fn time_is_passed_to_the_function() {
    // dy/dt = t gives y(1) = 1/2 exactly for any method of order >= 2.
    let ramp = FnOde::new(|t: f64, _y: &Array1<f64>| array![t]);

    let solution = integrate(&ramp, array![0.0], [0.0, 1.0], Method::Rk4, &config(1e-6, 0.1)).unwrap();

    assert_relative_eq!(solution.state[0], 0.5, epsilon = 1e-12);
}

#[test]
fn zero_span_returns_initial_state_without_evaluating() {
    for method in Method::ALL {
        let solution = integrate(&decay(), array![3.0], [0.7, 0.7], method, &Config::default()).unwrap();

        assert_eq!(solution.state, array![3.0]);
        assert_eq!(solution.stats.evaluations, 0);
        assert_eq!(solution.stats.accepted_steps, 0);
    }
}

#[test]
fn fixed_grid_evaluations_follow_stage_count() {
    let cfg = config(1e-6, 0.25);
    let cases = [(Method::Euler, 1), (Method::Midpoint, 2), (Method::Rk4, 4)];

    for (method, stages) in cases {
        let solution = integrate(&decay(), array![1.0], [0.0, 1.0], method, &cfg).unwrap();

        assert_eq!(solution.stats.accepted_steps, 4);
        assert_eq!(solution.stats.evaluations, 4 * stages);
    }
}

#[test]
fn adaptive_evaluations_reuse_last_stage() {
    let solution = integrate(&decay(), array![1.0], [0.0, 3.0], Method::Dopri5, &config(1e-7, 0.1)).unwrap();
    let stats = solution.stats;

    // One evaluation for k0, one for the initial step guess, and six new
    // stages per attempted step.
    assert!(stats.accepted_steps > 0);
    assert_eq!(
        stats.evaluations,
        2 + 6 * (stats.accepted_steps + stats.rejected_steps)
    );
}

#[test]
fn tighter_tolerance_costs_more_evaluations() {
    let loose = integrate(&decay(), array![1.0], [0.0, 2.0], Method::Dopri5, &config(1e-3, 0.1)).unwrap();
    let tight = integrate(&decay(), array![1.0], [0.0, 2.0], Method::Dopri5, &config(1e-10, 0.1)).unwrap();

    assert!(tight.stats.evaluations > loose.stats.evaluations);
}

#[test]
fn exhausted_step_budget_fails_loudly() {
    let cfg = Config::new(1e-12, 1e-12)
        .and_then(|c| c.with_max_steps(3))
        .unwrap();

    let result = integrate(&decay(), array![1.0], [0.0, 10.0], Method::Dopri5, &cfg);

    assert!(matches!(
        result,
        Err(Error::StepBudgetExhausted { steps: 3, .. })
    ));
}

#[test]
fn fixed_grid_respects_step_budget() {
    let cfg = config(1e-6, 0.01).with_max_steps(10).unwrap();

    let result = integrate(&decay(), array![1.0], [0.0, 1.0], Method::Euler, &cfg);

    assert!(matches!(result, Err(Error::StepBudgetExhausted { .. })));
}

#[test]
fn finite_time_blow_up_is_an_error() {
    // y' = y² with y(0) = 1 blows up at t = 1.
    let blow_up = FnOde::new(|_t: f64, y: &Array1<f64>| y.mapv(|v| v * v));
    let cfg = Config::new(1e-6, 1e-6)
        .and_then(|c| c.with_max_steps(2_000))
        .unwrap();

    let result = integrate(&blow_up, array![1.0], [0.0, 2.0], Method::Dopri5, &cfg);

    assert!(matches!(
        result,
        Err(Error::StepSizeUnderflow { .. } | Error::StepBudgetExhausted { .. })
    ));
}

#[test]
fn rejects_non_finite_inputs() {
    let cfg = Config::default();

    let result = integrate(&decay(), array![f64::NAN], [0.0, 1.0], Method::Dopri5, &cfg);
    assert!(matches!(result, Err(Error::NonFinite { .. })));

    let result = integrate(&decay(), array![1.0], [0.0, f64::INFINITY], Method::Rk4, &cfg);
    assert!(matches!(result, Err(Error::InvalidSpan { .. })));
}

#[derive(Debug, Error)]
#[error("dynamics refused to evaluate at t = {0}")]
struct Refused(f64);

struct FailsAfter(f64);

impl OdeFunction for FailsAfter {
    type State = Array1<f64>;
    type Error = Refused;

    fn evaluate(&self, t: f64, state: &Array1<f64>) -> Result<Array1<f64>, Refused> {
        if t > self.0 { Err(Refused(t)) } else { Ok(state.clone()) }
    }
}

#[test]
fn function_errors_are_propagated() {
    let result = integrate(
        &FailsAfter(0.5),
        array![1.0],
        [0.0, 1.0],
        Method::Rk4,
        &config(1e-6, 0.1),
    );

    let Err(Error::Function(source)) = result else {
        panic!("expected a function error");
    };
    assert!(source.downcast_ref::<Refused>().is_some());
}

#[test]
fn infallible_functions_compile_with_any_method() {
    struct Still;

    impl OdeFunction for Still {
        type State = Array1<f64>;
        type Error = Infallible;

        fn evaluate(&self, _t: f64, state: &Array1<f64>) -> Result<Array1<f64>, Infallible> {
            Ok(state.zeros_like())
        }
    }

    for method in Method::ALL {
        let solution = integrate(&Still, array![2.0, -1.0], [1.0, 0.0], method, &config(1e-6, 0.1)).unwrap();
        assert_eq!(solution.state, array![2.0, -1.0]);
    }
}
