use cnflow_core::{OdeFunction, OdeState};
use tracing::trace;

use super::{
    Config, Error, Solution, Stats,
    step::{Counted, Stages},
    tableau::Tableau,
};

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

/// Integrates with an embedded, first-same-as-last Runge-Kutta pair.
///
/// Steps are accepted when the RMS of the scaled local error is at most one.
/// After every attempt the step is rescaled by
/// `SAFETY · ratio^(-1/order)`, clamped to `[MIN_FACTOR, MAX_FACTOR]` and
/// never grown after a rejection.
pub(crate) fn integrate<F: OdeFunction>(
    func: &F,
    initial: F::State,
    [t0, t1]: [f64; 2],
    tab: &Tableau,
    b_err: &[f64],
    config: &Config,
) -> Result<Solution<F::State>, Error> {
    let func = Counted::new(func);
    let direction = (t1 - t0).signum();
    let (atol, rtol) = (config.atol(), config.rtol());

    let mut t = t0;
    let mut y = initial;
    let mut k0 = func.eval(t, &y)?;
    let mut h = direction * initial_step(&func, t, &y, &k0, tab.order, config, t1 - t0)?;

    let mut accepted = 0;
    let mut rejected = 0;

    while (t1 - t) * direction > 0.0 {
        if accepted + rejected >= config.max_steps() {
            return Err(Error::StepBudgetExhausted {
                t,
                steps: config.max_steps(),
            });
        }

        // A step that would leave less than an underflowing remainder is
        // stretched to land on t1.
        let last = (t + h - t1) * direction >= -16.0 * f64::EPSILON * t1.abs().max(1.0);
        if last {
            h = t1 - t;
        }
        if h.abs() <= 16.0 * f64::EPSILON * t.abs().max(1.0) {
            return Err(Error::StepSizeUnderflow { t, step: h });
        }

        let stages = Stages::compute(&func, tab, t, &y, h, k0.clone())?;
        let y_next = stages.combine(&y, h, tab.b);
        let error = stages.combine(&y.zeros_like(), h, b_err);

        let ratio = if y_next.is_finite() {
            y.error_ratio(&error, &y_next, atol, rtol)
        } else {
            f64::INFINITY
        };

        let accept = ratio <= 1.0;
        if accept {
            t = if last { t1 } else { t + h };
            y = y_next;
            // Rows are first-same-as-last, so the final stage is f(t + h, y_next).
            k0 = match stages.into_last() {
                Some(k) => k,
                None => func.eval(t, &y)?,
            };
            accepted += 1;
        } else {
            rejected += 1;
            trace!(t, step = h, ratio, "rejected step");
        }

        let factor = if ratio == 0.0 {
            MAX_FACTOR
        } else if ratio.is_finite() {
            (SAFETY * ratio.powf(-1.0 / f64::from(tab.order))).clamp(MIN_FACTOR, MAX_FACTOR)
        } else {
            MIN_FACTOR
        };
        h *= if accept { factor } else { factor.min(1.0) };
    }

    Ok(Solution {
        state: y,
        stats: Stats {
            evaluations: func.evaluations(),
            accepted_steps: accepted,
            rejected_steps: rejected,
        },
    })
}

/// Chooses a first step size following Hairer, Nørsett & Wanner (II.4).
///
/// `span` is the signed length of the integration interval. Costs one
/// evaluation and returns a positive magnitude no larger than `|span|`.
fn initial_step<F: OdeFunction>(
    func: &Counted<'_, F>,
    t0: f64,
    y0: &F::State,
    f0: &F::State,
    order: u32,
    config: &Config,
    span: f64,
) -> Result<f64, Error> {
    let (atol, rtol) = (config.atol(), config.rtol());
    let direction = span.signum();
    let span = span.abs();

    let d0 = y0.error_ratio(y0, y0, atol, rtol);
    let d1 = y0.error_ratio(f0, y0, atol, rtol);

    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    }
    .min(span);

    let y1 = y0.offset(&[(direction * h0, f0)]);
    let f1 = func.eval(t0 + direction * h0, &y1)?;
    let df = f1.offset(&[(-1.0, f0)]);
    let d2 = y0.error_ratio(&df, y0, atol, rtol) / h0;

    let h1 = if d1.max(d2) <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / f64::from(order + 1))
    };

    let h = (100.0 * h0).min(h1).min(span);
    if h.is_finite() { Ok(h) } else { Ok(h0) }
}
