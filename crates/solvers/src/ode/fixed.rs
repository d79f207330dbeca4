use cnflow_core::{OdeFunction, OdeState};

use super::{Error, Solution, Stats, step::{Counted, Stages}, tableau::Tableau};

/// Integrates on a uniform grid of `ceil(|t1 - t0| / step_size)` steps.
pub(crate) fn integrate<F: OdeFunction>(
    func: &F,
    initial: F::State,
    [t0, t1]: [f64; 2],
    tab: &Tableau,
    step_size: f64,
    max_steps: usize,
) -> Result<Solution<F::State>, Error> {
    let span = t1 - t0;
    let steps = (span.abs() / step_size).ceil() as usize;
    if steps > max_steps {
        return Err(Error::StepBudgetExhausted {
            t: t0,
            steps: max_steps,
        });
    }

    let func = Counted::new(func);
    let h = span / steps as f64;
    let mut y = initial;

    for n in 0..steps {
        let t = t0 + n as f64 * h;
        let k0 = func.eval(t, &y)?;
        let stages = Stages::compute(&func, tab, t, &y, h, k0)?;
        y = stages.combine(&y, h, tab.b);

        if !y.is_finite() {
            return Err(Error::NonFinite { t: t + h });
        }
    }

    Ok(Solution {
        state: y,
        stats: Stats {
            evaluations: func.evaluations(),
            accepted_steps: steps,
            rejected_steps: 0,
        },
    })
}
