use std::cell::Cell;

use cnflow_core::{OdeFunction, OdeState};

use super::{Error, tableau::Tableau};

/// An ODE function wrapper that counts evaluations.
pub(crate) struct Counted<'a, F> {
    func: &'a F,
    evaluations: Cell<usize>,
}

impl<'a, F: OdeFunction> Counted<'a, F> {
    pub(crate) fn new(func: &'a F) -> Self {
        Self {
            func,
            evaluations: Cell::new(0),
        }
    }

    pub(crate) fn eval(&self, t: f64, state: &F::State) -> Result<F::State, Error> {
        self.evaluations.set(self.evaluations.get() + 1);
        self.func.evaluate(t, state).map_err(Error::function)
    }

    pub(crate) fn evaluations(&self) -> usize {
        self.evaluations.get()
    }
}

/// Stage derivatives of one Runge-Kutta step, `k[0]` being `f(t, y)`.
pub(crate) struct Stages<S> {
    pub(crate) k: Vec<S>,
}

impl<S: OdeState> Stages<S> {
    /// Evaluates stages `1..` of `tab`, given the first stage `k0`.
    pub(crate) fn compute<F>(
        func: &Counted<'_, F>,
        tab: &Tableau,
        t: f64,
        y: &S,
        h: f64,
        k0: S,
    ) -> Result<Self, Error>
    where
        F: OdeFunction<State = S>,
    {
        let mut k = Vec::with_capacity(tab.stages());
        k.push(k0);

        for i in 1..tab.stages() {
            let terms: Vec<(f64, &S)> = tab.a[i]
                .iter()
                .zip(&k)
                .map(|(a, k_j)| (h * a, k_j))
                .collect();
            let y_i = y.offset(&terms);
            let k_i = func.eval(t + tab.c[i] * h, &y_i)?;
            k.push(k_i);
        }

        Ok(Self { k })
    }

    /// Returns `y + h·Σ wⱼ·kⱼ`.
    pub(crate) fn combine(&self, y: &S, h: f64, weights: &[f64]) -> S {
        let terms: Vec<(f64, &S)> = weights
            .iter()
            .zip(&self.k)
            .map(|(w, k_j)| (h * w, k_j))
            .collect();
        y.offset(&terms)
    }

    /// Hands back the final stage derivative.
    pub(crate) fn into_last(mut self) -> Option<S> {
        self.k.pop()
    }
}
