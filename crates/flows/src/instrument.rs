//! Cost introspection over a model's component tree.
//!
//! Each function folds over every component reachable from the root,
//! visiting shared components once. Calling them never changes the model.

use cnflow_core::{Module, fold_modules, fold_parameters};

/// Total field evaluations performed by every flow block so far.
///
/// Zero for a model that has not been run or whose counters were reset.
pub fn count_nfe(model: &dyn Module) -> usize {
    fold_modules(model, 0, |acc, module| acc + module.num_evals().unwrap_or(0))
}

/// Sum of the effective horizons `T = (√T)²` of every flow block.
///
/// A proxy for integration cost, available before any forward pass.
pub fn count_total_time(model: &dyn Module) -> f64 {
    fold_modules(model, 0.0, |acc, module| {
        acc + module.integration_time().unwrap_or(0.0)
    })
}

/// Number of trainable scalars, excluding frozen parameters.
pub fn count_parameters(model: &dyn Module) -> usize {
    fold_parameters(model, 0, |acc, param| {
        if param.requires_grad() {
            acc + param.numel()
        } else {
            acc
        }
    })
}
