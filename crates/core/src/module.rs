//! The component tree that every flow model is made of.
//!
//! A [`Module`] owns zero or more sub-modules and zero or more
//! [`Parameter`]s. Instrumentation never inspects concrete types. It walks
//! the tree with [`fold_modules`] and asks each node what it contributes,
//! through hooks whose default contribution is nothing.

use std::{collections::HashSet, sync::Arc};

use ndarray::{Array, Dimension};

/// A node in a model's component tree.
pub trait Module {
    /// A short, human-readable name for the node type.
    fn name(&self) -> &'static str;

    /// Returns the directly owned sub-modules, in order.
    fn children(&self) -> Vec<&dyn Module> {
        Vec::new()
    }

    /// Returns the directly owned parameters (not those of children).
    fn parameters(&self) -> Vec<&dyn Parameter> {
        Vec::new()
    }

    /// Number of ODE function evaluations performed so far, for nodes that
    /// integrate an ODE.
    fn num_evals(&self) -> Option<usize> {
        None
    }

    /// Effective integration horizon, for nodes that integrate an ODE.
    fn integration_time(&self) -> Option<f64> {
        None
    }

    /// Address identifying the node's storage.
    ///
    /// Two handles to the same shared node must report the same identity, so
    /// wrappers such as [`Arc`] forward to their target.
    fn identity(&self) -> *const () {
        std::ptr::from_ref(self).cast()
    }
}

impl<M: Module + ?Sized> Module for Arc<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn children(&self) -> Vec<&dyn Module> {
        (**self).children()
    }

    fn parameters(&self) -> Vec<&dyn Parameter> {
        (**self).parameters()
    }

    fn num_evals(&self) -> Option<usize> {
        (**self).num_evals()
    }

    fn integration_time(&self) -> Option<f64> {
        (**self).integration_time()
    }

    fn identity(&self) -> *const () {
        (**self).identity()
    }
}

/// A tensor of values owned by a module.
pub trait Parameter {
    /// Number of scalar elements.
    fn numel(&self) -> usize;

    /// Whether the values are updated by training.
    fn requires_grad(&self) -> bool;

    /// Address identifying the parameter's storage.
    fn identity(&self) -> *const ();
}

/// An n-dimensional parameter tensor with a trainable flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Param<D: Dimension> {
    value: Array<f64, D>,
    requires_grad: bool,
}

impl<D: Dimension> Param<D> {
    /// Creates a trainable parameter.
    pub fn new(value: Array<f64, D>) -> Self {
        Self {
            value,
            requires_grad: true,
        }
    }

    /// Creates a parameter that training leaves untouched.
    pub fn frozen(value: Array<f64, D>) -> Self {
        Self {
            value,
            requires_grad: false,
        }
    }

    pub fn value(&self) -> &Array<f64, D> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Array<f64, D> {
        &mut self.value
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }
}

impl<D: Dimension> Parameter for Param<D> {
    fn numel(&self) -> usize {
        self.value.len()
    }

    fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    fn identity(&self) -> *const () {
        std::ptr::from_ref(self).cast()
    }
}

/// Folds over every module reachable from `root`, depth first, parents
/// before children.
///
/// Each node is visited once even if it is reachable along several paths.
/// Nodes are told apart by [`Module::identity`] together with
/// [`Module::name`], since a node and its first field may share an address.
pub fn fold_modules<T, F>(root: &dyn Module, init: T, mut f: F) -> T
where
    F: FnMut(T, &dyn Module) -> T,
{
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    let mut acc = init;

    while let Some(module) = stack.pop() {
        if !seen.insert((module.identity(), module.name())) {
            continue;
        }
        acc = f(acc, module);
        // Reverse so the first child is visited first.
        stack.extend(module.children().into_iter().rev());
    }

    acc
}

/// Folds over every distinct parameter reachable from `root`.
pub fn fold_parameters<T, F>(root: &dyn Module, init: T, mut f: F) -> T
where
    F: FnMut(T, &dyn Parameter) -> T,
{
    let mut seen = HashSet::new();
    fold_modules(root, init, |acc, module| {
        module
            .parameters()
            .into_iter()
            .filter(|param| seen.insert(param.identity()))
            .fold(acc, &mut f)
    })
}
