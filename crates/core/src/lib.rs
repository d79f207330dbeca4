//! Core traits and types for the cnflow workspace.
//!
//! This crate defines the shared abstractions that the solvers and the flow
//! models build on:
//!
//! - [`OdeFunction`]: the right-hand side `dy/dt = f(t, y)` of an ODE
//! - [`OdeState`]: a state the Runge-Kutta solvers can step
//! - [`Module`] / [`Parameter`]: the component tree of a model, with
//!   [`fold_modules`] and [`fold_parameters`] reducing over it
//! - [`NonNegative`] / [`LearnableNonNegative`]: non-negative values,
//!   including a trainable scalar stored in a square-root basis

mod module;
mod non_negative;
mod ode;
mod state;

pub use module::{Module, Param, Parameter, fold_modules, fold_parameters};
pub use non_negative::{LearnableNonNegative, NonNegative};
pub use ode::{FnOde, OdeFunction};
pub use state::OdeState;
