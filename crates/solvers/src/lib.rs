//! Numerical solvers for the cnflow workspace.
//!
//! - [`ode`]: fixed-grid and adaptive explicit Runge-Kutta integration of
//!   [`OdeFunction`](cnflow_core::OdeFunction)s, used by every flow block

pub mod ode;
