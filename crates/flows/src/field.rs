//! Vector fields that drive a flow block.
//!
//! A field maps `(t, z, context)` to a velocity with the shape of `z`. Flow
//! blocks only see the [`VectorField`] trait, so the plain, hypernetwork, and
//! 2-D hypernetwork parameterizations are interchangeable as dynamics.
//!
//! # Context layout
//!
//! A context has shape `(rows, context_dim)`. It either supplies one row per
//! state row, or a single row shared by every state row (one latent code for
//! a whole point cloud). Any other row count is a [`ShapeError`].
//!
//! # Jacobian-vector products
//!
//! [`VectorField::velocity_with_jvp`] pushes tangent directions through the
//! network alongside the state (forward-mode differentiation with respect to
//! `z`). The log-density dynamics use these products to form the divergence.

mod activation;
mod hyper;
mod hyper2d;
mod layer;
mod odenet;

pub use activation::Nonlinearity;
pub use hyper::HyperNet;
pub use hyper2d::HyperNet2D;
pub use layer::{DiffEqLayer, LayerType};
pub use odenet::OdeNet;

use cnflow_core::Module;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::{ConfigError, ShapeError};

/// A learnable velocity field `f(t, z, c)`.
pub trait VectorField: Module {
    /// Number of features per state row.
    fn input_dim(&self) -> usize;

    /// Number of context features, or zero if the field ignores context.
    fn context_dim(&self) -> usize;

    /// Returns the velocity at `(t, z)` together with the Jacobian-vector
    /// product `J·v` for each direction `v` in `directions`.
    ///
    /// Every direction has the shape of `z`; the products are returned in
    /// the same order.
    ///
    /// # Errors
    ///
    /// Returns a [`ShapeError`] if `z` or `context` do not match the layout
    /// the field was built for.
    fn velocity_with_jvp(
        &self,
        t: f64,
        z: ArrayView2<'_, f64>,
        context: Option<ArrayView2<'_, f64>>,
        directions: &[Array2<f64>],
    ) -> Result<(Array2<f64>, Vec<Array2<f64>>), ShapeError>;

    /// Returns the velocity at `(t, z)`.
    ///
    /// # Errors
    ///
    /// Returns a [`ShapeError`] if `z` or `context` do not match the layout
    /// the field was built for.
    fn velocity(
        &self,
        t: f64,
        z: ArrayView2<'_, f64>,
        context: Option<ArrayView2<'_, f64>>,
    ) -> Result<Array2<f64>, ShapeError> {
        self.velocity_with_jvp(t, z, context, &[])
            .map(|(velocity, _)| velocity)
    }
}

/// Checks `z` and `context` against a field's layout.
///
/// Returns the context to use, which is `None` for fields without context.
pub(crate) fn check_layout<'a>(
    input_dim: usize,
    context_dim: usize,
    z: ArrayView2<'_, f64>,
    context: Option<ArrayView2<'a, f64>>,
) -> Result<Option<ArrayView2<'a, f64>>, ShapeError> {
    if z.ncols() != input_dim {
        return Err(ShapeError::StateWidth {
            expected: input_dim,
            found: z.ncols(),
        });
    }
    if context_dim == 0 {
        return Ok(None);
    }

    let context = context.ok_or(ShapeError::MissingContext {
        expected: context_dim,
    })?;
    if context.ncols() != context_dim {
        return Err(ShapeError::ContextWidth {
            expected: context_dim,
            found: context.ncols(),
        });
    }
    if context.nrows() != 1 && context.nrows() != z.nrows() {
        return Err(ShapeError::ContextRows {
            state: z.nrows(),
            context: context.nrows(),
        });
    }
    Ok(Some(context))
}

/// The context row that applies to state row `i`.
pub(crate) fn context_row<'a>(context: ArrayView2<'a, f64>, i: usize) -> ArrayView1<'a, f64> {
    if context.nrows() == 1 {
        context.index_axis_move(Axis(0), 0)
    } else {
        context.index_axis_move(Axis(0), i)
    }
}

/// Checks a network's dimension schedule.
pub(crate) fn check_dims(input_dim: usize, hidden_dims: &[usize]) -> Result<(), ConfigError> {
    if input_dim == 0 {
        return Err(ConfigError::NonPositiveDim { field: "input_dim" });
    }
    if hidden_dims.is_empty() {
        return Err(ConfigError::EmptyHiddenDims);
    }
    if hidden_dims.contains(&0) {
        return Err(ConfigError::NonPositiveDim {
            field: "hidden_dims",
        });
    }
    Ok(())
}

/// Returns `[input_dim, hidden..., input_dim]` as `(in, out)` pairs.
pub(crate) fn layer_shapes(input_dim: usize, hidden_dims: &[usize]) -> Vec<(usize, usize)> {
    let mut dims = Vec::with_capacity(hidden_dims.len() + 2);
    dims.push(input_dim);
    dims.extend_from_slice(hidden_dims);
    dims.push(input_dim);
    dims.windows(2).map(|pair| (pair[0], pair[1])).collect()
}
