use cnflow_core::Module;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};

use super::{Nonlinearity, VectorField, activation::sigmoid, check_dims, check_layout, context_row, layer_shapes};
use crate::{ConfigError, ShapeError};

/// A vector field whose weights are supplied by a hypernetwork.
///
/// The field owns no parameters. Each context row is the flattened weight
/// vector of a target network `input_dim -> hidden_dims... -> input_dim`.
/// Layer `l` with shape `(in, out)` reads, in order:
///
/// - `W`: `in·out` values, row-major with one row per input feature,
/// - `b`: `out` values,
/// - time gate weight and bias: `out` values each,
/// - time bias: `out` values,
///
/// and computes `(hW + b) ⊙ σ(t·g_w + g_b) + t·h_b`.
#[derive(Debug, Clone)]
pub struct HyperNet {
    input_dim: usize,
    nonlinearity: Nonlinearity,
    shapes: Vec<(usize, usize)>,
    weight_count: usize,
}

impl HyperNet {
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `input_dim` is zero or `hidden_dims` is
    /// empty or contains a zero.
    pub fn new(
        input_dim: usize,
        hidden_dims: &[usize],
        nonlinearity: Nonlinearity,
    ) -> Result<Self, ConfigError> {
        check_dims(input_dim, hidden_dims)?;
        let shapes = layer_shapes(input_dim, hidden_dims);
        let weight_count = shapes.iter().map(|&(i, o)| i * o + 4 * o).sum();
        Ok(Self {
            input_dim,
            nonlinearity,
            shapes,
            weight_count,
        })
    }

    /// Length of the weight vector each context row must carry.
    #[must_use]
    pub fn weight_count(&self) -> usize {
        self.weight_count
    }

    fn row(
        &self,
        t: f64,
        weights: ArrayView1<'_, f64>,
        z: ArrayView1<'_, f64>,
        directions: Vec<Array1<f64>>,
    ) -> (Array1<f64>, Vec<Array1<f64>>) {
        let mut h = z.to_owned();
        let mut tangents = directions;
        let mut offset = 0;
        let last = self.shapes.len() - 1;

        for (l, &(n_in, n_out)) in self.shapes.iter().enumerate() {
            let w = take(weights, &mut offset, n_in * n_out);
            let b = take(weights, &mut offset, n_out);
            let gate_w = take(weights, &mut offset, n_out);
            let gate_b = take(weights, &mut offset, n_out);
            let shift = take(weights, &mut offset, n_out);

            let gate = (&gate_w * t + gate_b).mapv(sigmoid);
            h = (matvec(h.view(), w, n_out) + b) * &gate + &(&shift * t);
            tangents = tangents
                .iter()
                .map(|v| matvec(v.view(), w, n_out) * &gate)
                .collect();

            if l < last {
                self.nonlinearity.activate(&mut h, &mut tangents);
            }
        }

        (h, tangents)
    }
}

/// Returns the next `len` values of `weights` and advances `offset`.
pub(super) fn take<'a>(weights: ArrayView1<'a, f64>, offset: &mut usize, len: usize) -> ArrayView1<'a, f64> {
    let start = *offset;
    *offset += len;
    weights.slice_move(s![start..start + len])
}

/// Returns `xW` for `W` stored row-major as `(x.len(), out_dim)`.
pub(super) fn matvec(x: ArrayView1<'_, f64>, w: ArrayView1<'_, f64>, out_dim: usize) -> Array1<f64> {
    let mut out = Array1::zeros(out_dim);
    for (k, &xk) in x.iter().enumerate() {
        out.scaled_add(xk, &w.slice(s![k * out_dim..(k + 1) * out_dim]));
    }
    out
}

impl VectorField for HyperNet {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn context_dim(&self) -> usize {
        self.weight_count
    }

    fn velocity_with_jvp(
        &self,
        t: f64,
        z: ArrayView2<'_, f64>,
        context: Option<ArrayView2<'_, f64>>,
        directions: &[Array2<f64>],
    ) -> Result<(Array2<f64>, Vec<Array2<f64>>), ShapeError> {
        let context = check_layout(self.input_dim, self.weight_count, z, context)?.ok_or(
            ShapeError::MissingContext {
                expected: self.weight_count,
            },
        )?;

        let mut velocity = Array2::zeros(z.raw_dim());
        let mut products = vec![Array2::zeros(z.raw_dim()); directions.len()];
        for (i, z_row) in z.rows().into_iter().enumerate() {
            let row_directions = directions.iter().map(|d| d.row(i).to_owned()).collect();
            let (v, jv) = self.row(t, context_row(context, i), z_row, row_directions);

            velocity.row_mut(i).assign(&v);
            for (product, row) in products.iter_mut().zip(&jv) {
                product.row_mut(i).assign(row);
            }
        }

        Ok((velocity, products))
    }
}

impl Module for HyperNet {
    fn name(&self) -> &'static str {
        "HyperNet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use cnflow_core::fold_parameters;
    use ndarray::{Array, array};

    fn weights(count: usize, rows: usize) -> Array2<f64> {
        Array::from_shape_fn((rows, count), |(r, i)| {
            ((i * 7 + r * 3) % 11) as f64 / 11.0 - 0.5
        })
    }

    #[test]
    fn weight_count_covers_every_layer() {
        let field = HyperNet::new(3, &[4], Nonlinearity::Tanh).unwrap();

        assert_eq!(field.weight_count(), (3 * 4 + 4 * 4) + (4 * 3 + 4 * 3));
        assert_eq!(field.context_dim(), field.weight_count());
        assert_eq!(fold_parameters(&field, 0, |acc, p| acc + p.numel()), 0);
    }

    #[test]
    fn single_layer_matches_hand_computation() {
        // Identity nonlinearity and no hidden layers beyond one of width 1.
        let field = HyperNet::new(1, &[1], Nonlinearity::Identity).unwrap();
        // Layer 1: w = 2, b = 1, gate 0/0 (σ = 0.5), shift = 4.
        // Layer 2: w = 3, b = 0, gate 0/0, shift = 0.
        let context = array![[2.0, 1.0, 0.0, 0.0, 4.0, 3.0, 0.0, 0.0, 0.0, 0.0]];
        let z = array![[1.0]];
        let t = 0.5;

        let v = field.velocity(t, z.view(), Some(context.view())).unwrap();

        let h1: f64 = (1.0 * 2.0 + 1.0) * 0.5 + t * 4.0;
        let h2 = (h1 * 3.0) * 0.5;
        assert_abs_diff_eq!(v[[0, 0]], h2, epsilon = 1e-14);
    }

    #[test]
    fn jacobian_vector_products_match_finite_differences() {
        let field = HyperNet::new(2, &[5, 3], Nonlinearity::Tanh).unwrap();
        let context = weights(field.weight_count(), 2);
        let z = array![[0.3, -0.1], [0.8, 0.4]];
        let v = array![[1.0, 0.0], [0.5, -2.0]];
        let h = 1e-6;

        let (_, jvp) = field
            .velocity_with_jvp(0.4, z.view(), Some(context.view()), std::slice::from_ref(&v))
            .unwrap();
        let up = field
            .velocity(0.4, (&z + &(&v * h)).view(), Some(context.view()))
            .unwrap();
        let down = field
            .velocity(0.4, (&z - &(&v * h)).view(), Some(context.view()))
            .unwrap();

        assert_abs_diff_eq!(jvp[0], (up - down) / (2.0 * h), epsilon = 1e-6);
    }

    #[test]
    fn weights_are_required() {
        let field = HyperNet::new(2, &[4], Nonlinearity::Tanh).unwrap();
        let z = Array2::<f64>::zeros((3, 2));

        assert!(matches!(
            field.velocity(0.0, z.view(), None),
            Err(ShapeError::MissingContext { .. })
        ));

        let short = Array2::<f64>::zeros((1, field.weight_count() - 1));
        assert!(matches!(
            field.velocity(0.0, z.view(), Some(short.view())),
            Err(ShapeError::ContextWidth { .. })
        ));
    }
}
