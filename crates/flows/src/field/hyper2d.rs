use cnflow_core::Module;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::{
    Nonlinearity, VectorField, check_dims, check_layout, context_row,
    hyper::{matvec, take},
    layer_shapes,
};
use crate::{ConfigError, ShapeError};

/// A hypernetwork-conditioned field whose layers are full 2-D weight
/// matrices over the concatenated input `[h, t]`.
///
/// Layer `l` with shape `(in, out)` reads an `(in + 1, out)` matrix,
/// row-major with the time row last, followed by `out` bias values. Like
/// [`HyperNet`](super::HyperNet) it owns no parameters.
#[derive(Debug, Clone)]
pub struct HyperNet2D {
    input_dim: usize,
    nonlinearity: Nonlinearity,
    shapes: Vec<(usize, usize)>,
    weight_count: usize,
}

impl HyperNet2D {
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
        let weight_count = shapes.iter().map(|&(i, o)| (i + 1) * o + o).sum();
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
        mut tangents: Vec<Array1<f64>>,
    ) -> (Array1<f64>, Vec<Array1<f64>>) {
        let mut h = z.to_owned();
        let mut offset = 0;
        let last = self.shapes.len() - 1;

        for (l, &(n_in, n_out)) in self.shapes.iter().enumerate() {
            let w = take(weights, &mut offset, n_in * n_out);
            let w_t = take(weights, &mut offset, n_out);
            let b = take(weights, &mut offset, n_out);

            h = matvec(h.view(), w, n_out) + &(&w_t * t) + b;
            tangents = tangents
                .iter()
                .map(|v| matvec(v.view(), w, n_out))
                .collect();

            if l < last {
                self.nonlinearity.activate(&mut h, &mut tangents);
            }
        }

        (h, tangents)
    }
}

impl VectorField for HyperNet2D {
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

impl Module for HyperNet2D {
    fn name(&self) -> &'static str {
        "HyperNet2D"
    }
}
