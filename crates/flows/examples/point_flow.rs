//! Builds the point and latent presets, runs a batch through the point flow
//! and back, and prints the cost counters.
//!
//! Run with `RUST_LOG=cnflow=debug` to see the builder and solver logs.

use cnflow::{
    Dims, Flow, HyperParams, count_nfe, count_parameters, count_total_time, latent_cnf, point_cnf,
};
use ndarray::Array2;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let hp = HyperParams {
        dims: Dims::new(vec![64, 64]),
        latent_dims: Dims::new(vec![64]),
        zdim: 16,
        num_blocks: 2,
        seed: Some(17),
        ..HyperParams::default()
    };

    let mut point = point_cnf(&hp)?;
    let latent = latent_cnf(&hp)?;
    point.set_training(false);

    let points = Array2::from_shape_fn((128, hp.input_dim), |(i, j)| {
        ((i * hp.input_dim + j) as f64 * 0.37).sin()
    });
    let code = Array2::from_shape_fn((1, hp.zdim), |(_, j)| (j as f64 * 0.11).cos());

    let out = point.forward(points.view(), Some(code.view()))?;
    let back = point.inverse(out.z.view(), Some(code.view()))?;
    let max_error = (&back.z - &points)
        .iter()
        .fold(0.0_f64, |acc, d| acc.max(d.abs()));

    println!("point CNF: {} stages", point.len());
    println!("  parameters:      {}", count_parameters(&point));
    println!("  evaluations:     {}", count_nfe(&point));
    println!("  total time:      {:.4}", count_total_time(&point));
    println!("  round-trip error {max_error:.2e}");
    println!("latent CNF: {} stages", latent.len());
    println!("  parameters:      {}", count_parameters(&latent));

    Ok(())
}
