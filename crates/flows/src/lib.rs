//! Continuous normalizing flows.
//!
//! A flow is a chain of invertible stages. [`FlowBlock`]s integrate a learned
//! [`VectorField`] over a trainable horizon and track the log-density change
//! through the divergence of the field. [`MovingBatchNorm`] layers keep the
//! state standardized between blocks. A [`SequentialFlow`] applies the
//! stages in order on the way forward and in reverse on the way back.
//!
//! Models are assembled from a [`HyperParams`] bundle by [`build_model`],
//! [`build_hyper`], and [`build_hyper_2d`], or through the named presets.
//! [`count_nfe`], [`count_total_time`], and [`count_parameters`] report the
//! cost of a model at any point.
//!
//! ```
//! use cnflow::{Flow, HyperParams, build_model, count_nfe};
//! use ndarray::Array2;
//!
//! let hp = HyperParams {
//!     input_dim: 2,
//!     seed: Some(0),
//!     ..HyperParams::default()
//! };
//! let mut model = build_model(&hp, 2, &[16], 0, 2, false)?;
//! model.set_training(false);
//!
//! let x = Array2::from_shape_fn((4, 2), |(i, j)| (i as f64 - 1.5) * 0.5 + j as f64);
//! let out = model.forward(x.view(), None)?;
//! let back = model.inverse(out.z.view(), None)?;
//!
//! assert!((&back.z - &x).iter().all(|d| d.abs() < 1e-3));
//! assert!(count_nfe(&model) > 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod block;
mod builder;
mod config;
mod dynamics;
mod error;
pub mod field;
mod flow;
mod instrument;
mod norm;
mod presets;
mod sequential;
mod state;

pub use block::{BlockConfig, FlowBlock, GradientMode};
pub use builder::{build_hyper, build_hyper_2d, build_model};
pub use config::{Dims, HyperParams, parse_dims};
pub use dynamics::Divergence;
pub use error::{ConfigError, FlowError, ShapeError};
pub use field::{LayerType, Nonlinearity, VectorField};
pub use flow::{Direction, Flow};
pub use instrument::{count_nfe, count_parameters, count_total_time};
pub use norm::MovingBatchNorm;
pub use presets::{hyper_cnf, hyper_cnf_2d, latent_cnf, point_cnf};
pub use sequential::{SequentialFlow, Stage};
pub use state::FlowState;

pub use cnflow_core::{Module, NonNegative};
pub use cnflow_solvers::ode::Method;
