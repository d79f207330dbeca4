//! Tabular training data for flow models.
//!
//! A dataset directory holds a `train_data` folder of CSV files. Every file
//! carries the same feature columns plus the target columns `VALENCE` and
//! `AROUSAL`; rows from all files are concatenated in file-name order.

mod dataset;
mod error;

pub use dataset::{DatasetConfig, TabularDataset};
pub use error::Error;
