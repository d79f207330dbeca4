//! Named model configurations.

use tracing::{debug, info};

use crate::{
    ConfigError, HyperParams, SequentialFlow, build_hyper, build_hyper_2d, build_model,
    count_parameters,
};

/// The point-space flow: `hp.input_dim` features, conditioned on a latent
/// code of width `hp.zdim`, with `hp.num_blocks` blocks of widths `hp.dims`.
///
/// # Errors
///
/// See [`build_model`].
pub fn point_cnf(hp: &HyperParams) -> Result<SequentialFlow, ConfigError> {
    let model = build_model(hp, hp.input_dim, &hp.dims, hp.zdim, hp.num_blocks, true)?;
    info!(
        parameters = count_parameters(&model),
        "number of trainable parameters of point CNF"
    );
    Ok(model)
}

/// The latent-space flow: `hp.zdim` features, never conditioned, with
/// `hp.latent_num_blocks` blocks of widths `hp.latent_dims`.
///
/// # Errors
///
/// See [`build_model`].
pub fn latent_cnf(hp: &HyperParams) -> Result<SequentialFlow, ConfigError> {
    let model = build_model(hp, hp.zdim, &hp.latent_dims, 0, hp.latent_num_blocks, false)?;
    info!(
        parameters = count_parameters(&model),
        "number of trainable parameters of latent CNF"
    );
    Ok(model)
}

/// A conditional hypernetwork flow with `hp.num_blocks` blocks.
///
/// # Errors
///
/// See [`build_hyper`].
pub fn hyper_cnf(hp: &HyperParams) -> Result<SequentialFlow, ConfigError> {
    let model = build_hyper(hp, hp.num_blocks, true)?;
    debug!(stages = model.len(), "built hypernetwork CNF");
    Ok(model)
}

/// A conditional 2-D hypernetwork flow with `hp.num_blocks` blocks.
///
/// # Errors
///
/// See [`build_hyper_2d`].
pub fn hyper_cnf_2d(hp: &HyperParams) -> Result<SequentialFlow, ConfigError> {
    let model = build_hyper_2d(hp, hp.num_blocks, true)?;
    debug!(stages = model.len(), "built 2-D hypernetwork CNF");
    Ok(model)
}
