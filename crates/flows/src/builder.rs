//! Assembly of sequential flows from a [`HyperParams`] bundle.
//!
//! All three builders share one skeleton: validate, create `num_blocks`
//! independent fields, wrap each in a [`FlowBlock`], and, when batch norm is
//! enabled, interleave normalization layers as
//! `[norm, block, norm, block, norm, ...]`, giving `1 + 2·num_blocks` stages.
//! With `num_blocks = 0` the result is the identity, or a lone leading norm.

use rand::{RngCore, rngs::StdRng};
use tracing::debug;

use crate::{
    BlockConfig, ConfigError, FlowBlock, HyperParams, MovingBatchNorm, SequentialFlow, Stage,
    field::{HyperNet, HyperNet2D, OdeNet, VectorField, check_dims},
};

/// Builds a flow of plain [`OdeNet`] blocks.
///
/// Each block's field sees a context of width `context_dim` when
/// `conditional` is set. Unconditional blocks get no context inputs at all.
/// Normalization layers are sized `input_dim`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if `hp` is invalid, `input_dim` is zero, or
/// `hidden_dims` is empty or contains a zero. Nothing is built on error.
pub fn build_model(
    hp: &HyperParams,
    input_dim: usize,
    hidden_dims: &[usize],
    context_dim: usize,
    num_blocks: usize,
    conditional: bool,
) -> Result<SequentialFlow, ConfigError> {
    hp.validate()?;
    check_dims(input_dim, hidden_dims)?;
    let config = hp.block_config(conditional)?;
    let context_dim = if conditional { context_dim } else { 0 };

    let mut rng = hp.rng();
    let fields = (0..num_blocks)
        .map(|_| {
            OdeNet::new(
                input_dim,
                hidden_dims,
                context_dim,
                hp.layer_type,
                hp.nonlinearity,
                &mut rng,
            )
            .map(|net| Box::new(net) as Box<dyn VectorField>)
        })
        .collect::<Result<Vec<_>, _>>()?;

    assemble(hp, fields, &config, input_dim, &mut rng)
}

/// Builds a flow of [`HyperNet`] blocks over `hp.input_dim` features with
/// target widths `hp.dims`.
///
/// Normalization layers are sized `hp.output_size` when set and
/// `hp.input_dim` otherwise.
///
/// # Errors
///
/// Returns a [`ConfigError`] if `hp` is invalid, `hp.dims` is empty or
/// contains a zero, or `conditional` is false. Nothing is built on error.
pub fn build_hyper(
    hp: &HyperParams,
    num_blocks: usize,
    conditional: bool,
) -> Result<SequentialFlow, ConfigError> {
    if !conditional {
        return Err(ConfigError::UnconditionalHypernet);
    }
    hp.validate()?;
    check_dims(hp.input_dim, &hp.dims)?;
    let config = hp.block_config(conditional)?;

    let fields = (0..num_blocks)
        .map(|_| {
            HyperNet::new(hp.input_dim, &hp.dims, hp.nonlinearity)
                .map(|net| Box::new(net) as Box<dyn VectorField>)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let features = hp.output_size.unwrap_or(hp.input_dim);
    assemble(hp, fields, &config, features, &mut hp.rng())
}

/// Builds a flow of [`HyperNet2D`] blocks over `hp.input_dim` features with
/// target widths `hp.dims`. Normalization layers are sized `hp.input_dim`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if `hp` is invalid, `hp.dims` is empty or
/// contains a zero, or `conditional` is false. Nothing is built on error.
pub fn build_hyper_2d(
    hp: &HyperParams,
    num_blocks: usize,
    conditional: bool,
) -> Result<SequentialFlow, ConfigError> {
    if !conditional {
        return Err(ConfigError::UnconditionalHypernet);
    }
    hp.validate()?;
    check_dims(hp.input_dim, &hp.dims)?;
    let config = hp.block_config(conditional)?;

    let fields = (0..num_blocks)
        .map(|_| {
            HyperNet2D::new(hp.input_dim, &hp.dims, hp.nonlinearity)
                .map(|net| Box::new(net) as Box<dyn VectorField>)
        })
        .collect::<Result<Vec<_>, _>>()?;

    assemble(hp, fields, &config, hp.input_dim, &mut hp.rng())
}

fn assemble(
    hp: &HyperParams,
    fields: Vec<Box<dyn VectorField>>,
    config: &BlockConfig,
    features: usize,
    rng: &mut StdRng,
) -> Result<SequentialFlow, ConfigError> {
    let norm = || MovingBatchNorm::new(features, hp.bn_lag, hp.sync_bn).map(Stage::Norm);
    let num_blocks = fields.len();

    let mut stages = Vec::with_capacity(1 + 2 * num_blocks);
    if hp.batch_norm {
        stages.push(norm()?);
    }
    for field in fields {
        stages.push(Stage::Block(FlowBlock::new(field, config, rng.next_u64())));
        if hp.batch_norm {
            stages.push(norm()?);
        }
    }

    debug!(
        num_blocks,
        stages = stages.len(),
        norm_features = ?hp.batch_norm.then_some(features),
        solver = %config.method,
        "assembled sequential flow"
    );
    Ok(SequentialFlow::new(stages))
}
