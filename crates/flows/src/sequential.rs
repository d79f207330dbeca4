use std::ops::Range;

use cnflow_core::{Module, Parameter};
use ndarray::ArrayView2;

use crate::{Direction, Flow, FlowBlock, FlowError, FlowState, MovingBatchNorm};

/// One stage of a [`SequentialFlow`].
#[derive(Debug)]
pub enum Stage {
    Block(FlowBlock),
    Norm(MovingBatchNorm),
}

impl Stage {
    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self, Stage::Block(_))
    }

    #[must_use]
    pub fn is_norm(&self) -> bool {
        matches!(self, Stage::Norm(_))
    }

    #[must_use]
    pub fn as_block(&self) -> Option<&FlowBlock> {
        match self {
            Stage::Block(block) => Some(block),
            Stage::Norm(_) => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut FlowBlock> {
        match self {
            Stage::Block(block) => Some(block),
            Stage::Norm(_) => None,
        }
    }

    #[must_use]
    pub fn as_norm(&self) -> Option<&MovingBatchNorm> {
        match self {
            Stage::Norm(norm) => Some(norm),
            Stage::Block(_) => None,
        }
    }

    fn inner(&self) -> &dyn Module {
        match self {
            Stage::Block(block) => block,
            Stage::Norm(norm) => norm,
        }
    }
}

impl Flow for Stage {
    fn transform(
        &mut self,
        state: FlowState,
        context: Option<ArrayView2<'_, f64>>,
        direction: Direction,
    ) -> Result<FlowState, FlowError> {
        match self {
            Stage::Block(block) => block.transform(state, context, direction),
            Stage::Norm(norm) => norm.transform(state, context, direction),
        }
    }

    fn set_training(&mut self, training: bool) {
        match self {
            Stage::Block(block) => block.set_training(training),
            Stage::Norm(norm) => norm.set_training(training),
        }
    }
}

// A stage is transparent in the component tree: it reports the wrapped
// block or layer as itself.
impl Module for Stage {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn children(&self) -> Vec<&dyn Module> {
        self.inner().children()
    }

    fn parameters(&self) -> Vec<&dyn Parameter> {
        self.inner().parameters()
    }

    fn num_evals(&self) -> Option<usize> {
        self.inner().num_evals()
    }

    fn integration_time(&self) -> Option<f64> {
        self.inner().integration_time()
    }

    fn identity(&self) -> *const () {
        self.inner().identity()
    }
}

/// An ordered chain of stages applied as one invertible transformation.
///
/// Forward applies the stages in order and inverse in reverse order. The
/// context is handed to every stage, and blocks that are not conditional
/// ignore it. Sequential flows are assembled by
/// [`build_model`](crate::build_model) and its sibling builders.
#[derive(Debug)]
pub struct SequentialFlow {
    stages: Vec<Stage>,
}

impl SequentialFlow {
    pub(crate) fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn stages_mut(&mut self) -> &mut [Stage] {
        &mut self.stages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &FlowBlock> {
        self.stages.iter().filter_map(Stage::as_block)
    }

    pub fn norms(&self) -> impl Iterator<Item = &MovingBatchNorm> {
        self.stages.iter().filter_map(Stage::as_norm)
    }

    /// Resets the evaluation counter of every block.
    pub fn reset_num_evals(&mut self) {
        for block in self.stages.iter_mut().filter_map(Stage::as_block_mut) {
            block.reset_num_evals();
        }
    }

    /// Applies only the stages in `range`, in order for
    /// [`Direction::Forward`] and in reverse order for
    /// [`Direction::Inverse`].
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a stage. An out-of-bounds range is
    /// clamped to the stages that exist.
    pub fn transform_range(
        &mut self,
        state: FlowState,
        context: Option<ArrayView2<'_, f64>>,
        direction: Direction,
        range: Range<usize>,
    ) -> Result<FlowState, FlowError> {
        let end = range.end.min(self.stages.len());
        let start = range.start.min(end);
        let stages = &mut self.stages[start..end];

        match direction {
            Direction::Forward => stages
                .iter_mut()
                .try_fold(state, |state, stage| stage.transform(state, context, direction)),
            Direction::Inverse => stages
                .iter_mut()
                .rev()
                .try_fold(state, |state, stage| stage.transform(state, context, direction)),
        }
    }
}

impl Flow for SequentialFlow {
    fn transform(
        &mut self,
        state: FlowState,
        context: Option<ArrayView2<'_, f64>>,
        direction: Direction,
    ) -> Result<FlowState, FlowError> {
        let len = self.stages.len();
        self.transform_range(state, context, direction, 0..len)
    }

    fn set_training(&mut self, training: bool) {
        for stage in &mut self.stages {
            stage.set_training(training);
        }
    }
}

impl Module for SequentialFlow {
    fn name(&self) -> &'static str {
        "SequentialFlow"
    }

    fn children(&self) -> Vec<&dyn Module> {
        self.stages.iter().map(|stage| stage as &dyn Module).collect()
    }
}
