/// Counters describing the work done by one solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of times the ODE function was evaluated.
    pub evaluations: usize,

    /// Number of accepted steps.
    pub accepted_steps: usize,

    /// Number of steps rejected by the error controller.
    pub rejected_steps: usize,
}

/// The result of a successful integration.
#[derive(Debug, Clone)]
pub struct Solution<S> {
    /// State at the end of the integration span.
    pub state: S,

    /// Work done to reach it.
    pub stats: Stats,
}
