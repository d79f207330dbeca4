use cnflow_solvers::ode;
use thiserror::Error;

/// Errors detected while validating hyperparameters or assembling a model.
///
/// A builder that returns one of these has not constructed anything.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be a positive integer")]
    NonPositiveDim { field: &'static str },

    #[error("hidden dimension schedule must not be empty")]
    EmptyHiddenDims,

    #[error("invalid hidden dimension schedule `{0}`")]
    InvalidDims(String),

    #[error(transparent)]
    UnknownSolver(#[from] ode::ParseMethodError),

    #[error("unknown layer type `{0}`")]
    UnknownLayerType(String),

    #[error("unknown nonlinearity `{0}`")]
    UnknownNonlinearity(String),

    #[error("time_length must be finite and non-negative")]
    TimeLength,

    #[error("bn_lag must be in [0, 1)")]
    BnLag,

    #[error("hypernetwork flows take their weights from the context and must be conditional")]
    UnconditionalHypernet,

    #[error("invalid solver settings: {0}")]
    Solver(#[from] ode::ConfigError),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A state, context, or log-density array does not fit the layout a stage
/// expects.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ShapeError {
    #[error("state has {found} features, expected {expected}")]
    StateWidth { expected: usize, found: usize },

    #[error("context has {found} features, expected {expected}")]
    ContextWidth { expected: usize, found: usize },

    #[error("context has {context} rows but state has {state}; expected 1 or {state}")]
    ContextRows { state: usize, context: usize },

    #[error("context of width {expected} is required but none was given")]
    MissingContext { expected: usize },

    #[error("log-density has {found} rows, expected {expected}")]
    LogDensityRows { expected: usize, found: usize },
}

/// Errors from a forward or inverse pass.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("integration failed: {0}")]
    Solve(#[source] ode::Error),
}

impl From<ode::Error> for FlowError {
    fn from(err: ode::Error) -> Self {
        match err {
            ode::Error::Function(source) => match source.downcast::<ShapeError>() {
                Ok(shape) => Self::Shape(*shape),
                Err(source) => Self::Solve(ode::Error::Function(source)),
            },
            other => Self::Solve(other),
        }
    }
}
