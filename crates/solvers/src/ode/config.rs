use thiserror::Error;

/// Configuration shared by every integration method.
///
/// Adaptive methods use the tolerances and the step budget. Fixed-grid
/// methods use the step size and the step budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    atol: f64,
    rtol: f64,
    max_steps: usize,
    step_size: f64,
}

/// Errors that can occur when validating a solver config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("atol must be finite and positive")]
    Atol,

    #[error("rtol must be finite and positive")]
    Rtol,

    #[error("max_steps must be at least one")]
    MaxSteps,

    #[error("step_size must be finite and positive")]
    StepSize,
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(1e-5, 1e-5).unwrap()
    }
}

impl Config {
    /// Default budget of attempted steps for a single solve.
    pub const DEFAULT_MAX_STEPS: usize = 10_000;

    /// Default step size for fixed-grid methods.
    pub const DEFAULT_STEP_SIZE: f64 = 0.05;

    /// Creates a config with validated tolerances and default step settings.
    ///
    /// # Errors
    ///
    /// Returns an error if either tolerance is non-positive or non-finite.
    pub fn new(atol: f64, rtol: f64) -> Result<Self, ConfigError> {
        if !atol.is_finite() || atol <= 0.0 {
            return Err(ConfigError::Atol);
        }
        if !rtol.is_finite() || rtol <= 0.0 {
            return Err(ConfigError::Rtol);
        }

        Ok(Self {
            atol,
            rtol,
            max_steps: Self::DEFAULT_MAX_STEPS,
            step_size: Self::DEFAULT_STEP_SIZE,
        })
    }

    /// Sets the maximum number of attempted steps.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_steps` is zero.
    pub fn with_max_steps(mut self, max_steps: usize) -> Result<Self, ConfigError> {
        if max_steps == 0 {
            return Err(ConfigError::MaxSteps);
        }
        self.max_steps = max_steps;
        Ok(self)
    }

    /// Sets the step size used by fixed-grid methods.
    ///
    /// # Errors
    ///
    /// Returns an error if `step_size` is non-positive or non-finite.
    pub fn with_step_size(mut self, step_size: f64) -> Result<Self, ConfigError> {
        if !step_size.is_finite() || step_size <= 0.0 {
            return Err(ConfigError::StepSize);
        }
        self.step_size = step_size;
        Ok(self)
    }

    /// Returns the absolute tolerance.
    #[must_use]
    pub fn atol(&self) -> f64 {
        self.atol
    }

    /// Returns the relative tolerance.
    #[must_use]
    pub fn rtol(&self) -> f64 {
        self.rtol
    }

    /// Returns the maximum number of attempted steps.
    #[must_use]
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Returns the fixed-grid step size.
    #[must_use]
    pub fn step_size(&self) -> f64 {
        self.step_size
    }
}
