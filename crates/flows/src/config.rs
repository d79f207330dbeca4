//! The hyperparameter bundle every builder reads.

use std::{fmt, fs, ops::Deref, path::Path, str::FromStr};

use cnflow_core::NonNegative;
use cnflow_solvers::ode::{self, Method};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    BlockConfig, ConfigError, Divergence, GradientMode,
    field::{LayerType, Nonlinearity},
};

/// Parses a hidden-dimension schedule written as `"512-512-512"`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the schedule is empty, an entry is not an
/// integer, or an entry is zero.
pub fn parse_dims(s: &str) -> Result<Vec<usize>, ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::EmptyHiddenDims);
    }
    s.split('-')
        .map(|part| match part.trim().parse::<usize>() {
            Ok(0) => Err(ConfigError::NonPositiveDim {
                field: "hidden_dims",
            }),
            Ok(dim) => Ok(dim),
            Err(_) => Err(ConfigError::InvalidDims(s.to_owned())),
        })
        .collect()
}

/// A hidden-dimension schedule, written `"a-b-c"` in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dims(Vec<usize>);

impl Dims {
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl Deref for Dims {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

impl FromStr for Dims {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dims(s).map(Self)
    }
}

impl TryFrom<String> for Dims {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Dims> for String {
    fn from(dims: Dims) -> Self {
        dims.to_string()
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join("-"))
    }
}

/// Structural and numerical settings for building flow models.
///
/// Every field has a default, so a configuration file only lists what it
/// changes:
///
/// ```
/// use cnflow::HyperParams;
///
/// let hp = HyperParams::from_toml_str(r#"
///     input_dim = 2
///     dims = "64-64"
///     solver = "rk4"
///     batch_norm = false
/// "#)?;
///
/// assert_eq!(&*hp.dims, &[64, 64]);
/// assert_eq!(hp.zdim, 128);
/// # Ok::<(), cnflow::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HyperParams {
    /// Features per sample in data space.
    pub input_dim: usize,
    /// Hidden widths of the point and hypernetwork fields.
    pub dims: Dims,
    /// Hidden widths of the latent field.
    pub latent_dims: Dims,
    /// Latent code size, also the point flow's context width.
    pub zdim: usize,
    pub num_blocks: usize,
    pub latent_num_blocks: usize,
    pub layer_type: LayerType,
    pub nonlinearity: Nonlinearity,
    /// Initial integration horizon `T` of every block.
    pub time_length: f64,
    /// Whether `T` is a trainable parameter.
    #[serde(rename = "train_T", alias = "train_t")]
    pub train_t: bool,
    pub solver: Method,
    pub use_adjoint: bool,
    pub atol: f64,
    pub rtol: f64,
    /// Step size of fixed-grid solvers.
    pub step_size: f64,
    /// Step budget of a single solve.
    pub max_steps: usize,
    pub batch_norm: bool,
    pub bn_lag: f64,
    pub sync_bn: bool,
    /// Normalization width override for hypernetwork flows.
    pub output_size: Option<usize>,
    pub use_div_approx_train: bool,
    pub use_div_approx_test: bool,
    /// Seed for weight initialisation and divergence samples. Drawn from
    /// the OS when unset.
    pub seed: Option<u64>,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            input_dim: 3,
            dims: Dims(vec![256]),
            latent_dims: Dims(vec![256]),
            zdim: 128,
            num_blocks: 1,
            latent_num_blocks: 1,
            layer_type: LayerType::ConcatSquash,
            nonlinearity: Nonlinearity::Tanh,
            time_length: 0.5,
            train_t: true,
            solver: Method::Dopri5,
            use_adjoint: true,
            atol: 1e-5,
            rtol: 1e-5,
            step_size: ode::Config::DEFAULT_STEP_SIZE,
            max_steps: ode::Config::DEFAULT_MAX_STEPS,
            batch_norm: true,
            bn_lag: 0.0,
            sync_bn: false,
            output_size: None,
            use_div_approx_train: false,
            use_div_approx_test: false,
            seed: None,
        }
    }
}

impl HyperParams {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the document does not parse, names an
    /// unknown field or identifier, or fails [`validate`](Self::validate).
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let hp: Self = toml::from_str(s)?;
        hp.validate()?;
        Ok(hp)
    }

    /// Reads, parses, and validates a TOML file.
    ///
    /// # Errors
    ///
    /// As [`from_toml_str`](Self::from_toml_str), plus I/O failures.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Checks the settings every builder depends on.
    ///
    /// Hidden-dimension schedules are checked by the builder that uses them.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_dim == 0 {
            return Err(ConfigError::NonPositiveDim { field: "input_dim" });
        }
        if self.zdim == 0 {
            return Err(ConfigError::NonPositiveDim { field: "zdim" });
        }
        if self.output_size == Some(0) {
            return Err(ConfigError::NonPositiveDim {
                field: "output_size",
            });
        }
        if !self.time_length.is_finite() || self.time_length < 0.0 {
            return Err(ConfigError::TimeLength);
        }
        if !(0.0..1.0).contains(&self.bn_lag) {
            return Err(ConfigError::BnLag);
        }
        self.solver_config()?;
        Ok(())
    }

    /// The validated solver settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Solver`] for invalid tolerances, step size, or
    /// step budget.
    pub fn solver_config(&self) -> Result<ode::Config, ConfigError> {
        Ok(ode::Config::new(self.atol, self.rtol)?
            .with_max_steps(self.max_steps)?
            .with_step_size(self.step_size)?)
    }

    /// Settings for a block built from this bundle.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the horizon or solver settings are
    /// invalid.
    pub fn block_config(&self, conditional: bool) -> Result<BlockConfig, ConfigError> {
        let time_length = NonNegative::new(self.time_length)
            .filter(|t| t.into_inner().is_finite())
            .ok_or(ConfigError::TimeLength)?;
        let divergence = |approx: bool| {
            if approx {
                Divergence::Hutchinson
            } else {
                Divergence::Exact
            }
        };

        Ok(BlockConfig {
            time_length,
            train_t: self.train_t,
            conditional,
            method: self.solver,
            gradient: if self.use_adjoint {
                GradientMode::Adjoint
            } else {
                GradientMode::Direct
            },
            solver: self.solver_config()?,
            train_divergence: divergence(self.use_div_approx_train),
            eval_divergence: divergence(self.use_div_approx_test),
        })
    }

    /// A generator seeded from [`seed`](Self::seed), or from the OS.
    #[must_use]
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn dims_parse_from_dashed_strings() {
        assert_eq!(parse_dims("512-512-512").unwrap(), vec![512, 512, 512]);
        assert_eq!(parse_dims(" 64 ").unwrap(), vec![64]);

        assert!(matches!(parse_dims(""), Err(ConfigError::EmptyHiddenDims)));
        assert!(matches!(
            parse_dims("64-x"),
            Err(ConfigError::InvalidDims(s)) if s == "64-x"
        ));
        assert!(matches!(
            parse_dims("64--64"),
            Err(ConfigError::InvalidDims(_))
        ));
        assert!(matches!(
            parse_dims("64-0"),
            Err(ConfigError::NonPositiveDim { .. })
        ));
        assert_eq!(Dims::new(vec![3, 4]).to_string(), "3-4");
    }

    #[test]
    fn defaults_follow_the_training_scripts() {
        let hp = HyperParams::default();

        assert!(hp.validate().is_ok());
        assert_eq!(hp.solver, Method::Dopri5);
        assert_eq!(hp.layer_type, LayerType::ConcatSquash);
        assert_eq!(hp.nonlinearity, Nonlinearity::Tanh);
        assert!(hp.batch_norm && hp.train_t);
        assert_eq!(&*hp.dims, &[256]);
    }

    #[test]
    fn toml_overrides_defaults() {
        let hp = HyperParams::from_toml_str(
            r#"
            input_dim = 2
            dims = "32-32"
            latent_dims = "16"
            layer_type = "concat_v2"
            nonlinearity = "softplus"
            solver = "bosh3"
            train_T = false
            output_size = 8
            seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(hp.input_dim, 2);
        assert_eq!(&*hp.dims, &[32, 32]);
        assert_eq!(&*hp.latent_dims, &[16]);
        assert_eq!(hp.layer_type, LayerType::ConcatV2);
        assert_eq!(hp.nonlinearity, Nonlinearity::Softplus);
        assert_eq!(hp.solver, Method::Bosh3);
        assert!(!hp.train_t);
        assert_eq!(hp.output_size, Some(8));
        assert_eq!(hp.seed, Some(7));
    }

    #[test]
    fn unknown_identifiers_are_rejected() {
        for doc in [
            r#"solver = "adams""#,
            r#"layer_type = "blend""#,
            r#"nonlinearity = "gelu""#,
            r#"dims = "8-x""#,
            "no_such_field = 1",
        ] {
            assert!(
                matches!(HyperParams::from_toml_str(doc), Err(ConfigError::Parse(_))),
                "{doc}"
            );
        }
    }

    #[test]
    fn invalid_values_are_rejected() {
        let check = |hp: HyperParams| hp.validate().unwrap_err();

        assert!(matches!(
            check(HyperParams {
                input_dim: 0,
                ..HyperParams::default()
            }),
            ConfigError::NonPositiveDim { field: "input_dim" }
        ));
        assert!(matches!(
            check(HyperParams {
                atol: 0.0,
                ..HyperParams::default()
            }),
            ConfigError::Solver(ode::ConfigError::Atol)
        ));
        assert!(matches!(
            check(HyperParams {
                time_length: -1.0,
                ..HyperParams::default()
            }),
            ConfigError::TimeLength
        ));
        assert!(matches!(
            check(HyperParams {
                bn_lag: 1.0,
                ..HyperParams::default()
            }),
            ConfigError::BnLag
        ));
        assert!(matches!(
            check(HyperParams {
                output_size: Some(0),
                ..HyperParams::default()
            }),
            ConfigError::NonPositiveDim { .. }
        ));
    }

    #[test]
    fn block_config_maps_flags() {
        let hp = HyperParams {
            use_adjoint: false,
            use_div_approx_train: true,
            ..HyperParams::default()
        };

        let config = hp.block_config(true).unwrap();

        assert!(config.conditional);
        assert_eq!(config.gradient, GradientMode::Direct);
        assert_eq!(config.train_divergence, Divergence::Hutchinson);
        assert_eq!(config.eval_divergence, Divergence::Exact);
        assert_eq!(config.time_length.into_inner(), 0.5);
    }

    #[test]
    fn loads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "num_blocks = 3\nbn_lag = 0.25").unwrap();

        let hp = HyperParams::from_path(file.path()).unwrap();

        assert_eq!(hp.num_blocks, 3);
        assert_eq!(hp.bn_lag, 0.25);
        assert!(matches!(
            HyperParams::from_path(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }
}
