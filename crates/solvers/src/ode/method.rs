use std::{fmt, str::FromStr};

use thiserror::Error;

use super::tableau::{self, Tableau};

/// An explicit Runge-Kutta integration method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Method {
    /// Forward Euler on a fixed grid.
    Euler,
    /// Explicit midpoint on a fixed grid.
    Midpoint,
    /// Classic fourth-order Runge-Kutta on a fixed grid.
    Rk4,
    /// Adaptive Bogacki-Shampine 3(2).
    Bosh3,
    /// Adaptive Dormand-Prince 5(4).
    #[default]
    Dopri5,
}

/// Error returned when parsing an unknown method name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown solver `{0}` (expected one of: dopri5, bosh3, rk4, midpoint, euler)")]
pub struct ParseMethodError(pub String);

impl Method {
    /// All supported methods.
    pub const ALL: [Method; 5] = [
        Method::Euler,
        Method::Midpoint,
        Method::Rk4,
        Method::Bosh3,
        Method::Dopri5,
    ];

    /// The identifier used in configuration files.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Method::Euler => "euler",
            Method::Midpoint => "midpoint",
            Method::Rk4 => "rk4",
            Method::Bosh3 => "bosh3",
            Method::Dopri5 => "dopri5",
        }
    }

    /// Whether the method adapts its step size to the tolerances.
    #[must_use]
    pub fn is_adaptive(self) -> bool {
        self.tableau().b_err.is_some()
    }

    pub(crate) fn tableau(self) -> &'static Tableau {
        match self {
            Method::Euler => &tableau::EULER,
            Method::Midpoint => &tableau::MIDPOINT,
            Method::Rk4 => &tableau::RK4,
            Method::Bosh3 => &tableau::BOSH3,
            Method::Dopri5 => &tableau::DOPRI5,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|method| method.name() == s)
            .ok_or_else(|| ParseMethodError(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for method in Method::ALL {
            assert_eq!(method.name().parse::<Method>(), Ok(method));
            assert_eq!(method.to_string(), method.name());
        }
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = "adams".parse::<Method>().unwrap_err();
        assert_eq!(err, ParseMethodError("adams".into()));
        assert!(err.to_string().contains("adams"));
    }

    #[test]
    fn only_embedded_pairs_are_adaptive() {
        assert!(Method::Dopri5.is_adaptive());
        assert!(Method::Bosh3.is_adaptive());
        assert!(!Method::Euler.is_adaptive());
        assert!(!Method::Midpoint.is_adaptive());
        assert!(!Method::Rk4.is_adaptive());
    }
}
