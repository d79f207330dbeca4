use std::ops::Add;

use ndarray::{Array0, arr0};

use crate::{Param, Parameter};

/// A value that is guaranteed to be non-negative.
///
/// The invariant is checked at construction and preserved by every public
/// operation.
///
/// ```
/// use cnflow_core::NonNegative;
///
/// let x = NonNegative::new(3.0).unwrap();
/// assert_eq!(x.into_inner(), 3.0);
///
/// assert!(NonNegative::new(-5.0).is_none());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct NonNegative(f64);

impl NonNegative {
    /// Returns `Some` if `value >= 0`, or `None` otherwise (including NaN).
    pub fn new(value: f64) -> Option<Self> {
        if value >= 0.0 { Some(Self(value)) } else { None }
    }

    /// Returns `value²`, which is non-negative for every finite or infinite
    /// input. NaN squares to NaN and is mapped to zero.
    #[must_use]
    pub fn square_of(value: f64) -> Self {
        let squared = value * value;
        if squared.is_nan() { Self(0.0) } else { Self(squared) }
    }

    #[must_use]
    pub fn zero() -> Self {
        Self(0.0)
    }

    pub fn into_inner(self) -> f64 {
        self.0
    }
}

impl AsRef<f64> for NonNegative {
    fn as_ref(&self) -> &f64 {
        &self.0
    }
}

impl Add for NonNegative {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

/// A learnable scalar whose effective value can never be negative.
///
/// The raw parameter is stored in a square-root basis: an optimizer may move
/// it anywhere on the real line, while [`value`](Self::value) always returns
/// `raw²`. Reading the value back therefore never flips sign, whatever
/// updates were applied to the raw parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnableNonNegative {
    sqrt: Param<ndarray::Ix0>,
}

impl LearnableNonNegative {
    /// Creates a trainable scalar with effective value `value`.
    pub fn new(value: NonNegative) -> Self {
        Self {
            sqrt: Param::new(arr0(value.into_inner().sqrt())),
        }
    }

    /// Creates a scalar that is held fixed during training.
    pub fn frozen(value: NonNegative) -> Self {
        Self {
            sqrt: Param::frozen(arr0(value.into_inner().sqrt())),
        }
    }

    /// The effective value, `raw²`.
    pub fn value(&self) -> NonNegative {
        NonNegative::square_of(self.raw())
    }

    /// The raw parameter in the square-root basis.
    pub fn raw(&self) -> f64 {
        *self.sqrt.value().first().unwrap_or(&0.0)
    }

    /// Adds `delta` to the raw parameter, as a gradient step would.
    ///
    /// Frozen scalars ignore updates.
    pub fn apply_update(&mut self, delta: f64) {
        if self.sqrt.requires_grad() {
            *self.raw_mut() += delta;
        }
    }

    /// Overwrites the raw parameter.
    pub fn set_raw(&mut self, raw: f64) {
        *self.raw_mut() = raw;
    }

    pub fn is_trainable(&self) -> bool {
        self.sqrt.requires_grad()
    }

    pub fn param(&self) -> &Param<ndarray::Ix0> {
        &self.sqrt
    }

    fn raw_mut(&mut self) -> &mut f64 {
        let value: &mut Array0<f64> = self.sqrt.value_mut();
        &mut value[()]
    }
}
