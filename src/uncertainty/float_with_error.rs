//! A value with a one-sigma uncertainty.
//!
//! Arithmetic assumes the operands are uncorrelated and propagates the
//! standard deviations to first order.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// A measured or derived quantity with its standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FloatWithError {
    /// Best estimate
    pub value: f64,
    /// One-sigma standard deviation (zero when unknown)
    pub sd: f64,
}

impl FloatWithError {
    /// Create a value with the given standard deviation.
    pub fn new(value: f64, sd: f64) -> Self {
        Self { value, sd: sd.abs() }
    }

    /// Create a value without uncertainty.
    pub fn exact(value: f64) -> Self {
        Self { value, sd: 0.0 }
    }

    /// Build from a sample distribution: sample mean and sample standard deviation.
    ///
    /// Returns `None` for an empty slice. A single sample has zero spread.
    pub fn from_distribution(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let sd = if samples.len() > 1 {
            let var = samples.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        } else {
            0.0
        };

        Some(Self { value: mean, sd })
    }

    /// Keep the standard deviation but replace the value.
    pub fn with_value(self, value: f64) -> Self {
        Self { value, sd: self.sd }
    }

    /// Relative uncertainty `sd / |value|` (infinite for a zero value with spread).
    pub fn relative_error(&self) -> f64 {
        if self.value == 0.0 {
            if self.sd == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            self.sd / self.value.abs()
        }
    }

    /// Whether both value and sd are finite.
    pub fn is_finite(&self) -> bool {
        self.value.is_finite() && self.sd.is_finite()
    }

    /// Draw a normally distributed sample around the value.
    ///
    /// Values without uncertainty are returned unchanged.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.sd > 0.0 && self.sd.is_finite() {
            match Normal::new(self.value, self.sd) {
                Ok(normal) => normal.sample(rng),
                Err(_) => self.value,
            }
        } else {
            self.value
        }
    }

    /// Apply a scalar function and propagate the error through its derivative.
    pub fn map<F, D>(self, f: F, derivative: D) -> Self
    where
        F: Fn(f64) -> f64,
        D: Fn(f64) -> f64,
    {
        Self::new(f(self.value), derivative(self.value) * self.sd)
    }

    /// Natural logarithm with propagated error.
    pub fn ln(self) -> Self {
        self.map(f64::ln, |x| 1.0 / x)
    }

    /// Exponential with propagated error.
    pub fn exp(self) -> Self {
        self.map(f64::exp, f64::exp)
    }
}

impl From<f64> for FloatWithError {
    fn from(value: f64) -> Self {
        Self::exact(value)
    }
}

impl fmt::Display for FloatWithError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match f.precision() {
            Some(p) => write!(f, "{:.*} ± {:.*}", p, self.value, p, self.sd),
            None => write!(f, "{} ± {}", self.value, self.sd),
        }
    }
}

impl Add for FloatWithError {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.value + rhs.value, self.sd.hypot(rhs.sd))
    }
}

impl Sub for FloatWithError {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.value - rhs.value, self.sd.hypot(rhs.sd))
    }
}

impl Mul for FloatWithError {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let value = self.value * rhs.value;
        let sd = (rhs.value * self.sd).hypot(self.value * rhs.sd);
        Self::new(value, sd)
    }
}

impl Div for FloatWithError {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let value = self.value / rhs.value;
        let sd = (self.sd / rhs.value).hypot(self.value * rhs.sd / (rhs.value * rhs.value));
        Self::new(value, sd)
    }
}

impl Add<f64> for FloatWithError {
    type Output = Self;

    fn add(self, rhs: f64) -> Self {
        Self::new(self.value + rhs, self.sd)
    }
}

impl Sub<f64> for FloatWithError {
    type Output = Self;

    fn sub(self, rhs: f64) -> Self {
        Self::new(self.value - rhs, self.sd)
    }
}

impl Mul<f64> for FloatWithError {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.value * rhs, self.sd * rhs)
    }
}

impl Div<f64> for FloatWithError {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self::new(self.value / rhs, self.sd / rhs)
    }
}

impl Neg for FloatWithError {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.value, self.sd)
    }
}
