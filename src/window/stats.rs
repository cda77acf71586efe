//! Running moments for the `stats` aggregate.
//!
//! Values are folded into zero-centred power sums `[n, Σx, Σx², Σx³, Σx⁴]`,
//! which add and subtract exactly, and converted to mean, variance, skew and
//! kurtosis only when a result is read.
use std::any::Any;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use crate::{
    compiler::ExecutionError,
    value::Value,
    window::accumulator::{Accumulator, downcast, number},
};

/// Tolerance for treating a tiny negative variance as float noise.
pub const EPSILON: f64 = 0.000001;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZMoment {
    pub s: [f64; 5],
}

impl ZMoment {
    /// The moments of a single value.
    pub fn of(x: f64) -> ZMoment {
        ZMoment {
            s: [1.0, x, x * x, x * x * x, x * x * x * x],
        }
    }

    pub fn count(&self) -> f64 {
        self.s[0]
    }

    /// Descriptive statistics for the values summed so far; `None` when empty.
    pub fn to_stats(&self) -> Result<Option<Summary>, ExecutionError> {
        let n = self.s[0];
        if n == 0.0 {
            return Ok(None);
        }

        let mean = self.s[1] / n;
        if n == 1.0 {
            return Ok(Some(Summary {
                count: n,
                mean,
                variance: None,
                skew: None,
                kurtosis: None,
            }));
        }

        let z2 = self.s[2] / n;
        let z3 = self.s[3] / n;
        let z4 = self.s[4] / n;

        let variance = z2 - mean * mean;
        let error = -EPSILON * (z2.abs() + 1.0);
        if variance < error {
            return Err(ExecutionError::TypeError(format!(
                "variance can not be negative ({})",
                variance
            )));
        }
        if variance <= 0.0 {
            return Ok(Some(Summary {
                count: n,
                mean,
                variance: Some(0.0),
                skew: None,
                kurtosis: None,
            }));
        }

        let mc3 = z3 - (3.0 * mean * variance + mean.powi(3));
        let mc4 = z4 - (4.0 * mean * mc3 + 6.0 * mean * mean * variance + mean.powi(4));
        Ok(Some(Summary {
            count: n,
            mean,
            variance: Some(variance),
            skew: Some(mc3 / variance.powf(1.5)),
            kurtosis: Some(mc4 / (variance * variance) - 3.0),
        }))
    }
}

impl Add for ZMoment {
    type Output = ZMoment;

    fn add(mut self, other: ZMoment) -> ZMoment {
        self += other;
        self
    }
}

impl AddAssign for ZMoment {
    fn add_assign(&mut self, other: ZMoment) {
        for (a, b) in self.s.iter_mut().zip(other.s) {
            *a += b;
        }
    }
}

impl Sub for ZMoment {
    type Output = ZMoment;

    fn sub(mut self, other: ZMoment) -> ZMoment {
        self -= other;
        self
    }
}

impl SubAssign for ZMoment {
    fn sub_assign(&mut self, other: ZMoment) {
        for (a, b) in self.s.iter_mut().zip(other.s) {
            *a -= b;
        }
    }
}

/// Population statistics derived from a [`ZMoment`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: f64,
    pub mean: f64,
    pub variance: Option<f64>,
    pub skew: Option<f64>,
    pub kurtosis: Option<f64>,
}

impl Summary {
    /// Rebuild the power sums these statistics were derived from.
    pub fn to_z_moment(&self) -> ZMoment {
        let n = self.count;
        let m = self.mean;
        let variance = self.variance.unwrap_or(0.0);
        let mc3 = self.skew.unwrap_or(0.0) * variance.powf(1.5);
        let mc4 = (self.kurtosis.unwrap_or(0.0) + 3.0) * variance * variance;

        ZMoment {
            s: [
                n,
                m * n,
                (variance + m * m) * n,
                (mc3 + 3.0 * m * variance + m.powi(3)) * n,
                (mc4 + 4.0 * m * mc3 + 6.0 * m * m * variance + m.powi(4)) * n,
            ],
        }
    }

    pub fn to_value(&self) -> Value {
        let opt = |v: Option<f64>| v.map_or(Value::Null, Value::Float);
        Value::object([
            ("count", Value::Integer(self.count as i64)),
            ("mean", Value::Float(self.mean)),
            ("variance", opt(self.variance)),
            ("skew", opt(self.skew)),
            ("kurtosis", opt(self.kurtosis)),
        ])
    }
}

/// The `stats` aggregate: `{count, mean, variance, skew, kurtosis}`, or
/// null over no values.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    total: ZMoment,
}

impl Accumulator for Stats {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn add(&mut self, value: &Value) -> Result<(), ExecutionError> {
        if !value.is_null() {
            self.total += ZMoment::of(number(value, "stats")?);
        }
        Ok(())
    }

    fn remove(&mut self, value: &Value) -> Result<(), ExecutionError> {
        if !value.is_null() {
            self.total -= ZMoment::of(number(value, "stats")?);
        }
        Ok(())
    }

    fn merge(&mut self, other: &dyn Accumulator) -> Result<(), ExecutionError> {
        self.total += downcast::<Stats>(other, "stats")?.total;
        Ok(())
    }

    fn end(&self) -> Result<Value, ExecutionError> {
        Ok(self
            .total
            .to_stats()?
            .map_or(Value::Null, |summary| summary.to_value()))
    }
}
