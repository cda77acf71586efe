use std::any::Any;

use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};

use crate::{
    compiler::ExecutionError,
    value::Value,
    window::accumulator::{Accumulator, downcast},
};

/// Number of non-null values.
#[derive(Debug, Clone, Default)]
pub struct Count {
    count: i64,
}

impl Accumulator for Count {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn add(&mut self, value: &Value) -> Result<(), ExecutionError> {
        if !value.is_null() {
            self.count += 1;
        }
        Ok(())
    }

    fn remove(&mut self, value: &Value) -> Result<(), ExecutionError> {
        if !value.is_null() {
            self.count -= 1;
        }
        Ok(())
    }

    fn merge(&mut self, other: &dyn Accumulator) -> Result<(), ExecutionError> {
        self.count += downcast::<Count>(other, "count")?.count;
        Ok(())
    }

    fn end(&self) -> Result<Value, ExecutionError> {
        Ok(Value::Integer(self.count))
    }
}

/// Running total. Exact while values fit a [`Decimal`]; values beyond its
/// range, or additions that would overflow it, are carried in a float
/// remainder. Stays integral until a float is added.
#[derive(Debug, Clone, Default)]
pub struct Sum {
    exact: Decimal,
    spill: f64,
    count: i64,
    saw_float: bool,
}

impl Sum {
    fn number(value: &Value) -> Result<(Option<Decimal>, f64), ExecutionError> {
        match value {
            Value::Integer(n) => Ok((Some(Decimal::from(*n)), *n as f64)),
            Value::Float(f) => Ok((Decimal::from_f64(*f), *f)),
            _ => Err(ExecutionError::TypeError(format!("sum expects numbers, got {}", value))),
        }
    }

    fn total(&self) -> f64 {
        self.exact.to_f64().unwrap_or(0.0) + self.spill
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        if self.spill == 0.0
            && let Some(mean) = (self.exact / Decimal::from(self.count)).to_f64()
        {
            return Some(mean);
        }
        Some(self.total() / self.count as f64)
    }
}

impl Accumulator for Sum {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn add(&mut self, value: &Value) -> Result<(), ExecutionError> {
        if value.is_null() {
            return Ok(());
        }
        let (exact, f) = Self::number(value)?;
        match exact.and_then(|d| self.exact.checked_add(d)) {
            Some(total) => self.exact = total,
            None => self.spill += f,
        }
        self.count += 1;
        self.saw_float |= matches!(value, Value::Float(_));
        Ok(())
    }

    fn remove(&mut self, value: &Value) -> Result<(), ExecutionError> {
        if value.is_null() {
            return Ok(());
        }
        let (exact, f) = Self::number(value)?;
        match exact.and_then(|d| self.exact.checked_sub(d)) {
            Some(total) => self.exact = total,
            None => self.spill -= f,
        }
        self.count -= 1;
        Ok(())
    }

    fn merge(&mut self, other: &dyn Accumulator) -> Result<(), ExecutionError> {
        let other = downcast::<Sum>(other, "sum")?;
        match self.exact.checked_add(other.exact) {
            Some(total) => self.exact = total,
            None => self.spill += other.exact.to_f64().unwrap_or(0.0),
        }
        self.spill += other.spill;
        self.count += other.count;
        self.saw_float |= other.saw_float;
        Ok(())
    }

    fn end(&self) -> Result<Value, ExecutionError> {
        if self.spill != 0.0 {
            return Ok(Value::Float(self.total()));
        }
        if !self.saw_float
            && self.exact.fract().is_zero()
            && let Some(n) = self.exact.to_i64()
        {
            return Ok(Value::Integer(n));
        }
        Ok(self.exact.to_f64().map_or(Value::Null, Value::Float))
    }
}

/// Arithmetic mean of non-null values; null when empty.
#[derive(Debug, Clone, Default)]
pub struct Average {
    sum: Sum,
}

impl Accumulator for Average {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn add(&mut self, value: &Value) -> Result<(), ExecutionError> {
        self.sum.add(value)
    }

    fn remove(&mut self, value: &Value) -> Result<(), ExecutionError> {
        self.sum.remove(value)
    }

    fn merge(&mut self, other: &dyn Accumulator) -> Result<(), ExecutionError> {
        let other = downcast::<Average>(other, "avg")?;
        self.sum.merge(&other.sum)
    }

    fn end(&self) -> Result<Value, ExecutionError> {
        Ok(self.sum.mean().map_or(Value::Null, Value::Float))
    }
}
