use std::any::Any;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::{
    compiler::ExecutionError,
    value::Value,
    window::accumulator::{Accumulator, downcast},
};

/// A value keyed by [`Value::sort_order`], so `1` and `1.0` are the same key.
#[derive(Debug, Clone)]
struct Key(Value);

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.sort_order(&other.0)
    }
}

/// Counted bag of values, ordered so the extremes are cheap to read.
///
/// ```
/// use jx::{window::Multiset, Value};
///
/// let mut bag = Multiset::new();
/// bag.add(Value::Integer(3));
/// bag.add(Value::Integer(1));
/// bag.add(Value::Integer(3));
/// assert_eq!(bag.count(&Value::Integer(3)), 2);
/// assert_eq!(bag.min(), Some(&Value::Integer(1)));
/// assert!(bag.remove(&Value::Integer(7)).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Multiset {
    counts: BTreeMap<Key, usize>,
    len: usize,
}

impl Multiset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: Value) {
        *self.counts.entry(Key(value)).or_insert(0) += 1;
        self.len += 1;
    }

    /// Remove one occurrence. Removing a value that is not present is an
    /// error, since it means the caller's adds and removes are out of step.
    pub fn remove(&mut self, value: &Value) -> Result<(), ExecutionError> {
        let key = Key(value.clone());
        match self.counts.get_mut(&key) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.counts.remove(&key);
            }
            None => {
                return Err(ExecutionError::TypeError(format!(
                    "{} is not in the set, so it can not be removed",
                    value
                )));
            }
        }
        self.len -= 1;
        Ok(())
    }

    pub fn count(&self, value: &Value) -> usize {
        self.counts.get(&Key(value.clone())).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn min(&self) -> Option<&Value> {
        self.counts.keys().next().map(|k| &k.0)
    }

    pub fn max(&self) -> Option<&Value> {
        self.counts.keys().next_back().map(|k| &k.0)
    }

    /// Distinct values with their counts, smallest first.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, usize)> {
        self.counts.iter().map(|(k, n)| (&k.0, *n))
    }

    pub fn extend(&mut self, other: &Multiset) {
        for (key, n) in &other.counts {
            *self.counts.entry(key.clone()).or_insert(0) += n;
        }
        self.len += other.len;
    }
}

/// Smallest non-null value.
#[derive(Debug, Clone, Default)]
pub struct Min {
    values: Multiset,
}

impl Accumulator for Min {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn add(&mut self, value: &Value) -> Result<(), ExecutionError> {
        if !value.is_null() {
            self.values.add(value.clone());
        }
        Ok(())
    }

    fn remove(&mut self, value: &Value) -> Result<(), ExecutionError> {
        if value.is_null() {
            return Ok(());
        }
        self.values.remove(value)
    }

    fn merge(&mut self, other: &dyn Accumulator) -> Result<(), ExecutionError> {
        self.values.extend(&downcast::<Min>(other, "min")?.values);
        Ok(())
    }

    fn end(&self) -> Result<Value, ExecutionError> {
        Ok(self.values.min().cloned().unwrap_or(Value::Null))
    }
}

/// Largest non-null value.
#[derive(Debug, Clone, Default)]
pub struct Max {
    values: Multiset,
}

impl Accumulator for Max {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn add(&mut self, value: &Value) -> Result<(), ExecutionError> {
        if !value.is_null() {
            self.values.add(value.clone());
        }
        Ok(())
    }

    fn remove(&mut self, value: &Value) -> Result<(), ExecutionError> {
        if value.is_null() {
            return Ok(());
        }
        self.values.remove(value)
    }

    fn merge(&mut self, other: &dyn Accumulator) -> Result<(), ExecutionError> {
        self.values.extend(&downcast::<Max>(other, "max")?.values);
        Ok(())
    }

    fn end(&self) -> Result<Value, ExecutionError> {
        Ok(self.values.max().cloned().unwrap_or(Value::Null))
    }
}
