use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    compiler::ExecutionError,
    value::Value,
    window::{
        multiset::{Max, Min},
        simple::{Average, Count, Sum},
        stats::Stats,
    },
};

/// Incremental aggregate over a sliding set of values.
///
/// Accumulators ignore nulls in both `add` and `remove`, so the same value
/// sequence can be slid through a frame without the caller filtering it.
pub trait Accumulator: fmt::Debug + Send {
    fn as_any(&self) -> &dyn Any;

    fn add(&mut self, value: &Value) -> Result<(), ExecutionError>;

    /// Undo an earlier `add` of an equal value.
    fn remove(&mut self, value: &Value) -> Result<(), ExecutionError>;

    /// Fold another accumulator of the same kind into this one.
    fn merge(&mut self, other: &dyn Accumulator) -> Result<(), ExecutionError>;

    /// The aggregate over everything currently held.
    fn end(&self) -> Result<Value, ExecutionError>;
}

/// Downcast the argument of [`Accumulator::merge`] to the concrete type.
pub(crate) fn downcast<'a, T: 'static>(other: &'a dyn Accumulator, name: &str) -> Result<&'a T, ExecutionError> {
    other
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ExecutionError::TypeError(format!("can not merge {:?} into a {} accumulator", other, name)))
}

pub(crate) fn number(value: &Value, name: &str) -> Result<f64, ExecutionError> {
    value.as_float().ok_or_else(|| {
        ExecutionError::TypeError(format!("{} expects numbers, got {}", name, value.type_name()))
    })
}

pub type AccumulatorFactory = fn() -> Box<dyn Accumulator>;

/// Aggregate name to accumulator factory.
pub struct AggregateRegistry {
    factories: HashMap<String, AccumulatorFactory>,
}

impl AggregateRegistry {
    pub fn empty() -> Self {
        AggregateRegistry {
            factories: HashMap::new(),
        }
    }

    /// `count`, `sum`, `avg`, `min`, `max` and `stats`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("count", || Box::new(Count::default()));
        registry.register("sum", || Box::new(Sum::default()));
        registry.register("avg", || Box::new(Average::default()));
        registry.register("min", || Box::new(Min::default()));
        registry.register("max", || Box::new(Max::default()));
        registry.register("stats", || Box::new(Stats::default()));
        registry
    }

    /// Register or replace the factory for `name`.
    pub fn register(&mut self, name: &str, factory: AccumulatorFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn init(&self, name: &str) -> Option<Box<dyn Accumulator>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for AggregateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

static REGISTRY: LazyLock<RwLock<AggregateRegistry>> = LazyLock::new(|| RwLock::new(AggregateRegistry::with_builtins()));

/// Make `name` available to every query in the process.
///
/// ```
/// use jx::window::{register_aggregate, is_aggregate, Count};
///
/// register_aggregate("tally", || Box::new(Count::default()));
/// assert!(is_aggregate("tally"));
/// ```
pub fn register_aggregate(name: &str, factory: AccumulatorFactory) {
    debug!(aggregate = name, "registering aggregate");
    REGISTRY.write().register(name, factory);
}

/// A fresh accumulator for `name`, if registered.
pub fn init_aggregate(name: &str) -> Option<Box<dyn Accumulator>> {
    REGISTRY.read().init(name)
}

pub fn is_aggregate(name: &str) -> bool {
    REGISTRY.read().contains(name)
}

pub fn aggregate_names() -> Vec<String> {
    REGISTRY.read().names()
}
