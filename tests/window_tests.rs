use jx::query::Range;
use jx::window::{
    Accumulator, AggregateRegistry, Count, Max, Min, Multiset, Stats, Sum, ZMoment, init_aggregate, is_aggregate,
    register_aggregate, slide,
};
use jx::{ExecutionError, Value};
use serde_json::json;

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Integer).collect()
}

fn field(value: &Value, name: &str) -> Value {
    value.as_object().and_then(|o| o.get(name)).cloned().unwrap_or(Value::Null)
}

#[test]
fn test_stats_over_whole_set() {
    let results = slide(&ints(&[1, 2, 3, 4, 5]), "stats", None).unwrap();
    assert_eq!(results.len(), 5);
    for stats in &results {
        assert_eq!(field(stats, "count"), Value::Integer(5));
        assert_eq!(field(stats, "mean"), Value::Float(3.0));
        assert_eq!(field(stats, "variance"), Value::Float(2.0));
        assert_eq!(field(stats, "skew"), Value::Float(0.0));
    }
}

#[test]
fn test_stats_add_remove_round_trip() {
    let mut stats = Stats::default();
    for x in [4, 8, 15] {
        stats.add(&Value::Integer(x)).unwrap();
    }
    let before = stats.end().unwrap();

    stats.add(&Value::Integer(16)).unwrap();
    stats.remove(&Value::Integer(16)).unwrap();
    assert_eq!(stats.end().unwrap(), before);
}

#[test]
fn test_z_moment_round_trip() {
    let mut total = ZMoment::default();
    for x in [1.0, 2.0, 4.0] {
        total += ZMoment::of(x);
    }
    let before = total;
    total = total + ZMoment::of(23.0) - ZMoment::of(23.0);
    assert_eq!(total, before);
}

#[test]
fn test_stats_edge_cases() {
    let empty = Stats::default();
    assert_eq!(empty.end().unwrap(), Value::Null);

    let mut one = Stats::default();
    one.add(&Value::Integer(7)).unwrap();
    let summary = one.end().unwrap();
    assert_eq!(field(&summary, "count"), Value::Integer(1));
    assert_eq!(field(&summary, "mean"), Value::Float(7.0));
    assert_eq!(field(&summary, "variance"), Value::Null);

    let mut flat = Stats::default();
    flat.add(&Value::Integer(2)).unwrap();
    flat.add(&Value::Integer(2)).unwrap();
    let summary = flat.end().unwrap();
    assert_eq!(field(&summary, "variance"), Value::Float(0.0));
    assert_eq!(field(&summary, "skew"), Value::Null);
}

#[test]
fn test_summary_rebuilds_moments() {
    let mut total = ZMoment::default();
    for x in [1.0, 2.0, 3.0, 10.0] {
        total += ZMoment::of(x);
    }
    let summary = total.to_stats().unwrap().unwrap();
    let rebuilt = summary.to_z_moment();
    for (a, b) in rebuilt.s.iter().zip(total.s) {
        assert!((a - b).abs() <= 1e-6 * (a.abs() + b.abs() + 1.0), "{} vs {}", a, b);
    }
}

#[test]
fn test_min_tracks_removals() {
    let mut min = Min::default();
    for x in [5, 3, 8, 3] {
        min.add(&Value::Integer(x)).unwrap();
    }
    assert_eq!(min.end().unwrap(), Value::Integer(3));

    // duplicates are counted, so one removal leaves the other 3
    min.remove(&Value::Integer(3)).unwrap();
    assert_eq!(min.end().unwrap(), Value::Integer(3));
    min.remove(&Value::Integer(3)).unwrap();
    assert_eq!(min.end().unwrap(), Value::Integer(5));
    min.remove(&Value::Integer(5)).unwrap();
    min.remove(&Value::Integer(8)).unwrap();
    assert_eq!(min.end().unwrap(), Value::Null);
}

#[test]
fn test_min_remove_absent_is_error() {
    let mut min = Min::default();
    min.add(&Value::Integer(1)).unwrap();
    assert!(matches!(min.remove(&Value::Integer(2)), Err(ExecutionError::TypeError(_))));
}

#[test]
fn test_multiset_value_equality() {
    let mut bag = Multiset::new();
    bag.add(Value::Integer(1));
    bag.add(Value::Float(1.0));
    assert_eq!(bag.count(&Value::Integer(1)), 2);
    assert_eq!(bag.len(), 2);
    bag.remove(&Value::Float(1.0)).unwrap();
    bag.remove(&Value::Integer(1)).unwrap();
    assert!(bag.is_empty());
}

#[test]
fn test_max_and_merge() {
    let mut left = Max::default();
    let mut right = Max::default();
    left.add(&Value::Integer(4)).unwrap();
    right.add(&Value::Integer(9)).unwrap();
    left.merge(&right).unwrap();
    assert_eq!(left.end().unwrap(), Value::Integer(9));

    assert!(left.merge(&Count::default()).is_err());
}

#[test]
fn test_sum_is_exact() {
    let mut sum = Sum::default();
    for x in [0.1, 0.2, 0.3] {
        sum.add(&Value::Float(x)).unwrap();
    }
    sum.remove(&Value::Float(0.1)).unwrap();
    sum.remove(&Value::Float(0.2)).unwrap();
    assert_eq!(sum.end().unwrap(), Value::Float(0.3));

    let mut ints = Sum::default();
    ints.add(&Value::Integer(2)).unwrap();
    ints.add(&Value::Integer(3)).unwrap();
    assert_eq!(ints.end().unwrap(), Value::Integer(5));
}

#[test]
fn test_sum_beyond_decimal_range() {
    let values = vec![Value::Float(1e30), Value::Float(2.0)];
    assert_eq!(slide(&values, "sum", None).unwrap()[0], Value::Float(1e30));
    assert_eq!(slide(&values, "avg", None).unwrap()[0], Value::Float(5e29));

    let mut sum = Sum::default();
    sum.add(&Value::Integer(3)).unwrap();
    sum.add(&Value::Float(1e30)).unwrap();
    sum.remove(&Value::Float(1e30)).unwrap();
    assert_eq!(sum.end().unwrap(), Value::Integer(3));

    let rows: Vec<Value> = vec![json!({"a": 1e30}).into(), json!({"a": 2.0}).into()];
    let container = jx::ListContainer::new("big", rows).unwrap();
    let output = jx::Container::query(&container, &json!({"select": {"value": "a", "aggregate": "sum"}}).into()).unwrap();
    assert_eq!(output.as_value(), Some(&Value::Float(1e30)));
}

#[test]
fn test_nulls_never_enter_accumulators() {
    let values = vec![Value::Integer(1), Value::Null, Value::Integer(3)];
    assert_eq!(slide(&values, "count", None).unwrap()[0], Value::Integer(2));
    assert_eq!(slide(&values, "avg", None).unwrap()[0], Value::Float(2.0));
    assert_eq!(slide(&values, "min", None).unwrap()[0], Value::Integer(1));
}

#[test]
fn test_sliding_frames() {
    let values = ints(&[1, 2, 3, 4, 5]);

    let trailing = slide(&values, "sum", Some(Range { min: Some(-2), max: Some(1) })).unwrap();
    assert_eq!(trailing, ints(&[1, 3, 6, 9, 12]));

    let leading = slide(&values, "sum", Some(Range { min: Some(0), max: Some(2) })).unwrap();
    assert_eq!(leading, ints(&[3, 5, 7, 9, 5]));

    let running = slide(&values, "max", Some(Range { min: None, max: Some(1) })).unwrap();
    assert_eq!(running, ints(&[1, 2, 3, 4, 5]));

    let rest = slide(&values, "min", Some(Range { min: Some(0), max: None })).unwrap();
    assert_eq!(rest, ints(&[1, 2, 3, 4, 5]));

    let previous = slide(&values, "sum", Some(Range { min: Some(-1), max: Some(0) })).unwrap();
    assert_eq!(previous, ints(&[0, 1, 2, 3, 4]));
}

#[test]
fn test_sliding_min_matches_recomputation() {
    let values = ints(&[7, 2, 9, 2, 5, 1, 8, 3]);
    let range = Range { min: Some(-2), max: Some(2) };
    let slid = slide(&values, "min", Some(range)).unwrap();

    for (i, result) in slid.iter().enumerate() {
        let lo = i.saturating_sub(2);
        let hi = (i + 2).min(values.len());
        let expected = values[lo..hi].iter().filter_map(Value::as_int).min().map(Value::Integer);
        assert_eq!(Some(result.clone()), expected, "frame at {}", i);
    }
}

#[test]
fn test_slide_rejects_unknown_aggregate() {
    assert!(slide(&ints(&[1]), "median", None).is_err());
}

#[test]
fn test_registry() {
    let registry = AggregateRegistry::with_builtins();
    assert_eq!(registry.names(), vec!["avg", "count", "max", "min", "stats", "sum"]);
    assert!(registry.init("stats").is_some());
    assert!(registry.init("median").is_none());
    assert!(!AggregateRegistry::empty().contains("count"));
}

#[derive(Debug)]
struct Product {
    product: f64,
    zeros: i64,
}

impl Accumulator for Product {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn add(&mut self, value: &Value) -> Result<(), ExecutionError> {
        match value.as_float() {
            Some(x) if x == 0.0 => self.zeros += 1,
            Some(x) => self.product *= x,
            None => {}
        }
        Ok(())
    }

    fn remove(&mut self, value: &Value) -> Result<(), ExecutionError> {
        match value.as_float() {
            Some(x) if x == 0.0 => self.zeros -= 1,
            Some(x) => self.product /= x,
            None => {}
        }
        Ok(())
    }

    fn merge(&mut self, other: &dyn Accumulator) -> Result<(), ExecutionError> {
        let other = other
            .as_any()
            .downcast_ref::<Product>()
            .ok_or_else(|| ExecutionError::TypeError("not a product".to_string()))?;
        self.product *= other.product;
        self.zeros += other.zeros;
        Ok(())
    }

    fn end(&self) -> Result<Value, ExecutionError> {
        Ok(Value::Float(if self.zeros > 0 { 0.0 } else { self.product }))
    }
}

#[test]
fn test_register_custom_aggregate() {
    register_aggregate("product", || {
        Box::new(Product {
            product: 1.0,
            zeros: 0,
        })
    });
    assert!(is_aggregate("product"));
    assert!(init_aggregate("product").is_some());

    let results = slide(&ints(&[2, 3, 4]), "product", Some(Range { min: Some(-1), max: Some(1) })).unwrap();
    assert_eq!(results, vec![Value::Float(2.0), Value::Float(6.0), Value::Float(12.0)]);

    let rows: Vec<Value> = vec![json!({"x": 2}).into(), json!({"x": 5}).into()];
    let container = jx::ListContainer::new("numbers", rows).unwrap();
    let output = jx::Container::query(
        &container,
        &json!({"select": {"name": "p", "value": "x", "aggregate": "product"}}).into(),
    )
    .unwrap();
    assert_eq!(output.as_value(), Some(&Value::Float(10.0)));
}
