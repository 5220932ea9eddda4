use std::fmt;

use crate::core::{flow_from, same_element, Element, Flow, Produce, Result, Value};

/// A producer of integers from `start`, advancing by `step`, without end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountFrom {
    start: i64,
    step: i64,
}

impl CountFrom {
    pub fn new(start: i64) -> Self {
        Self { start, step: 1 }
    }

    /// Count with a custom increment.
    pub fn with_step(start: i64, step: i64) -> Self {
        Self { start, step }
    }
}

impl Default for CountFrom {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Produce for CountFrom {
    fn produce(&mut self) -> Result<Flow> {
        let step = self.step;
        Ok(Box::new(
            std::iter::successors(Some(self.start), move |n| n.checked_add(step))
                .map(|n| Ok(Value::Int(n))),
        ))
    }
}

impl Element for CountFrom {
    fn as_produce(&mut self) -> Option<&mut dyn Produce> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        same_element(self, other)
    }
}

/// A producer that yields a fixed list of values, once per `produce`.
#[derive(Debug, Clone, PartialEq)]
pub struct Values {
    values: Vec<Value>,
}

impl Values {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Produce for Values {
    fn produce(&mut self) -> Result<Flow> {
        Ok(flow_from(self.values.clone()))
    }
}

impl Element for Values {
    fn as_produce(&mut self) -> Option<&mut dyn Produce> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        same_element(self, other)
    }
}

/// A producer backed by a closure.
pub struct FnSource<F> {
    f: F,
}

impl<F> FnSource<F>
where
    F: FnMut() -> Result<Flow> + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSource")
    }
}

impl<F> Produce for FnSource<F>
where
    F: FnMut() -> Result<Flow> + 'static,
{
    fn produce(&mut self) -> Result<Flow> {
        (self.f)()
    }
}

impl<F> Element for FnSource<F>
where
    F: FnMut() -> Result<Flow> + 'static,
{
    fn as_produce(&mut self) -> Option<&mut dyn Produce> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_from_is_lazy_and_infinite() {
        let mut count = CountFrom::with_step(10, 5);
        let taken: Vec<Value> = count
            .produce()
            .unwrap()
            .take(3)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(taken, vec![Value::Int(10), Value::Int(15), Value::Int(20)]);
    }

    #[test]
    fn test_values_produce_restarts() {
        let mut values = Values::new([1, 2]);
        assert_eq!(values.produce().unwrap().count(), 2);
        assert_eq!(values.produce().unwrap().count(), 2);
    }

    #[test]
    fn test_equality() {
        assert!(CountFrom::new(0).eq_element(&CountFrom::default()));
        assert!(!CountFrom::new(0).eq_element(&CountFrom::new(1)));
        let f = FnSource::new(|| Ok(flow_from([Value::Null])));
        assert!(!f.eq_element(&f));
    }
}
