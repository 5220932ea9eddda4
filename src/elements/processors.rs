use std::fmt;

use crate::core::{
    downcast_ref, same_element, Element, Error, Fill, FillInto, FillStatus, Flow, Result, Run,
    Transform, Value, CONTINUE, STOP,
};

/// A transform backed by a closure.
///
/// Closures cannot be compared, so an anonymous `Call` is never equal to
/// anything. A named one compares equal to any `Call` of the same name, which
/// lets pipelines built from the same named steps share a common head.
pub struct Call {
    f: Box<dyn Fn(Value) -> Result<Value>>,
    name: Option<String>,
}

impl Call {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + 'static,
    {
        Self {
            f: Box::new(f),
            name: None,
        }
    }

    pub fn named<S, F>(name: S, f: F) -> Self
    where
        S: Into<String>,
        F: Fn(Value) -> Result<Value> + 'static,
    {
        Self {
            f: Box::new(f),
            name: Some(name.into()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Call({})", name),
            None => f.write_str("Call"),
        }
    }
}

impl Transform for Call {
    fn apply(&self, value: Value) -> Result<Value> {
        (self.f)(value)
    }
}

impl Element for Call {
    fn as_transform(&self) -> Option<&dyn Transform> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        self.name.is_some()
            && downcast_ref::<Call>(other).is_some_and(|other| other.name == self.name)
    }
}

/// A flow function run as a stage.
pub struct FnRun<F> {
    f: F,
}

impl<F> FnRun<F>
where
    F: FnMut(Flow) -> Result<Flow> + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnRun<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnRun")
    }
}

impl<F> Run for FnRun<F>
where
    F: FnMut(Flow) -> Result<Flow> + 'static,
{
    fn run(&mut self, flow: Flow) -> Result<Flow> {
        (self.f)(flow)
    }
}

impl<F> Element for FnRun<F>
where
    F: FnMut(Flow) -> Result<Flow> + 'static,
{
    fn as_run(&mut self) -> Option<&mut dyn Run> {
        Some(self)
    }
}

/// Select values by position, like a range over the flow.
///
/// As a run stage it cuts every flow independently. As a fill-into stage it
/// counts the values it is given across calls and signals a stop once every
/// selected position has passed.
#[derive(Debug, Clone)]
pub struct Slice {
    start: usize,
    stop: usize,
    step: usize,
    index: usize,
}

impl Slice {
    /// The first `stop` values.
    pub fn new(stop: usize) -> Self {
        Self {
            start: 0,
            stop,
            step: 1,
            index: 0,
        }
    }

    /// Positions `start`, `start + step`, ... below `stop`.
    pub fn range(start: usize, stop: usize, step: usize) -> Result<Self> {
        if step == 0 {
            return Err(Error::invalid("slice step must be positive"));
        }
        Ok(Self {
            start,
            stop,
            step,
            index: 0,
        })
    }

    fn last_selected(&self) -> Option<usize> {
        if self.stop <= self.start {
            return None;
        }
        Some(self.start + (self.stop - 1 - self.start) / self.step * self.step)
    }

    fn selects(&self, index: usize) -> bool {
        index >= self.start && index < self.stop && (index - self.start) % self.step == 0
    }
}

impl PartialEq for Slice {
    fn eq(&self, other: &Self) -> bool {
        (self.start, self.stop, self.step) == (other.start, other.stop, other.step)
    }
}

impl Run for Slice {
    fn run(&mut self, flow: Flow) -> Result<Flow> {
        Ok(Box::new(
            flow.take(self.stop).skip(self.start).step_by(self.step),
        ))
    }
}

impl FillInto for Slice {
    fn fill_into(&mut self, target: &mut dyn Fill, value: Value) -> Result<FillStatus> {
        let index = self.index;
        if self.last_selected().is_none_or(|last| index > last) {
            return Ok(STOP);
        }
        self.index += 1;
        if self.selects(index) {
            return target.fill(value);
        }
        Ok(CONTINUE)
    }
}

impl Element for Slice {
    fn as_run(&mut self) -> Option<&mut dyn Run> {
        Some(self)
    }

    fn as_fill_into(&mut self) -> Option<&mut dyn FillInto> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        same_element(self, other)
    }
}

/// Keep only values matching a predicate.
pub struct Filter<P> {
    predicate: std::rc::Rc<P>,
}

impl<P> Filter<P>
where
    P: Fn(&Value) -> bool + 'static,
{
    pub fn new(predicate: P) -> Self {
        Self {
            predicate: std::rc::Rc::new(predicate),
        }
    }
}

impl<P> fmt::Debug for Filter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter")
    }
}

impl<P> Run for Filter<P>
where
    P: Fn(&Value) -> bool + 'static,
{
    fn run(&mut self, flow: Flow) -> Result<Flow> {
        let predicate = self.predicate.clone();
        Ok(Box::new(flow.filter(move |item| match item {
            Ok(value) => predicate(value),
            Err(_) => true,
        })))
    }
}

impl<P> FillInto for Filter<P>
where
    P: Fn(&Value) -> bool + 'static,
{
    fn fill_into(&mut self, target: &mut dyn Fill, value: Value) -> Result<FillStatus> {
        if (self.predicate)(&value) {
            target.fill(value)
        } else {
            Ok(CONTINUE)
        }
    }
}

impl<P> Element for Filter<P>
where
    P: Fn(&Value) -> bool + 'static,
{
    fn as_run(&mut self) -> Option<&mut dyn Run> {
        Some(self)
    }

    fn as_fill_into(&mut self) -> Option<&mut dyn FillInto> {
        Some(self)
    }
}
