use crate::adapters::FillIntoStage;
use crate::core::{downcast_ref, Element, Fill, FillInto, FillStatus, Map, Result, Value};

/// Fill-into stages chained in front of an accumulator.
///
/// Each link fills the next one; the last fills the target. A stop signal
/// from any link or from the target is returned as is.
#[derive(Debug, Default)]
pub struct FillChain {
    links: Vec<FillIntoStage>,
}

impl FillChain {
    /// Cast every element to fill-into. Run stages are refused.
    pub fn new(elements: Vec<Box<dyn Element>>) -> Result<Self> {
        let links = elements
            .into_iter()
            .map(|element| FillIntoStage::new(element, false))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { links })
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn into_elements(self) -> Result<Vec<Box<dyn Element>>> {
        self.links.into_iter().map(FillIntoStage::into_inner).collect()
    }
}

struct Link<'a, 'b> {
    rest: &'a mut [FillIntoStage],
    target: &'a mut (dyn Fill + 'b),
}

impl Fill for Link<'_, '_> {
    fn fill(&mut self, value: Value) -> Result<FillStatus> {
        fill_through(self.rest, self.target, value)
    }
}

fn fill_through<'b>(
    links: &mut [FillIntoStage],
    target: &mut (dyn Fill + 'b),
    value: Value,
) -> Result<FillStatus> {
    match links.split_first_mut() {
        None => target.fill(value),
        Some((first, rest)) => first.fill_into(&mut Link { rest, target }, value),
    }
}

impl FillInto for FillChain {
    fn fill_into(&mut self, target: &mut dyn Fill, value: Value) -> Result<FillStatus> {
        fill_through(&mut self.links, target, value)
    }
}

impl PartialEq for FillChain {
    fn eq(&self, other: &Self) -> bool {
        self.links.len() == other.links.len()
            && self
                .links
                .iter()
                .zip(&other.links)
                .all(|(a, b)| a.eq_element(b))
    }
}

impl Element for FillChain {
    fn as_fill_into(&mut self) -> Option<&mut dyn FillInto> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        downcast_ref::<FillChain>(other).is_some_and(|other| self == other)
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        self.links
            .iter()
            .try_for_each(|link| link.update_static(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CONTINUE, STOP};
    use crate::elements::{Call, Filter, Slice};

    #[derive(Default)]
    struct Store(Vec<Value>);

    impl Fill for Store {
        fn fill(&mut self, value: Value) -> Result<FillStatus> {
            self.0.push(value);
            Ok(CONTINUE)
        }
    }

    #[test]
    fn test_links_apply_in_order() {
        let mut chain = FillChain::new(vec![
            Box::new(Filter::new(|v: &Value| v.as_int().is_some_and(|n| n > 1))),
            Box::new(Call::new(|v: Value| Ok(Value::Int(v.as_int().unwrap_or(0) * 10)))),
        ])
        .unwrap();
        let mut store = Store::default();
        for n in 1..=3 {
            chain.fill_into(&mut store, Value::Int(n)).unwrap();
        }
        assert_eq!(store.0, vec![Value::Int(20), Value::Int(30)]);
    }

    #[test]
    fn test_stop_propagates() {
        let mut chain = FillChain::new(vec![Box::new(Slice::new(1))]).unwrap();
        let mut store = Store::default();
        assert_eq!(chain.fill_into(&mut store, Value::Int(1)).unwrap(), CONTINUE);
        assert_eq!(chain.fill_into(&mut store, Value::Int(2)).unwrap(), STOP);
    }

    #[test]
    fn test_empty_chain_fills_target() {
        let mut chain = FillChain::default();
        let mut store = Store::default();
        chain.fill_into(&mut store, Value::Int(5)).unwrap();
        assert_eq!(store.0, vec![Value::Int(5)]);
    }
}
