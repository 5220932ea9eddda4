use tracing::trace;

use crate::adapters::{view_lost, Node};
use crate::core::{downcast_ref, Contract, Element, Error, Flow, Result, Run};
use crate::elements::FnRun;

/// Which capability backs `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunVia {
    /// The element's own `run`.
    Native,
    /// `transform` applied to each value.
    Transform,
    /// Fill with the whole input, then `compute` once.
    FillCompute,
}

/// Adapter exposing the Run contract.
///
/// Inference order, first match wins: a native `run`; a transform, mapped
/// over the flow; a fill-compute accumulator, filled with the whole flow and
/// then computed. Nothing else converts to Run.
#[derive(Debug)]
pub struct RunStage {
    node: Node,
    via: RunVia,
}

impl RunStage {
    pub fn new(mut element: Box<dyn Element>) -> Result<Self> {
        let via = if element.as_run().is_some() {
            RunVia::Native
        } else if element.as_transform().is_some() {
            RunVia::Transform
        } else if element.as_fill_compute().is_some() {
            RunVia::FillCompute
        } else {
            return Err(Error::unsupported(&mut *element, Contract::Run));
        };
        trace!(element = ?element, via = ?via, "adapted to Run");
        Ok(Self {
            node: Node::new(element),
            via,
        })
    }

    /// Build directly from a flow function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(Flow) -> Result<Flow> + 'static,
    {
        Self {
            node: Node::new(Box::new(FnRun::new(f))),
            via: RunVia::Native,
        }
    }

    /// Give back the wrapped element.
    pub fn into_inner(self) -> Result<Box<dyn Element>> {
        self.node.into_inner()
    }
}

impl Run for RunStage {
    fn run(&mut self, flow: Flow) -> Result<Flow> {
        match self.via {
            RunVia::Native => {
                let mut el = self.node.get_mut()?;
                match el.as_run() {
                    Some(run) => run.run(flow),
                    None => Err(view_lost(el.as_ref(), Contract::Run)),
                }
            }
            RunVia::Transform => {
                let node = self.node.clone();
                Ok(Box::new(flow.map(move |item| {
                    let value = item?;
                    let el = node.get()?;
                    match el.as_transform() {
                        Some(transform) => transform.apply(value),
                        None => Err(view_lost(el.as_ref(), Contract::Transform)),
                    }
                })))
            }
            RunVia::FillCompute => {
                let mut el = self.node.get_mut()?;
                let Some(acc) = el.as_fill_compute() else {
                    return Err(view_lost(el.as_ref(), Contract::FillCompute));
                };
                for item in flow {
                    if acc.fill(item?)?.is_break() {
                        break;
                    }
                }
                acc.compute()
            }
        }
    }
}

impl Element for RunStage {
    fn as_run(&mut self) -> Option<&mut dyn Run> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        match downcast_ref::<RunStage>(other) {
            Some(other) => self.node.eq_node(&other.node),
            None => self.node.eq_element(other),
        }
    }

    fn update_static(&self, metadata: &mut crate::core::Map) -> Result<()> {
        self.node.update_static(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{flow_from, Fill, FillCompute, FillStatus, Value, CONTINUE};
    use crate::elements::{Call, Slice};

    #[derive(Debug, Default)]
    struct Total(i64);

    impl Fill for Total {
        fn fill(&mut self, value: Value) -> Result<FillStatus> {
            self.0 += value.as_int().unwrap_or(0);
            Ok(CONTINUE)
        }
    }

    impl FillCompute for Total {
        fn compute(&mut self) -> Result<Flow> {
            Ok(flow_from([Value::Int(std::mem::take(&mut self.0))]))
        }
    }

    impl Element for Total {
        fn as_fill_compute(&mut self) -> Option<&mut dyn FillCompute> {
            Some(self)
        }
    }

    #[derive(Debug)]
    struct Inert;

    impl Element for Inert {}

    fn ints(values: &[i64]) -> Flow {
        flow_from(values.iter().copied().map(Value::Int).collect::<Vec<_>>())
    }

    fn collect(flow: Flow) -> Vec<Value> {
        flow.collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_native_run_matches_direct_call() {
        let mut direct = Slice::new(2);
        let expected = collect(direct.run(ints(&[1, 2, 3])).unwrap());

        let mut stage = RunStage::new(Box::new(Slice::new(2))).unwrap();
        assert_eq!(collect(stage.run(ints(&[1, 2, 3])).unwrap()), expected);
    }

    #[test]
    fn test_transform_is_mapped_lazily() {
        let mut stage = RunStage::new(Box::new(Call::new(|v: Value| {
            Ok(Value::Int(v.as_int().unwrap_or(0) * 10))
        })))
        .unwrap();
        let mut out = stage.run(ints(&[1, 2])).unwrap();
        assert_eq!(out.next().unwrap().unwrap(), Value::Int(10));
        assert_eq!(out.next().unwrap().unwrap(), Value::Int(20));
        assert!(out.next().is_none());
    }

    #[test]
    fn test_fill_compute_drains_whole_flow() {
        let mut stage = RunStage::new(Box::new(Total::default())).unwrap();
        assert_eq!(collect(stage.run(ints(&[1, 2, 3])).unwrap()), vec![Value::Int(6)]);
        // compute started a new epoch
        assert_eq!(collect(stage.run(ints(&[4])).unwrap()), vec![Value::Int(4)]);
    }

    #[test]
    fn test_unadaptable_element_fails_at_construction() {
        let err = RunStage::new(Box::new(Inert)).unwrap_err();
        assert!(matches!(
            err,
            Error::CapabilityMismatch {
                contract: Contract::Run,
                ..
            }
        ));
    }
}
