//! Pipelines: chains of stages threading one lazy flow.
//!
//! A [`Pipeline`] adapts each of its elements to Run when it is built, so a
//! stage that cannot run fails construction rather than first use. A
//! [`Source`] puts a producer in front of a pipeline. The accumulate
//! pipelines, [`FillComputePipeline`] and [`FillRequestPipeline`], are built
//! around one accumulator and preprocess every value filled into it.

mod fill_compute;
mod fill_request;
mod fill_seq;
mod source;

pub use fill_compute::FillComputePipeline;
pub use fill_request::FillRequestPipeline;
pub use fill_seq::FillChain;
pub use source::Source;

use tracing::debug;

use crate::adapters::RunStage;
use crate::core::{downcast_mut, downcast_ref, Element, Flow, Map, Result, Run};
use crate::rewrite::{rewrite_cached, Rewritten};

/// An ordered chain of run stages.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<RunStage>,
}

impl Pipeline {
    /// Adapt every element to Run. Nested pipelines are spliced in place.
    pub fn new(elements: Vec<Box<dyn Element>>) -> Result<Self> {
        let stages = flatten(elements)?
            .into_iter()
            .map(RunStage::new)
            .collect::<Result<Vec<_>>>()?;
        debug!(stages = stages.len(), "pipeline built");
        Ok(Self { stages })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Static metadata of all stages, later stages overriding earlier ones.
    pub fn static_metadata(&self) -> Result<Map> {
        let mut metadata = Map::new();
        self.update_static(&mut metadata)?;
        Ok(metadata)
    }

    /// Give back the elements the pipeline was built from.
    pub fn into_elements(self) -> Result<Vec<Box<dyn Element>>> {
        self.stages.into_iter().map(RunStage::into_inner).collect()
    }

    /// Start from the last filled cache, if there is one.
    pub fn rewrite_cached(self) -> Result<Rewritten<Pipeline>> {
        Ok(match rewrite_cached(self.into_elements()?)? {
            Rewritten::Unchanged(elements) => Rewritten::Unchanged(Pipeline::new(elements)?),
            Rewritten::Replayed(source) => Rewritten::Replayed(source),
        })
    }
}

impl Run for Pipeline {
    fn run(&mut self, flow: Flow) -> Result<Flow> {
        self.stages
            .iter_mut()
            .try_fold(flow, |flow, stage| stage.run(flow))
    }
}

impl PartialEq for Pipeline {
    fn eq(&self, other: &Self) -> bool {
        self.stages.len() == other.stages.len()
            && self
                .stages
                .iter()
                .zip(&other.stages)
                .all(|(a, b)| a.eq_element(b))
    }
}

impl Element for Pipeline {
    fn as_run(&mut self) -> Option<&mut dyn Run> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        downcast_ref::<Pipeline>(other).is_some_and(|other| self == other)
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        self.stages
            .iter()
            .try_for_each(|stage| stage.update_static(metadata))
    }
}

/// Splice nested pipelines into a flat element list, preserving order.
pub fn flatten(elements: Vec<Box<dyn Element>>) -> Result<Vec<Box<dyn Element>>> {
    let mut flat = Vec::with_capacity(elements.len());
    for mut element in elements {
        match downcast_mut::<Pipeline>(element.as_mut()) {
            Some(nested) => flat.extend(std::mem::take(nested).into_elements()?),
            None => flat.push(element),
        }
    }
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{flow_from, Value};
    use crate::elements::{Call, SetMetadata, Slice};
    use pretty_assertions::assert_eq;

    fn add(n: i64) -> Box<dyn Element> {
        Box::new(Call::named(format!("add{}", n), move |v: Value| {
            Ok(Value::Int(v.as_int().unwrap_or(0) + n))
        }))
    }

    fn ints(values: &[i64]) -> Flow {
        flow_from(values.iter().copied().map(Value::Int).collect::<Vec<_>>())
    }

    fn collect(flow: Flow) -> Vec<Value> {
        flow.collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_stages_run_in_order() {
        let mut pipeline = Pipeline::new(vec![
            add(1),
            Box::new(Slice::new(2)),
            Box::new(Call::new(|v: Value| Ok(Value::Int(v.as_int().unwrap_or(0) * 10)))),
        ])
        .unwrap();
        assert_eq!(pipeline.len(), 3);
        assert_eq!(
            collect(pipeline.run(ints(&[1, 2, 3])).unwrap()),
            vec![Value::Int(20), Value::Int(30)]
        );
    }

    #[test]
    fn test_nested_pipelines_are_transparent() {
        let inner = Pipeline::new(vec![add(1), add(2)]).unwrap();
        let mut nested = Pipeline::new(vec![add(0), Box::new(inner), add(3)]).unwrap();
        let mut flat = Pipeline::new(vec![add(0), add(1), add(2), add(3)]).unwrap();

        assert_eq!(nested.len(), 4);
        assert!(nested == flat);
        assert_eq!(
            collect(nested.run(ints(&[0, 10])).unwrap()),
            collect(flat.run(ints(&[0, 10])).unwrap())
        );
    }

    #[test]
    fn test_static_metadata_later_stages_win() {
        let pipeline = Pipeline::new(vec![
            Box::new(SetMetadata::new("output.dir", "a")),
            Box::new(SetMetadata::new("output.name", "n")),
            Box::new(SetMetadata::new("output.dir", "b")),
        ])
        .unwrap();
        let metadata = pipeline.static_metadata().unwrap();
        let output = metadata["output"].as_map().unwrap();
        assert_eq!(output["dir"], Value::from("b"));
        assert_eq!(output["name"], Value::from("n"));
    }

    #[test]
    fn test_empty_pipeline_passes_flow() {
        let mut pipeline = Pipeline::new(Vec::new()).unwrap();
        assert!(pipeline.is_empty());
        assert_eq!(collect(pipeline.run(ints(&[1])).unwrap()), vec![Value::Int(1)]);
    }

    #[test]
    fn test_into_elements_round_trip() {
        let pipeline = Pipeline::new(vec![add(1), Box::new(Slice::new(1))]).unwrap();
        let elements = pipeline.into_elements().unwrap();
        assert_eq!(elements.len(), 2);
        assert!(elements[1].eq_element(&Slice::new(1)));
    }
}
