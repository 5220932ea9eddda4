use tracing::debug;

use crate::adapters::FillComputeStage;
use crate::core::{
    downcast_ref, Contract, Element, Error, Fill, FillCompute, FillInto, FillStatus, Flow, Map,
    Result, Run, Value,
};
use crate::pipeline::{flatten, FillChain, Pipeline};
use crate::rewrite::{rewrite_cached, Rewritten};

/// Split a flat element list at the first element matching `is_accumulator`.
pub(crate) fn split_at_accumulator(
    elements: Vec<Box<dyn Element>>,
    contract: Contract,
    mut is_accumulator: impl FnMut(&mut dyn Element) -> bool,
) -> Result<(Vec<Box<dyn Element>>, Box<dyn Element>, Vec<Box<dyn Element>>)> {
    let mut elements = flatten(elements)?;
    let Some(index) = elements
        .iter_mut()
        .position(|element| is_accumulator(element.as_mut()))
    else {
        return Err(Error::mismatch(&elements, contract));
    };
    let after = elements.split_off(index + 1);
    let accumulator = elements.pop().ok_or_else(|| Error::mismatch(&after, contract))?;
    Ok((elements, accumulator, after))
}

/// A pipeline around one fill-compute accumulator.
///
/// Elements before the accumulator preprocess each filled value; they are
/// cast to fill-into, so a stage that can only run is refused here. Elements
/// after it postprocess the computed flow. Later accumulators are ordinary
/// run stages of that tail.
#[derive(Debug)]
pub struct FillComputePipeline {
    before: FillChain,
    accumulator: FillComputeStage,
    after: Pipeline,
}

impl FillComputePipeline {
    pub fn new(elements: Vec<Box<dyn Element>>) -> Result<Self> {
        let (before, accumulator, after) =
            split_at_accumulator(elements, Contract::FillCompute, |element| {
                element.as_fill_compute().is_some()
            })?;
        let pipeline = Self {
            before: FillChain::new(before)?,
            accumulator: FillComputeStage::new(accumulator)?,
            after: Pipeline::new(after)?,
        };
        debug!(
            before = pipeline.before.len(),
            after = pipeline.after.len(),
            "fill-compute pipeline built"
        );
        Ok(pipeline)
    }

    pub fn static_metadata(&self) -> Result<Map> {
        let mut metadata = Map::new();
        self.update_static(&mut metadata)?;
        Ok(metadata)
    }

    /// Give back the elements the pipeline was built from.
    pub fn into_elements(self) -> Result<Vec<Box<dyn Element>>> {
        let mut elements = self.before.into_elements()?;
        elements.push(self.accumulator.into_inner()?);
        elements.extend(self.after.into_elements()?);
        Ok(elements)
    }

    /// Start from the last filled cache, if there is one.
    pub fn rewrite_cached(self) -> Result<Rewritten<FillComputePipeline>> {
        Ok(match rewrite_cached(self.into_elements()?)? {
            Rewritten::Unchanged(elements) => {
                Rewritten::Unchanged(FillComputePipeline::new(elements)?)
            }
            Rewritten::Replayed(source) => Rewritten::Replayed(source),
        })
    }
}

impl Fill for FillComputePipeline {
    fn fill(&mut self, value: Value) -> Result<FillStatus> {
        self.before.fill_into(&mut self.accumulator, value)
    }
}

impl FillCompute for FillComputePipeline {
    fn compute(&mut self) -> Result<Flow> {
        let results = self.accumulator.compute()?;
        self.after.run(results)
    }
}

impl PartialEq for FillComputePipeline {
    fn eq(&self, other: &Self) -> bool {
        self.before == other.before
            && self.accumulator.eq_element(&other.accumulator)
            && self.after == other.after
    }
}

impl Element for FillComputePipeline {
    fn as_fill_compute(&mut self) -> Option<&mut dyn FillCompute> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        downcast_ref::<FillComputePipeline>(other).is_some_and(|other| self == other)
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        self.before.update_static(metadata)?;
        self.accumulator.update_static(metadata)?;
        self.after.update_static(metadata)
    }
}
