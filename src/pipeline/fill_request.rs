use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use tracing::debug;

use crate::adapters::{BufferedRequest, FillRequestConfig, FillRequestStage};
use crate::core::{
    downcast_ref, Contract, Element, Error, Fill, FillInto, FillRequest, FillStatus, Flow, Map,
    Result, Run, Value,
};
use crate::pipeline::fill_compute::split_at_accumulator;
use crate::pipeline::{FillChain, Pipeline};
use crate::rewrite::{rewrite_cached, Rewritten};

#[derive(Debug)]
struct Parts {
    before: FillChain,
    accumulator: FillRequestStage,
    after: Pipeline,
}

/// Handle shared with the flows handed out by `run`.
#[derive(Debug, Clone)]
struct Shared(Rc<RefCell<Parts>>);

impl Shared {
    fn get_mut(&self) -> Result<RefMut<'_, Parts>> {
        self.0
            .try_borrow_mut()
            .map_err(|_| Error::StageBusy("fill-request pipeline is already in use".to_string()))
    }
}

impl Fill for Shared {
    fn fill(&mut self, value: Value) -> Result<FillStatus> {
        let mut parts = self.get_mut()?;
        let Parts {
            before,
            accumulator,
            ..
        } = &mut *parts;
        before.fill_into(accumulator, value)
    }
}

impl FillRequest for Shared {
    fn request(&mut self) -> Result<Flow> {
        let mut parts = self.get_mut()?;
        let results = parts.accumulator.request()?;
        parts.after.run(results)
    }

    fn clear(&mut self) -> Result<()> {
        self.get_mut()?.accumulator.clear()
    }
}

/// A pipeline around one fill-request accumulator.
///
/// Built like [`crate::pipeline::FillComputePipeline`]. The accumulator is
/// adapted with the pipeline's [`FillRequestConfig`], so `clear` after each
/// request applies to it, and `run` fills in buffers of `bufsize` values with
/// a request after each one.
#[derive(Debug)]
pub struct FillRequestPipeline {
    shared: Shared,
    config: FillRequestConfig,
}

impl FillRequestPipeline {
    pub fn new(elements: Vec<Box<dyn Element>>) -> Result<Self> {
        Self::with_config(elements, FillRequestConfig::default())
    }

    pub fn with_config(elements: Vec<Box<dyn Element>>, config: FillRequestConfig) -> Result<Self> {
        config.validate()?;
        let (before, accumulator, after) =
            split_at_accumulator(elements, Contract::FillRequest, |element| {
                element.as_fill_request().is_some()
            })?;
        let parts = Parts {
            before: FillChain::new(before)?,
            accumulator: FillRequestStage::with_config(accumulator, config.clone())?,
            after: Pipeline::new(after)?,
        };
        debug!(
            before = parts.before.len(),
            after = parts.after.len(),
            bufsize = config.bufsize,
            clear = config.clear,
            "fill-request pipeline built"
        );
        Ok(Self {
            shared: Shared(Rc::new(RefCell::new(parts))),
            config,
        })
    }

    pub fn config(&self) -> &FillRequestConfig {
        &self.config
    }

    pub fn static_metadata(&self) -> Result<Map> {
        let mut metadata = Map::new();
        self.update_static(&mut metadata)?;
        Ok(metadata)
    }

    /// Give back the elements the pipeline was built from.
    ///
    /// Fails with [`Error::StageBusy`] while a flow from `run` is alive.
    pub fn into_elements(self) -> Result<Vec<Box<dyn Element>>> {
        let parts = Rc::try_unwrap(self.shared.0)
            .map_err(|_| Error::StageBusy("fill-request pipeline is still running".to_string()))?
            .into_inner();
        let mut elements = parts.before.into_elements()?;
        elements.push(parts.accumulator.into_inner()?);
        elements.extend(parts.after.into_elements()?);
        Ok(elements)
    }

    /// Start from the last filled cache, if there is one. The config is kept.
    pub fn rewrite_cached(self) -> Result<Rewritten<FillRequestPipeline>> {
        let config = self.config.clone();
        Ok(match rewrite_cached(self.into_elements()?)? {
            Rewritten::Unchanged(elements) => {
                Rewritten::Unchanged(FillRequestPipeline::with_config(elements, config)?)
            }
            Rewritten::Replayed(source) => Rewritten::Replayed(source),
        })
    }
}

impl Fill for FillRequestPipeline {
    fn fill(&mut self, value: Value) -> Result<FillStatus> {
        self.shared.fill(value)
    }
}

impl FillRequest for FillRequestPipeline {
    fn request(&mut self) -> Result<Flow> {
        self.shared.request()
    }

    fn clear(&mut self) -> Result<()> {
        self.shared.clear()
    }
}

impl Run for FillRequestPipeline {
    fn run(&mut self, flow: Flow) -> Result<Flow> {
        Ok(Box::new(BufferedRequest::new(
            self.shared.clone(),
            flow,
            &self.config,
        )))
    }
}

impl PartialEq for FillRequestPipeline {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.shared.0, &other.shared.0) {
            return true;
        }
        match (self.shared.0.try_borrow(), other.shared.0.try_borrow()) {
            (Ok(a), Ok(b)) => {
                a.before == b.before
                    && a.accumulator.eq_element(&b.accumulator)
                    && a.after == b.after
            }
            _ => false,
        }
    }
}

impl Element for FillRequestPipeline {
    fn as_fill_request(&mut self) -> Option<&mut dyn FillRequest> {
        Some(self)
    }

    fn as_run(&mut self) -> Option<&mut dyn Run> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        downcast_ref::<FillRequestPipeline>(other).is_some_and(|other| self == other)
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        let parts = self
            .shared
            .0
            .try_borrow()
            .map_err(|_| Error::StageBusy("fill-request pipeline is already in use".to_string()))?;
        parts.before.update_static(metadata)?;
        parts.accumulator.update_static(metadata)?;
        parts.after.update_static(metadata)
    }
}
