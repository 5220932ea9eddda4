use serde::Deserialize;
use tracing::trace;

use crate::adapters::{view_lost, Node};
use crate::core::{
    downcast_ref, flow_from, Contract, Element, Error, Fill, FillCompute, FillInto, FillRequest,
    FillStatus, Flow, Map, Result, Run, Value, CONTINUE, STOP,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComputeVia {
    Native,
    Request,
}

/// Adapter exposing the FillCompute contract.
///
/// Accepts a native fill-compute accumulator, or a fill-request one whose
/// `request` followed by `clear` stands in for `compute`.
#[derive(Debug)]
pub struct FillComputeStage {
    node: Node,
    via: ComputeVia,
}

impl FillComputeStage {
    pub fn new(mut element: Box<dyn Element>) -> Result<Self> {
        let via = if element.as_fill_compute().is_some() {
            ComputeVia::Native
        } else if element.as_fill_request().is_some() {
            ComputeVia::Request
        } else {
            return Err(Error::unsupported(&mut *element, Contract::FillCompute));
        };
        Ok(Self {
            node: Node::new(element),
            via,
        })
    }

    pub fn into_inner(self) -> Result<Box<dyn Element>> {
        self.node.into_inner()
    }
}

impl Fill for FillComputeStage {
    fn fill(&mut self, value: Value) -> Result<FillStatus> {
        let mut el = self.node.get_mut()?;
        match self.via {
            ComputeVia::Native => match el.as_fill_compute() {
                Some(acc) => acc.fill(value),
                None => Err(view_lost(el.as_ref(), Contract::FillCompute)),
            },
            ComputeVia::Request => match el.as_fill_request() {
                Some(acc) => acc.fill(value),
                None => Err(view_lost(el.as_ref(), Contract::FillRequest)),
            },
        }
    }
}

impl FillCompute for FillComputeStage {
    fn compute(&mut self) -> Result<Flow> {
        let mut el = self.node.get_mut()?;
        match self.via {
            ComputeVia::Native => match el.as_fill_compute() {
                Some(acc) => acc.compute(),
                None => Err(view_lost(el.as_ref(), Contract::FillCompute)),
            },
            ComputeVia::Request => match el.as_fill_request() {
                Some(acc) => {
                    // results must not depend on the cleared state
                    let results = acc.request()?.collect::<Result<Vec<_>>>()?;
                    acc.clear()?;
                    Ok(flow_from(results))
                }
                None => Err(view_lost(el.as_ref(), Contract::FillRequest)),
            },
        }
    }
}

impl Element for FillComputeStage {
    fn as_fill_compute(&mut self) -> Option<&mut dyn FillCompute> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        match downcast_ref::<FillComputeStage>(other) {
            Some(other) => self.node.eq_node(&other.node),
            None => self.node.eq_element(other),
        }
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        self.node.update_static(metadata)
    }
}

/// Options of the buffered `run` of a fill-request stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FillRequestConfig {
    /// Values filled between two requests. Must be at least 1.
    pub bufsize: usize,
    /// Call `clear` after every request.
    pub clear: bool,
    /// Request once more for a trailing partial buffer.
    pub yield_on_remainder: bool,
}

impl Default for FillRequestConfig {
    fn default() -> Self {
        Self {
            bufsize: 1,
            clear: false,
            yield_on_remainder: true,
        }
    }
}

impl FillRequestConfig {
    pub fn bufsize(mut self, bufsize: usize) -> Self {
        self.bufsize = bufsize;
        self
    }

    pub fn clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    pub fn yield_on_remainder(mut self, yield_on_remainder: bool) -> Self {
        self.yield_on_remainder = yield_on_remainder;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bufsize == 0 {
            return Err(Error::invalid(format!(
                "bufsize must be a natural number, {} provided",
                self.bufsize
            )));
        }
        Ok(())
    }
}

/// Which capability backs `request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestVia {
    Native,
    /// `compute` used as `request`.
    Compute,
}

/// Shared handle to a fill-request accumulator, cloned into buffered flows.
#[derive(Debug, Clone)]
struct RequestCore {
    node: Node,
    via: RequestVia,
    clear_after: bool,
}

impl Fill for RequestCore {
    fn fill(&mut self, value: Value) -> Result<FillStatus> {
        let mut el = self.node.get_mut()?;
        match self.via {
            RequestVia::Native => match el.as_fill_request() {
                Some(acc) => acc.fill(value),
                None => Err(view_lost(el.as_ref(), Contract::FillRequest)),
            },
            RequestVia::Compute => match el.as_fill_compute() {
                Some(acc) => acc.fill(value),
                None => Err(view_lost(el.as_ref(), Contract::FillCompute)),
            },
        }
    }
}

impl FillRequest for RequestCore {
    fn request(&mut self) -> Result<Flow> {
        let mut el = self.node.get_mut()?;
        match self.via {
            RequestVia::Native => match el.as_fill_request() {
                Some(acc) => {
                    let results = acc.request()?;
                    if self.clear_after {
                        acc.clear()?;
                    }
                    Ok(results)
                }
                None => Err(view_lost(el.as_ref(), Contract::FillRequest)),
            },
            RequestVia::Compute => match el.as_fill_compute() {
                Some(acc) => acc.compute(),
                None => Err(view_lost(el.as_ref(), Contract::FillCompute)),
            },
        }
    }

    fn clear(&mut self) -> Result<()> {
        let mut el = self.node.get_mut()?;
        match self.via {
            RequestVia::Native => match el.as_fill_request() {
                Some(acc) => acc.clear(),
                None => Err(view_lost(el.as_ref(), Contract::FillRequest)),
            },
            // compute already starts a new epoch
            RequestVia::Compute => Ok(()),
        }
    }
}

/// Adapter exposing the FillRequest contract.
///
/// Accepts a native fill-request accumulator, or a fill-compute one whose
/// `compute` stands in for `request`. The adapter also runs: a native `run`
/// of the element wins, otherwise input is filled in buffers of
/// [`FillRequestConfig::bufsize`] values with a request after each buffer.
#[derive(Debug)]
pub struct FillRequestStage {
    core: RequestCore,
    config: FillRequestConfig,
    native_run: bool,
}

impl FillRequestStage {
    pub fn new(element: Box<dyn Element>) -> Result<Self> {
        Self::with_config(element, FillRequestConfig::default())
    }

    pub fn with_config(mut element: Box<dyn Element>, config: FillRequestConfig) -> Result<Self> {
        config.validate()?;
        let via = if element.as_fill_request().is_some() {
            RequestVia::Native
        } else if element.as_fill_compute().is_some() {
            RequestVia::Compute
        } else {
            return Err(Error::unsupported(&mut *element, Contract::FillRequest));
        };
        let native_run = element.as_run().is_some();
        trace!(element = ?element, via = ?via, native_run, "adapted to FillRequest");
        Ok(Self {
            core: RequestCore {
                node: Node::new(element),
                via,
                clear_after: config.clear,
            },
            config,
            native_run,
        })
    }

    pub fn config(&self) -> &FillRequestConfig {
        &self.config
    }

    pub fn into_inner(self) -> Result<Box<dyn Element>> {
        self.core.node.into_inner()
    }
}

impl Fill for FillRequestStage {
    fn fill(&mut self, value: Value) -> Result<FillStatus> {
        self.core.fill(value)
    }
}

impl FillRequest for FillRequestStage {
    fn request(&mut self) -> Result<Flow> {
        self.core.request()
    }

    fn clear(&mut self) -> Result<()> {
        self.core.clear()
    }
}

impl Run for FillRequestStage {
    fn run(&mut self, flow: Flow) -> Result<Flow> {
        if self.native_run {
            let mut el = self.core.node.get_mut()?;
            return match el.as_run() {
                Some(run) => run.run(flow),
                None => Err(view_lost(el.as_ref(), Contract::Run)),
            };
        }
        Ok(Box::new(BufferedRequest::new(
            self.core.clone(),
            flow,
            &self.config,
        )))
    }
}

impl Element for FillRequestStage {
    fn as_fill_request(&mut self) -> Option<&mut dyn FillRequest> {
        Some(self)
    }

    fn as_run(&mut self) -> Option<&mut dyn Run> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        match downcast_ref::<FillRequestStage>(other) {
            Some(other) => self.config == other.config && self.core.node.eq_node(&other.core.node),
            None => self.core.node.eq_element(other),
        }
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        self.core.node.update_static(metadata)
    }
}

/// Fill `bufsize` values, request, repeat.
///
/// An empty input is still requested once. A trailing partial buffer is
/// requested only with `yield_on_remainder`. A stop signal from `fill`
/// requests what was filled and ends the flow. Errors end the flow.
pub(crate) struct BufferedRequest<R> {
    target: R,
    input: Option<Flow>,
    output: Option<Flow>,
    bufsize: usize,
    yield_on_remainder: bool,
    filled_once: bool,
}

impl<R: FillRequest> BufferedRequest<R> {
    pub(crate) fn new(target: R, input: Flow, config: &FillRequestConfig) -> Self {
        Self {
            target,
            input: Some(input),
            output: None,
            bufsize: config.bufsize.max(1),
            yield_on_remainder: config.yield_on_remainder,
            filled_once: false,
        }
    }

    /// Fill one buffer. Returns whether to request now.
    fn fill_buffer(&mut self) -> Result<bool> {
        let Some(input) = self.input.as_mut() else {
            return Ok(false);
        };
        let mut filled = 0;
        while filled < self.bufsize {
            let Some(item) = input.next() else {
                self.input = None;
                let request = if filled == 0 {
                    !self.filled_once
                } else {
                    self.yield_on_remainder
                };
                return Ok(request);
            };
            filled += 1;
            self.filled_once = true;
            if self.target.fill(item?)?.is_break() {
                self.input = None;
                return Ok(true);
            }
        }
        Ok(true)
    }

    fn finish(&mut self) {
        self.input = None;
        self.output = None;
    }
}

impl<R: FillRequest> Iterator for BufferedRequest<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(output) = self.output.as_mut() {
                match output.next() {
                    Some(Ok(value)) => return Some(Ok(value)),
                    Some(Err(e)) => {
                        self.finish();
                        return Some(Err(e));
                    }
                    None => self.output = None,
                }
            }
            self.input.as_ref()?;
            match self.fill_buffer() {
                Ok(true) => match self.target.request() {
                    Ok(results) => self.output = Some(results),
                    Err(e) => {
                        self.finish();
                        return Some(Err(e));
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillIntoVia {
    Native,
    Transform,
    Run,
}

/// Adapter exposing the FillInto contract.
///
/// Accepts, in order: a native `fill_into`; a transform, whose result is
/// filled; a `run` over a one-value flow, each result filled, only when
/// `allow_run` is set. The last one changes how often the target sees
/// updates, hence the opt-in.
#[derive(Debug)]
pub struct FillIntoStage {
    node: Node,
    via: FillIntoVia,
}

impl FillIntoStage {
    pub fn new(mut element: Box<dyn Element>, allow_run: bool) -> Result<Self> {
        let via = if element.as_fill_into().is_some() {
            FillIntoVia::Native
        } else if element.as_transform().is_some() {
            FillIntoVia::Transform
        } else if allow_run && element.as_run().is_some() {
            FillIntoVia::Run
        } else {
            return Err(Error::unsupported(&mut *element, Contract::FillInto));
        };
        Ok(Self {
            node: Node::new(element),
            via,
        })
    }

    pub fn into_inner(self) -> Result<Box<dyn Element>> {
        self.node.into_inner()
    }
}

impl FillInto for FillIntoStage {
    fn fill_into(&mut self, target: &mut dyn Fill, value: Value) -> Result<FillStatus> {
        match self.via {
            FillIntoVia::Native => {
                let mut el = self.node.get_mut()?;
                match el.as_fill_into() {
                    Some(stage) => stage.fill_into(target, value),
                    None => Err(view_lost(el.as_ref(), Contract::FillInto)),
                }
            }
            FillIntoVia::Transform => {
                let transformed = {
                    let el = self.node.get()?;
                    match el.as_transform() {
                        Some(transform) => transform.apply(value)?,
                        None => return Err(view_lost(el.as_ref(), Contract::Transform)),
                    }
                };
                target.fill(transformed)
            }
            FillIntoVia::Run => {
                let results = {
                    let mut el = self.node.get_mut()?;
                    match el.as_run() {
                        Some(run) => run.run(flow_from([value]))?,
                        None => return Err(view_lost(el.as_ref(), Contract::Run)),
                    }
                };
                for result in results {
                    if target.fill(result?)?.is_break() {
                        return Ok(STOP);
                    }
                }
                Ok(CONTINUE)
            }
        }
    }
}

impl Element for FillIntoStage {
    fn as_fill_into(&mut self) -> Option<&mut dyn FillInto> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        match downcast_ref::<FillIntoStage>(other) {
            Some(other) => self.node.eq_node(&other.node),
            None => self.node.eq_element(other),
        }
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        self.node.update_static(metadata)
    }
}
