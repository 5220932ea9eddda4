//! Fan one flow out to several branches.
//!
//! A [`Split`] reads its input in buffers and hands every buffer to each
//! active branch in declared order. How a branch treats a buffer depends on
//! its kind:
//!
//! | Kind          | Per buffer                       | After the input ends              |
//! |---------------|----------------------------------|-----------------------------------|
//! | `Source`      | produce once, then retire        | produce, if the input was empty   |
//! | `FillCompute` | fill                             | compute                           |
//! | `FillRequest` | fill, then request               | request, if the input was empty   |
//! | `Pipeline`    | run over the buffer              | run over nothing, if input empty  |
//!
//! A stop signal from `fill` retires the branch: a fill-compute branch is
//! computed first, a fill-request branch is requested as usual. The other
//! branches carry on.

mod run;

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::{
    downcast_ref, Contract, Element, Error, Fill, FillCompute, FillRequest, FillStatus, Flow, Map,
    Produce, Result, Run, Value, CONTINUE, STOP,
};
use crate::pipeline::{flatten, FillComputePipeline, FillRequestPipeline, Pipeline, Source};
use crate::rewrite::{rewrite_cached, Rewritten};

use run::SplitRun;

/// Buffering options of a [`Split`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Values per buffer. `None` reads the whole input into one buffer.
    pub bufsize: Option<usize>,
    /// Give each branch but the last its own copy of every buffer.
    ///
    /// Setting this to `false` currently has no effect. Branches take values
    /// by ownership, so every branch but the last receives a clone either
    /// way. `false` still carries no non-interference guarantee, so code
    /// relying on independent buffers should leave it on.
    pub copy_buf: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            bufsize: Some(1000),
            copy_buf: true,
        }
    }
}

impl SplitConfig {
    pub fn bufsize(mut self, bufsize: impl Into<Option<usize>>) -> Self {
        self.bufsize = bufsize.into();
        self
    }

    pub fn copy_buf(mut self, copy_buf: bool) -> Self {
        self.copy_buf = copy_buf;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bufsize == Some(0) {
            return Err(Error::invalid(
                "bufsize should be a natural number or None, 0 provided",
            ));
        }
        Ok(())
    }
}

/// The way a branch consumes its buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Source,
    FillCompute,
    FillRequest,
    Pipeline,
}

impl BranchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchKind::Source => "source",
            BranchKind::FillCompute => "fill_compute",
            BranchKind::FillRequest => "fill_request",
            BranchKind::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A branch as given to [`Split::new`].
///
/// Typed pipelines keep their kind. A plain element list becomes a
/// [`Source`] if its first element only produces, a
/// [`FillComputePipeline`] if any element is a fill-compute accumulator,
/// else a [`FillRequestPipeline`] if any is a fill-request one, else a
/// [`Pipeline`].
#[derive(Debug)]
pub enum SplitBranch {
    Source(Source),
    FillCompute(FillComputePipeline),
    FillRequest(FillRequestPipeline),
    Pipeline(Pipeline),
    Elements(Vec<Box<dyn Element>>),
}

impl From<Source> for SplitBranch {
    fn from(source: Source) -> Self {
        SplitBranch::Source(source)
    }
}

impl From<FillComputePipeline> for SplitBranch {
    fn from(pipeline: FillComputePipeline) -> Self {
        SplitBranch::FillCompute(pipeline)
    }
}

impl From<FillRequestPipeline> for SplitBranch {
    fn from(pipeline: FillRequestPipeline) -> Self {
        SplitBranch::FillRequest(pipeline)
    }
}

impl From<Pipeline> for SplitBranch {
    fn from(pipeline: Pipeline) -> Self {
        SplitBranch::Pipeline(pipeline)
    }
}

impl From<Vec<Box<dyn Element>>> for SplitBranch {
    fn from(elements: Vec<Box<dyn Element>>) -> Self {
        SplitBranch::Elements(elements)
    }
}

impl From<Box<dyn Element>> for SplitBranch {
    fn from(element: Box<dyn Element>) -> Self {
        SplitBranch::Elements(vec![element])
    }
}

#[derive(Debug)]
pub(crate) enum Branch {
    Source(Source),
    FillCompute(FillComputePipeline),
    FillRequest(FillRequestPipeline),
    Pipeline(Pipeline),
}

impl Branch {
    /// Apply the cache rewrite, then settle the kind.
    fn build(branch: SplitBranch) -> Result<Self> {
        Ok(match branch {
            SplitBranch::Source(source) => Branch::Source(source.rewrite_cached()?),
            SplitBranch::FillCompute(pipeline) => match pipeline.rewrite_cached()? {
                Rewritten::Unchanged(pipeline) => Branch::FillCompute(pipeline),
                Rewritten::Replayed(source) => Branch::Source(source),
            },
            SplitBranch::FillRequest(pipeline) => match pipeline.rewrite_cached()? {
                Rewritten::Unchanged(pipeline) => Branch::FillRequest(pipeline),
                Rewritten::Replayed(source) => Branch::Source(source),
            },
            SplitBranch::Pipeline(pipeline) => match pipeline.rewrite_cached()? {
                Rewritten::Unchanged(pipeline) => Branch::Pipeline(pipeline),
                Rewritten::Replayed(source) => Branch::Source(source),
            },
            SplitBranch::Elements(elements) => match rewrite_cached(flatten(elements)?)? {
                Rewritten::Unchanged(elements) => Self::detect(elements)?,
                Rewritten::Replayed(source) => Branch::Source(source),
            },
        })
    }

    fn detect(mut elements: Vec<Box<dyn Element>>) -> Result<Self> {
        let produces_only = elements.first_mut().is_some_and(|first| {
            first.as_produce().is_some() && first.as_run().is_none() && first.as_transform().is_none()
        });
        if produces_only {
            return Ok(Branch::Source(Source::new(elements)?));
        }
        if elements.iter_mut().any(|el| el.as_fill_compute().is_some()) {
            return Ok(Branch::FillCompute(FillComputePipeline::new(elements)?));
        }
        if elements.iter_mut().any(|el| el.as_fill_request().is_some()) {
            return Ok(Branch::FillRequest(FillRequestPipeline::new(elements)?));
        }
        Ok(Branch::Pipeline(Pipeline::new(elements)?))
    }

    pub(crate) fn kind(&self) -> BranchKind {
        match self {
            Branch::Source(_) => BranchKind::Source,
            Branch::FillCompute(_) => BranchKind::FillCompute,
            Branch::FillRequest(_) => BranchKind::FillRequest,
            Branch::Pipeline(_) => BranchKind::Pipeline,
        }
    }

    fn element(&self) -> &dyn Element {
        match self {
            Branch::Source(source) => source,
            Branch::FillCompute(pipeline) => pipeline,
            Branch::FillRequest(pipeline) => pipeline,
            Branch::Pipeline(pipeline) => pipeline,
        }
    }

    fn mismatch(&self, contract: Contract) -> Error {
        Error::mismatch(self.element(), contract)
    }

    pub(crate) fn fill(&mut self, value: Value) -> Result<FillStatus> {
        match self {
            Branch::FillCompute(pipeline) => pipeline.fill(value),
            Branch::FillRequest(pipeline) => pipeline.fill(value),
            _ => Err(self.mismatch(Contract::FillCompute)),
        }
    }

    pub(crate) fn compute(&mut self) -> Result<Flow> {
        match self {
            Branch::FillCompute(pipeline) => pipeline.compute(),
            _ => Err(self.mismatch(Contract::FillCompute)),
        }
    }

    pub(crate) fn request(&mut self) -> Result<Flow> {
        match self {
            Branch::FillRequest(pipeline) => pipeline.request(),
            _ => Err(self.mismatch(Contract::FillRequest)),
        }
    }

    pub(crate) fn produce(&mut self) -> Result<Flow> {
        match self {
            Branch::Source(source) => source.produce(),
            _ => Err(self.mismatch(Contract::Produce)),
        }
    }

    pub(crate) fn run(&mut self, flow: Flow) -> Result<Flow> {
        match self {
            Branch::Pipeline(pipeline) => pipeline.run(flow),
            _ => Err(self.mismatch(Contract::Run)),
        }
    }
}

pub(crate) type Branches = Rc<RefCell<Vec<Branch>>>;

pub(crate) fn borrow_mut(branches: &Branches) -> Result<RefMut<'_, Vec<Branch>>> {
    branches
        .try_borrow_mut()
        .map_err(|_| Error::StageBusy("split is already in use".to_string()))
}

fn borrow(branches: &Branches) -> Result<Ref<'_, Vec<Branch>>> {
    branches
        .try_borrow()
        .map_err(|_| Error::StageBusy("split is already in use".to_string()))
}

/// Fan-out of one flow to independently typed branches.
///
/// ```rust
/// use pipeweld::core::{Run, Value, flow_from};
/// use pipeweld::elements::{Call, Slice};
/// use pipeweld::split::{Split, SplitBranch, SplitConfig};
///
/// let mut split = Split::with_config(
///     vec![
///         SplitBranch::from(vec![Box::new(Slice::new(1)) as Box<dyn pipeweld::core::Element>]),
///         SplitBranch::from(vec![Box::new(Call::new(|v: Value| Ok(Value::Int(v.as_int().unwrap_or(0) * 10))))
///             as Box<dyn pipeweld::core::Element>]),
///     ],
///     SplitConfig::default().bufsize(2),
/// )?;
/// let out: Vec<Value> = split
///     .run(flow_from([Value::Int(1), Value::Int(2)]))?
///     .collect::<Result<_, _>>()?;
/// assert_eq!(out, vec![Value::Int(1), Value::Int(10), Value::Int(20)]);
/// # Ok::<(), pipeweld::Error>(())
/// ```
pub struct Split {
    branches: Branches,
    kinds: Vec<BranchKind>,
    config: SplitConfig,
    /// Branches that stopped during a direct `fill`.
    stopped: Vec<bool>,
}

impl Split {
    pub fn new(branches: Vec<SplitBranch>) -> Result<Self> {
        Self::with_config(branches, SplitConfig::default())
    }

    pub fn with_config(branches: Vec<SplitBranch>, config: SplitConfig) -> Result<Self> {
        config.validate()?;
        let branches = branches
            .into_iter()
            .map(Branch::build)
            .collect::<Result<Vec<_>>>()?;
        let kinds: Vec<BranchKind> = branches.iter().map(Branch::kind).collect();
        if !config.copy_buf {
            warn!("copy_buf = false has no effect, buffers are still cloned per branch");
        }
        debug!(
            kinds = ?kinds,
            bufsize = ?config.bufsize,
            copy_buf = config.copy_buf,
            "split built"
        );
        Ok(Self {
            stopped: vec![false; branches.len()],
            branches: Rc::new(RefCell::new(branches)),
            kinds,
            config,
        })
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn kinds(&self) -> &[BranchKind] {
        &self.kinds
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// The kind shared by every branch, if there is one.
    pub fn uniform_kind(&self) -> Option<BranchKind> {
        let (first, rest) = self.kinds.split_first()?;
        rest.iter().all(|kind| kind == first).then_some(*first)
    }

    pub fn static_metadata(&self) -> Result<Map> {
        let mut metadata = Map::new();
        self.update_static(&mut metadata)?;
        Ok(metadata)
    }

    fn fill_branches(&mut self, mut value: Value) -> Result<FillStatus> {
        let mut branches = borrow_mut(&self.branches)?;
        let live: Vec<usize> = (0..branches.len()).filter(|&i| !self.stopped[i]).collect();
        for (position, &index) in live.iter().enumerate() {
            let value = if position + 1 < live.len() {
                value.clone()
            } else {
                std::mem::take(&mut value)
            };
            if branches[index].fill(value)?.is_break() {
                warn!(branch = index, "branch stopped filling");
                self.stopped[index] = true;
            }
        }
        Ok(if self.stopped.iter().all(|&stopped| stopped) {
            STOP
        } else {
            CONTINUE
        })
    }

    /// Call `f` on every branch, chaining the flows it returns.
    fn chain(&self, f: impl Fn(&mut Branch) -> Result<Flow>) -> Result<Flow> {
        let mut branches = borrow_mut(&self.branches)?;
        let flows = branches
            .iter_mut()
            .map(f)
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(flows.into_iter().flatten()))
    }
}

impl fmt::Debug for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Split")
            .field("kinds", &self.kinds)
            .field("config", &self.config)
            .finish()
    }
}

impl Run for Split {
    fn run(&mut self, flow: Flow) -> Result<Flow> {
        if self.is_empty() {
            return Ok(flow);
        }
        Ok(Box::new(SplitRun::new(
            self.branches.clone(),
            self.kinds.len(),
            flow,
            &self.config,
        )))
    }
}

impl Produce for Split {
    fn produce(&mut self) -> Result<Flow> {
        self.chain(Branch::produce)
    }
}

impl Fill for Split {
    fn fill(&mut self, value: Value) -> Result<FillStatus> {
        self.fill_branches(value)
    }
}

impl FillCompute for Split {
    fn compute(&mut self) -> Result<Flow> {
        self.chain(Branch::compute)
    }
}

impl FillRequest for Split {
    fn request(&mut self) -> Result<Flow> {
        self.chain(Branch::request)
    }

    fn clear(&mut self) -> Result<()> {
        let mut branches = borrow_mut(&self.branches)?;
        for branch in branches.iter_mut() {
            if let Branch::FillRequest(pipeline) = branch {
                pipeline.clear()?;
            }
        }
        Ok(())
    }
}

impl PartialEq for Split {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.branches, &other.branches) {
            return true;
        }
        let (Ok(a), Ok(b)) = (borrow(&self.branches), borrow(&other.branches)) else {
            return false;
        };
        self.config == other.config
            && a.len() == b.len()
            && a.iter()
                .zip(b.iter())
                .all(|(x, y)| x.kind() == y.kind() && x.element().eq_element(y.element()))
    }
}

impl Element for Split {
    fn as_run(&mut self) -> Option<&mut dyn Run> {
        Some(self)
    }

    fn as_produce(&mut self) -> Option<&mut dyn Produce> {
        match self.uniform_kind() {
            Some(BranchKind::Source) => Some(self),
            _ => None,
        }
    }

    fn as_fill_compute(&mut self) -> Option<&mut dyn FillCompute> {
        match self.uniform_kind() {
            Some(BranchKind::FillCompute) => Some(self),
            _ => None,
        }
    }

    fn as_fill_request(&mut self) -> Option<&mut dyn FillRequest> {
        match self.uniform_kind() {
            Some(BranchKind::FillRequest) => Some(self),
            _ => None,
        }
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        downcast_ref::<Split>(other).is_some_and(|other| self == other)
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        borrow(&self.branches)?
            .iter()
            .try_for_each(|branch| branch.element().update_static(metadata))
    }
}
