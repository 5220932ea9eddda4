use tracing::{trace, warn};

use crate::core::{empty_flow, flow_from, Flow, Result, Value};
use crate::split::{borrow_mut, Branch, BranchKind, Branches, SplitConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Handing buffers to branches.
    Dispatch,
    /// Input exhausted; finalizing active branch `n`.
    Finalize(usize),
    Done,
}

/// What dispatching a buffer to one branch gave.
struct Step {
    output: Option<Flow>,
    retire: bool,
}

/// The flow returned by `Split::run`.
///
/// Every output of one branch for one buffer is yielded before the next
/// branch sees that buffer.
pub(crate) struct SplitRun {
    branches: Branches,
    /// Indices of branches still taking buffers.
    active: Vec<usize>,
    input: Option<Flow>,
    bufsize: Option<usize>,
    buffer: Vec<Value>,
    /// Next position in `active` to receive `buffer`.
    position: usize,
    output: Option<Flow>,
    phase: Phase,
    input_was_empty: bool,
}

impl SplitRun {
    pub(crate) fn new(branches: Branches, count: usize, input: Flow, config: &SplitConfig) -> Self {
        Self {
            branches,
            active: (0..count).collect(),
            input: Some(input),
            bufsize: config.bufsize,
            buffer: Vec::new(),
            position: 0,
            output: None,
            phase: Phase::Dispatch,
            input_was_empty: true,
        }
    }

    /// Read the next buffer. An empty buffer means the input is exhausted.
    fn read_buffer(&mut self) -> Result<()> {
        self.buffer.clear();
        self.position = 0;
        let Some(input) = self.input.as_mut() else {
            return Ok(());
        };
        let limit = self.bufsize.unwrap_or(usize::MAX);
        while self.buffer.len() < limit {
            match input.next() {
                Some(item) => self.buffer.push(item?),
                None => {
                    self.input = None;
                    break;
                }
            }
        }
        if !self.buffer.is_empty() {
            self.input_was_empty = false;
            trace!(values = self.buffer.len(), branches = self.active.len(), "dispatching buffer");
            #[cfg(feature = "metrics")]
            crate::metrics::record_buffer(self.buffer.len());
        }
        Ok(())
    }

    fn dispatch(&mut self) -> Result<Step> {
        let index = self.active[self.position];
        // the last active branch takes the buffer itself
        let buffer = if self.position + 1 < self.active.len() {
            self.buffer.clone()
        } else {
            std::mem::take(&mut self.buffer)
        };
        let mut branches = borrow_mut(&self.branches)?;
        let branch = &mut branches[index];
        match branch.kind() {
            BranchKind::Source => {
                trace!(branch = index, "source branch produced, retiring");
                Ok(Step {
                    output: Some(branch.produce()?),
                    retire: true,
                })
            }
            BranchKind::FillCompute => {
                if fill_all(branch, buffer)? {
                    warn!(branch = index, kind = "fill_compute", "branch stopped filling, retiring");
                    return Ok(Step {
                        output: Some(branch.compute()?),
                        retire: true,
                    });
                }
                Ok(Step {
                    output: None,
                    retire: false,
                })
            }
            BranchKind::FillRequest => {
                let stopped = fill_all(branch, buffer)?;
                if stopped {
                    warn!(branch = index, kind = "fill_request", "branch stopped filling, retiring");
                }
                Ok(Step {
                    output: Some(branch.request()?),
                    retire: stopped,
                })
            }
            BranchKind::Pipeline => Ok(Step {
                output: Some(branch.run(flow_from(buffer))?),
                retire: false,
            }),
        }
    }

    /// Final output of a branch still active when the input ends.
    fn finalize(&mut self, index: usize) -> Result<Option<Flow>> {
        let mut branches = borrow_mut(&self.branches)?;
        let branch = &mut branches[index];
        let empty = self.input_was_empty;
        Ok(match branch.kind() {
            BranchKind::FillCompute => Some(branch.compute()?),
            BranchKind::Source if empty => Some(branch.produce()?),
            BranchKind::FillRequest if empty => Some(branch.request()?),
            BranchKind::Pipeline if empty => Some(branch.run(empty_flow())?),
            _ => None,
        })
    }

    fn step(&mut self) -> Result<()> {
        match self.phase {
            Phase::Done => {}
            Phase::Dispatch => {
                if self.active.is_empty() {
                    self.phase = Phase::Done;
                    return Ok(());
                }
                if self.position >= self.active.len() || self.buffer.is_empty() {
                    self.read_buffer()?;
                    if self.buffer.is_empty() {
                        self.phase = Phase::Finalize(0);
                        return Ok(());
                    }
                }
                let step = self.dispatch()?;
                if step.retire {
                    let index = self.active.remove(self.position);
                    #[cfg(feature = "metrics")]
                    if let Ok(branches) = self.branches.try_borrow() {
                        crate::metrics::record_retired(branches[index].kind().as_str());
                    }
                    trace!(branch = index, remaining = self.active.len(), "branch retired");
                } else {
                    self.position += 1;
                }
                if self.position >= self.active.len() {
                    self.buffer.clear();
                }
                self.output = step.output;
            }
            Phase::Finalize(position) => {
                let Some(&index) = self.active.get(position) else {
                    self.phase = Phase::Done;
                    return Ok(());
                };
                self.phase = Phase::Finalize(position + 1);
                self.output = self.finalize(index)?;
            }
        }
        Ok(())
    }
}

/// Fill a branch with a whole buffer. Returns whether it asked to stop.
fn fill_all(branch: &mut Branch, buffer: Vec<Value>) -> Result<bool> {
    for value in buffer {
        if branch.fill(value)?.is_break() {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Iterator for SplitRun {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(output) = self.output.as_mut() {
                match output.next() {
                    Some(Ok(value)) => return Some(Ok(value)),
                    Some(Err(e)) => {
                        self.phase = Phase::Done;
                        self.output = None;
                        return Some(Err(e));
                    }
                    None => self.output = None,
                }
            }
            if self.phase == Phase::Done {
                return None;
            }
            if let Err(e) = self.step() {
                self.phase = Phase::Done;
                self.input = None;
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::{
        flow_from, Element, Fill, FillCompute, FillRequest, FillStatus, Flow, Result, Run, Value,
        CONTINUE,
    };
    use crate::elements::{Call, Slice, Values};
    use crate::split::{Split, SplitBranch, SplitConfig};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Sum(i64);

    impl Fill for Sum {
        fn fill(&mut self, value: Value) -> Result<FillStatus> {
            self.0 += value.as_int().unwrap_or(0);
            Ok(CONTINUE)
        }
    }

    impl FillCompute for Sum {
        fn compute(&mut self) -> Result<Flow> {
            Ok(flow_from([Value::Int(std::mem::take(&mut self.0))]))
        }
    }

    impl Element for Sum {
        fn as_fill_compute(&mut self) -> Option<&mut dyn FillCompute> {
            Some(self)
        }
    }

    #[derive(Debug, Default)]
    struct RunningSum(i64);

    impl Fill for RunningSum {
        fn fill(&mut self, value: Value) -> Result<FillStatus> {
            self.0 += value.as_int().unwrap_or(0);
            Ok(CONTINUE)
        }
    }

    impl FillRequest for RunningSum {
        fn request(&mut self) -> Result<Flow> {
            Ok(flow_from([Value::Int(self.0)]))
        }
    }

    impl Element for RunningSum {
        fn as_fill_request(&mut self) -> Option<&mut dyn FillRequest> {
            Some(self)
        }
    }

    fn branch(elements: Vec<Box<dyn Element>>) -> SplitBranch {
        SplitBranch::from(elements)
    }

    fn ints(values: &[i64]) -> Flow {
        flow_from(values.iter().copied().map(Value::Int).collect::<Vec<_>>())
    }

    fn run(split: &mut Split, input: &[i64]) -> Vec<Value> {
        split
            .run(ints(input))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn int_values(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    #[test]
    fn test_request_branch_yields_per_buffer() {
        let mut split = Split::with_config(
            vec![branch(vec![Box::new(RunningSum::default())])],
            SplitConfig::default().bufsize(1),
        )
        .unwrap();
        assert_eq!(run(&mut split, &[1, 1, 1]), int_values(&[1, 2, 3]));
    }

    #[test]
    fn test_source_branch_runs_once() {
        let mut split = Split::with_config(
            vec![
                branch(vec![Box::new(Values::new([100]))]),
                branch(vec![Box::new(Slice::new(10))]),
            ],
            SplitConfig::default().bufsize(2),
        )
        .unwrap();
        assert_eq!(run(&mut split, &[1, 2, 3]), int_values(&[100, 1, 2, 3]));
    }

    #[test]
    fn test_empty_input_finalizes_every_branch() {
        let mut split = Split::new(vec![
            branch(vec![Box::new(Values::new([100]))]),
            branch(vec![Box::new(Sum::default())]),
            branch(vec![Box::new(RunningSum::default())]),
            branch(vec![Box::new(Call::new(|_| Ok(Value::Int(-1))))]),
        ])
        .unwrap();
        assert_eq!(run(&mut split, &[]), int_values(&[100, 0, 0]));
    }

    #[test]
    fn test_stopped_compute_branch_is_computed_early() {
        let mut split = Split::with_config(
            vec![
                branch(vec![Box::new(Slice::new(1)), Box::new(Sum::default())]),
                branch(vec![Box::new(Slice::new(100))]),
            ],
            SplitConfig::default().bufsize(2),
        )
        .unwrap();
        // the first branch stops during the first buffer
        assert_eq!(run(&mut split, &[5, 6, 7]), int_values(&[5, 5, 6, 7]));
    }

    #[test]
    fn test_stopped_request_branch_is_requested_and_retired() {
        let mut split = Split::with_config(
            vec![
                branch(vec![Box::new(Slice::new(3)), Box::new(RunningSum::default())]),
                branch(vec![Box::new(Call::new(|v: Value| {
                    Ok(Value::Int(v.as_int().unwrap_or(0) * 100))
                }))]),
            ],
            SplitConfig::default().bufsize(2),
        )
        .unwrap();
        // the first branch stops on the fourth value and yields 1 + 2 + 3
        assert_eq!(
            run(&mut split, &[1, 2, 3, 4, 5, 6]),
            int_values(&[3, 100, 200, 6, 300, 400, 500, 600])
        );
    }

    #[test]
    fn test_whole_input_buffer() {
        let mut split = Split::with_config(
            vec![
                branch(vec![Box::new(RunningSum::default())]),
                branch(vec![Box::new(Slice::new(1))]),
            ],
            SplitConfig::default().bufsize(None),
        )
        .unwrap();
        assert_eq!(run(&mut split, &[1, 2, 3]), int_values(&[6, 1]));
    }

    #[test]
    fn test_input_error_ends_flow() {
        let mut split = Split::new(vec![branch(vec![Box::new(Slice::new(10))])]).unwrap();
        let input: Flow = Box::new(
            vec![Ok(Value::Int(1)), Err(crate::Error::custom("broken"))].into_iter(),
        );
        let out: Vec<Result<Value>> = split.run(input).unwrap().collect();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }
}
