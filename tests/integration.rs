//! Integration tests for pipeline composition, fan-out and rewrites

use pipeweld::elements::FnSource;
use pipeweld::prelude::*;
use pipeweld::rewrite::rewrite_cached;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

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
struct Count(i64);

impl Fill for Count {
    fn fill(&mut self, _value: Value) -> Result<FillStatus> {
        self.0 += 1;
        Ok(CONTINUE)
    }
}

impl FillCompute for Count {
    fn compute(&mut self) -> Result<Flow> {
        Ok(flow_from([Value::Int(std::mem::take(&mut self.0))]))
    }
}

impl Element for Count {
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

fn add(n: i64) -> Box<dyn Element> {
    Box::new(Call::named(format!("add{}", n), move |v: Value| {
        Ok(Value::Int(v.as_int().unwrap_or(0) + n))
    }))
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

fn collect(flow: Flow) -> Vec<Value> {
    flow.collect::<Result<Vec<_>>>().unwrap()
}

#[test]
fn test_source_with_transforms() {
    let mut source = Source::new(vec![Box::new(CountFrom::new(1)), add(10), Box::new(Slice::new(3))])
        .unwrap();
    assert_eq!(collect(source.produce().unwrap()), ints(&[11, 12, 13]));
}

#[test]
fn test_split_of_accumulators() {
    let mut split = Split::with_config(
        vec![
            SplitBranch::from(vec![Box::new(Sum::default()) as Box<dyn Element>]),
            SplitBranch::from(vec![Box::new(Count::default()) as Box<dyn Element>]),
        ],
        SplitConfig::default().bufsize(2),
    )
    .unwrap();
    let out = collect(split.run(flow_from(ints(&[1, 2, 3, 4]))).unwrap());
    assert_eq!(out, ints(&[10, 4]));
}

#[test]
fn test_fill_request_pipeline_yields_per_value() {
    let mut pipeline = FillRequestPipeline::new(vec![Box::new(RunningSum::default())]).unwrap();
    let out = collect(pipeline.run(flow_from(ints(&[1, 1, 1]))).unwrap());
    assert_eq!(out, ints(&[1, 2, 3]));
}

#[test]
fn test_fill_compute_pipeline_in_run_pipeline() {
    let accumulate = FillComputePipeline::new(vec![add(1), Box::new(Sum::default()), add(100)])
        .unwrap();
    let mut pipeline = Pipeline::new(vec![Box::new(accumulate)]).unwrap();
    // (1 + 1) + (2 + 1) + (3 + 1), then + 100
    assert_eq!(collect(pipeline.run(flow_from(ints(&[1, 2, 3]))).unwrap()), ints(&[109]));
}

#[test]
fn test_nested_pipelines_are_transparent() {
    let inner = Pipeline::new(vec![add(1), add(2)]).unwrap();
    let mut nested = Pipeline::new(vec![Box::new(inner), add(3)]).unwrap();
    let mut flat = Pipeline::new(vec![add(1), add(2), add(3)]).unwrap();
    assert_eq!(nested.len(), 3);
    assert_eq!(
        collect(nested.run(flow_from(ints(&[0, 10]))).unwrap()),
        collect(flat.run(flow_from(ints(&[0, 10]))).unwrap())
    );
}

#[test]
fn test_branches_do_not_see_each_other() {
    // the first branch rewrites every value in place before the sum sees it
    let bump: Box<dyn Element> = Box::new(Call::new(|mut v: Value| {
        if let Value::Int(n) = &mut v {
            *n += 100;
        }
        Ok(v)
    }));
    let mut split = Split::with_config(
        vec![
            SplitBranch::from(vec![bump]),
            SplitBranch::from(vec![Box::new(Sum::default()) as Box<dyn Element>]),
        ],
        SplitConfig::default().bufsize(2),
    )
    .unwrap();
    assert!(split.config().copy_buf);
    let out = collect(split.run(flow_from(ints(&[1, 2, 3]))).unwrap());
    assert_eq!(out, ints(&[101, 102, 103, 6]));
}

#[test]
fn test_branches_without_buffer_copies() {
    let mut split = Split::with_config(
        vec![
            SplitBranch::from(vec![add(100)]),
            SplitBranch::from(vec![Box::new(Slice::new(10)) as Box<dyn Element>]),
        ],
        SplitConfig::default().bufsize(None).copy_buf(false),
    )
    .unwrap();
    let out = collect(split.run(flow_from(ints(&[1, 2]))).unwrap());
    assert_eq!(out, ints(&[101, 102, 1, 2]));
}

#[test]
fn test_merge_heads_of_equal_sources() {
    let make = || Source::new(vec![Box::new(Values::new([1, 2])), add(1)]).unwrap();
    let mut merged = merge_heads(vec![make(), make(), make()]).unwrap();
    assert!(merged == make());
    assert_eq!(collect(merged.produce().unwrap()), ints(&[2, 3]));
}

#[test]
fn test_merge_heads_fans_out() {
    let mut merged = merge_heads(vec![
        Source::new(vec![Box::new(Values::new([1, 2])), add(1)]).unwrap(),
        Source::new(vec![Box::new(Values::new([1, 2])), add(2)]).unwrap(),
    ])
    .unwrap();
    assert_eq!(collect(merged.produce().unwrap()), ints(&[2, 3, 3, 4]));
}

#[test]
fn test_cache_is_replayed_after_first_pass() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("numbers.jsonl");

    let mut first = Source::new(vec![
        Box::new(Values::new([1, 2, 3])),
        Box::new(Cache::new(&path)),
        add(10),
    ])
    .unwrap();
    assert_eq!(collect(first.produce().unwrap()), ints(&[11, 12, 13]));
    assert!(path.is_file());

    // the producer is never reached once the cache is filled
    let second = Source::new(vec![
        Box::new(FnSource::new(|| Err(Error::custom("source must not run")))),
        Box::new(Cache::new(&path)),
        add(10),
    ])
    .unwrap();
    let mut replay = second.rewrite_cached().unwrap();
    assert_eq!(collect(replay.produce().unwrap()), ints(&[11, 12, 13]));

    let mut again = replay.rewrite_cached().unwrap();
    assert_eq!(collect(again.produce().unwrap()), ints(&[11, 12, 13]));
}

#[test]
fn test_rewrite_without_cache_is_unchanged() {
    let rewritten = rewrite_cached(vec![add(1), add(2)]).unwrap();
    assert!(!rewritten.is_replayed());
}

#[test]
fn test_static_metadata_is_collected() {
    let pipeline = Pipeline::new(vec![
        Box::new(SetMetadata::new("run.name", "first")),
        add(1),
        Box::new(SetMetadata::new("run.name", "second")),
    ])
    .unwrap();
    let metadata = pipeline.static_metadata().unwrap();
    let run = metadata.get("run").and_then(Value::as_map).unwrap();
    assert_eq!(run.get("name"), Some(&Value::Str("second".to_string())));
}

#[test]
fn test_capability_mismatch_is_reported() {
    let err = Source::new(vec![add(1)]).unwrap_err();
    assert!(matches!(err, Error::CapabilityMismatch { .. }));
}

#[test]
fn test_filter_then_accumulate() {
    let mut split = Split::new(vec![SplitBranch::from(vec![
        Box::new(Filter::new(|v: &Value| v.as_int().is_some_and(|n| n % 2 == 0)))
            as Box<dyn Element>,
        Box::new(Sum::default()),
    ])])
    .unwrap();
    let out = collect(split.run(flow_from(ints(&[1, 2, 3, 4]))).unwrap());
    assert_eq!(out, ints(&[6]));
}
