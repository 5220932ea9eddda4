use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pipeweld::adapters::FillRequestConfig;
use pipeweld::prelude::*;
use std::hint::black_box;

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

impl FillRequest for Sum {
    fn request(&mut self) -> Result<Flow> {
        Ok(flow_from([Value::Int(self.0)]))
    }
}

impl Element for Sum {
    fn as_fill_compute(&mut self) -> Option<&mut dyn FillCompute> {
        Some(self)
    }

    fn as_fill_request(&mut self) -> Option<&mut dyn FillRequest> {
        Some(self)
    }
}

fn double() -> Box<dyn Element> {
    Box::new(Call::new(|v: Value| Ok(Value::Int(black_box(v.as_int().unwrap_or(0) * 2)))))
}

fn bench_basic_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("basic_pipeline");

    for size in [100usize, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("slice", size), size, |b, &size| {
            b.iter(|| {
                let mut source =
                    Source::new(vec![Box::new(CountFrom::new(0)), Box::new(Slice::new(size))])
                        .unwrap();
                source.produce().unwrap().for_each(drop);
            });
        });

        group.bench_with_input(BenchmarkId::new("map", size), size, |b, &size| {
            b.iter(|| {
                let mut source = Source::new(vec![
                    Box::new(CountFrom::new(0)),
                    Box::new(Slice::new(size)),
                    double(),
                ])
                .unwrap();
                source.produce().unwrap().for_each(drop);
            });
        });
    }

    group.finish();
}

fn bench_fill_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_request");

    for bufsize in [1usize, 10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("bufsize", bufsize),
            bufsize,
            |b, &bufsize| {
                b.iter(|| {
                    let config = FillRequestConfig::default().bufsize(bufsize);
                    let mut pipeline =
                        FillRequestPipeline::with_config(vec![Box::new(Sum::default())], config)
                            .unwrap();
                    let input = flow_from((0..10000i64).map(Value::Int).collect::<Vec<_>>());
                    pipeline.run(input).unwrap().for_each(drop);
                });
            },
        );
    }

    group.finish();
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");

    for bufsize in [1usize, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("bufsize", bufsize),
            bufsize,
            |b, &bufsize| {
                b.iter(|| {
                    let mut split = Split::with_config(
                        vec![
                            SplitBranch::from(vec![Box::new(Sum::default()) as Box<dyn Element>]),
                            SplitBranch::from(vec![double()]),
                        ],
                        SplitConfig::default().bufsize(bufsize),
                    )
                    .unwrap();
                    let input = flow_from((0..10000i64).map(Value::Int).collect::<Vec<_>>());
                    split.run(input).unwrap().for_each(drop);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_basic_pipeline, bench_fill_request, bench_split);
criterion_main!(benches);
