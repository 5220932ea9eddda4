//! Basic usage examples for pipeweld
//!
//! Run with: cargo run --example basic

use pipeweld::adapters::FillRequestConfig;
use pipeweld::prelude::*;

/// Running mean of integer values
#[derive(Debug, Default)]
struct Mean {
    sum: i64,
    count: i64,
}

impl Fill for Mean {
    fn fill(&mut self, value: Value) -> Result<FillStatus> {
        self.sum += value.as_int().unwrap_or(0);
        self.count += 1;
        Ok(CONTINUE)
    }
}

impl FillRequest for Mean {
    fn request(&mut self) -> Result<Flow> {
        let mean = if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        };
        Ok(flow_from([Value::Float(mean)]))
    }

    fn clear(&mut self) -> Result<()> {
        *self = Mean::default();
        Ok(())
    }
}

impl Element for Mean {
    fn as_fill_request(&mut self) -> Option<&mut dyn FillRequest> {
        Some(self)
    }
}

fn square() -> Box<dyn Element> {
    Box::new(Call::named("square", |v: Value| {
        let n = v.as_int().unwrap_or(0);
        Ok(Value::Int(n * n))
    }))
}

fn print(label: &str, flow: Flow) -> Result<()> {
    for value in flow {
        println!("{}: {:?}", label, value?);
    }
    Ok(())
}

/// Example 1: a source with transforms
fn simple_example() -> Result<()> {
    println!("=== Source with Transforms ===");

    let mut source = Source::new(vec![
        Box::new(CountFrom::new(1)),
        Box::new(Filter::new(|v: &Value| v.as_int().is_some_and(|n| n % 3 == 0))),
        square(),
        Box::new(Slice::new(5)),
    ])?;
    print("Square", source.produce()?)?;

    println!();
    Ok(())
}

/// Example 2: windowed means
fn fill_request_example() -> Result<()> {
    println!("=== Windowed Mean ===");

    let config = FillRequestConfig::default().bufsize(4).clear(true);
    let mut pipeline = FillRequestPipeline::with_config(vec![Box::new(Mean::default())], config)?;
    let input = flow_from((1..=10i64).map(Value::Int).collect::<Vec<_>>());
    print("Mean", pipeline.run(input)?)?;

    println!();
    Ok(())
}

/// Example 3: one input, several branches
fn split_example() -> Result<()> {
    println!("=== Split ===");

    let mut split = Split::with_config(
        vec![
            SplitBranch::from(vec![square()]),
            SplitBranch::from(vec![Box::new(Slice::range(0, 10, 2)?) as Box<dyn Element>]),
        ],
        SplitConfig::default().bufsize(3),
    )?;
    let input = flow_from((0..6i64).map(Value::Int).collect::<Vec<_>>());
    print("Branch", split.run(input)?)?;

    println!();
    Ok(())
}

/// Example 4: sharing a common head
fn merge_example() -> Result<()> {
    println!("=== Merged Heads ===");

    let head = || -> Vec<Box<dyn Element>> {
        vec![Box::new(Values::new([1, 2, 3])), square()]
    };
    let mut first = head();
    first.push(Box::new(SetMetadata::new("branch", "first")));
    let mut second = head();
    second.push(Box::new(Slice::new(1)));

    let mut merged = merge_heads(vec![Source::new(first)?, Source::new(second)?])?;
    println!("Merged into {} stages", merged.len());
    print("Merged", merged.produce()?)?;

    println!();
    Ok(())
}

fn main() -> Result<()> {
    simple_example()?;
    fill_request_example()?;
    split_example()?;
    merge_example()?;
    Ok(())
}
