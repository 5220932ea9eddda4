use tracing::debug;

use crate::core::{Element, Error, Result};
use crate::pipeline::{Pipeline, Source};
use crate::split::{Split, SplitBranch};

/// Pipelines whose heads can be merged.
pub trait MergeHeads: Sized {
    /// Whether the first element produces rather than runs.
    const PRODUCES: bool;

    fn into_elements(self) -> Result<Vec<Box<dyn Element>>>;

    fn from_elements(elements: Vec<Box<dyn Element>>) -> Result<Self>;
}

impl MergeHeads for Source {
    const PRODUCES: bool = true;

    fn into_elements(self) -> Result<Vec<Box<dyn Element>>> {
        Source::into_elements(self)
    }

    fn from_elements(elements: Vec<Box<dyn Element>>) -> Result<Self> {
        Source::new(elements)
    }
}

impl MergeHeads for Pipeline {
    const PRODUCES: bool = false;

    fn into_elements(self) -> Result<Vec<Box<dyn Element>>> {
        Pipeline::into_elements(self)
    }

    fn from_elements(elements: Vec<Box<dyn Element>>) -> Result<Self> {
        Pipeline::new(elements)
    }
}

/// Share the common head of several pipelines.
///
/// Elements equal at the same position across all pipelines are kept once.
/// At the first position where they differ, the pipelines are grouped by
/// their element there, in order of first appearance, the tails of every
/// group are merged recursively, and the position becomes a [`Split`] with
/// one branch per group. A single pipeline, or several equal ones, come back
/// as the first one.
///
/// A pipeline that is a strict prefix of another cannot be merged without
/// losing its output and fails with [`Error::AmbiguousMerge`].
///
/// ```rust
/// use pipeweld::elements::{CountFrom, Slice};
/// use pipeweld::pipeline::Source;
/// use pipeweld::rewrite::merge_heads;
///
/// let make = || Source::new(vec![Box::new(CountFrom::new(0)), Box::new(Slice::new(3))]);
/// let merged = merge_heads(vec![make()?, make()?])?;
/// assert!(merged == make()?);
/// # Ok::<(), pipeweld::Error>(())
/// ```
pub fn merge_heads<T: MergeHeads>(pipelines: Vec<T>) -> Result<T> {
    let mut pipelines = pipelines.into_iter();
    let first = match (pipelines.next(), pipelines.len()) {
        (None, _) => return Err(Error::invalid("no pipelines provided")),
        (Some(only), 0) => return Ok(only),
        (Some(first), _) => first,
    };
    let mut lists = vec![first.into_elements()?];
    for pipeline in pipelines {
        lists.push(pipeline.into_elements()?);
    }
    debug!(pipelines = lists.len(), "merging heads");
    T::from_elements(merge_lists(lists, T::PRODUCES)?)
}

fn merge_lists(
    lists: Vec<Vec<Box<dyn Element>>>,
    produces: bool,
) -> Result<Vec<Box<dyn Element>>> {
    let index = common_length(&lists)?;
    let mut lists = lists.into_iter();
    let Some(mut head) = lists.next() else {
        return Err(Error::invalid("no pipelines provided"));
    };
    if index == head.len() {
        // every list is equal
        return Ok(head);
    }

    let first_tail = head.split_off(index);
    let mut groups: Vec<(Box<dyn Element>, Vec<Vec<Box<dyn Element>>>)> = Vec::new();
    for list in std::iter::once(first_tail).chain(lists.map(|mut list| list.split_off(index))) {
        let mut list = list.into_iter();
        let Some(element) = list.next() else {
            return Err(Error::AmbiguousMerge(
                "a pipeline ends where others continue".to_string(),
            ));
        };
        let tail: Vec<Box<dyn Element>> = list.collect();
        match groups
            .iter_mut()
            .find(|(key, _)| key.eq_element(element.as_ref()))
        {
            Some((_, tails)) => tails.push(tail),
            None => groups.push((element, vec![tail])),
        }
    }

    debug!(position = index, branches = groups.len(), "pipelines diverge");
    let mut branches = Vec::with_capacity(groups.len());
    for (element, tails) in groups {
        let ended = tails.iter().filter(|tail| tail.is_empty()).count();
        let mut elements = vec![element];
        if ended == 0 {
            elements.extend(merge_lists(tails, false)?);
        } else if ended < tails.len() {
            return Err(Error::AmbiguousMerge(format!(
                "{:?} ends one pipeline but continues another",
                elements[0]
            )));
        }
        branches.push(if produces && index == 0 {
            SplitBranch::Source(Source::new(elements)?)
        } else {
            SplitBranch::Elements(elements)
        });
    }
    head.push(Box::new(Split::new(branches)?));
    Ok(head)
}

/// Number of leading positions equal across all lists.
///
/// A list running out while all others are still equal to it makes the
/// merge ambiguous.
fn common_length(lists: &[Vec<Box<dyn Element>>]) -> Result<usize> {
    let Some((first, rest)) = lists.split_first() else {
        return Ok(0);
    };
    let mut index = 0;
    loop {
        let ended = lists.iter().filter(|list| list.len() == index).count();
        if ended == lists.len() {
            return Ok(index);
        }
        if ended > 0 {
            return Err(Error::AmbiguousMerge(format!(
                "a pipeline is a prefix of another at position {}",
                index
            )));
        }
        let element = first[index].as_ref();
        if !rest.iter().all(|list| list[index].eq_element(element)) {
            return Ok(index);
        }
        index += 1;
    }
}
