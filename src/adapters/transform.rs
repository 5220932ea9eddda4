use crate::adapters::{view_lost, Node};
use crate::core::{downcast_ref, Contract, Element, Error, Result, Transform, Value};
use crate::elements::Call;

/// Adapter exposing the Transform contract.
#[derive(Debug)]
pub struct TransformStage {
    node: Node,
}

impl TransformStage {
    /// Wrap an element that exposes a transform.
    pub fn new(mut element: Box<dyn Element>) -> Result<Self> {
        if element.as_transform().is_none() {
            return Err(Error::unsupported(&mut *element, Contract::Transform));
        }
        Ok(Self {
            node: Node::new(element),
        })
    }

    /// Build directly from a function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + 'static,
    {
        Self {
            node: Node::new(Box::new(Call::new(f))),
        }
    }

    /// Give back the wrapped element.
    pub fn into_inner(self) -> Result<Box<dyn Element>> {
        self.node.into_inner()
    }
}

impl Transform for TransformStage {
    fn apply(&self, value: Value) -> Result<Value> {
        let el = self.node.get()?;
        match el.as_transform() {
            Some(transform) => transform.apply(value),
            None => Err(view_lost(el.as_ref(), Contract::Transform)),
        }
    }
}

impl Element for TransformStage {
    fn as_transform(&self) -> Option<&dyn Transform> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        downcast_ref::<TransformStage>(other).is_some_and(|other| self.node.eq_node(&other.node))
    }

    fn update_static(&self, metadata: &mut crate::core::Map) -> Result<()> {
        self.node.update_static(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Slice;

    #[test]
    fn test_transform_from_callable() {
        let stage = TransformStage::new(Box::new(Call::new(|v: Value| {
            Ok(Value::Int(v.as_int().unwrap_or(0) + 1))
        })))
        .unwrap();
        assert_eq!(stage.apply(Value::Int(1)).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_non_callable_is_rejected() {
        let err = TransformStage::new(Box::new(Slice::new(2))).unwrap_err();
        assert!(matches!(
            err,
            Error::CapabilityMismatch {
                contract: Contract::Transform,
                ..
            }
        ));
    }
}
