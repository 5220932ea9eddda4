use crate::core::metadata::set_nested;
use crate::core::{same_element, Element, Map, Result, Transform, Value};

/// Contribute a key to static metadata. Values pass unchanged.
///
/// `key` may be dotted (`"output.dir"`) to address a nested map.
#[derive(Debug, Clone, PartialEq)]
pub struct SetMetadata {
    key: String,
    value: Value,
}

impl SetMetadata {
    pub fn new<K: Into<String>, V: Into<Value>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Transform for SetMetadata {
    fn apply(&self, value: Value) -> Result<Value> {
        Ok(value)
    }
}

impl Element for SetMetadata {
    fn as_transform(&self) -> Option<&dyn Transform> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        same_element(self, other)
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        set_nested(metadata, &self.key, self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::get_recursively;

    #[test]
    fn test_sets_nested_key() {
        let mut metadata = Map::new();
        SetMetadata::new("output.dir", "plots")
            .update_static(&mut metadata)
            .unwrap();
        assert_eq!(
            get_recursively(&metadata, "output.dir"),
            Some(&Value::Str("plots".to_string()))
        );
    }
}
