//! Functions on nested metadata maps.
//!
//! Dotted keys (`"data.detector"`) address nested maps. The only way two
//! maps are combined is [`update_recursively`]; nothing here merges silently.

use crate::core::error::{Error, Result};
use crate::core::value::{Map, Value};

/// Merge `other` into `map`.
///
/// Nested maps present on both sides are merged key by key. Any other value
/// in `other` replaces the one in `map`.
pub fn update_recursively(map: &mut Map, other: &Map) {
    for (key, value) in other {
        match (map.get_mut(key), value) {
            (Some(Value::Map(ours)), Value::Map(theirs)) => update_recursively(ours, theirs),
            _ => {
                map.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Look up a dotted key.
pub fn get_recursively<'a>(map: &'a Map, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let first = parts.next()?;
    let mut current = map.get(first)?;
    for part in parts {
        current = current.as_map()?.get(part)?;
    }
    Some(current)
}

/// Build `{"a": {"b": value}}` from `"a.b"`.
pub fn str_to_map(key: &str, value: Value) -> Result<Map> {
    let parts = split_key(key)?;
    let mut current = value;
    for part in parts.iter().rev() {
        let mut map = Map::new();
        map.insert((*part).to_string(), current);
        current = Value::Map(map);
    }
    match current {
        Value::Map(map) => Ok(map),
        _ => Err(Error::invalid(format!("empty metadata key {:?}", key))),
    }
}

/// Set a dotted key, creating (or replacing non-map) intermediate levels.
pub fn set_nested(map: &mut Map, key: &str, value: Value) -> Result<()> {
    let parts = split_key(key)?;
    let (last, init) = match parts.split_last() {
        Some(split) => split,
        None => return Err(Error::invalid(format!("empty metadata key {:?}", key))),
    };
    let mut current = map;
    for part in init {
        let slot = current
            .entry((*part).to_string())
            .or_insert_with(|| Value::Map(Map::new()));
        if !matches!(slot, Value::Map(_)) {
            *slot = Value::Map(Map::new());
        }
        current = match slot {
            Value::Map(inner) => inner,
            _ => return Err(Error::custom("metadata level vanished")),
        };
    }
    current.insert((*last).to_string(), value);
    Ok(())
}

/// True if every key of `subset` is present in `map` with an equal value,
/// descending into nested maps.
pub fn contains(map: &Map, subset: &Map) -> bool {
    subset.iter().all(|(key, value)| match (map.get(key), value) {
        (Some(Value::Map(ours)), Value::Map(theirs)) => contains(ours, theirs),
        (Some(ours), theirs) => ours == theirs,
        (None, _) => false,
    })
}

fn split_key(key: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = key.split('.').collect();
    if key.is_empty() || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::invalid(format!("malformed metadata key {:?}", key)));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_update_recursively_merges_nested_levels() {
        let mut map = str_to_map("data.detector", "far".into()).unwrap();
        set_nested(&mut map, "data.cycle", Value::Int(1)).unwrap();
        let other = str_to_map("data.detector", "near".into()).unwrap();

        update_recursively(&mut map, &other);

        assert_eq!(get_recursively(&map, "data.detector"), Some(&Value::from("near")));
        assert_eq!(get_recursively(&map, "data.cycle"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_non_map_values_are_replaced() {
        let mut map = str_to_map("a", Value::Int(1)).unwrap();
        let other = str_to_map("a.b", Value::Int(2)).unwrap();
        update_recursively(&mut map, &other);
        assert_eq!(get_recursively(&map, "a.b"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_contains() {
        let mut map = str_to_map("x.y", Value::Int(1)).unwrap();
        set_nested(&mut map, "z", Value::Bool(true)).unwrap();
        assert!(contains(&map, &str_to_map("x.y", Value::Int(1)).unwrap()));
        assert!(!contains(&map, &str_to_map("x.y", Value::Int(2)).unwrap()));
        assert!(contains(&map, &Map::new()));
    }

    #[test]
    fn test_malformed_keys_are_rejected() {
        assert!(str_to_map("", Value::Null).is_err());
        assert!(str_to_map("a..b", Value::Null).is_err());
        assert!(set_nested(&mut Map::new(), ".a", Value::Null).is_err());
    }
}
