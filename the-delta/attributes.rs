//! Attribute maps attached to insert and retain operations.
//!
//! Values are arbitrary JSON. A `null` value inside a retain means "remove
//! this attribute"; it never survives into a document (insert-only) change.

use std::collections::{
  BTreeMap,
  btree_map,
};

use serde::{
  Deserialize,
  Serialize,
};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, Value>);

impl AttributeMap {
  #[must_use]
  pub fn new() -> Self {
    Self(BTreeMap::new())
  }

  /// Map holding a single attribute.
  #[must_use]
  pub fn single(name: impl Into<String>, value: impl Into<Value>) -> Self {
    let mut map = Self::new();
    map.insert(name, value);
    map
  }

  /// Builder form of [`AttributeMap::insert`].
  #[must_use]
  pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.insert(name, value);
    self
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.0.len()
  }

  #[inline]
  pub fn get(&self, name: &str) -> Option<&Value> {
    self.0.get(name)
  }

  #[inline]
  pub fn contains_key(&self, name: &str) -> bool {
    self.0.contains_key(name)
  }

  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
    self.0.insert(name.into(), value.into())
  }

  pub fn remove(&mut self, name: &str) -> Option<Value> {
    self.0.remove(name)
  }

  pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
    self.0.iter()
  }

  pub fn keys(&self) -> btree_map::Keys<'_, String, Value> {
    self.0.keys()
  }

  /// Copies every entry of `other` over `self`.
  pub fn extend_from(&mut self, other: &AttributeMap) {
    for (name, value) in other.iter() {
      self.0.insert(name.clone(), value.clone());
    }
  }

  /// Applies `b` on top of `a`.
  ///
  /// `keep_null` keeps `null` removals from `b` in the result; this is wanted
  /// when `a` belongs to a retain, since the removal still has to reach the
  /// document.
  #[must_use]
  pub fn compose(a: &AttributeMap, b: &AttributeMap, keep_null: bool) -> AttributeMap {
    let mut attributes: BTreeMap<String, Value> = if keep_null {
      b.0.clone()
    } else {
      b.0
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
    };
    for (name, value) in a.iter() {
      if !b.contains_key(name) {
        attributes.insert(name.clone(), value.clone());
      }
    }
    AttributeMap(attributes)
  }

  /// Attributes turning `a` into `b`; keys only in `a` map to `null`.
  #[must_use]
  pub fn diff(a: &AttributeMap, b: &AttributeMap) -> AttributeMap {
    let mut attributes = BTreeMap::new();
    for name in a.keys().chain(b.keys()) {
      if a.get(name) != b.get(name) {
        let value = b.get(name).cloned().unwrap_or(Value::Null);
        attributes.insert(name.clone(), value);
      }
    }
    AttributeMap(attributes)
  }

  /// Attributes that undo `attr` when it was applied on top of `base`.
  #[must_use]
  pub fn invert(attr: &AttributeMap, base: &AttributeMap) -> AttributeMap {
    let mut inverted = BTreeMap::new();
    for (name, value) in base.iter() {
      if let Some(applied) = attr.get(name) {
        if applied != value {
          inverted.insert(name.clone(), value.clone());
        }
      }
    }
    for name in attr.keys() {
      if !base.contains_key(name) {
        inverted.insert(name.clone(), Value::Null);
      }
    }
    AttributeMap(inverted)
  }

  /// Transforms `b` against a concurrent `a`. With `priority`, `a` wins
  /// every key both maps set.
  #[must_use]
  pub fn transform(a: &AttributeMap, b: &AttributeMap, priority: bool) -> AttributeMap {
    if a.is_empty() || !priority {
      return b.clone();
    }
    AttributeMap(
      b.0
        .iter()
        .filter(|(name, _)| !a.contains_key(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect(),
    )
  }
}

/// Whether a format value asks for the format to be present. `null` and
/// `false` both mean removal.
#[inline]
pub fn value_is_set(value: &Value) -> bool {
  !matches!(value, Value::Null | Value::Bool(false))
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for AttributeMap {
  fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
    AttributeMap(
      iter
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect(),
    )
  }
}

impl IntoIterator for AttributeMap {
  type IntoIter = btree_map::IntoIter<String, Value>;
  type Item = (String, Value);

  fn into_iter(self) -> Self::IntoIter {
    self.0.into_iter()
  }
}

impl<'a> IntoIterator for &'a AttributeMap {
  type IntoIter = btree_map::Iter<'a, String, Value>;
  type Item = (&'a String, &'a Value);

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}
