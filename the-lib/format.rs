use std::collections::BTreeMap;

use serde::{
  Deserialize,
  Serialize,
};
use serde_json::Value;
use the_delta::AttributeMap;

/// Formats in effect over a span, keyed by format name.
pub type Formats = BTreeMap<String, FormatValue>;

/// The value of a format over a span: the same everywhere, or every distinct
/// value seen, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatValue {
  Mixed(Vec<Value>),
  Single(Value),
}

impl FormatValue {
  pub fn single(value: impl Into<Value>) -> Self {
    FormatValue::Single(value.into())
  }

  pub fn is_mixed(&self) -> bool {
    matches!(self, FormatValue::Mixed(_))
  }
}

/// Intersects `combined` with the next node's formats.
///
/// A name survives only if `next` carries a non-null value for it. Equal
/// values stay single; differing ones turn into the set of values seen.
pub fn combine(combined: Formats, next: &AttributeMap) -> Formats {
  combined
    .into_iter()
    .filter_map(|(name, current)| {
      let value = next.get(&name).filter(|value| !value.is_null())?;
      let merged = match current {
        FormatValue::Single(current) if current == *value => FormatValue::Single(current),
        FormatValue::Single(current) => FormatValue::Mixed(vec![current, value.clone()]),
        FormatValue::Mixed(mut values) => {
          if !values.contains(value) {
            values.push(value.clone());
          }
          FormatValue::Mixed(values)
        },
      };
      Some((name, merged))
    })
    .collect()
}

/// Folds the formats of a sequence of nodes, seeded by the first one.
/// Stops early once nothing is left in common.
pub fn fold<'a>(mut maps: impl Iterator<Item = &'a AttributeMap>) -> Formats {
  let Some(first) = maps.next() else {
    return Formats::new();
  };
  let mut formats: Formats = first
    .iter()
    .map(|(name, value)| (name.clone(), FormatValue::Single(value.clone())))
    .collect();
  for next in maps {
    if formats.is_empty() {
      break;
    }
    formats = combine(formats, next);
  }
  formats
}
