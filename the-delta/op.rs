use serde::{
  Deserialize,
  Serialize,
};
use serde_json::{
  Map,
  Value,
};

use crate::{
  AttributeMap,
  Tendril,
};

/// Inserted content: text or a single embedded object.
///
/// An embed is an object whose one key names the embed kind, e.g.
/// `{"image": "https://..."}`. An embed always occupies one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insert {
  Text(Tendril),
  Embed(Map<String, Value>),
}

impl Insert {
  pub fn embed(kind: impl Into<String>, value: impl Into<Value>) -> Self {
    let mut map = Map::new();
    map.insert(kind.into(), value.into());
    Insert::Embed(map)
  }

  pub fn len_chars(&self) -> usize {
    match self {
      Insert::Text(text) => text.chars().count(),
      Insert::Embed(_) => 1,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Insert::Text(text) => Some(text),
      Insert::Embed(_) => None,
    }
  }

  /// The embed kind and its value. `None` for text and for an embed object
  /// that carries no key.
  pub fn embed_kind(&self) -> Option<(&str, &Value)> {
    match self {
      Insert::Embed(map) => map.iter().next().map(|(kind, value)| (kind.as_str(), value)),
      Insert::Text(_) => None,
    }
  }
}

impl From<&str> for Insert {
  fn from(text: &str) -> Self {
    Insert::Text(text.into())
  }
}

impl From<String> for Insert {
  fn from(text: String) -> Self {
    Insert::Text(text.into())
  }
}

impl From<Tendril> for Insert {
  fn from(text: Tendril) -> Self {
    Insert::Text(text)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
  Insert,
  Retain,
  Delete,
}

/// A single operation. An empty [`AttributeMap`] means "no attributes".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOp", into = "RawOp")]
pub enum Op {
  /// Insert content at the current position.
  Insert(Insert, AttributeMap),

  /// Keep n positions, optionally changing their attributes.
  Retain(usize, AttributeMap),

  /// Remove n positions.
  Delete(usize),
}

impl Op {
  pub fn len(&self) -> usize {
    match self {
      Op::Insert(insert, _) => insert.len_chars(),
      Op::Retain(n, _) | Op::Delete(n) => *n,
    }
  }

  pub fn kind(&self) -> OpKind {
    match self {
      Op::Insert(..) => OpKind::Insert,
      Op::Retain(..) => OpKind::Retain,
      Op::Delete(_) => OpKind::Delete,
    }
  }

  pub fn attributes(&self) -> Option<&AttributeMap> {
    match self {
      Op::Insert(_, attributes) | Op::Retain(_, attributes) => Some(attributes),
      Op::Delete(_) => None,
    }
  }

  #[inline]
  pub fn is_insert(&self) -> bool {
    matches!(self, Op::Insert(..))
  }

  #[inline]
  pub fn is_delete(&self) -> bool {
    matches!(self, Op::Delete(_))
  }

  #[inline]
  pub fn is_retain(&self) -> bool {
    matches!(self, Op::Retain(..))
  }
}

/// JSON shape of an op: exactly one of `insert`, `retain` or `delete`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOp {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  insert:     Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  retain:     Option<usize>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  delete:     Option<usize>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  attributes: Option<AttributeMap>,
}

impl TryFrom<RawOp> for Op {
  type Error = String;

  fn try_from(raw: RawOp) -> Result<Self, Self::Error> {
    let attributes = raw.attributes.unwrap_or_default();
    match (raw.insert, raw.retain, raw.delete) {
      (Some(Value::String(text)), None, None) => Ok(Op::Insert(Insert::from(text), attributes)),
      (Some(Value::Object(map)), None, None) => Ok(Op::Insert(Insert::Embed(map), attributes)),
      (Some(other), None, None) => Err(format!("insert must be a string or an object, got {other}")),
      (None, Some(n), None) => Ok(Op::Retain(n, attributes)),
      (None, None, Some(n)) => Ok(Op::Delete(n)),
      _ => Err("op must have exactly one of insert, retain or delete".to_string()),
    }
  }
}

impl From<Op> for RawOp {
  fn from(op: Op) -> Self {
    let optional = |attributes: AttributeMap| (!attributes.is_empty()).then_some(attributes);
    match op {
      Op::Insert(Insert::Text(text), attributes) => RawOp {
        insert: Some(Value::String(text.to_string())),
        attributes: optional(attributes),
        ..RawOp::default()
      },
      Op::Insert(Insert::Embed(map), attributes) => RawOp {
        insert: Some(Value::Object(map)),
        attributes: optional(attributes),
        ..RawOp::default()
      },
      Op::Retain(n, attributes) => RawOp {
        retain: Some(n),
        attributes: optional(attributes),
        ..RawOp::default()
      },
      Op::Delete(n) => RawOp {
        delete: Some(n),
        ..RawOp::default()
      },
    }
  }
}
