//! The change representation.
//!
//! A [`Delta`] is an ordered list of [`Op`]s describing either a whole
//! document (inserts only) or a change to one (any mix of ops). Builders
//! keep it in canonical form:
//!
//! - adjacent ops of the same kind with equal attributes are merged
//! - an insert is always placed before an adjacent delete
//! - zero-length ops are dropped
//!
//! so structurally equal changes compare equal with `==`.
//!
//! # Lengths
//!
//! - [`Delta::length`] counts inserts and retains. For a document that is
//!   the document length; for a change it is the length of the document it
//!   produces up to the last touched position.
//! - [`Delta::change_length`] is the net growth: inserts minus deletes.
//!
//! # Algebra
//!
//! - [`Delta::compose`]: `a.compose(b)` is the single change equivalent to
//!   applying `a` then `b`.
//! - [`Delta::transform`]: rewrites a concurrent change so it applies after
//!   `self`. With `priority` set, `self` is considered to have happened
//!   first and wins ties at equal positions.
//! - [`Delta::invert`]: the change undoing `self` against the document it
//!   was applied to.
//! - [`Delta::diff`] (in the `diff` module): the change turning one document
//!   into another.

use serde::{
  Deserialize,
  Deserializer,
  Serialize,
};
use serde_json::Value;
use thiserror::Error;

use crate::{
  AttributeMap,
  Insert,
  Op,
  iter::OpIterator,
  op::OpKind,
};

pub type Result<T> = std::result::Result<T, DeltaError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeltaError {
  #[error("diff called with a non-document {side} operand")]
  DiffOnNonDocument { side: &'static str },
  #[error("invalid change json: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Delta {
  ops: Vec<Op>,
}

/// Accepted wire shapes: a bare op array or an object with an `ops` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum Wire {
  Ops(Vec<Op>),
  Object {
    #[serde(default)]
    ops: Vec<Op>,
  },
}

impl<'de> Deserialize<'de> for Delta {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    let (Wire::Ops(ops) | Wire::Object { ops }) = Wire::deserialize(deserializer)?;
    Ok(Self::from_ops(ops))
  }
}

impl Delta {
  #[must_use]
  pub fn new() -> Self {
    Self { ops: Vec::new() }
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      ops: Vec::with_capacity(capacity),
    }
  }

  /// Builds a canonical change from arbitrary ops.
  pub fn from_ops(ops: impl IntoIterator<Item = Op>) -> Self {
    let mut delta = Self::new();
    for op in ops {
      delta.push(op);
    }
    delta
  }

  pub fn from_json(json: &str) -> Result<Self> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string(self)?)
  }

  #[inline]
  pub fn ops(&self) -> &[Op] {
    &self.ops
  }

  #[inline]
  pub fn into_ops(self) -> Vec<Op> {
    self.ops
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.ops.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Op> {
    self.ops.iter()
  }

  pub fn op_iter(&self) -> OpIterator<'_> {
    OpIterator::new(&self.ops)
  }

  // Builder operations: insert/retain/delete.
  //

  pub fn insert(self, text: &str, attributes: AttributeMap) -> Self {
    self.insert_value(Insert::from(text), attributes)
  }

  pub fn insert_embed(self, kind: &str, value: Value, attributes: AttributeMap) -> Self {
    self.insert_value(Insert::embed(kind, value), attributes)
  }

  pub fn insert_value(mut self, insert: Insert, attributes: AttributeMap) -> Self {
    if let Insert::Text(text) = &insert {
      if text.is_empty() {
        return self;
      }
    }
    self.push(Op::Insert(insert, attributes));
    self
  }

  pub fn retain(self, n: usize) -> Self {
    self.retain_with(n, AttributeMap::new())
  }

  pub fn retain_with(mut self, n: usize, attributes: AttributeMap) -> Self {
    if n == 0 {
      return self;
    }
    self.push(Op::Retain(n, attributes));
    self
  }

  pub fn delete(mut self, n: usize) -> Self {
    if n == 0 {
      return self;
    }
    self.push(Op::Delete(n));
    self
  }

  /// Appends `op`, merging it into its neighbours when possible.
  pub fn push(&mut self, op: Op) {
    if op.len() == 0 && !op.is_insert() {
      return;
    }
    if let Op::Insert(Insert::Text(text), _) = &op {
      if text.is_empty() {
        return;
      }
    }

    let mut index = self.ops.len();
    if let (Some(Op::Delete(last)), Op::Delete(n)) = (self.ops.last_mut(), &op) {
      *last += n;
      return;
    }

    // Inserting before or after a delete at the same position is the same
    // edit; keep the insert first.
    if matches!(self.ops.last(), Some(Op::Delete(_))) && op.is_insert() {
      index -= 1;
      if index == 0 {
        self.ops.insert(0, op);
        return;
      }
    }

    if let Some(prev) = index.checked_sub(1).and_then(|i| self.ops.get_mut(i)) {
      match (prev, &op) {
        (
          Op::Insert(Insert::Text(prev_text), prev_attrs),
          Op::Insert(Insert::Text(text), attributes),
        ) if prev_attrs == attributes => {
          prev_text.push_str(text);
          return;
        },
        (Op::Retain(prev_n, prev_attrs), Op::Retain(n, attributes)) if prev_attrs == attributes => {
          *prev_n += n;
          return;
        },
        _ => {},
      }
    }

    if index == self.ops.len() {
      self.ops.push(op);
    } else {
      self.ops.insert(index, op);
    }
  }

  /// Drops a trailing attribute-free retain, which changes nothing.
  #[must_use]
  pub fn chop(mut self) -> Self {
    if let Some(Op::Retain(_, attributes)) = self.ops.last() {
      if attributes.is_empty() {
        self.ops.pop();
      }
    }
    self
  }

  /// Sum of insert and retain lengths.
  pub fn length(&self) -> usize {
    self
      .ops
      .iter()
      .filter(|op| !op.is_delete())
      .map(Op::len)
      .sum()
  }

  /// Net change in document length.
  pub fn change_length(&self) -> isize {
    self.ops.iter().fold(0isize, |len, op| {
      match op {
        Op::Insert(insert, _) => len + insert.len_chars() as isize,
        Op::Delete(n) => len - *n as isize,
        Op::Retain(..) => len,
      }
    })
  }

  /// Total length deleted by this change.
  pub fn delete_length(&self) -> usize {
    self
      .ops
      .iter()
      .filter_map(|op| match op {
        Op::Delete(n) => Some(*n),
        _ => None,
      })
      .sum()
  }

  pub fn reduce<T>(&self, init: T, f: impl FnMut(T, &Op) -> T) -> T {
    self.ops.iter().fold(init, f)
  }

  /// Ops covering positions `start..end` of this change.
  #[must_use]
  pub fn slice(&self, start: usize, end: usize) -> Delta {
    let mut ops = Vec::new();
    let mut iter = self.op_iter();
    let mut index = 0;
    while index < end && iter.has_next() {
      let next = if index < start {
        iter.next_len(start - index)
      } else {
        let next = iter.next_len(end - index);
        ops.push(next.clone());
        next
      };
      index += next.len();
    }
    Delta { ops }
  }

  /// `self` followed by `other`, merging at the seam.
  #[must_use]
  pub fn concat(&self, other: &Delta) -> Delta {
    let mut delta = self.clone();
    let mut rest = other.ops.iter();
    if let Some(first) = rest.next() {
      delta.push(first.clone());
      delta.ops.extend(rest.cloned());
    }
    delta
  }

  /// The change equivalent to applying `self` then `other`.
  #[must_use]
  pub fn compose(&self, other: &Delta) -> Delta {
    let mut this_iter = self.op_iter();
    let mut other_iter = other.op_iter();
    let mut delta = Delta::with_capacity(self.ops.len() + other.ops.len());

    // Fast-forward over a leading plain retain in `other`: our inserts it
    // covers pass through untouched.
    if let Some(Op::Retain(first_retain, attributes)) = other_iter.peek() {
      if attributes.is_empty() {
        let mut first_left = *first_retain;
        while this_iter.peek_kind() == OpKind::Insert && this_iter.peek_len() <= first_left {
          first_left -= this_iter.peek_len();
          delta.ops.push(this_iter.next_op());
        }
        if first_retain - first_left > 0 {
          other_iter.next_len(first_retain - first_left);
        }
      }
    }

    while this_iter.has_next() || other_iter.has_next() {
      if other_iter.peek_kind() == OpKind::Insert {
        delta.push(other_iter.next_op());
      } else if this_iter.peek_kind() == OpKind::Delete {
        delta.push(this_iter.next_op());
      } else {
        let len = this_iter.peek_len().min(other_iter.peek_len());
        let this_op = this_iter.next_len(len);
        let other_op = other_iter.next_len(len);
        match other_op {
          Op::Retain(_, other_attributes) => {
            let new_op = match this_op {
              Op::Retain(_, this_attributes) => {
                Op::Retain(len, AttributeMap::compose(&this_attributes, &other_attributes, true))
              },
              Op::Insert(insert, this_attributes) => {
                Op::Insert(insert, AttributeMap::compose(&this_attributes, &other_attributes, false))
              },
              Op::Delete(_) => unreachable!("deletes in `self` are consumed above"),
            };
            delta.push(new_op.clone());

            // The rest of `other` is an endless retain: copy ours verbatim.
            if !other_iter.has_next() && delta.ops.last() == Some(&new_op) {
              let rest = Delta {
                ops: this_iter.rest(),
              };
              return delta.concat(&rest).chop();
            }
          },
          Op::Delete(n) => {
            // Deleting our insert cancels out; deleting retained content
            // survives.
            if this_op.is_retain() {
              delta.push(Op::Delete(n));
            }
          },
          Op::Insert(..) => unreachable!("inserts in `other` are consumed above"),
        }
      }
    }
    delta.chop()
  }

  /// Rewrites `other` so it applies after `self`, both having been made
  /// against the same document. `priority` means `self` happened first.
  #[must_use]
  pub fn transform(&self, other: &Delta, priority: bool) -> Delta {
    let mut this_iter = self.op_iter();
    let mut other_iter = other.op_iter();
    let mut delta = Delta::new();
    while this_iter.has_next() || other_iter.has_next() {
      if this_iter.peek_kind() == OpKind::Insert
        && (priority || other_iter.peek_kind() != OpKind::Insert)
      {
        let len = this_iter.next_op().len();
        delta.push(Op::Retain(len, AttributeMap::new()));
      } else if other_iter.peek_kind() == OpKind::Insert {
        delta.push(other_iter.next_op());
      } else {
        let len = this_iter.peek_len().min(other_iter.peek_len());
        let this_op = this_iter.next_len(len);
        let other_op = other_iter.next_len(len);
        match (this_op, other_op) {
          // Our delete either makes theirs redundant or removes what they
          // retained.
          (Op::Delete(_), _) => {},
          (_, Op::Delete(n)) => delta.push(Op::Delete(n)),
          (this_op, other_op) => {
            let empty = AttributeMap::new();
            let this_attributes = this_op.attributes().unwrap_or(&empty);
            let other_attributes = other_op.attributes().unwrap_or(&empty);
            delta.push(Op::Retain(
              len,
              AttributeMap::transform(this_attributes, other_attributes, priority),
            ));
          },
        }
      }
    }
    delta.chop()
  }

  /// Maps a document position through this change. With `priority`, an
  /// insert exactly at `index` does not push it forward.
  pub fn transform_position(&self, mut index: usize, priority: bool) -> usize {
    let mut iter = self.op_iter();
    let mut offset = 0;
    while iter.has_next() && offset <= index {
      let len = iter.peek_len();
      let kind = iter.peek_kind();
      iter.next_op();
      match kind {
        OpKind::Delete => {
          index -= len.min(index - offset);
          continue;
        },
        OpKind::Insert if offset < index || !priority => index += len,
        _ => {},
      }
      offset += len;
    }
    index
  }

  /// The change that undoes `self` when `self` was applied to `base`.
  #[must_use]
  pub fn invert(&self, base: &Delta) -> Delta {
    let mut inverted = Delta::new();
    let mut base_index = 0;
    for op in &self.ops {
      match op {
        Op::Insert(insert, _) => inverted.push(Op::Delete(insert.len_chars())),
        Op::Retain(n, attributes) if attributes.is_empty() => {
          inverted.push(Op::Retain(*n, AttributeMap::new()));
          base_index += n;
        },
        Op::Retain(n, attributes) => {
          for base_op in base.slice(base_index, base_index + n).ops {
            let empty = AttributeMap::new();
            let base_attributes = base_op.attributes().unwrap_or(&empty);
            inverted.push(Op::Retain(
              base_op.len(),
              AttributeMap::invert(attributes, base_attributes),
            ));
          }
          base_index += n;
        },
        Op::Delete(n) => {
          for base_op in base.slice(base_index, base_index + n).ops {
            inverted.push(base_op);
          }
          base_index += n;
        },
      }
    }
    inverted.chop()
  }

  /// The document text with every embed rendered as `placeholder`. `None`
  /// when the change is not a document.
  pub fn document_text(&self, placeholder: char) -> Option<String> {
    let mut text = String::new();
    for op in &self.ops {
      match op {
        Op::Insert(Insert::Text(s), _) => text.push_str(s),
        Op::Insert(Insert::Embed(_), _) => text.push(placeholder),
        _ => return None,
      }
    }
    Some(text)
  }
}

impl<'a> IntoIterator for &'a Delta {
  type IntoIter = std::slice::Iter<'a, Op>;
  type Item = &'a Op;

  fn into_iter(self) -> Self::IntoIter {
    self.ops.iter()
  }
}

impl FromIterator<Op> for Delta {
  fn from_iter<T: IntoIterator<Item = Op>>(iter: T) -> Self {
    Delta::from_ops(iter)
  }
}

#[cfg(test)]
mod test {
  use quickcheck::{
    Arbitrary,
    Gen,
  };
  use serde_json::json;

  use super::*;

  fn bold() -> AttributeMap {
    AttributeMap::single("bold", true)
  }

  fn doc(text: &str) -> Delta {
    Delta::new().insert(text, AttributeMap::new())
  }

  #[test]
  fn push_merges_and_orders() {
    let delta = Delta::new()
      .insert("a", AttributeMap::new())
      .insert("b", AttributeMap::new())
      .retain(2)
      .retain(3)
      .delete(1)
      .delete(2);
    assert_eq!(delta.ops(), &[
      Op::Insert("ab".into(), AttributeMap::new()),
      Op::Retain(5, AttributeMap::new()),
      Op::Delete(3),
    ]);

    let delta = Delta::new().retain(1).delete(2).insert("x", AttributeMap::new());
    assert_eq!(delta.ops(), &[
      Op::Retain(1, AttributeMap::new()),
      Op::Insert("x".into(), AttributeMap::new()),
      Op::Delete(2),
    ]);

    let delta = Delta::new().delete(2).insert("x", AttributeMap::new());
    assert_eq!(delta.ops(), &[
      Op::Insert("x".into(), AttributeMap::new()),
      Op::Delete(2),
    ]);

    // attributes block merging
    let delta = Delta::new().insert("a", bold()).insert("b", AttributeMap::new());
    assert_eq!(delta.ops().len(), 2);

    // embeds never merge
    let delta = Delta::new()
      .insert_embed("image", json!("a.png"), AttributeMap::new())
      .insert_embed("image", json!("a.png"), AttributeMap::new());
    assert_eq!(delta.ops().len(), 2);
  }

  #[test]
  fn zero_length_ops_are_dropped() {
    let delta = Delta::new().retain(0).delete(0).insert("", bold());
    assert!(delta.is_empty());
  }

  #[test]
  fn lengths() {
    let delta = Delta::new()
      .retain(3)
      .insert("ab", AttributeMap::new())
      .delete(4)
      .insert_embed("image", json!("x"), AttributeMap::new());
    assert_eq!(delta.length(), 6);
    assert_eq!(delta.change_length(), -1);
    assert_eq!(delta.delete_length(), 4);
  }

  #[test]
  fn chop_keeps_formatting_retain() {
    assert!(Delta::new().retain(3).chop().is_empty());
    assert_eq!(Delta::new().retain_with(3, bold()).chop().ops().len(), 1);
  }

  #[test]
  fn slice() {
    let delta = Delta::new()
      .insert("Hello", bold())
      .insert(" World", AttributeMap::new());
    assert_eq!(
      delta.slice(3, 8),
      Delta::new()
        .insert("lo", bold())
        .insert(" Wo", AttributeMap::new())
    );
    assert_eq!(delta.slice(0, 0), Delta::new());
    assert_eq!(delta.slice(6, 100), doc("World"));
  }

  #[test]
  fn concat_merges_seam() {
    let left = doc("ab");
    let right = doc("cd").insert("e", bold());
    assert_eq!(
      left.concat(&right),
      Delta::new().insert("abcd", AttributeMap::new()).insert("e", bold())
    );
    assert_eq!(left.concat(&Delta::new()), left);
  }

  #[test]
  fn compose_insert_then_format() {
    let a = doc("Hello");
    let b = Delta::new().retain_with(5, bold());
    assert_eq!(a.compose(&b), Delta::new().insert("Hello", bold()));
  }

  #[test]
  fn compose_insert_then_delete_cancels() {
    let a = Delta::new().retain(2).insert("abc", AttributeMap::new());
    let b = Delta::new().retain(3).delete(2);
    assert_eq!(
      a.compose(&b),
      Delta::new().retain(2).insert("a", AttributeMap::new())
    );
  }

  #[test]
  fn compose_delete_then_insert() {
    let a = Delta::new().delete(1);
    let b = Delta::new().insert("X", AttributeMap::new());
    assert_eq!(
      a.compose(&b),
      Delta::new().insert("X", AttributeMap::new()).delete(1)
    );
  }

  #[test]
  fn compose_retain_attributes_keep_null() {
    let a = Delta::new().retain_with(1, bold());
    let b = Delta::new().retain_with(1, AttributeMap::single("bold", Value::Null));
    assert_eq!(
      a.compose(&b),
      Delta::new().retain_with(1, AttributeMap::single("bold", Value::Null))
    );
  }

  #[test]
  fn compose_rest_fast_path() {
    let a = doc("Hello World");
    let b = Delta::new().retain(2).delete(1);
    assert_eq!(a.compose(&b), doc("Helo World"));
  }

  #[test]
  fn transform_inserts_at_same_position() {
    let a = Delta::new().insert("A", AttributeMap::new());
    let b = Delta::new().insert("B", AttributeMap::new());
    assert_eq!(
      a.transform(&b, true),
      Delta::new().retain(1).insert("B", AttributeMap::new())
    );
    assert_eq!(a.transform(&b, false), Delta::new().insert("B", AttributeMap::new()));
  }

  #[test]
  fn transform_delete_against_delete() {
    let a = Delta::new().retain(1).delete(2);
    let b = Delta::new().delete(2);
    assert_eq!(a.transform(&b, true), Delta::new().delete(1));
  }

  #[test]
  fn transform_attributes() {
    let a = Delta::new().retain_with(3, bold());
    let b = Delta::new().retain_with(3, AttributeMap::single("bold", false).with("italic", true));
    assert_eq!(
      a.transform(&b, true),
      Delta::new().retain_with(3, AttributeMap::single("italic", true))
    );
    assert_eq!(a.transform(&b, false), b);
  }

  #[test]
  fn transform_position() {
    let delta = Delta::new().retain(5).insert("a", AttributeMap::new());
    assert_eq!(delta.transform_position(4, false), 4);
    assert_eq!(delta.transform_position(5, false), 6);
    assert_eq!(delta.transform_position(5, true), 5);
    assert_eq!(delta.transform_position(6, true), 7);

    let delta = Delta::new().retain(2).delete(3);
    assert_eq!(delta.transform_position(1, false), 1);
    assert_eq!(delta.transform_position(3, false), 2);
    assert_eq!(delta.transform_position(8, false), 5);
  }

  #[test]
  fn invert_restores_base() {
    let base = Delta::new()
      .insert("Hello", bold())
      .insert(" World\n", AttributeMap::new());
    let change = Delta::new()
      .retain(2)
      .delete(4)
      .insert("XY", AttributeMap::new())
      .retain_with(3, AttributeMap::single("italic", true));
    let inverted = change.invert(&base);
    assert_eq!(base.compose(&change).compose(&inverted), base);
  }

  #[test]
  fn json_roundtrip() {
    let delta = Delta::new()
      .insert("ab", bold())
      .insert_embed("image", json!("x.png"), AttributeMap::new())
      .insert("\n", AttributeMap::single("header", 1));
    let json = delta.to_json().unwrap();
    assert_eq!(Delta::from_json(&json).unwrap(), delta);
    assert_eq!(
      Delta::from_json(r#"{"ops":[{"insert":"a"},{"insert":"b"}]}"#).unwrap(),
      doc("ab")
    );
  }

  #[test]
  fn json_accepts_bare_op_arrays() {
    let bare = Delta::from_json(r#"[{"insert":"a","attributes":{"bold":true}},{"retain":2},{"delete":1}]"#).unwrap();
    let wrapped =
      Delta::from_json(r#"{"ops":[{"insert":"a","attributes":{"bold":true}},{"retain":2},{"delete":1}]}"#).unwrap();
    assert_eq!(bare, wrapped);
    assert_eq!(bare, Delta::new().insert("a", bold()).retain(2).delete(1));
    assert_eq!(Delta::from_json("[]").unwrap(), Delta::new());
    assert_eq!(Delta::from_json("{}").unwrap(), Delta::new());
    assert!(Delta::from_json(r#""insert""#).is_err());
  }

  #[derive(Debug, Clone)]
  struct Document(Delta);

  #[derive(Debug, Clone)]
  struct Edit(Delta);

  fn arbitrary_attributes(g: &mut Gen) -> AttributeMap {
    match u8::arbitrary(g) % 4 {
      0 => AttributeMap::single("bold", true),
      1 => AttributeMap::single("italic", true),
      _ => AttributeMap::new(),
    }
  }

  fn arbitrary_text(g: &mut Gen) -> String {
    let len = 1 + usize::arbitrary(g) % 4;
    (0..len)
      .map(|_| *g.choose(&['a', 'b', '\n', '\u{e9}']).unwrap_or(&'a'))
      .collect()
  }

  impl Arbitrary for Document {
    fn arbitrary(g: &mut Gen) -> Self {
      let mut delta = Delta::new();
      for _ in 0..usize::arbitrary(g) % 6 {
        delta = if u8::arbitrary(g) % 5 == 0 {
          delta.insert_embed("image", json!("x"), arbitrary_attributes(g))
        } else {
          delta.insert(&arbitrary_text(g), arbitrary_attributes(g))
        };
      }
      Document(delta)
    }
  }

  impl Edit {
    /// A random change applicable to a document of length `len`.
    fn against(len: usize, g: &mut Gen) -> Self {
      let mut delta = Delta::new();
      let mut left = len;
      while left > 0 {
        let n = 1 + usize::arbitrary(g) % left;
        delta = match u8::arbitrary(g) % 4 {
          0 => delta.delete(n),
          1 => delta.retain_with(n, arbitrary_attributes(g)),
          2 => delta.insert(&arbitrary_text(g), arbitrary_attributes(g)).retain(n),
          _ => delta.retain(n),
        };
        left -= n;
      }
      if bool::arbitrary(g) {
        delta = delta.insert(&arbitrary_text(g), AttributeMap::new());
      }
      Edit(delta)
    }
  }

  quickcheck::quickcheck! {
    fn compose_with_empty_is_identity(doc: Document) -> bool {
      doc.0.compose(&Delta::new()) == doc.0 && Delta::new().compose(&doc.0) == doc.0
    }

    fn invert_undoes_change(doc: Document, size: u8) -> bool {
      let mut g = Gen::new(size as usize % 16 + 1);
      let change = Edit::against(doc.0.length(), &mut g).0;
      let applied = doc.0.compose(&change);
      applied.compose(&change.invert(&doc.0)) == doc.0
    }

    fn transform_converges(doc: Document, priority: bool, size: u8) -> bool {
      let mut g = Gen::new(size as usize % 16 + 1);
      let a = Edit::against(doc.0.length(), &mut g).0;
      let b = Edit::against(doc.0.length(), &mut g).0;
      let b_after_a = a.transform(&b, priority);
      let a_after_b = b.transform(&a, !priority);
      doc.0.compose(&a).compose(&b_after_a) == doc.0.compose(&b).compose(&a_after_b)
    }
  }
}
