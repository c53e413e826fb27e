//! The presentation surface collaborator.
//!
//! The document never observes a live surface. The surface reports what
//! changed as [`MutationRecord`]s and exposes its native selection through
//! [`Surface`]; everything native is addressed by opaque [`NativeNode`]
//! handles issued by the document tree.

use serde::{
  Deserialize,
  Serialize,
};

/// Opaque handle naming one node of the presentation tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NativeNode(pub u64);

/// A point in the presentation tree. For text nodes `offset` counts chars,
/// for element nodes it counts children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeAnchor {
  pub node:   NativeNode,
  pub offset: usize,
}

impl NativeAnchor {
  pub fn new(node: NativeNode, offset: usize) -> Self {
    Self { node, offset }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeRange {
  pub start: NativeAnchor,
  pub end:   NativeAnchor,
}

impl NativeRange {
  pub fn new(start: NativeAnchor, end: NativeAnchor) -> Self {
    Self { start, end }
  }

  pub fn collapsed(anchor: NativeAnchor) -> Self {
    Self {
      start: anchor,
      end:   anchor,
    }
  }

  #[inline]
  pub fn is_collapsed(&self) -> bool {
    self.start == self.end
  }
}

/// One observed change of the presentation tree, in observation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MutationRecord {
  /// The text of a text node changed from `old_value` to `value`.
  CharacterData {
    target:    NativeNode,
    old_value: String,
    value:     String,
  },
  /// A text node holding `text` was added under `target`, before `before`
  /// or at the end.
  ChildAdded {
    target: NativeNode,
    before: Option<NativeNode>,
    text:   String,
  },
  /// `target` was removed together with its subtree.
  ChildRemoved { target: NativeNode },
}

impl MutationRecord {
  pub fn target(&self) -> NativeNode {
    match self {
      MutationRecord::CharacterData { target, .. }
      | MutationRecord::ChildAdded { target, .. }
      | MutationRecord::ChildRemoved { target } => *target,
    }
  }
}

pub trait Surface {
  /// The current native selection, if any.
  fn native_range(&self) -> Option<NativeRange>;

  fn set_native_range(&mut self, range: Option<NativeRange>);

  fn has_focus(&self) -> bool;

  fn focus(&mut self);

  fn blur(&mut self);

  /// Whether the surface is mounted and able to host a document.
  fn is_attached(&self) -> bool {
    true
  }
}

/// A surface without any presentation, used by tests and the CLI.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
  range:    Option<NativeRange>,
  focused:  bool,
  attached: bool,
}

impl Default for HeadlessSurface {
  fn default() -> Self {
    Self {
      range:    None,
      focused:  false,
      attached: true,
    }
  }
}

impl HeadlessSurface {
  pub fn new() -> Self {
    Self::default()
  }

  /// A surface that reports itself as not mounted.
  pub fn detached() -> Self {
    Self {
      attached: false,
      ..Self::default()
    }
  }
}

impl Surface for HeadlessSurface {
  fn native_range(&self) -> Option<NativeRange> {
    self.range
  }

  fn set_native_range(&mut self, range: Option<NativeRange>) {
    self.range = range;
  }

  fn has_focus(&self) -> bool {
    self.focused
  }

  fn focus(&mut self) {
    self.focused = true;
  }

  fn blur(&mut self) {
    self.focused = false;
  }

  fn is_attached(&self) -> bool {
    self.attached
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn headless_focus_and_range() {
    let mut surface = HeadlessSurface::new();
    assert!(surface.is_attached());
    assert!(!surface.has_focus());
    surface.focus();
    assert!(surface.has_focus());

    let range = NativeRange::collapsed(NativeAnchor::new(NativeNode(3), 1));
    assert!(range.is_collapsed());
    surface.set_native_range(Some(range));
    assert_eq!(surface.native_range(), Some(range));
    surface.blur();
    assert!(!surface.has_focus());
    assert!(!HeadlessSurface::detached().is_attached());
  }

  #[test]
  fn record_json_shape() {
    let record: MutationRecord = serde_json::from_str(
      r#"{"type": "character-data", "target": 4, "old_value": "ab", "value": "abc"}"#,
    )
    .unwrap();
    assert_eq!(record.target(), NativeNode(4));
  }
}
