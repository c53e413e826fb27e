//! Mapping between document ranges and native selections.
//!
//! A [`Range`] addresses the document by index and length. The surface
//! reports its selection as a [`NativeRange`] of anchors into the native
//! tree, which may sit on elements as well as on text. [`Selection`]
//! translates between the two and keeps the last known range.
//!
//! # Normalization
//!
//! A native anchor on an element is first pushed down to a leaf:
//!
//! - an offset naming a child descends into that child at offset 0
//! - an offset past the last child descends into the last child, at the
//!   end of its text or past its own children
//!
//! Every step moves one level down, so descent always terminates. The leaf
//! found this way converts to a document index. A parked cursor counts as
//! zero length, so it never shifts the indices around it.

use serde::{
  Deserialize,
  Serialize,
};
use serde_json::Value;

use crate::{
  emitter::Source,
  node::NodeKind,
  scroll::Scroll,
  surface::{
    NativeAnchor,
    NativeRange,
    Surface,
  },
};

/// A span of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
  pub index:  usize,
  pub length: usize,
}

impl Range {
  pub fn new(index: usize, length: usize) -> Self {
    Self { index, length }
  }

  pub fn collapsed(index: usize) -> Self {
    Self { index, length: 0 }
  }

  #[inline]
  pub fn is_collapsed(&self) -> bool {
    self.length == 0
  }

  #[inline]
  pub fn end(&self) -> usize {
    self.index + self.length
  }
}

/// A native selection with both anchors pushed down to leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedRange {
  pub start:  NativeAnchor,
  pub end:    NativeAnchor,
  /// The selection as the surface reported it.
  pub native: NativeRange,
}

/// Reported whenever the selection moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionChange {
  pub range:     Option<Range>,
  pub old_range: Option<Range>,
  pub source:    Source,
}

#[derive(Debug, Clone)]
pub struct Selection {
  composing:   bool,
  /// Last non-null range, restored on focus.
  saved_range: Range,
  last_range:  Option<Range>,
  last_native: Option<NormalizedRange>,
  /// Native range remembered across a tree update.
  pending:     Option<NativeRange>,
}

impl Default for Selection {
  fn default() -> Self {
    Self {
      composing:   false,
      saved_range: Range::default(),
      last_range:  Some(Range::default()),
      last_native: None,
      pending:     None,
    }
  }
}

impl Selection {
  pub fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub fn last_range(&self) -> Option<Range> {
    self.last_range
  }

  #[inline]
  pub fn saved_range(&self) -> Range {
    self.saved_range
  }

  #[inline]
  pub fn last_native(&self) -> Option<&NormalizedRange> {
    self.last_native.as_ref()
  }

  #[inline]
  pub fn is_composing(&self) -> bool {
    self.composing
  }

  pub fn composition_start(&mut self) {
    self.composing = true;
  }

  /// Ends a composition and turns anything composed into the parked cursor
  /// into regular text.
  pub fn composition_end<S: Surface>(&mut self, scroll: &mut Scroll, surface: &mut S) {
    self.composing = false;
    if scroll.cursor().is_none() {
      return;
    }
    let native = surface.native_range();
    if let Some(range) = scroll.restore_cursor(native.as_ref()) {
      self.set_native_range(scroll, surface, Some(range), false);
    }
  }

  pub fn has_focus<S: Surface>(&self, surface: &S) -> bool {
    surface.has_focus()
  }

  /// Focuses the surface and restores the saved range.
  pub fn focus<S: Surface>(&mut self, scroll: &mut Scroll, surface: &mut S) -> Option<SelectionChange> {
    if surface.has_focus() {
      return None;
    }
    surface.focus();
    self.set_range(scroll, surface, Some(self.saved_range), false, Source::Api)
  }

  /// Applies an inline format to a collapsed selection by parking the
  /// cursor at the caret.
  pub fn format<S: Surface>(&mut self, scroll: &mut Scroll, surface: &mut S, name: &str, value: &Value) {
    self.update(scroll, surface, Source::Silent);
    let Some(normalized) = self.get_native_range(scroll, surface) else {
      return;
    };
    if !normalized.native.is_collapsed() || scroll.registry().is_block_format(name) {
      return;
    }
    if scroll.cursor_inner() != Some(normalized.start.node) {
      let Some(node) = scroll.find(normalized.start.node, false) else {
        return;
      };
      scroll.park_cursor(node, normalized.start.offset);
    }
    scroll.format_cursor(name, value);
    scroll.optimize();
    let caret = scroll
      .cursor()
      .and_then(|cursor| scroll.leaf_position(cursor, 0));
    if let Some(caret) = caret {
      self.set_native_range(scroll, surface, Some(NativeRange::collapsed(caret)), false);
    }
    self.update(scroll, surface, Source::Silent);
  }

  pub fn get_native_range<S: Surface>(&self, scroll: &Scroll, surface: &S) -> Option<NormalizedRange> {
    let native = surface.native_range()?;
    self.normalize_native(scroll, &native)
  }

  /// Pushes both anchors down to leaves. `None` when either anchor lies
  /// outside the document.
  pub fn normalize_native(&self, scroll: &Scroll, native: &NativeRange) -> Option<NormalizedRange> {
    if !scroll.contains_native(native.start.node) || !scroll.contains_native(native.end.node) {
      tracing::trace!("native range {native:?} is outside the document");
      return None;
    }
    Some(NormalizedRange {
      start:  descend(scroll, native.start),
      end:    descend(scroll, native.end),
      native: *native,
    })
  }

  pub fn normalized_to_range(&self, scroll: &Scroll, normalized: &NormalizedRange) -> Range {
    let mut anchors = vec![normalized.start];
    if !normalized.native.is_collapsed() {
      anchors.push(normalized.end);
    }
    let indexes: Vec<usize> = anchors
      .into_iter()
      .filter_map(|anchor| {
        let id = scroll.find(anchor.node, true)?;
        let index = scroll.offset(id);
        Some(if anchor.offset == 0 {
          index
        } else if scroll.kind(id).is_some_and(NodeKind::is_parent) {
          index + scroll.node_len(id)
        } else {
          index + scroll.leaf_index(id, anchor.node, anchor.offset)
        })
      })
      .collect();
    let max = scroll.length().saturating_sub(1);
    let end = indexes.iter().copied().max().unwrap_or(0).min(max);
    let start = indexes.iter().copied().min().unwrap_or(0).min(end);
    let range = Range::new(start, end - start);
    tracing::trace!("{normalized:?} maps to {range:?}");
    range
  }

  pub fn range_to_native(&self, scroll: &Scroll, range: Range) -> Option<NativeRange> {
    let max = scroll.length().saturating_sub(1);
    let anchor = |index: usize| {
      let (leaf, offset) = scroll.leaf(index.min(max))?;
      scroll.leaf_position(leaf, offset)
    };
    let start = anchor(range.index)?;
    let end = if range.is_collapsed() {
      start
    } else {
      anchor(range.end())?
    };
    Some(NativeRange::new(start, end))
  }

  pub fn get_range<S: Surface>(&self, scroll: &Scroll, surface: &S) -> (Option<Range>, Option<NormalizedRange>) {
    match self.get_native_range(scroll, surface) {
      Some(normalized) => (
        Some(self.normalized_to_range(scroll, &normalized)),
        Some(normalized),
      ),
      None => (None, None),
    }
  }

  /// Hands a native range to the surface. `None` blurs it.
  ///
  /// Anchors on a line break placeholder are moved onto its line. An
  /// identical range is not set again unless `force` is given.
  pub fn set_native_range<S: Surface>(
    &mut self,
    scroll: &Scroll,
    surface: &mut S,
    range: Option<NativeRange>,
    force: bool,
  ) {
    let Some(range) = range else {
      surface.set_native_range(None);
      surface.blur();
      return;
    };
    if !scroll.contains_native(range.start.node) || !scroll.contains_native(range.end.node) {
      tracing::trace!("ignoring native range {range:?} outside the document");
      return;
    }
    if !surface.has_focus() {
      surface.focus();
    }
    let range = NativeRange::new(onto_line(scroll, range.start), onto_line(scroll, range.end));
    if !force && surface.native_range() == Some(range) {
      return;
    }
    surface.set_native_range(Some(range));
  }

  pub fn set_range<S: Surface>(
    &mut self,
    scroll: &mut Scroll,
    surface: &mut S,
    range: Option<Range>,
    force: bool,
    source: Source,
  ) -> Option<SelectionChange> {
    let native = range.and_then(|range| self.range_to_native(scroll, range));
    self.set_native_range(scroll, surface, native, force);
    self.update(scroll, surface, source)
  }

  /// Re-reads the native selection. Returns the change when the range
  /// moved.
  ///
  /// A parked cursor is restored once the caret collapses outside it.
  pub fn update<S: Surface>(
    &mut self,
    scroll: &mut Scroll,
    surface: &mut S,
    source: Source,
  ) -> Option<SelectionChange> {
    let old_range = self.last_range;
    let (range, native) = self.get_range(scroll, surface);
    self.last_range = range;
    self.last_native = native;
    if let Some(range) = range {
      self.saved_range = range;
    }
    if old_range == self.last_range {
      return None;
    }

    if !self.composing
      && let Some(native) = native
      && native.native.is_collapsed()
      && scroll.cursor().is_some()
      && scroll.cursor_inner() != Some(native.start.node)
      && let Some(restored) = scroll.restore_cursor(Some(&native.native))
    {
      self.set_native_range(scroll, surface, Some(restored), false);
    }
    Some(SelectionChange {
      range: self.last_range,
      old_range,
      source,
    })
  }

  /// Remembers the focused native range before the tree is updated from
  /// surface records. A caret inside the cursor is left to the cursor.
  pub fn before_update<S: Surface>(&mut self, scroll: &Scroll, surface: &S) {
    self.pending = None;
    if !surface.has_focus() {
      return;
    }
    let Some(normalized) = self.get_native_range(scroll, surface) else {
      return;
    };
    if scroll.cursor_inner() == Some(normalized.start.node) {
      return;
    }
    self.pending = Some(normalized.native);
  }

  /// Puts the remembered range back if it still exists and re-reads the
  /// selection.
  pub fn after_update<S: Surface>(
    &mut self,
    scroll: &mut Scroll,
    surface: &mut S,
    source: Source,
  ) -> Option<SelectionChange> {
    let pending = self.pending.take()?;
    if scroll.contains_native(pending.start.node) && scroll.contains_native(pending.end.node) {
      self.set_native_range(scroll, surface, Some(pending), false);
    }
    self.update(scroll, surface, source)
  }
}

fn descend(scroll: &Scroll, anchor: NativeAnchor) -> NativeAnchor {
  let NativeAnchor {
    mut node,
    mut offset,
  } = anchor;
  while scroll.native_text_len(node).is_none() {
    let children = scroll.native_children(node);
    if let Some(&child) = children.get(offset) {
      node = child;
      offset = 0;
    } else if let Some(&last) = children.last() {
      node = last;
      offset = match scroll.native_text_len(last) {
        Some(len) => len,
        None => scroll.native_children(last).len().max(1),
      };
    } else {
      break;
    }
  }
  NativeAnchor::new(node, offset)
}

fn onto_line(scroll: &Scroll, anchor: NativeAnchor) -> NativeAnchor {
  let Some(id) = scroll.find(anchor.node, false) else {
    return anchor;
  };
  if !matches!(scroll.kind(id), Some(NodeKind::Break)) {
    return anchor;
  }
  let line = scroll.parent(id).and_then(|line| scroll.native_of(line));
  match (line, scroll.index_in_parent(id)) {
    (Some(line), Some(index)) => NativeAnchor::new(line, index),
    _ => anchor,
  }
}

#[cfg(test)]
mod test {
  use std::sync::Arc;

  use serde_json::json;
  use the_core::chars::CURSOR_MARKER;
  use the_delta::Delta;

  use super::*;
  use crate::{
    editor::Editor,
    registry::Registry,
    scroll::UpdateContext,
    surface::{
      HeadlessSurface,
      MutationRecord,
      NativeNode,
    },
  };

  fn load(content: serde_json::Value) -> Scroll {
    let mut scroll = Scroll::new(Arc::new(Registry::default()));
    let mut editor = Editor::new(&scroll);
    let content = Delta::from_json(&content.to_string()).unwrap();
    editor.apply_delta(&mut scroll, &content);
    let length = scroll.length();
    editor.delete_text(&mut scroll, length - 1, 1);
    scroll
  }

  fn mixed() -> Scroll {
    load(json!([
      { "insert": "ab" },
      { "insert": { "image": "a.png" } },
      { "insert": "c", "attributes": { "bold": true } },
      { "insert": "\n\n" },
      { "insert": "de", "attributes": { "bold": true } },
      { "insert": "f\n" },
    ]))
  }

  fn round_trip(scroll: &mut Scroll, range: Range) -> Option<Range> {
    let mut selection = Selection::new();
    let mut surface = HeadlessSurface::new();
    selection.set_range(scroll, &mut surface, Some(range), false, Source::Api);
    selection.get_range(scroll, &surface).0
  }

  #[test]
  fn element_anchors_descend_to_leaves() {
    let scroll = mixed();
    let selection = Selection::new();
    let root = scroll.native_of(scroll.root()).unwrap();
    let lines = scroll.native_children(root).len();

    let end = NativeRange::collapsed(NativeAnchor::new(root, lines));
    let normalized = selection.normalize_native(&scroll, &end).unwrap();
    assert!(scroll.native_text_len(normalized.start.node).is_some());
    assert_eq!(
      selection.normalized_to_range(&scroll, &normalized),
      Range::collapsed(scroll.length() - 1)
    );

    let start = NativeRange::collapsed(NativeAnchor::new(root, 0));
    let normalized = selection.normalize_native(&scroll, &start).unwrap();
    assert_eq!(selection.normalized_to_range(&scroll, &normalized), Range::collapsed(0));
  }

  #[test]
  fn embeds_and_empty_lines() {
    let mut scroll = mixed();
    for range in [
      Range::collapsed(2),
      Range::collapsed(3),
      Range::new(2, 1),
      Range::collapsed(5),
      Range::new(4, 2),
    ] {
      assert_eq!(round_trip(&mut scroll, range), Some(range));
    }
  }

  #[test]
  fn block_embeds_map_onto_the_root() {
    let mut scroll = load(json!([
      { "insert": "a\n" },
      { "insert": { "video": "v.mp4" } },
      { "insert": "b\n" },
    ]));
    assert_eq!(scroll.length(), 5);
    for range in [Range::collapsed(2), Range::new(2, 1), Range::new(1, 2)] {
      assert_eq!(round_trip(&mut scroll, range), Some(range));
    }
  }

  #[test]
  fn ranges_are_clamped() {
    let mut scroll = mixed();
    let last = scroll.length() - 1;
    assert_eq!(round_trip(&mut scroll, Range::new(last - 1, 10)), Some(Range::new(last - 1, 1)));
    assert_eq!(round_trip(&mut scroll, Range::collapsed(100)), Some(Range::collapsed(last)));
  }

  #[test]
  fn foreign_anchors_yield_nothing() {
    let mut scroll = mixed();
    let mut selection = Selection::new();
    let mut surface = HeadlessSurface::new();
    let foreign = NativeRange::collapsed(NativeAnchor::new(NativeNode(9999), 0));
    assert_eq!(selection.normalize_native(&scroll, &foreign), None);

    selection.set_native_range(&scroll, &mut surface, Some(foreign), false);
    assert_eq!(surface.native_range(), None);
    surface.set_native_range(Some(foreign));
    let change = selection.update(&mut scroll, &mut surface, Source::User).unwrap();
    assert_eq!(change.range, None);
    assert_eq!(change.old_range, Some(Range::default()));
  }

  #[test]
  fn update_reports_moves_once() {
    let mut scroll = mixed();
    let mut selection = Selection::new();
    let mut surface = HeadlessSurface::new();
    let change = selection
      .set_range(&mut scroll, &mut surface, Some(Range::new(1, 2)), false, Source::User)
      .unwrap();
    assert_eq!(change.range, Some(Range::new(1, 2)));
    assert_eq!(change.old_range, Some(Range::default()));
    assert_eq!(change.source, Source::User);
    assert!(surface.has_focus());
    assert_eq!(selection.update(&mut scroll, &mut surface, Source::User), None);
  }

  #[test]
  fn focus_restores_the_saved_range() {
    let mut scroll = mixed();
    let mut selection = Selection::new();
    let mut surface = HeadlessSurface::new();
    selection.set_range(&mut scroll, &mut surface, Some(Range::new(1, 1)), false, Source::Api);
    selection.set_range(&mut scroll, &mut surface, None, false, Source::Api);
    assert!(!surface.has_focus());
    assert_eq!(selection.last_range(), None);
    assert_eq!(selection.saved_range(), Range::new(1, 1));

    let change = selection.focus(&mut scroll, &mut surface).unwrap();
    assert_eq!(change.range, Some(Range::new(1, 1)));
    assert!(selection.has_focus(&surface));
    assert_eq!(selection.focus(&mut scroll, &mut surface), None);
  }

  #[test]
  fn break_anchors_sit_on_their_line() {
    let mut scroll = mixed();
    let mut selection = Selection::new();
    let mut surface = HeadlessSurface::new();
    selection.set_range(&mut scroll, &mut surface, Some(Range::collapsed(5)), false, Source::Api);
    let (line, _) = scroll.line(5).unwrap();
    let anchor = surface.native_range().unwrap().start;
    assert_eq!(anchor, NativeAnchor::new(scroll.native_of(line).unwrap(), 0));
  }

  #[test]
  fn collapsed_format_parks_the_cursor() {
    let mut scroll = load(json!([{ "insert": "ab\n" }]));
    let mut selection = Selection::new();
    let mut surface = HeadlessSurface::new();
    selection.set_range(&mut scroll, &mut surface, Some(Range::collapsed(1)), false, Source::Api);
    selection.format(&mut scroll, &mut surface, "bold", &json!(true));
    let inner = scroll.cursor_inner().unwrap();
    assert_eq!(surface.native_range().unwrap().start.node, inner);
    assert_eq!(selection.last_range(), Some(Range::collapsed(1)));

    // block formats never park
    selection.format(&mut scroll, &mut surface, "header", &json!(1));
    assert_eq!(scroll.cursor_inner(), Some(inner));

    let mut context = UpdateContext {
      selection: Some(NativeRange::collapsed(NativeAnchor::new(inner, 2))),
      ..UpdateContext::default()
    };
    scroll.update(
      &[MutationRecord::CharacterData {
        target:    inner,
        old_value: CURSOR_MARKER.to_string(),
        value:     format!("{CURSOR_MARKER}x"),
      }],
      &mut context,
    );
    selection.set_native_range(&scroll, &mut surface, context.range, false);
    let change = selection.update(&mut scroll, &mut surface, Source::User).unwrap();
    assert_eq!(change.range, Some(Range::collapsed(2)));
    assert_eq!(
      scroll.delta(),
      Delta::from_json(r#"[{"insert":"a"},{"insert":"x","attributes":{"bold":true}},{"insert":"b\n"}]"#).unwrap()
    );
  }

  #[test]
  fn caret_leaving_the_cursor_restores_it() {
    let mut scroll = load(json!([{ "insert": "ab\n" }]));
    let mut selection = Selection::new();
    let mut surface = HeadlessSurface::new();
    selection.set_range(&mut scroll, &mut surface, Some(Range::collapsed(1)), false, Source::Api);
    selection.format(&mut scroll, &mut surface, "italic", &json!(true));
    assert!(scroll.cursor().is_some());

    selection.composition_start();
    selection.set_range(&mut scroll, &mut surface, Some(Range::collapsed(0)), false, Source::User);
    assert!(scroll.cursor().is_some());
    selection.composition_end(&mut scroll, &mut surface);
    assert!(!selection.is_composing());
    assert!(scroll.cursor().is_none());

    let change = selection.set_range(&mut scroll, &mut surface, Some(Range::collapsed(2)), false, Source::User);
    assert_eq!(change.and_then(|change| change.range), Some(Range::collapsed(2)));
    assert_eq!(scroll.delta(), Delta::from_json(r#"[{"insert":"ab\n"}]"#).unwrap());
  }

  #[test]
  fn pending_range_survives_updates() {
    let mut scroll = load(json!([{ "insert": "abc\n" }]));
    let mut selection = Selection::new();
    let mut surface = HeadlessSurface::new();
    selection.set_range(&mut scroll, &mut surface, Some(Range::collapsed(2)), false, Source::Api);
    selection.before_update(&scroll, &surface);

    let (leaf, _) = scroll.leaf(0).unwrap();
    let target = scroll.native_of(leaf).unwrap();
    scroll.update(
      &[MutationRecord::CharacterData {
        target,
        old_value: "abc".into(),
        value: "Zabc".into(),
      }],
      &mut UpdateContext::default(),
    );
    let change = selection.after_update(&mut scroll, &mut surface, Source::Silent);
    assert_eq!(change, None);
    assert_eq!(selection.last_range(), Some(Range::collapsed(2)));
  }

  quickcheck::quickcheck! {
    fn ranges_survive_native_mapping(index: u8, length: u8) -> bool {
      let mut scroll = mixed();
      let max = scroll.length() - 1;
      let index = index as usize % (max + 1);
      let length = length as usize % (max - index + 1);
      let range = Range::new(index, length);
      round_trip(&mut scroll, range) == Some(range)
    }
  }
}
