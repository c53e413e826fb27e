//! The reconciliation engine.
//!
//! [`Editor`] keeps the canonical [`Delta`] of a [`Scroll`] and turns index
//! based edit intents into tree mutations. Every edit ends in
//! [`Editor::update`], which decides what change actually happened: the
//! caller's stated change when it composes onto the previous document to
//! exactly the tree's content, and a full diff otherwise. The tree is always
//! trusted over the stated intent.

use std::time::Instant;

use the_core::{
  chars::{
    str_is_printable_ascii,
    strip_cursor_marker,
  },
  line_ending::normalize_line_endings,
};
use the_delta::{
  AttributeMap,
  Delta,
  Insert,
  Op,
};

use crate::{
  format::{
    self,
    Formats,
  },
  html,
  node::{
    NodeId,
    NodeKind,
  },
  scroll::{
    Insertion,
    Scroll,
  },
  surface::MutationRecord,
};

#[derive(Debug, Clone)]
pub struct Editor {
  delta: Delta,
}

impl Editor {
  pub fn new(scroll: &Scroll) -> Self {
    Self {
      delta: scroll.delta(),
    }
  }

  /// The canonical change as of the last update.
  #[inline]
  pub fn delta(&self) -> &Delta {
    &self.delta
  }

  /// Applies a change to the tree in one batch.
  ///
  /// Inserts and attributes are applied first, left to right. Deletes
  /// follow in a second pass, addressed in the coordinates of the first.
  pub fn apply_delta(&mut self, scroll: &mut Scroll, change: &Delta) -> Delta {
    let start = tracing::enabled!(tracing::Level::DEBUG).then(Instant::now);
    let mut consume_newline = false;
    scroll.optimize();
    let mut scroll_length = scroll.length();
    scroll.batch_start();
    let normalized = normalize_delta(change);

    let mut index = 0;
    for op in normalized.iter() {
      let length = op.len();
      let attributes = match op {
        Op::Insert(Insert::Text(text), attributes) => {
          let mut text = text.as_str();
          if consume_newline && let Some(stripped) = text.strip_suffix('\n') {
            consume_newline = false;
            text = stripped;
          }
          if index >= scroll_length && !text.ends_with('\n') {
            consume_newline = true;
          }
          scroll.insert_at(index, Insertion::Text(text));
          scroll_length += length;
          AttributeMap::diff(&bubbled_formats(scroll, index), attributes)
        },
        Op::Insert(insert, attributes) => {
          let Some((name, value)) = insert.embed_kind() else {
            continue;
          };
          scroll.insert_at(index, Insertion::Embed(name, value));
          scroll_length += length;
          attributes.clone()
        },
        Op::Retain(_, attributes) => attributes.clone(),
        Op::Delete(_) => AttributeMap::new(),
      };
      for (name, value) in &attributes {
        scroll.format_at(index, length, name, value);
      }
      index += length;
    }

    let mut index = 0;
    for op in normalized.iter() {
      match op {
        Op::Delete(length) => scroll.delete_at(index, *length),
        Op::Insert(insert, _) if insert.as_text().is_none() && insert.embed_kind().is_none() => {},
        op => index += op.len(),
      }
    }

    scroll.batch_end();
    scroll.optimize();
    if let Some(start) = start {
      tracing::debug!(
        "applied change of {} ops in {}s",
        normalized.ops().len(),
        start.elapsed().as_secs_f64()
      );
    }
    self.update(scroll, Some(normalized), &[], None)
  }

  pub fn delete_text(&mut self, scroll: &mut Scroll, index: usize, length: usize) -> Delta {
    scroll.delete_at(index, length);
    self.update(scroll, Some(Delta::new().retain(index).delete(length)), &[], None)
  }

  /// Applies block formats to every line overlapping the span. An empty
  /// span still reaches the line it sits in.
  pub fn format_line(&mut self, scroll: &mut Scroll, index: usize, length: usize, formats: &AttributeMap) -> Delta {
    scroll.optimize();
    for (name, value) in formats {
      for line in scroll.lines(index, length.max(1)) {
        scroll.format_line_node(line, name, value);
      }
    }
    scroll.optimize();
    let change = Delta::new()
      .retain(index)
      .retain_with(length, formats.clone());
    self.update(scroll, Some(change), &[], None)
  }

  pub fn format_text(&mut self, scroll: &mut Scroll, index: usize, length: usize, formats: &AttributeMap) -> Delta {
    for (name, value) in formats {
      scroll.format_at(index, length, name, value);
    }
    let change = Delta::new()
      .retain(index)
      .retain_with(length, formats.clone());
    self.update(scroll, Some(change), &[], None)
  }

  pub fn insert_text(&mut self, scroll: &mut Scroll, index: usize, text: &str, formats: &AttributeMap) -> Delta {
    let text = normalize_line_endings(text);
    scroll.insert_at(index, Insertion::Text(&text));
    let length = text.chars().count();
    for (name, value) in formats {
      scroll.format_at(index, length, name, value);
    }
    let change = Delta::new().retain(index).insert(&text, formats.clone());
    self.update(scroll, Some(change), &[], None)
  }

  pub fn insert_embed(&mut self, scroll: &mut Scroll, index: usize, name: &str, value: &serde_json::Value) -> Delta {
    scroll.insert_at(index, Insertion::Embed(name, value));
    let change = Delta::new()
      .retain(index)
      .insert_embed(name, value.clone(), AttributeMap::new());
    self.update(scroll, Some(change), &[], None)
  }

  /// Strips inline formats from the span and block formats from the lines
  /// it touches. The rest of the last line keeps its inline formats.
  ///
  /// A span reaching the end of the document covers the final newline,
  /// which then only loses its formats.
  pub fn remove_format(&mut self, scroll: &mut Scroll, index: usize, length: usize) -> Delta {
    let index = index.min(scroll.length());
    let length = length.min(scroll.length() - index);
    let text = self.get_text(index, length);
    let mut suffix_length = 0;
    let mut suffix = Delta::new();
    if index + length < scroll.length()
      && let Some((line, offset)) = scroll.line(index + length)
    {
      suffix_length = scroll.node_len(line) - offset;
      suffix = scroll
        .line_delta(line)
        .slice(offset, offset + suffix_length - 1)
        .insert("\n", AttributeMap::new());
    }
    let contents = self.get_contents(index, length + suffix_length);
    let target = Delta::new().insert(&text, AttributeMap::new()).concat(&suffix);
    let diff = match contents.diff(&target, None) {
      Ok(diff) => diff,
      Err(err) => {
        tracing::warn!("cannot remove formats: {err}");
        return Delta::new();
      },
    };
    let change = Delta::new().retain(index).concat(&diff);
    self.apply_delta(scroll, &change)
  }

  pub fn get_contents(&self, index: usize, length: usize) -> Delta {
    self.delta.slice(index, index.saturating_add(length))
  }

  /// Text of the span; embeds are left out.
  pub fn get_text(&self, index: usize, length: usize) -> String {
    self
      .get_contents(index, length)
      .iter()
      .filter_map(|op| match op {
        Op::Insert(insert, _) => insert.as_text(),
        _ => None,
      })
      .collect()
  }

  /// Formats common to the span.
  ///
  /// Line and leaf formats are folded separately: a name survives only when
  /// every node of its kind carries it. An empty span reports the line and
  /// the leaf at `index`.
  pub fn get_format(&self, scroll: &Scroll, index: usize, length: usize) -> Formats {
    let (lines, leaves) = if length == 0 {
      let path = scroll.path(index);
      let is = |pred: fn(&NodeKind) -> bool| {
        path
          .iter()
          .map(|&(node, _)| node)
          .filter(|&node| scroll.kind(node).is_some_and(pred))
          .collect::<Vec<_>>()
      };
      (is(NodeKind::is_line), is(NodeKind::is_leaf))
    } else {
      (
        scroll.lines(index, length),
        scroll.descendants(NodeKind::is_leaf, index, length),
      )
    };

    let mut formats = fold_formats(scroll, &lines);
    formats.extend(fold_formats(scroll, &leaves));
    formats
  }

  pub fn get_html(&self, scroll: &Scroll, index: usize, length: usize) -> String {
    html::html(scroll, index, length)
  }

  /// Whether the document is a single empty plain line.
  pub fn is_blank(&self, scroll: &Scroll) -> bool {
    let [line] = scroll.children(scroll.root()) else {
      return scroll.children(scroll.root()).is_empty();
    };
    let Some(NodeKind::Block { formats }) = scroll.kind(*line) else {
      return false;
    };
    if formats
      .keys()
      .any(|name| scroll.registry().query(name).is_some_and(|def| def.exclusive))
    {
      return false;
    }
    matches!(
      scroll.children(*line),
      [head] if matches!(scroll.kind(*head), Some(NodeKind::Break))
    )
  }

  /// Settles what changed since the last update.
  ///
  /// A single printable ASCII edit of one text leaf is diffed locally.
  /// Anything else re-reads the tree and keeps `change` only if it explains
  /// the new content, diffing the documents with the `cursor` hint
  /// otherwise.
  pub fn update(
    &mut self,
    scroll: &Scroll,
    change: Option<Delta>,
    records: &[MutationRecord],
    cursor: Option<usize>,
  ) -> Delta {
    let old = std::mem::take(&mut self.delta);

    if let [MutationRecord::CharacterData { target, old_value, .. }] = records
      && let Some(leaf) = scroll.find(*target, false)
      && let Some(NodeKind::Text { text, formats }) = scroll.kind(leaf)
      && str_is_printable_ascii(text)
    {
      let index = scroll.offset(leaf);
      let before = Delta::new().insert(&strip_cursor_marker(old_value), AttributeMap::new());
      let after = Delta::new().insert(text, AttributeMap::new());
      let local = cursor.map(|cursor| cursor.saturating_sub(index));
      if let Ok(diff) = before.diff(&after, local) {
        tracing::trace!("character update at {index}");
        let mut change = Delta::new().retain(index);
        for op in diff.into_ops() {
          match op {
            Op::Insert(insert, _) => change = change.insert_value(insert, formats.clone()),
            op => change.push(op),
          }
        }
        self.delta = old.compose(&change);
        return change;
      }
    }

    self.delta = scroll.delta();
    if let Some(change) = change {
      if old.compose(&change) == self.delta {
        return change;
      }
      tracing::debug!(
        "tree diverged from the stated change ({} -> {} chars), diffing",
        old.length(),
        self.delta.length()
      );
    }
    old.diff(&self.delta, cursor).unwrap_or_else(|err| {
      tracing::warn!("cannot diff documents: {err}");
      Delta::new()
    })
  }
}

/// Folds `\r\n` and `\r` inside text inserts to `\n`.
pub fn normalize_delta(change: &Delta) -> Delta {
  let mut normalized = Delta::with_capacity(change.ops().len());
  for op in change.iter() {
    match op {
      Op::Insert(Insert::Text(text), attributes) => {
        normalized = normalized.insert(&normalize_line_endings(text), attributes.clone());
      },
      op => normalized.push(op.clone()),
    }
  }
  normalized
}

fn fold_formats(scroll: &Scroll, nodes: &[NodeId]) -> Formats {
  let maps: Vec<AttributeMap> = nodes.iter().map(|&node| scroll.bubbled_formats(node)).collect();
  format::fold(maps.iter())
}

/// Formats already in effect at `index`: the line's, plus the leaf's when
/// the line holds leaves.
fn bubbled_formats(scroll: &Scroll, index: usize) -> AttributeMap {
  let Some((line, offset)) = scroll.line(index) else {
    return AttributeMap::new();
  };
  let mut formats = scroll.bubbled_formats(line);
  if matches!(scroll.kind(line), Some(NodeKind::Block { .. }))
    && let Some((leaf, _)) = scroll.descendant_in(line, &NodeKind::is_leaf, offset)
  {
    formats.extend_from(&scroll.bubbled_formats(leaf));
  }
  formats
}
