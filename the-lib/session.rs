//! The public editing surface.
//!
//! A [`Session`] owns one document tree together with the [`Editor`],
//! [`Selection`] and [`History`] working on it. Every mutating call is
//! tagged with a [`Source`] and runs through [`Session::modify`], which
//! keeps the selection in place, feeds history and fans out events.

use std::sync::Arc;

use serde_json::Value;
use the_core::line_ending::normalize_line_endings;
use the_delta::{
  AttributeMap,
  Delta,
  Op,
};
use thiserror::Error;

use crate::{
  config::{
    ConfigError,
    Options,
  },
  editor::Editor,
  emitter::{
    Emitter,
    Event,
    EventKind,
    Source,
    SubscriptionId,
  },
  format::Formats,
  history::{
    self,
    History,
    HistoryJump,
  },
  node::NodeId,
  registry::RegistryError,
  scroll::{
    Scroll,
    UpdateContext,
  },
  selection::{
    Range,
    Selection,
    SelectionChange,
  },
  surface::{
    MutationRecord,
    Surface,
  },
};

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
  #[error("surface is not attached")]
  InvalidSurface,
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Registry(#[from] RegistryError),
}

/// How a modification moves the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shift {
  /// The selection is left to the modification itself.
  Untracked,
  /// Positions are mapped through the resulting change.
  ByChange,
  /// Positions after `index` move by the given amount.
  By(usize, isize),
}

pub struct Session<S: Surface> {
  scroll:    Scroll,
  editor:    Editor,
  selection: Selection,
  history:   History,
  emitter:   Emitter,
  surface:   S,
  options:   Options,
  enabled:   bool,
}

impl<S: Surface> Session<S> {
  pub fn new(surface: S, options: Options) -> Result<Self> {
    if !surface.is_attached() {
      return Err(SessionError::InvalidSurface);
    }
    options.validate()?;
    let scroll = Scroll::new(Arc::new(options.registry()?));
    let editor = Editor::new(&scroll);
    let mut session = Self {
      editor,
      scroll,
      selection: Selection::new(),
      history: History::new(options.history_config()),
      emitter: Emitter::new(),
      surface,
      enabled: true,
      options,
    };
    session.enable(!session.options.read_only);
    session.history.clear();
    Ok(session)
  }

  pub fn options(&self) -> &Options {
    &self.options
  }

  pub fn scroll(&self) -> &Scroll {
    &self.scroll
  }

  pub fn editor(&self) -> &Editor {
    &self.editor
  }

  pub fn selection(&self) -> &Selection {
    &self.selection
  }

  pub fn surface(&self) -> &S {
    &self.surface
  }

  pub fn surface_mut(&mut self) -> &mut S {
    &mut self.surface
  }

  pub fn history(&self) -> &History {
    &self.history
  }

  pub fn history_mut(&mut self) -> &mut History {
    &mut self.history
  }

  // Events.

  pub fn on(&mut self, kind: EventKind, listener: impl FnMut(&Event) + 'static) -> SubscriptionId {
    self.emitter.on(kind, listener)
  }

  pub fn once(&mut self, kind: EventKind, listener: impl FnMut(&Event) + 'static) -> SubscriptionId {
    self.emitter.once(kind, listener)
  }

  pub fn off(&mut self, id: SubscriptionId) -> bool {
    self.emitter.off(id)
  }

  // State.

  pub fn enable(&mut self, enabled: bool) {
    self.enabled = enabled;
  }

  pub fn disable(&mut self) {
    self.enable(false);
  }

  #[inline]
  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  // Modification.

  pub fn insert_text(&mut self, index: usize, text: &str, formats: &AttributeMap, source: Source) -> Delta {
    let length = normalize_line_endings(text).chars().count();
    self.modify(source, Shift::By(index, length as isize), |session| {
      session
        .editor
        .insert_text(&mut session.scroll, index, text, formats)
    })
  }

  pub fn insert_embed(&mut self, index: usize, name: &str, value: &Value, source: Source) -> Delta {
    self.modify(source, Shift::ByChange, |session| {
      session
        .editor
        .insert_embed(&mut session.scroll, index, name, value)
    })
  }

  pub fn delete_text(&mut self, index: usize, length: usize, source: Source) -> Delta {
    self.modify(source, Shift::By(index, -(length as isize)), |session| {
      session.editor.delete_text(&mut session.scroll, index, length)
    })
  }

  /// Formats the current selection.
  ///
  /// Block formats go to the selected lines. A collapsed selection parks
  /// inline formats on the cursor, where they apply to what is typed next.
  pub fn format(&mut self, name: &str, value: &Value, source: Source) -> Delta {
    self.modify(source, Shift::Untracked, |session| {
      let Some(range) = session.get_selection(true) else {
        return Delta::new();
      };
      let formats = AttributeMap::single(name, value.clone());
      let change = if session.scroll.registry().is_block_format(name) {
        session
          .editor
          .format_line(&mut session.scroll, range.index, range.length, &formats)
      } else if range.is_collapsed() {
        session
          .selection
          .format(&mut session.scroll, &mut session.surface, name, value);
        return Delta::new();
      } else {
        session
          .editor
          .format_text(&mut session.scroll, range.index, range.length, &formats)
      };
      session.set_selection(Some(range), Source::Silent);
      change
    })
  }

  pub fn format_line(&mut self, index: usize, length: usize, formats: &AttributeMap, source: Source) -> Delta {
    self.modify(source, Shift::By(index, 0), |session| {
      session
        .editor
        .format_line(&mut session.scroll, index, length, formats)
    })
  }

  pub fn format_line_with(&mut self, index: usize, length: usize, name: &str, value: &Value, source: Source) -> Delta {
    self.format_line(index, length, &AttributeMap::single(name, value.clone()), source)
  }

  pub fn format_text(&mut self, index: usize, length: usize, formats: &AttributeMap, source: Source) -> Delta {
    self.modify(source, Shift::By(index, 0), |session| {
      session
        .editor
        .format_text(&mut session.scroll, index, length, formats)
    })
  }

  pub fn format_text_with(&mut self, index: usize, length: usize, name: &str, value: &Value, source: Source) -> Delta {
    self.format_text(index, length, &AttributeMap::single(name, value.clone()), source)
  }

  pub fn remove_format(&mut self, index: usize, length: usize, source: Source) -> Delta {
    self.modify(source, Shift::ByChange, |session| {
      session
        .editor
        .remove_format(&mut session.scroll, index, length)
    })
  }

  pub fn update_contents(&mut self, change: &Delta, source: Source) -> Delta {
    self.modify(source, Shift::ByChange, |session| {
      session.editor.apply_delta(&mut session.scroll, change)
    })
  }

  /// Replaces the whole document.
  ///
  /// The reported change turns the old document into the new one.
  pub fn set_contents(&mut self, contents: &Delta, source: Source) -> Delta {
    self.modify(source, Shift::Untracked, |session| {
      let length = session.scroll.length();
      let deleted = session.editor.delete_text(&mut session.scroll, 0, length);
      let mut applied = session.editor.apply_delta(&mut session.scroll, contents);
      let newline_last = matches!(
        applied.ops().last(),
        Some(Op::Insert(insert, _)) if insert.as_text().is_some_and(|text| text.ends_with('\n'))
      );
      if newline_last {
        let length = session.scroll.length();
        session
          .editor
          .delete_text(&mut session.scroll, length.saturating_sub(1), 1);
        applied = applied.delete(1);
      }
      deleted.compose(&applied)
    })
  }

  pub fn set_text(&mut self, text: &str, source: Source) -> Delta {
    self.set_contents(&Delta::new().insert(text, AttributeMap::new()), source)
  }

  // Queries.

  pub fn get_contents(&self, index: usize, length: usize) -> Delta {
    self.editor.get_contents(index, length)
  }

  pub fn get_text(&self, index: usize, length: usize) -> String {
    self.editor.get_text(index, length)
  }

  pub fn get_html(&self, index: usize, length: usize) -> String {
    self.editor.get_html(&self.scroll, index, length)
  }

  pub fn get_format(&self, index: usize, length: usize) -> Formats {
    self.editor.get_format(&self.scroll, index, length)
  }

  pub fn get_length(&self) -> usize {
    self.scroll.length()
  }

  pub fn get_line(&self, index: usize) -> Option<(NodeId, usize)> {
    self.scroll.line(index)
  }

  pub fn get_lines(&self, index: usize, length: usize) -> Vec<NodeId> {
    self.scroll.lines(index, length)
  }

  pub fn get_leaf(&self, index: usize) -> Option<(NodeId, usize)> {
    self.scroll.leaf(index)
  }

  pub fn get_index(&self, node: NodeId) -> usize {
    self.scroll.offset(node)
  }

  pub fn is_blank(&self) -> bool {
    self.editor.is_blank(&self.scroll)
  }

  // Selection.

  pub fn get_selection(&mut self, focus: bool) -> Option<Range> {
    if focus {
      self.focus();
    }
    self.update(Source::User);
    self.selection.get_range(&self.scroll, &self.surface).0
  }

  pub fn set_selection(&mut self, range: Option<Range>, source: Source) {
    let moved = self
      .selection
      .set_range(&mut self.scroll, &mut self.surface, range, false, source);
    self.emit_selection(moved);
  }

  pub fn focus(&mut self) {
    let moved = self.selection.focus(&mut self.scroll, &mut self.surface);
    self.emit_selection(moved);
  }

  pub fn blur(&mut self) {
    self.set_selection(None, Source::Api);
  }

  pub fn has_focus(&self) -> bool {
    self.selection.has_focus(&self.surface)
  }

  // History.

  pub fn undo(&mut self) -> Delta {
    let jump = self.history.undo();
    self.jump(jump)
  }

  pub fn redo(&mut self) -> Delta {
    let jump = self.history.redo();
    self.jump(jump)
  }

  fn jump(&mut self, jump: Option<HistoryJump>) -> Delta {
    let Some(jump) = jump else {
      return Delta::new();
    };
    self.history.apply_jump(&jump);
    self.history.set_ignore_change(true);
    let change = self.update_contents(&jump.change, Source::User);
    self.history.set_ignore_change(false);
    let index = history::last_change_index(self.scroll.registry(), &jump.change);
    self.set_selection(Some(Range::collapsed(index)), Source::Api);
    change
  }

  // Reconciliation.

  /// Brings the document up to date with what the surface reports.
  pub fn handle_mutations(&mut self, records: &[MutationRecord], source: Source) -> Delta {
    self.emitter.emit(&Event::ScrollBeforeUpdate { source });
    self.selection.before_update(&self.scroll, &self.surface);
    let old = self.editor.delta().clone();

    let mut context = UpdateContext {
      composing: self.selection.is_composing(),
      selection: self.surface.native_range(),
      range:     None,
    };
    let Some(mutations) = self.scroll.update(records, &mut context) else {
      return Delta::new();
    };
    self.emitter.emit(&Event::ScrollUpdate { source, mutations });
    if let Some(range) = context.range {
      self
        .selection
        .set_native_range(&self.scroll, &mut self.surface, Some(range), false);
    }

    let cursor = self
      .selection
      .last_range()
      .filter(Range::is_collapsed)
      .map(|range| range.index);
    let change = self.editor.update(&self.scroll, None, records, cursor);

    let selection_source = if records.is_empty() { source } else { Source::Silent };
    let moved = self
      .selection
      .after_update(&mut self.scroll, &mut self.surface, selection_source);
    self.emit_selection(moved);
    self.settle(&change, &old, source);
    change
  }

  /// Re-reads the native selection.
  pub fn update(&mut self, source: Source) {
    let moved = self.selection.update(&mut self.scroll, &mut self.surface, source);
    self.emit_selection(moved);
  }

  fn modify(&mut self, source: Source, shift: Shift, modifier: impl FnOnce(&mut Self) -> Delta) -> Delta {
    if !self.enabled && source == Source::User {
      tracing::debug!("ignoring user change of a disabled session");
      return Delta::new();
    }
    let range = match shift {
      Shift::Untracked => None,
      _ => self.selection.get_range(&self.scroll, &self.surface).0,
    };
    let old = self.editor.delta().clone();
    let change = modifier(self);

    if let Some(range) = range {
      let range = match shift {
        Shift::ByChange => shift_by_change(range, &change, source),
        Shift::By(index, length) => shift_by(range, index, length, source),
        Shift::Untracked => range,
      };
      self.set_selection(Some(range), Source::Silent);
    }
    self.settle(&change, &old, source);
    change
  }

  fn settle(&mut self, change: &Delta, old: &Delta, source: Source) {
    if !change.is_empty() {
      self
        .history
        .on_text_change(change, old, source, self.editor.delta());
      self.emitter.emit(&Event::TextChange {
        delta: change.clone(),
        old_delta: old.clone(),
        source,
      });
    }
    let mutations = self.scroll.take_optimized();
    if !mutations.is_empty() {
      self.emitter.emit(&Event::ScrollOptimize { mutations });
    }
  }

  fn emit_selection(&mut self, moved: Option<SelectionChange>) {
    if let Some(SelectionChange {
      range,
      old_range,
      source,
    }) = moved
    {
      self.emitter.emit(&Event::SelectionChange {
        range,
        old_range,
        source,
      });
    }
  }
}

fn shift_by_change(range: Range, change: &Delta, source: Source) -> Range {
  let priority = source != Source::User;
  let start = change.transform_position(range.index, priority);
  let end = change.transform_position(range.end(), priority);
  Range::new(start, end.saturating_sub(start))
}

fn shift_by(range: Range, index: usize, length: isize, source: Source) -> Range {
  let shift = |pos: usize| {
    if pos < index || (pos == index && source == Source::User) {
      pos
    } else if length >= 0 {
      pos + length as usize
    } else {
      pos.saturating_sub(length.unsigned_abs()).max(index)
    }
  };
  let start = shift(range.index);
  let end = shift(range.end());
  Range::new(start, end.saturating_sub(start))
}
