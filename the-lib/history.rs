use std::{
  collections::VecDeque,
  time::{
    Duration,
    Instant,
  },
};

use the_delta::{
  Delta,
  Insert,
  Op,
};

use crate::{
  emitter::Source,
  registry::Registry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
  /// Changes recorded within this window of the entry's first change are
  /// merged into it.
  pub delay:     Duration,
  pub max_stack: usize,
  /// Record only user changes; others only transform the stacks.
  pub user_only: bool,
}

impl Default for HistoryConfig {
  fn default() -> Self {
    Self {
      delay:     Duration::from_millis(1000),
      max_stack: 100,
      user_only: false,
    }
  }
}

/// One undoable step: the change that made it and the change reverting it.
#[derive(Debug, Clone, PartialEq)]
pub struct StackItem {
  pub undo: Delta,
  pub redo: Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Undo,
  Redo,
}

/// A pending move through history that has not been applied yet.
///
/// The caller applies `change` to the document with recording suppressed,
/// then calls [`History::apply_jump`]. History state only changes once the
/// change has landed.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryJump {
  pub change:    Delta,
  pub direction: Direction,
}

/// Undo and redo stacks of changes.
///
/// Unlike a revision tree, entries hold changes relative to the current
/// document. Changes made outside of the recorded path are folded into
/// every entry by [`History::transform`], so stacked entries stay valid.
#[derive(Debug, Clone)]
pub struct History {
  config:        HistoryConfig,
  undo:          VecDeque<StackItem>,
  redo:          VecDeque<StackItem>,
  /// Start of the entry currently open for merging.
  last_recorded: Option<Instant>,
  ignore_change: bool,
}

impl Default for History {
  fn default() -> Self {
    Self::new(HistoryConfig::default())
  }
}

impl History {
  pub fn new(config: HistoryConfig) -> Self {
    Self {
      config,
      undo: VecDeque::new(),
      redo: VecDeque::new(),
      last_recorded: None,
      ignore_change: false,
    }
  }

  #[inline]
  pub fn config(&self) -> &HistoryConfig {
    &self.config
  }

  pub fn undo_stack(&self) -> &VecDeque<StackItem> {
    &self.undo
  }

  pub fn redo_stack(&self) -> &VecDeque<StackItem> {
    &self.redo
  }

  pub fn can_undo(&self) -> bool {
    !self.undo.is_empty()
  }

  pub fn can_redo(&self) -> bool {
    !self.redo.is_empty()
  }

  pub fn clear(&mut self) {
    self.undo.clear();
    self.redo.clear();
  }

  /// Closes the open entry; the next change starts a new one.
  pub fn cutoff(&mut self) {
    self.last_recorded = None;
  }

  /// Suppresses [`History::on_text_change`] while a jump is being applied.
  pub fn set_ignore_change(&mut self, ignore: bool) {
    self.ignore_change = ignore;
  }

  #[inline]
  pub fn is_ignoring(&self) -> bool {
    self.ignore_change
  }

  /// Reacts to a text change of the document now holding `current`.
  pub fn on_text_change(&mut self, change: &Delta, old: &Delta, source: Source, current: &Delta) {
    if self.ignore_change {
      return;
    }
    if !self.config.user_only || source == Source::User {
      self.record(change, old, current);
    } else {
      self.transform(change);
    }
  }

  pub fn record(&mut self, change: &Delta, old: &Delta, current: &Delta) {
    self.record_at(change, old, current, Instant::now());
  }

  /// Records `change`, which turned `old` into `current`, at `now`.
  pub fn record_at(&mut self, change: &Delta, old: &Delta, current: &Delta, now: Instant) {
    if change.is_empty() {
      return;
    }
    self.redo.clear();
    let mut item = match current.diff(old, None) {
      Ok(undo) => StackItem {
        undo,
        redo: change.clone(),
      },
      Err(err) => {
        tracing::warn!("cannot record change: {err}");
        return;
      },
    };

    let open = self
      .last_recorded
      .is_some_and(|last| now.saturating_duration_since(last) < self.config.delay);
    if open && let Some(prev) = self.undo.pop_back() {
      item.undo = item.undo.compose(&prev.undo);
      item.redo = prev.redo.compose(&item.redo);
      tracing::trace!("merged change into the open entry");
    } else {
      self.last_recorded = Some(now);
    }

    self.undo.push_back(item);
    if self.undo.len() > self.config.max_stack {
      self.undo.pop_front();
      tracing::trace!("evicted the oldest entry");
    }
  }

  /// Rebases every entry over a change made outside of history. Stacked
  /// changes are considered to have happened first.
  pub fn transform(&mut self, external: &Delta) {
    for item in self.undo.iter_mut().chain(self.redo.iter_mut()) {
      item.undo = external.transform(&item.undo, true);
      item.redo = external.transform(&item.redo, true);
    }
  }

  pub fn undo(&self) -> Option<HistoryJump> {
    self.undo.back().map(|item| HistoryJump {
      change:    item.undo.clone(),
      direction: Direction::Undo,
    })
  }

  pub fn redo(&self) -> Option<HistoryJump> {
    self.redo.back().map(|item| HistoryJump {
      change:    item.redo.clone(),
      direction: Direction::Redo,
    })
  }

  /// Moves the jumped-over entry to the opposite stack.
  pub fn apply_jump(&mut self, jump: &HistoryJump) {
    let (from, to) = match jump.direction {
      Direction::Undo => (&mut self.undo, &mut self.redo),
      Direction::Redo => (&mut self.redo, &mut self.undo),
    };
    if let Some(item) = from.pop_back() {
      to.push_back(item);
    }
    self.last_recorded = None;
  }
}

/// Where the caret goes after a history jump applied `change`.
pub fn last_change_index(registry: &Registry, change: &Delta) -> usize {
  let index = change.length();
  if ends_with_newline_change(registry, change) {
    index.saturating_sub(1)
  } else {
    index
  }
}

fn ends_with_newline_change(registry: &Registry, change: &Delta) -> bool {
  match change.ops().last() {
    Some(Op::Insert(Insert::Text(text), _)) => text.ends_with('\n'),
    Some(Op::Insert(..)) | Some(Op::Delete(_)) | None => false,
    Some(Op::Retain(_, attributes)) => attributes.keys().any(|name| registry.is_block_format(name)),
  }
}
