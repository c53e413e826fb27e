//! Synchronous event fan-out for a [`Session`](crate::session::Session).

use std::{
  collections::BTreeMap,
  fmt,
};

use serde::{
  Deserialize,
  Serialize,
};
use the_delta::Delta;

use crate::{
  node::Mutation,
  selection::Range,
};

/// Provenance of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
  #[default]
  Api,
  User,
  /// Suppresses external notification, never internal bookkeeping.
  Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  /// Text and selection changes of every source.
  EditorChange,
  TextChange,
  SelectionChange,
  ScrollBeforeUpdate,
  ScrollUpdate,
  ScrollOptimize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  TextChange {
    delta:     Delta,
    old_delta: Delta,
    source:    Source,
  },
  SelectionChange {
    range:     Option<Range>,
    old_range: Option<Range>,
    source:    Source,
  },
  ScrollBeforeUpdate { source: Source },
  ScrollUpdate {
    source:    Source,
    mutations: Vec<Mutation>,
  },
  ScrollOptimize { mutations: Vec<Mutation> },
}

impl Event {
  pub fn kind(&self) -> EventKind {
    match self {
      Event::TextChange { .. } => EventKind::TextChange,
      Event::SelectionChange { .. } => EventKind::SelectionChange,
      Event::ScrollBeforeUpdate { .. } => EventKind::ScrollBeforeUpdate,
      Event::ScrollUpdate { .. } => EventKind::ScrollUpdate,
      Event::ScrollOptimize { .. } => EventKind::ScrollOptimize,
    }
  }

  pub fn source(&self) -> Option<Source> {
    match self {
      Event::TextChange { source, .. }
      | Event::SelectionChange { source, .. }
      | Event::ScrollBeforeUpdate { source }
      | Event::ScrollUpdate { source, .. } => Some(*source),
      Event::ScrollOptimize { .. } => None,
    }
  }

  /// Whether `EditorChange` subscribers see this event.
  fn is_editor_change(&self) -> bool {
    matches!(self, Event::TextChange { .. } | Event::SelectionChange { .. })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

pub type Callback = Box<dyn FnMut(&Event)>;

struct Listener {
  kind:     EventKind,
  once:     bool,
  callback: Callback,
}

#[derive(Default)]
pub struct Emitter {
  listeners: BTreeMap<SubscriptionId, Listener>,
  next_id:   u64,
}

impl fmt::Debug for Emitter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Emitter")
      .field("listeners", &self.listeners.len())
      .finish()
  }
}

impl Emitter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn on(&mut self, kind: EventKind, callback: impl FnMut(&Event) + 'static) -> SubscriptionId {
    self.subscribe(kind, false, Box::new(callback))
  }

  /// Subscribes for the first matching event only.
  pub fn once(&mut self, kind: EventKind, callback: impl FnMut(&Event) + 'static) -> SubscriptionId {
    self.subscribe(kind, true, Box::new(callback))
  }

  fn subscribe(&mut self, kind: EventKind, once: bool, callback: Callback) -> SubscriptionId {
    let id = SubscriptionId(self.next_id);
    self.next_id += 1;
    self.listeners.insert(id, Listener {
      kind,
      once,
      callback,
    });
    id
  }

  /// Returns whether the subscription existed.
  pub fn off(&mut self, id: SubscriptionId) -> bool {
    self.listeners.remove(&id).is_some()
  }

  pub fn len(&self) -> usize {
    self.listeners.len()
  }

  pub fn is_empty(&self) -> bool {
    self.listeners.is_empty()
  }

  /// Calls every matching listener in subscription order.
  pub fn emit(&mut self, event: &Event) {
    let silent = event.source() == Some(Source::Silent);
    let mut fired = Vec::new();
    for (&id, listener) in &mut self.listeners {
      let matches = if listener.kind == EventKind::EditorChange {
        event.is_editor_change()
      } else {
        listener.kind == event.kind() && !(silent && event.is_editor_change())
      };
      if !matches {
        continue;
      }
      (listener.callback)(event);
      if listener.once {
        fired.push(id);
      }
    }
    tracing::trace!(kind = ?event.kind(), "emitted");
    for id in fired {
      self.listeners.remove(&id);
    }
  }
}

#[cfg(test)]
mod test {
  use std::{
    cell::RefCell,
    rc::Rc,
  };

  use super::*;

  fn text_change(source: Source) -> Event {
    Event::TextChange {
      delta: Delta::new().retain(1),
      old_delta: Delta::new(),
      source,
    }
  }

  fn recorder() -> (Rc<RefCell<Vec<EventKind>>>, impl FnMut(&Event) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    (seen, move |event: &Event| sink.borrow_mut().push(event.kind()))
  }

  #[test]
  fn once_fires_a_single_time() {
    let mut emitter = Emitter::new();
    let (seen, callback) = recorder();
    emitter.once(EventKind::TextChange, callback);
    emitter.emit(&text_change(Source::Api));
    emitter.emit(&text_change(Source::Api));
    assert_eq!(seen.borrow().len(), 1);
    assert!(emitter.is_empty());
  }

  #[test]
  fn off_unsubscribes() {
    let mut emitter = Emitter::new();
    let (seen, callback) = recorder();
    let id = emitter.on(EventKind::TextChange, callback);
    assert!(emitter.off(id));
    assert!(!emitter.off(id));
    emitter.emit(&text_change(Source::User));
    assert!(seen.borrow().is_empty());
  }

  #[test]
  fn silent_reaches_editor_change_only() {
    let mut emitter = Emitter::new();
    let (all, callback) = recorder();
    emitter.on(EventKind::EditorChange, callback);
    let (text, callback) = recorder();
    emitter.on(EventKind::TextChange, callback);

    emitter.emit(&text_change(Source::Silent));
    emitter.emit(&text_change(Source::User));
    emitter.emit(&Event::ScrollOptimize { mutations: Vec::new() });
    assert_eq!(*all.borrow(), [EventKind::TextChange, EventKind::TextChange]);
    assert_eq!(*text.borrow(), [EventKind::TextChange]);
  }

  #[test]
  fn listeners_run_in_subscription_order() {
    let mut emitter = Emitter::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    for n in 0..3 {
      let order = Rc::clone(&order);
      emitter.on(EventKind::ScrollOptimize, move |_| order.borrow_mut().push(n));
    }
    emitter.emit(&Event::ScrollOptimize { mutations: Vec::new() });
    assert_eq!(*order.borrow(), [0, 1, 2]);
  }
}
