//! The document tree.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; the tree is laid
//! out as Root → (Container →) line → leaf, and every position of the
//! document is a contiguous char offset over it. A [`Block`] line counts one
//! extra position for its implicit newline.
//!
//! Mutations (`insert_at`, `delete_at`, `format_at`) leave the tree in a
//! possibly unnormalized state (empty text leaves, stray breaks, list items
//! outside their container) which [`Scroll::optimize`] fixes. While a batch
//! is open, normalization is postponed to [`Scroll::batch_end`].
//!
//! Every node also owns a [`NativeNode`] handle so the presentation surface
//! and the selection mapper can talk about it; the tree answers the native
//! structure queries (`native_children`, `native_text_len`, ...) itself.
//!
//! [`Block`]: NodeKind::Block

use std::{
  collections::HashMap,
  sync::Arc,
};

use serde_json::Value;
use slotmap::HopSlotMap;
use smallvec::SmallVec;
use the_core::chars::{
  char_to_byte_idx,
  strip_cursor_marker,
};
use the_delta::{
  AttributeMap,
  Delta,
  attributes::value_is_set,
};

use crate::{
  node::{
    Mutation,
    MutationKind,
    Node,
    NodeId,
    NodeKind,
  },
  registry::Registry,
  surface::{
    MutationRecord,
    NativeAnchor,
    NativeNode,
    NativeRange,
  },
};

/// Content handed to [`Scroll::insert_at`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Insertion<'a> {
  Text(&'a str),
  /// Embed kind and its value.
  Embed(&'a str, &'a Value),
}

/// State shared between [`Scroll::update`] and its caller.
#[derive(Debug, Default, Clone)]
pub struct UpdateContext {
  /// An input method composition is in progress.
  pub composing: bool,
  /// The native selection at the time the records were taken.
  pub selection: Option<NativeRange>,
  /// Set when a parked cursor was restored; the caret belongs here.
  pub range:     Option<NativeRange>,
}

/// Children overlapping a span: node, offset into it, overlap length.
pub type Spans = SmallVec<[(NodeId, usize, usize); 8]>;

#[derive(Debug, Clone)]
pub struct Scroll {
  registry:    Arc<Registry>,
  nodes:       HopSlotMap<NodeId, Node>,
  root:        NodeId,
  natives:     HashMap<NativeNode, NodeId>,
  // inner text handles of cursors
  inner:       HashMap<NativeNode, NodeId>,
  next_native: u64,
  batch:       bool,
  cursor:      Option<NodeId>,
  optimized:   Vec<Mutation>,
}

impl Scroll {
  pub fn new(registry: Arc<Registry>) -> Self {
    let mut nodes = HopSlotMap::with_key();
    let native = NativeNode(0);
    let root = nodes.insert(Node {
      parent: None,
      children: Vec::new(),
      native,
      kind: NodeKind::Root,
    });
    let mut scroll = Self {
      registry,
      nodes,
      root,
      natives: HashMap::from([(native, root)]),
      inner: HashMap::new(),
      next_native: 1,
      batch: false,
      cursor: None,
      optimized: Vec::new(),
    };
    scroll.optimize();
    scroll.optimized.clear();
    scroll
  }

  #[inline]
  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  #[inline]
  pub fn root(&self) -> NodeId {
    self.root
  }

  #[inline]
  pub fn node(&self, id: NodeId) -> Option<&Node> {
    self.nodes.get(id)
  }

  #[inline]
  pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
    self.nodes.get(id).map(Node::kind)
  }

  #[inline]
  pub fn contains(&self, id: NodeId) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    self.nodes.get(id).map_or(&[], |node| node.children.as_slice())
  }

  pub fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.nodes.get(id).and_then(Node::parent)
  }

  /// The currently parked cursor, if any.
  #[inline]
  pub fn cursor(&self) -> Option<NodeId> {
    self.cursor
  }

  /// Native handle of the parked cursor's text.
  pub fn cursor_inner(&self) -> Option<NativeNode> {
    match self.cursor.and_then(|id| self.kind(id)) {
      Some(NodeKind::Cursor { inner, .. }) => Some(*inner),
      _ => None,
    }
  }

  #[inline]
  pub fn is_batching(&self) -> bool {
    self.batch
  }

  /// Length of the whole document.
  #[inline]
  pub fn length(&self) -> usize {
    self.node_len(self.root)
  }

  pub fn node_len(&self, id: NodeId) -> usize {
    let Some(node) = self.nodes.get(id) else {
      return 0;
    };
    if let Some(len) = node.kind.intrinsic_len() {
      return len;
    }
    let children: usize = node.children.iter().map(|&child| self.node_len(child)).sum();
    match node.kind {
      NodeKind::Block { .. } => children + 1,
      _ => children,
    }
  }

  /// Absolute document index of a node.
  pub fn offset(&self, id: NodeId) -> usize {
    let mut offset = 0;
    let mut current = id;
    while let Some(parent) = self.parent(current) {
      for &sibling in self.children(parent) {
        if sibling == current {
          break;
        }
        offset += self.node_len(sibling);
      }
      current = parent;
    }
    offset
  }

  pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
    let parent = self.parent(id)?;
    self.children(parent).iter().position(|&child| child == id)
  }

  pub fn prev(&self, id: NodeId) -> Option<NodeId> {
    let parent = self.parent(id)?;
    let index = self.index_in_parent(id)?;
    index
      .checked_sub(1)
      .and_then(|index| self.children(parent).get(index).copied())
  }

  pub fn next(&self, id: NodeId) -> Option<NodeId> {
    let parent = self.parent(id)?;
    let index = self.index_in_parent(id)?;
    self.children(parent).get(index + 1).copied()
  }

  fn alloc_native(&mut self) -> NativeNode {
    let native = NativeNode(self.next_native);
    self.next_native += 1;
    native
  }

  fn alloc(&mut self, kind: NodeKind) -> NodeId {
    let native = self.alloc_native();
    let inner = match &kind {
      NodeKind::Cursor { inner, .. } => Some(*inner),
      _ => None,
    };
    let id = self.nodes.insert(Node {
      parent: None,
      children: Vec::new(),
      native,
      kind,
    });
    self.natives.insert(native, id);
    if let Some(inner) = inner {
      self.inner.insert(inner, id);
    }
    id
  }

  fn default_block(&mut self) -> NodeId {
    self.alloc(NodeKind::block(AttributeMap::new()))
  }

  fn detach(&mut self, id: NodeId) {
    let Some(parent) = self.parent(id) else {
      return;
    };
    if let Some(node) = self.nodes.get_mut(parent) {
      node.children.retain(|&child| child != id);
    }
    if let Some(node) = self.nodes.get_mut(id) {
      node.parent = None;
    }
  }

  /// Moves `child` under `parent`, before `before` or at the end.
  fn insert_before(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
    self.detach(child);
    let position = before.and_then(|before| {
      self
        .children(parent)
        .iter()
        .position(|&sibling| sibling == before)
    });
    let Some(node) = self.nodes.get_mut(parent) else {
      return;
    };
    match position {
      Some(position) => node.children.insert(position, child),
      None => node.children.push(child),
    }
    if let Some(node) = self.nodes.get_mut(child) {
      node.parent = Some(parent);
    }
  }

  #[inline]
  fn append(&mut self, parent: NodeId, child: NodeId) {
    self.insert_before(parent, child, None);
  }

  /// Removes a node and its subtree. The root is never removed.
  pub fn remove(&mut self, id: NodeId) {
    if id == self.root {
      return;
    }
    self.detach(id);
    let mut stack = vec![id];
    while let Some(id) = stack.pop() {
      let Some(node) = self.nodes.remove(id) else {
        continue;
      };
      self.natives.remove(&node.native);
      if let NodeKind::Cursor { inner, .. } = node.kind {
        self.inner.remove(&inner);
      }
      if self.cursor == Some(id) {
        self.cursor = None;
      }
      stack.extend(node.children);
    }
  }

  /// Constructs a detached node from the registry. `None` for unknown kinds.
  pub fn create(&mut self, kind: &str, value: Option<&Value>) -> Option<NodeId> {
    let node = match kind {
      "block" => {
        let formats = match value {
          Some(Value::Object(map)) => map.clone().into_iter().collect(),
          _ => AttributeMap::new(),
        };
        NodeKind::block(formats)
      },
      "text" => NodeKind::text(value.and_then(Value::as_str).unwrap_or_default(), AttributeMap::new()),
      "break" => NodeKind::Break,
      "cursor" => {
        let inner = self.alloc_native();
        NodeKind::cursor(inner, AttributeMap::new())
      },
      name if self.registry.is_container(name) => NodeKind::Container {
        name: name.to_string(),
      },
      name => {
        let value = value?.clone();
        if self.registry.is_block_embed(name) {
          NodeKind::BlockEmbed {
            name: name.to_string(),
            value,
            formats: AttributeMap::new(),
          }
        } else if self.registry.is_inline_embed(name) {
          NodeKind::Embed {
            name: name.to_string(),
            value,
            formats: AttributeMap::new(),
          }
        } else {
          return None;
        }
      },
    };
    Some(self.alloc(node))
  }

  // Addressing.

  /// Child of `parent` containing `index`, and the offset inside it.
  ///
  /// With `inclusive`, a child ending exactly at `index` matches too, unless
  /// a zero-length sibling follows it.
  fn find_child(&self, parent: NodeId, mut index: usize, inclusive: bool) -> Option<(NodeId, usize)> {
    let children = self.children(parent);
    for (i, &child) in children.iter().enumerate() {
      let len = self.node_len(child);
      if index < len
        || (inclusive
          && index == len
          && children
            .get(i + 1)
            .is_none_or(|&next| self.node_len(next) != 0))
      {
        return Some((child, index));
      }
      index -= len;
    }
    None
  }

  /// Children of `parent` overlapping `[index, index + length)`, each with
  /// the offset and length of the overlap. Zero-length children inside the
  /// span are included.
  fn for_each_at(&self, parent: NodeId, index: usize, length: usize) -> Spans {
    let mut spans = Spans::new();
    if length == 0 {
      return spans;
    }
    let children = self.children(parent);
    let mut cursor = 0;
    let Some(start) = children.iter().position(|&child| {
      let len = self.node_len(child);
      if index < cursor + len {
        return true;
      }
      cursor += len;
      false
    }) else {
      return spans;
    };

    let end = index.saturating_add(length);
    for &child in &children[start..] {
      if cursor >= end {
        break;
      }
      let len = self.node_len(child);
      if index > cursor {
        spans.push((child, index - cursor, length.min(cursor + len - index)));
      } else {
        spans.push((child, 0, len.min(end - cursor)));
      }
      cursor += len;
    }
    spans
  }

  fn path_from(&self, node: NodeId, index: usize, inclusive: bool, path: &mut SmallVec<[(NodeId, usize); 4]>) {
    path.push((node, index));
    let inclusive = inclusive || matches!(self.kind(node), Some(NodeKind::Block { .. }));
    let Some((child, offset)) = self.find_child(node, index, inclusive) else {
      return;
    };
    if self.kind(child).is_some_and(NodeKind::is_parent) {
      self.path_from(child, offset, inclusive, path);
    } else {
      path.push((child, offset));
    }
  }

  /// Nodes from below the root down to the leaf at `index`, each with the
  /// offset of `index` inside it.
  pub fn path(&self, index: usize) -> SmallVec<[(NodeId, usize); 4]> {
    let mut path = SmallVec::new();
    self.path_from(self.root, index, false, &mut path);
    path.remove(0);
    path
  }

  pub fn leaf(&self, index: usize) -> Option<(NodeId, usize)> {
    self.path(index).pop()
  }

  /// The line containing `index`. The end of the document resolves to the
  /// last line.
  pub fn line(&self, index: usize) -> Option<(NodeId, usize)> {
    let length = self.length();
    if index >= length {
      return if length == 0 { None } else { self.line(length - 1) };
    }
    self.descendant(NodeKind::is_line, index)
  }

  pub fn lines(&self, index: usize, length: usize) -> Vec<NodeId> {
    let mut lines = Vec::new();
    self.lines_in(self.root, index, length, &mut lines);
    lines
  }

  fn lines_in(&self, parent: NodeId, index: usize, length: usize, lines: &mut Vec<NodeId>) {
    let mut left = length;
    for (child, child_index, child_len) in self.for_each_at(parent, index, length) {
      match self.kind(child) {
        Some(kind) if kind.is_line() => lines.push(child),
        Some(NodeKind::Container { .. }) => self.lines_in(child, child_index, left, lines),
        _ => {},
      }
      left = left.saturating_sub(child_len);
    }
  }

  pub fn descendant(&self, pred: impl Fn(&NodeKind) -> bool, index: usize) -> Option<(NodeId, usize)> {
    self.descendant_in(self.root, &pred, index)
  }

  /// Like [`Scroll::descendant`], starting below `node`.
  pub fn descendant_in(
    &self,
    node: NodeId,
    pred: &dyn Fn(&NodeKind) -> bool,
    index: usize,
  ) -> Option<(NodeId, usize)> {
    let (child, offset) = self.find_child(node, index, false)?;
    let kind = self.kind(child)?;
    if pred(kind) {
      Some((child, offset))
    } else if kind.is_parent() {
      self.descendant_in(child, pred, offset)
    } else {
      None
    }
  }

  pub fn descendants(&self, pred: impl Fn(&NodeKind) -> bool, index: usize, length: usize) -> Vec<NodeId> {
    let mut found = Vec::new();
    self.descendants_in(self.root, &pred, index, length, &mut found);
    found
  }

  fn descendants_in(
    &self,
    node: NodeId,
    pred: &dyn Fn(&NodeKind) -> bool,
    index: usize,
    length: usize,
    found: &mut Vec<NodeId>,
  ) {
    let mut left = length;
    for (child, child_index, child_len) in self.for_each_at(node, index, length) {
      let Some(kind) = self.kind(child) else {
        continue;
      };
      if pred(kind) {
        found.push(child);
      }
      if kind.is_parent() {
        self.descendants_in(child, pred, child_index, left, found);
      }
      left = left.saturating_sub(child_len);
    }
  }

  /// Children of `node` overlapping a span, for renderers walking the tree.
  pub fn children_at(&self, node: NodeId, index: usize, length: usize) -> Spans {
    self.for_each_at(node, index, length)
  }

  // Native handles.

  /// Node owning `native`. A cursor's inner text handle only resolves with
  /// `bubble`.
  pub fn find(&self, native: NativeNode, bubble: bool) -> Option<NodeId> {
    if let Some(&id) = self.natives.get(&native) {
      return Some(id);
    }
    if bubble {
      return self.inner.get(&native).copied();
    }
    None
  }

  pub fn contains_native(&self, native: NativeNode) -> bool {
    self.natives.contains_key(&native) || self.inner.contains_key(&native)
  }

  pub fn native_of(&self, id: NodeId) -> Option<NativeNode> {
    self.nodes.get(id).map(Node::native)
  }

  pub fn native_children(&self, native: NativeNode) -> SmallVec<[NativeNode; 8]> {
    let Some(&id) = self.natives.get(&native) else {
      return SmallVec::new();
    };
    match self.kind(id) {
      Some(NodeKind::Cursor { inner, .. }) => SmallVec::from_slice(&[*inner]),
      _ => self
        .children(id)
        .iter()
        .filter_map(|&child| self.native_of(child))
        .collect(),
    }
  }

  /// Char length of a native text node, `None` for elements.
  pub fn native_text_len(&self, native: NativeNode) -> Option<usize> {
    if let Some(&id) = self.inner.get(&native) {
      return match self.kind(id) {
        Some(NodeKind::Cursor { text, .. }) => Some(text.chars().count()),
        _ => None,
      };
    }
    match self.natives.get(&native).and_then(|&id| self.kind(id)) {
      Some(NodeKind::Text { text, .. }) => Some(text.chars().count()),
      _ => None,
    }
  }

  pub fn native_parent(&self, native: NativeNode) -> Option<NativeNode> {
    if let Some(&id) = self.inner.get(&native) {
      return self.native_of(id);
    }
    let id = self.natives.get(&native)?;
    self.parent(*id).and_then(|parent| self.native_of(parent))
  }

  /// Native point for `offset` inside a leaf. At the end of a non-text leaf
  /// the point sits after the leaf in its parent.
  pub fn leaf_position(&self, leaf: NodeId, offset: usize) -> Option<NativeAnchor> {
    let node = self.nodes.get(leaf)?;
    match &node.kind {
      NodeKind::Text { .. } => Some(NativeAnchor::new(node.native, offset)),
      NodeKind::Cursor { text, inner, .. } => Some(NativeAnchor::new(*inner, text.chars().count())),
      _ => {
        let parent = node.parent?;
        let index = self.index_in_parent(leaf)?;
        Some(NativeAnchor::new(
          self.native_of(parent)?,
          index + usize::from(offset > 0),
        ))
      },
    }
  }

  /// Document offset of a native point inside the leaf `id`, relative to
  /// the leaf.
  pub fn leaf_index(&self, id: NodeId, native: NativeNode, offset: usize) -> usize {
    match self.kind(id) {
      Some(NodeKind::Text { .. }) if self.native_of(id) == Some(native) => offset,
      Some(NodeKind::Cursor { .. }) => 0,
      _ => offset.min(1),
    }
  }

  // Mutation.

  pub fn batch_start(&mut self) {
    self.batch = true;
  }

  pub fn batch_end(&mut self) -> Vec<Mutation> {
    self.batch = false;
    self.optimize()
  }

  fn new_leaf(&mut self, insertion: Insertion, formats: AttributeMap) -> NodeId {
    match insertion {
      Insertion::Text(text) => self.alloc(NodeKind::text(text, formats)),
      Insertion::Embed(name, value) => self.alloc(NodeKind::Embed {
        name: name.to_string(),
        value: value.clone(),
        formats,
      }),
    }
  }

  pub fn insert_at(&mut self, index: usize, insertion: Insertion) {
    match insertion {
      Insertion::Text("") => return,
      Insertion::Embed(name, _) if !self.registry.query(name).is_some_and(|def| def.embed) => {
        tracing::trace!("ignoring insert of unknown embed '{name}'");
        return;
      },
      _ => {},
    }

    if index >= self.length() {
      match insertion {
        Insertion::Embed(name, value) if self.registry.is_block_embed(name) => {
          let embed = self.alloc(NodeKind::BlockEmbed {
            name:    name.to_string(),
            value:   value.clone(),
            formats: AttributeMap::new(),
          });
          self.append(self.root, embed);
        },
        insertion => {
          let block = self.default_block();
          self.append(self.root, block);
          let insertion = match insertion {
            Insertion::Text(text) => Insertion::Text(text.strip_suffix('\n').unwrap_or(text)),
            insertion => insertion,
          };
          self.insert_in_block(block, 0, insertion);
        },
      }
    } else {
      self.insert_in(self.root, index, insertion);
    }
    self.optimize();
  }

  fn insert_in(&mut self, parent: NodeId, index: usize, insertion: Insertion) {
    let Some((child, offset)) = self.find_child(parent, index, false) else {
      let block = self.default_block();
      self.append(parent, block);
      self.insert_in_block(block, 0, insertion);
      return;
    };
    match self.kind(child) {
      Some(NodeKind::Root | NodeKind::Container { .. }) => self.insert_in(child, offset, insertion),
      Some(NodeKind::Block { .. }) => self.insert_in_block(child, offset, insertion),
      Some(NodeKind::BlockEmbed { .. }) => self.insert_before_embed(child, insertion),
      Some(_) => self.insert_into_leaf(child, offset, insertion),
      None => {},
    }
  }

  fn insert_in_block(&mut self, block: NodeId, index: usize, insertion: Insertion) {
    let text = match insertion {
      Insertion::Embed(name, value) if self.registry.is_block_embed(name) => {
        self.insert_block_embed(block, index, name, value);
        return;
      },
      Insertion::Embed(..) => {
        self.insert_inline(block, index, insertion);
        return;
      },
      Insertion::Text(text) => text,
    };
    if text.is_empty() {
      return;
    }

    let mut lines = text.split('\n');
    let first = lines.next().unwrap_or_default();
    if !first.is_empty() {
      let len = self.node_len(block);
      match self.children(block).last().copied() {
        Some(tail) if index >= len - 1 => {
          let tail_len = self.node_len(tail);
          self.insert_into_leaf(tail, tail_len, Insertion::Text(first));
        },
        _ => self.insert_inline(block, index.min(len - 1), Insertion::Text(first)),
      }
    }

    let mut block = block;
    let mut line_index = index + first.chars().count();
    for line in lines {
      block = self.split_block(block, line_index);
      self.insert_in_block(block, 0, Insertion::Text(line));
      line_index = line.chars().count();
    }
  }

  fn insert_inline(&mut self, block: NodeId, index: usize, insertion: Insertion) {
    match self.find_child(block, index, false) {
      Some((child, offset)) => self.insert_into_leaf(child, offset, insertion),
      None => {
        let leaf = self.new_leaf(insertion, AttributeMap::new());
        self.append(block, leaf);
      },
    }
  }

  /// Inserts next to or into `leaf`. New leaves take the formats of the leaf
  /// they are inserted into.
  fn insert_into_leaf(&mut self, leaf: NodeId, offset: usize, insertion: Insertion) {
    if let Insertion::Text(text) = insertion
      && let Some(NodeKind::Text { text: current, .. }) = self.nodes.get_mut(leaf).map(|node| &mut node.kind)
    {
      let at = char_to_byte_idx(current, offset);
      current.insert_str(at, text);
      return;
    }

    let Some(parent) = self.parent(leaf) else {
      return;
    };
    let formats = self
      .kind(leaf)
      .and_then(NodeKind::formats)
      .cloned()
      .unwrap_or_default();
    let new = self.new_leaf(insertion, formats);
    let before = self.split_leaf(leaf, offset);
    self.insert_before(parent, new, before);
  }

  fn insert_before_embed(&mut self, embed: NodeId, insertion: Insertion) {
    let Some(parent) = self.parent(embed) else {
      return;
    };
    match insertion {
      Insertion::Text(text) => {
        let mut lines: Vec<&str> = text.split('\n').collect();
        let last = lines.pop().unwrap_or_default();
        for line in lines {
          let block = self.default_block();
          self.insert_before(parent, block, Some(embed));
          self.insert_in_block(block, 0, Insertion::Text(line));
        }
        if !last.is_empty() {
          let block = self.default_block();
          self.insert_before(parent, block, Some(embed));
          self.insert_in_block(block, 0, Insertion::Text(last));
        }
      },
      Insertion::Embed(name, value) if self.registry.is_block_embed(name) => {
        let new = self.alloc(NodeKind::BlockEmbed {
          name:    name.to_string(),
          value:   value.clone(),
          formats: AttributeMap::new(),
        });
        self.insert_before(parent, new, Some(embed));
      },
      insertion => {
        let block = self.default_block();
        self.insert_before(parent, block, Some(embed));
        let leaf = self.new_leaf(insertion, AttributeMap::new());
        self.append(block, leaf);
      },
    }
  }

  /// Puts a block embed before, after or in the middle of `block`.
  fn insert_block_embed(&mut self, block: NodeId, index: usize, name: &str, value: &Value) {
    let Some(parent) = self.parent(block) else {
      return;
    };
    let embed = self.alloc(NodeKind::BlockEmbed {
      name:    name.to_string(),
      value:   value.clone(),
      formats: AttributeMap::new(),
    });
    let len = self.node_len(block);
    if index == 0 {
      self.insert_before(parent, embed, Some(block));
    } else if index >= len - 1 {
      let next = self.next(block);
      self.insert_before(parent, embed, next);
    } else {
      let after = self.split_block(block, index);
      self.insert_before(parent, embed, Some(after));
    }
  }

  /// Splits a text leaf at a char offset; returns the new right half.
  fn split_text(&mut self, leaf: NodeId, offset: usize) -> NodeId {
    let Some(NodeKind::Text { text, formats }) = self.kind(leaf) else {
      return leaf;
    };
    let at = char_to_byte_idx(text, offset);
    let tail = NodeKind::text(&text[at..], formats.clone());
    if let Some(NodeKind::Text { text, .. }) = self.nodes.get_mut(leaf).map(|node| &mut node.kind) {
      text.truncate(at);
    }
    let after = self.alloc(tail);
    if let Some(parent) = self.parent(leaf) {
      let next = self.next(leaf);
      self.insert_before(parent, after, next);
    }
    after
  }

  /// The node that starts at `offset` after splitting `leaf` there, if any.
  fn split_leaf(&mut self, leaf: NodeId, offset: usize) -> Option<NodeId> {
    if offset == 0 {
      return Some(leaf);
    }
    if offset >= self.node_len(leaf) {
      return self.next(leaf);
    }
    match self.kind(leaf) {
      Some(NodeKind::Text { .. }) => Some(self.split_text(leaf, offset)),
      _ => self.next(leaf),
    }
  }

  /// Splits a line at `offset` and returns the line now starting there.
  /// Splitting at either end creates an empty line with the same formats.
  fn split_block(&mut self, block: NodeId, offset: usize) -> NodeId {
    let Some(parent) = self.parent(block) else {
      return block;
    };
    let formats = self
      .kind(block)
      .and_then(NodeKind::formats)
      .cloned()
      .unwrap_or_default();
    let len = self.node_len(block);
    let clone = self.alloc(NodeKind::block(formats));

    if offset == 0 {
      self.insert_before(parent, clone, Some(block));
      return block;
    }
    let next = self.next(block);
    self.insert_before(parent, clone, next);
    if offset >= len - 1 {
      return clone;
    }

    for (child, child_offset, _) in self.for_each_at(block, offset, len) {
      let moved = match self.kind(child) {
        Some(NodeKind::Text { .. }) if child_offset > 0 => self.split_text(child, child_offset),
        _ => child,
      };
      self.append(clone, moved);
    }
    clone
  }

  pub fn delete_at(&mut self, index: usize, length: usize) {
    let first = self.line(index);
    let last = self.line(index + length).map(|(line, _)| line);
    self.delete_in(self.root, index, length);

    if let (Some((first, offset)), Some(last)) = (first, last)
      && first != last
      && offset > 0
      && self.contains(first)
      && self.contains(last)
    {
      let embed = |line| matches!(self.kind(line), Some(NodeKind::BlockEmbed { .. }));
      if !embed(first) && !embed(last) {
        // the surviving newline is the second line's
        let before = self
          .children(last)
          .first()
          .copied()
          .filter(|&head| !matches!(self.kind(head), Some(NodeKind::Break)));
        for child in self.children(first).to_vec() {
          self.insert_before(last, child, before);
        }
        self.remove(first);
      }
    }
    self.optimize();
  }

  fn delete_in(&mut self, parent: NodeId, index: usize, length: usize) {
    for (child, offset, len) in self.for_each_at(parent, index, length) {
      match self.kind(child) {
        Some(NodeKind::Container { .. } | NodeKind::Block { .. }) => {
          if offset == 0 && len == self.node_len(child) {
            self.remove(child);
          } else {
            self.delete_in(child, offset, len);
          }
        },
        Some(NodeKind::Text { text, .. }) if offset > 0 || len < text.chars().count() => {
          let start = char_to_byte_idx(text, offset);
          let end = start + char_to_byte_idx(&text[start..], len);
          if let Some(NodeKind::Text { text, .. }) = self.nodes.get_mut(child).map(|node| &mut node.kind) {
            text.replace_range(start..end, "");
          }
        },
        Some(_) => self.remove(child),
        None => {},
      }
    }
  }

  pub fn format_at(&mut self, index: usize, length: usize, name: &str, value: &Value) {
    self.format_in(self.root, index, length, name, value);
    self.optimize();
  }

  fn format_in(&mut self, parent: NodeId, index: usize, length: usize, name: &str, value: &Value) {
    for (child, offset, len) in self.for_each_at(parent, index, length) {
      match self.kind(child) {
        Some(NodeKind::Root | NodeKind::Container { .. }) => self.format_in(child, offset, len, name, value),
        Some(NodeKind::Block { .. }) => {
          let block_len = self.node_len(child);
          if self.registry.is_block_format(name) {
            if offset + len == block_len {
              self.format_line_node(child, name, value);
            }
          } else {
            let inner = len.min(block_len.saturating_sub(offset + 1));
            self.format_in(child, offset, inner, name, value);
          }
        },
        Some(NodeKind::BlockEmbed { .. }) => self.format_line_node(child, name, value),
        Some(NodeKind::Text { .. }) if self.registry.is_inline_format(name) => {
          let target = self.isolate(child, offset, len);
          set_format(self.formats_mut(target), name, value);
        },
        Some(NodeKind::Embed { .. }) if self.registry.is_inline_format(name) => {
          set_format(self.formats_mut(child), name, value);
        },
        _ => {},
      }
    }
  }

  /// Applies a block format to a single line. Setting a block type clears
  /// the others; removing one only clears it when it is the line's type.
  pub fn format_line_node(&mut self, line: NodeId, name: &str, value: &Value) {
    let registry = Arc::clone(&self.registry);
    let Some(definition) = registry.query(name).filter(|def| def.is_block_format()) else {
      return;
    };
    let Some(node) = self.nodes.get_mut(line) else {
      return;
    };
    match &mut node.kind {
      NodeKind::Block { formats } if definition.exclusive => {
        if value_is_set(value) {
          if formats.get(name) != Some(value) {
            for block_type in registry.block_types() {
              formats.remove(block_type);
            }
            formats.insert(name, value.clone());
          }
        } else {
          formats.remove(name);
        }
      },
      NodeKind::Block { formats } => set_format(Some(formats), name, value),
      NodeKind::BlockEmbed { formats, .. } if !definition.exclusive => set_format(Some(formats), name, value),
      _ => {},
    }
  }

  fn formats_mut(&mut self, id: NodeId) -> Option<&mut AttributeMap> {
    self
      .nodes
      .get_mut(id)
      .and_then(|node| node.kind.formats_mut())
  }

  /// Splits a text leaf so that `[offset, offset + length)` is one leaf.
  fn isolate(&mut self, leaf: NodeId, offset: usize, length: usize) -> NodeId {
    if offset + length < self.node_len(leaf) {
      self.split_text(leaf, offset + length);
    }
    if offset > 0 {
      self.split_text(leaf, offset)
    } else {
      leaf
    }
  }

  // Cursor.

  /// Parks the cursor at a native point resolved to `node`, splitting the
  /// leaf there. The cursor starts out with the formats of that leaf.
  pub fn park_cursor(&mut self, node: NodeId, offset: usize) -> Option<NodeId> {
    let kind = self.kind(node)?;
    let (parent, mut before, formats) = if kind.is_leaf() {
      let parent = self.parent(node)?;
      let formats = kind.formats().cloned().unwrap_or_default();
      let before = self.split_leaf(node, offset);
      (parent, before, formats)
    } else {
      (node, self.children(node).get(offset).copied(), AttributeMap::new())
    };
    if before.is_some() && before == self.cursor {
      before = before.and_then(|cursor| self.next(cursor));
    }

    let cursor = match self.cursor {
      Some(cursor) => {
        if let Some(NodeKind::Cursor {
          text,
          formats: current,
          ..
        }) = self.nodes.get_mut(cursor).map(|node| &mut node.kind)
        {
          *text = the_core::chars::CURSOR_MARKER.to_string();
          *current = formats;
        }
        cursor
      },
      None => {
        let inner = self.alloc_native();
        self.alloc(NodeKind::cursor(inner, formats))
      },
    };
    self.insert_before(parent, cursor, before);
    self.cursor = Some(cursor);
    Some(cursor)
  }

  /// Sets or removes an inline format on the parked cursor.
  pub fn format_cursor(&mut self, name: &str, value: &Value) {
    if !self.registry.is_inline_format(name) {
      return;
    }
    if let Some(cursor) = self.cursor {
      set_format(self.formats_mut(cursor), name, value);
    }
  }

  /// Turns whatever was typed into the parked cursor into regular text and
  /// removes the cursor.
  ///
  /// The text joins a neighbouring text leaf with the same formats when
  /// there is one. `selection` is remapped onto the resulting text leaf.
  pub fn restore_cursor(&mut self, selection: Option<&NativeRange>) -> Option<NativeRange> {
    let cursor = self.cursor?;
    let parent = self.parent(cursor)?;
    let Some(NodeKind::Cursor {
      text,
      formats,
      inner,
    }) = self.kind(cursor)
    else {
      return None;
    };
    let typed = strip_cursor_marker(text);
    let formats = formats.clone();
    let inner = *inner;

    let same_text = |id: NodeId| {
      matches!(self.kind(id), Some(NodeKind::Text { formats: other, .. }) if *other == formats)
    };
    let prev = self.prev(cursor).filter(|&id| same_text(id));
    let next = self.next(cursor).filter(|&id| same_text(id));
    let prev_len = prev.map_or(0, |id| self.node_len(id));
    let typed_len = typed.chars().count();
    let prev_native = prev.and_then(|id| self.native_of(id));
    let next_native = next.and_then(|id| self.native_of(id));

    let merged = if let Some(prev) = prev {
      if !typed.is_empty() || next.is_some() {
        let mut tail = typed.clone();
        if let Some(NodeKind::Text { text, .. }) = next.and_then(|id| self.kind(id)) {
          tail.push_str(text);
        }
        if let Some(NodeKind::Text { text, .. }) = self.nodes.get_mut(prev).map(|node| &mut node.kind) {
          text.push_str(&tail);
        }
        if let Some(next) = next {
          self.remove(next);
        }
      }
      Some(prev)
    } else if let Some(next) = next {
      if let Some(NodeKind::Text { text, .. }) = self.nodes.get_mut(next).map(|node| &mut node.kind) {
        text.insert_str(0, &typed);
      }
      Some(next)
    } else if !typed.is_empty() {
      let leaf = self.alloc(NodeKind::text(typed, formats));
      self.insert_before(parent, leaf, Some(cursor));
      Some(leaf)
    } else {
      None
    };
    self.remove(cursor);
    tracing::trace!("restored cursor, {typed_len} chars typed");

    let merged = self.native_of(merged?)?;
    let selection = selection?;
    let remap = |anchor: NativeAnchor| {
      if prev_native == Some(anchor.node) {
        Some(anchor.offset)
      } else if anchor.node == inner {
        Some((prev_len + anchor.offset).saturating_sub(1))
      } else if next_native == Some(anchor.node) {
        Some(prev_len + typed_len + anchor.offset)
      } else {
        None
      }
    };
    Some(NativeRange::new(
      NativeAnchor::new(merged, remap(selection.start)?),
      NativeAnchor::new(merged, remap(selection.end)?),
    ))
  }

  // Normalization.

  /// Runs the normalize pass and reports what it changed. Does nothing while
  /// a batch is open.
  pub fn optimize(&mut self) -> Vec<Mutation> {
    if self.batch {
      return Vec::new();
    }
    let mut mutations = Vec::new();
    self.normalize_containers(&mut mutations);
    self.normalize_root(&mut mutations);
    for line in self.lines(0, usize::MAX) {
      self.normalize_line(line, &mut mutations);
    }
    if !mutations.is_empty() {
      tracing::trace!("normalize produced {} mutations", mutations.len());
      self.optimized.extend_from_slice(&mutations);
    }
    mutations
  }

  /// Mutations collected by normalize passes since the last call.
  pub fn take_optimized(&mut self) -> Vec<Mutation> {
    std::mem::take(&mut self.optimized)
  }

  fn required_container(&self, id: NodeId) -> Option<&str> {
    let Some(NodeKind::Block { formats }) = self.kind(id) else {
      return None;
    };
    formats
      .keys()
      .find_map(|name| self.registry.query(name)?.container.as_deref())
  }

  /// Lifts children out of containers they do not belong in.
  fn normalize_containers(&mut self, mutations: &mut Vec<Mutation>) {
    let mut i = 0;
    while let Some(&child) = self.children(self.root).get(i) {
      i += 1;
      let Some(NodeKind::Container { name }) = self.kind(child) else {
        continue;
      };
      let name = name.clone();
      let children = self.children(child).to_vec();
      let Some(position) = children
        .iter()
        .position(|&grandchild| self.required_container(grandchild) != Some(name.as_str()))
      else {
        continue;
      };

      let stray = children[position];
      let next = self.next(child);
      self.insert_before(self.root, stray, next);
      mutations.push(Mutation::new(stray, MutationKind::Updated));
      let rest = &children[position + 1..];
      if !rest.is_empty() {
        let container = self.alloc(NodeKind::Container { name });
        let next = self.next(stray);
        self.insert_before(self.root, container, next);
        for &grandchild in rest {
          self.append(container, grandchild);
        }
        mutations.push(Mutation::new(container, MutationKind::Inserted));
      }
    }
  }

  fn normalize_root(&mut self, mutations: &mut Vec<Mutation>) {
    let root = self.root;

    // stray leaves get a line of their own
    for child in self.children(root).to_vec() {
      if self.kind(child).is_some_and(NodeKind::is_leaf) {
        let block = self.default_block();
        self.insert_before(root, block, Some(child));
        self.append(block, child);
        mutations.push(Mutation::new(block, MutationKind::Inserted));
      }
    }

    // wrap lines into the containers they require
    let mut i = 0;
    while let Some(&child) = self.children(root).get(i) {
      let Some(required) = self.required_container(child).map(str::to_string) else {
        i += 1;
        continue;
      };
      let prev = self.prev(child).filter(
        |&prev| matches!(self.kind(prev), Some(NodeKind::Container { name }) if *name == required),
      );
      match prev {
        Some(prev) => self.append(prev, child),
        None => {
          let container = self.alloc(NodeKind::Container { name: required });
          self.insert_before(root, container, Some(child));
          self.append(container, child);
          mutations.push(Mutation::new(container, MutationKind::Inserted));
          i += 1;
        },
      }
      mutations.push(Mutation::new(child, MutationKind::Updated));
    }

    // drop empty containers, merge neighbours
    let mut i = 0;
    while let Some(&child) = self.children(root).get(i) {
      let Some(NodeKind::Container { name }) = self.kind(child) else {
        i += 1;
        continue;
      };
      if self.children(child).is_empty() {
        self.remove(child);
        mutations.push(Mutation::new(child, MutationKind::Removed));
        continue;
      }
      let name = name.clone();
      match self.next(child) {
        Some(next) if matches!(self.kind(next), Some(NodeKind::Container { name: other }) if *other == name) => {
          for grandchild in self.children(next).to_vec() {
            self.append(child, grandchild);
          }
          self.remove(next);
          mutations.push(Mutation::new(next, MutationKind::Removed));
        },
        _ => i += 1,
      }
    }

    if self.children(root).is_empty() {
      let block = self.default_block();
      self.append(root, block);
      mutations.push(Mutation::new(block, MutationKind::Inserted));
    }
  }

  fn normalize_line(&mut self, line: NodeId, mutations: &mut Vec<Mutation>) {
    if !matches!(self.kind(line), Some(NodeKind::Block { .. })) {
      return;
    }

    for child in self.children(line).to_vec() {
      if matches!(self.kind(child), Some(NodeKind::Text { text, .. }) if text.is_empty()) {
        self.remove(child);
        mutations.push(Mutation::new(child, MutationKind::Removed));
      }
    }

    let mut i = 0;
    while let (Some(&left), Some(&right)) = (self.children(line).get(i), self.children(line).get(i + 1)) {
      let mergeable = match (self.kind(left), self.kind(right)) {
        (Some(NodeKind::Text { formats: a, .. }), Some(NodeKind::Text { formats: b, .. })) => a == b,
        _ => false,
      };
      if !mergeable {
        i += 1;
        continue;
      }
      let tail = match self.kind(right) {
        Some(NodeKind::Text { text, .. }) => text.clone(),
        _ => String::new(),
      };
      if let Some(NodeKind::Text { text, .. }) = self.nodes.get_mut(left).map(|node| &mut node.kind) {
        text.push_str(&tail);
      }
      self.remove(right);
      mutations.push(Mutation::new(left, MutationKind::Updated));
      mutations.push(Mutation::new(right, MutationKind::Removed));
    }

    if self.children(line).len() > 1 {
      for child in self.children(line).to_vec() {
        if matches!(self.kind(child), Some(NodeKind::Break)) {
          self.remove(child);
          mutations.push(Mutation::new(child, MutationKind::Removed));
        }
      }
    }

    if self.children(line).is_empty() {
      let leaf = self.alloc(NodeKind::Break);
      self.append(line, leaf);
      mutations.push(Mutation::new(leaf, MutationKind::Inserted));
    }
  }

  /// Applies observed surface mutations, then normalizes.
  ///
  /// Returns `None` while batching, otherwise every resulting mutation.
  pub fn update(&mut self, records: &[MutationRecord], context: &mut UpdateContext) -> Option<Vec<Mutation>> {
    if self.batch {
      return None;
    }
    let mut mutations = Vec::new();
    for record in records {
      match record {
        MutationRecord::CharacterData { target, value, .. } => {
          let Some(id) = self.find(*target, true) else {
            tracing::trace!("character data for unknown node {target:?}");
            continue;
          };
          match self.nodes.get_mut(id).map(|node| &mut node.kind) {
            Some(NodeKind::Text { text, .. }) => *text = value.clone(),
            Some(NodeKind::Cursor { text, .. }) => {
              *text = value.clone();
              if !context.composing
                && let Some(range) = self.restore_cursor(context.selection.as_ref())
              {
                context.range = Some(range);
              }
            },
            _ => continue,
          }
          mutations.push(Mutation::new(id, MutationKind::Updated));
        },
        MutationRecord::ChildAdded { target, before, text } => {
          let Some(parent) = self
            .find(*target, false)
            .filter(|&id| self.kind(id).is_some_and(NodeKind::is_parent))
          else {
            continue;
          };
          let before = before
            .and_then(|native| self.find(native, false))
            .filter(|&id| self.parent(id) == Some(parent));
          let leaf = self.alloc(NodeKind::text(text.as_str(), AttributeMap::new()));
          self.insert_before(parent, leaf, before);
          mutations.push(Mutation::new(leaf, MutationKind::Inserted));
        },
        MutationRecord::ChildRemoved { target } => {
          if let Some(id) = self.find(*target, false) {
            self.remove(id);
            mutations.push(Mutation::new(id, MutationKind::Removed));
          }
        },
      }
    }
    mutations.extend(self.optimize());
    Some(mutations)
  }

  // Content.

  /// The change describing one line.
  pub fn line_delta(&self, line: NodeId) -> Delta {
    match self.kind(line) {
      Some(NodeKind::Block { formats }) => {
        let mut delta = Delta::new();
        for &leaf in self.children(line) {
          delta = match self.kind(leaf) {
            Some(NodeKind::Text { text, formats }) => delta.insert(text, formats.clone()),
            Some(NodeKind::Embed {
              name,
              value,
              formats,
            }) => delta.insert_embed(name, value.clone(), formats.clone()),
            _ => delta,
          };
        }
        delta.insert("\n", formats.clone())
      },
      Some(NodeKind::BlockEmbed {
        name,
        value,
        formats,
      }) => Delta::new().insert_embed(name, value.clone(), formats.clone()),
      _ => Delta::new(),
    }
  }

  /// The whole document as a change.
  pub fn delta(&self) -> Delta {
    let mut delta = Delta::new();
    for line in self.lines(0, usize::MAX) {
      for op in self.line_delta(line).into_ops() {
        delta.push(op);
      }
    }
    delta
  }

  /// Formats a node contributes at its position.
  pub fn bubbled_formats(&self, id: NodeId) -> AttributeMap {
    self
      .kind(id)
      .and_then(NodeKind::formats)
      .cloned()
      .unwrap_or_default()
  }
}

fn set_format(formats: Option<&mut AttributeMap>, name: &str, value: &Value) {
  let Some(formats) = formats else {
    return;
  };
  if value_is_set(value) {
    formats.insert(name, value.clone());
  } else {
    formats.remove(name);
  }
}

#[cfg(test)]
mod test {
  use serde_json::json;
  use the_core::chars::CURSOR_MARKER;

  use super::*;

  fn scroll() -> Scroll {
    Scroll::new(Arc::new(Registry::default()))
  }

  fn doc(ops: serde_json::Value) -> Delta {
    serde_json::from_value(json!({ "ops": ops })).unwrap()
  }

  fn text_leaf(scroll: &Scroll, index: usize) -> (NodeId, usize) {
    let (leaf, offset) = scroll.leaf(index).unwrap();
    assert!(matches!(scroll.kind(leaf), Some(NodeKind::Text { .. })));
    (leaf, offset)
  }

  #[test]
  fn starts_with_one_empty_line() {
    let mut scroll = scroll();
    assert_eq!(scroll.length(), 1);
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "\n" }])));
    assert_eq!(scroll.lines(0, usize::MAX).len(), 1);
    assert!(scroll.optimize().is_empty());
  }

  #[test]
  fn insert_splits_lines() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("Hello\nWorld"));
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "Hello\nWorld\n" }])));
    assert_eq!(scroll.lines(0, usize::MAX).len(), 2);
    assert_eq!(scroll.length(), 12);

    scroll.insert_at(2, Insertion::Text("\n"));
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "He\nllo\nWorld\n" }])));
  }

  #[test]
  fn insert_at_end_appends_line() {
    let mut scroll = scroll();
    scroll.insert_at(1, Insertion::Text("abc\n"));
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "\nabc\n" }])));
    scroll.insert_at(100, Insertion::Text("d"));
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "\nabc\nd\n" }])));
  }

  #[test]
  fn inserted_text_inherits_leaf_formats() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab"));
    scroll.format_at(0, 2, "bold", &json!(true));
    scroll.insert_at(2, Insertion::Text("c"));
    assert_eq!(
      scroll.delta(),
      doc(json!([{ "insert": "abc", "attributes": { "bold": true } }, { "insert": "\n" }]))
    );
  }

  #[test]
  fn split_lines_keep_block_formats() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("Title"));
    scroll.format_at(5, 1, "header", &json!(1));
    scroll.insert_at(2, Insertion::Text("\n"));
    assert_eq!(
      scroll.delta(),
      doc(json!([
        { "insert": "Ti" },
        { "insert": "\n", "attributes": { "header": 1 } },
        { "insert": "tle" },
        { "insert": "\n", "attributes": { "header": 1 } },
      ]))
    );
  }

  #[test]
  fn inline_format_isolates_span() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("Hello"));
    scroll.format_at(1, 2, "bold", &json!(true));
    assert_eq!(
      scroll.delta(),
      doc(json!([
        { "insert": "H" },
        { "insert": "el", "attributes": { "bold": true } },
        { "insert": "lo\n" },
      ]))
    );

    scroll.format_at(0, 5, "bold", &Value::Null);
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "Hello\n" }])));
    assert_eq!(scroll.children(scroll.lines(0, 1)[0]).len(), 1);
  }

  #[test]
  fn block_format_needs_newline() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab\ncd"));
    scroll.format_at(0, 2, "header", &json!(2));
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "ab\ncd\n" }])));
    scroll.format_at(1, 3, "align", &json!("center"));
    assert_eq!(
      scroll.delta(),
      doc(json!([
        { "insert": "ab" },
        { "insert": "\n", "attributes": { "align": "center" } },
        { "insert": "cd\n" },
      ]))
    );
  }

  #[test]
  fn block_types_are_exclusive() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab"));
    scroll.format_at(2, 1, "header", &json!(1));
    scroll.format_at(2, 1, "align", &json!("right"));
    scroll.format_at(2, 1, "blockquote", &json!(true));
    assert_eq!(
      scroll.delta(),
      doc(json!([{ "insert": "ab" }, { "insert": "\n", "attributes": { "align": "right", "blockquote": true } }]))
    );
    // removing a type the line does not have changes nothing
    scroll.format_at(2, 1, "header", &Value::Null);
    assert_eq!(scroll.delta().ops().len(), 2);
    scroll.format_at(2, 1, "blockquote", &json!(false));
    assert_eq!(
      scroll.delta(),
      doc(json!([{ "insert": "ab" }, { "insert": "\n", "attributes": { "align": "right" } }]))
    );
  }

  #[test]
  fn delete_merges_lines() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab\ncd"));
    scroll.format_at(5, 1, "header", &json!(1));
    scroll.delete_at(1, 2);
    assert_eq!(
      scroll.delta(),
      doc(json!([{ "insert": "acd" }, { "insert": "\n", "attributes": { "header": 1 } }]))
    );
    assert_eq!(scroll.lines(0, usize::MAX).len(), 1);
  }

  #[test]
  fn delete_whole_lines() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab\ncd\nef"));
    scroll.delete_at(3, 3);
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "ab\nef\n" }])));
    scroll.delete_at(0, scroll.length());
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "\n" }])));
  }

  #[test]
  fn delete_into_empty_line() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab\n"));
    scroll.delete_at(1, 2);
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "a\n" }])));
  }

  #[test]
  fn block_embed_lines_do_not_merge() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab"));
    scroll.insert_at(3, Insertion::Embed("video", &json!("v.mp4")));
    scroll.insert_at(4, Insertion::Text("cd"));
    assert_eq!(
      scroll.delta(),
      doc(json!([{ "insert": "ab\n" }, { "insert": { "video": "v.mp4" } }, { "insert": "cd\n" }]))
    );

    let mut joined = scroll.clone();
    joined.delete_at(1, 3);
    assert_eq!(joined.delta(), doc(json!([{ "insert": "acd\n" }])));

    // the newline before a block embed cannot be joined into it
    scroll.delete_at(1, 2);
    assert_eq!(
      scroll.delta(),
      doc(json!([{ "insert": "a\n" }, { "insert": { "video": "v.mp4" } }, { "insert": "cd\n" }]))
    );
  }

  #[test]
  fn block_embed_splits_line() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("abcd"));
    scroll.insert_at(2, Insertion::Embed("divider", &json!(true)));
    assert_eq!(
      scroll.delta(),
      doc(json!([{ "insert": "ab\n" }, { "insert": { "divider": true } }, { "insert": "cd\n" }]))
    );
  }

  #[test]
  fn unknown_embed_is_ignored() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Embed("widget", &json!(1)));
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "\n" }])));
  }

  #[test]
  fn addressing() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab\ncd"));
    let lines = scroll.lines(0, usize::MAX);

    let (leaf, offset) = text_leaf(&scroll, 2);
    assert_eq!(offset, 2);
    assert_eq!(scroll.parent(leaf), Some(lines[0]));
    let (leaf, offset) = text_leaf(&scroll, 3);
    assert_eq!((scroll.parent(leaf), offset), (Some(lines[1]), 0));

    assert_eq!(scroll.line(2), Some((lines[0], 2)));
    assert_eq!(scroll.line(3), Some((lines[1], 0)));
    assert_eq!(scroll.line(6), Some((lines[1], 2)));
    assert_eq!(scroll.offset(lines[1]), 3);
    assert_eq!(scroll.lines(2, 2), lines);
    assert_eq!(scroll.lines(0, 3), &lines[..1]);
    assert!(scroll.leaf(6).is_none());
  }

  #[test]
  fn zero_length_children_are_visited_inside_spans() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab"));
    let (leaf, _) = text_leaf(&scroll, 0);
    scroll.park_cursor(leaf, 1);
    let leaves = scroll.descendants(NodeKind::is_leaf, 0, 2);
    assert_eq!(leaves.len(), 3);
    assert!(matches!(scroll.kind(leaves[1]), Some(NodeKind::Cursor { .. })));
    // a zero-length child at the start of the span is skipped
    assert_eq!(scroll.descendants(NodeKind::is_leaf, 1, 1).len(), 1);

    let mut scroll = self::scroll();
    scroll.insert_at(0, Insertion::Text("a\n\nb"));
    assert_eq!(scroll.descendants(NodeKind::is_leaf, 0, 5).len(), 2);
  }

  #[test]
  fn lists_live_in_containers() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("a\nb\nc"));
    scroll.format_at(0, 4, "list", &json!("ordered"));
    let root_children = scroll.children(scroll.root()).to_vec();
    assert_eq!(root_children.len(), 2);
    assert!(matches!(scroll.kind(root_children[0]), Some(NodeKind::Container { name }) if name == "list-container"));
    assert_eq!(scroll.children(root_children[0]).len(), 2);

    // lifting the first item out keeps the rest in a container
    scroll.format_at(1, 1, "list", &Value::Null);
    let root_children = scroll.children(scroll.root()).to_vec();
    assert_eq!(root_children.len(), 3);
    assert!(matches!(scroll.kind(root_children[0]), Some(NodeKind::Block { .. })));
    assert!(matches!(scroll.kind(root_children[1]), Some(NodeKind::Container { .. })));
    assert_eq!(
      scroll.delta(),
      doc(json!([
        { "insert": "a\nb" },
        { "insert": "\n", "attributes": { "list": "ordered" } },
        { "insert": "c\n" },
      ]))
    );
    assert!(scroll.optimize().is_empty());
  }

  #[test]
  fn batch_postpones_normalize() {
    let mut scroll = scroll();
    scroll.batch_start();
    scroll.insert_at(0, Insertion::Text("ab"));
    scroll.insert_at(2, Insertion::Text("cd"));
    assert!(scroll.optimize().is_empty());
    assert!(scroll.update(&[], &mut UpdateContext::default()).is_none());
    assert!(!scroll.batch_end().is_empty());
    assert!(scroll.optimize().is_empty());
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "abcd\n" }])));
  }

  #[test]
  fn native_structure() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab"));
    let line = scroll.lines(0, 1)[0];
    let (leaf, _) = text_leaf(&scroll, 0);
    let line_native = scroll.native_of(line).unwrap();
    let leaf_native = scroll.native_of(leaf).unwrap();

    assert_eq!(scroll.native_children(line_native).as_slice(), &[leaf_native]);
    assert_eq!(scroll.native_text_len(leaf_native), Some(2));
    assert_eq!(scroll.native_text_len(line_native), None);
    assert_eq!(scroll.native_parent(leaf_native), Some(line_native));
    assert_eq!(scroll.find(leaf_native, false), Some(leaf));
    assert_eq!(scroll.find(NativeNode(9999), true), None);
  }

  #[test]
  fn update_applies_records() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab"));
    let (leaf, _) = text_leaf(&scroll, 0);
    let native = scroll.native_of(leaf).unwrap();
    let line_native = scroll.native_of(scroll.lines(0, 1)[0]).unwrap();

    let records = [
      MutationRecord::CharacterData {
        target:    native,
        old_value: "ab".into(),
        value:     "abc".into(),
      },
      MutationRecord::ChildAdded {
        target: line_native,
        before: None,
        text:   "!".into(),
      },
    ];
    let mutations = scroll.update(&records, &mut UpdateContext::default()).unwrap();
    assert!(!mutations.is_empty());
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "abc!\n" }])));

    let (leaf, _) = text_leaf(&scroll, 0);
    let native = scroll.native_of(leaf).unwrap();
    scroll.update(&[MutationRecord::ChildRemoved { target: native }], &mut UpdateContext::default());
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "\n" }])));
  }

  #[test]
  fn cursor_restore_keeps_typed_text() {
    let mut scroll = scroll();
    scroll.insert_at(0, Insertion::Text("ab"));
    let (leaf, _) = text_leaf(&scroll, 0);
    let cursor = scroll.park_cursor(leaf, 1).unwrap();
    scroll.format_cursor("bold", &json!(true));
    scroll.optimize();
    assert_eq!(scroll.delta(), doc(json!([{ "insert": "ab\n" }])));
    assert_eq!(scroll.cursor(), Some(cursor));

    let inner = scroll.cursor_inner().unwrap();
    assert_eq!(scroll.find(inner, false), None);
    assert_eq!(scroll.find(inner, true), Some(cursor));

    let typed = format!("{CURSOR_MARKER}x");
    let selection = NativeRange::collapsed(NativeAnchor::new(inner, 2));
    let mut context = UpdateContext {
      selection: Some(selection),
      ..UpdateContext::default()
    };
    scroll.update(
      &[MutationRecord::CharacterData {
        target:    inner,
        old_value: CURSOR_MARKER.to_string(),
        value:     typed,
      }],
      &mut context,
    );
    assert_eq!(scroll.cursor(), None);
    assert_eq!(
      scroll.delta(),
      doc(json!([
        { "insert": "a" },
        { "insert": "x", "attributes": { "bold": true } },
        { "insert": "b\n" },
      ]))
    );
    let range = context.range.unwrap();
    let (leaf, _) = scroll.leaf(2).unwrap();
    assert_eq!(range.start, NativeAnchor::new(scroll.native_of(leaf).unwrap(), 1));
  }

  #[test]
  fn create_nodes() {
    let mut scroll = scroll();
    let block = scroll.create("block", Some(&json!({ "align": "center" }))).unwrap();
    assert_eq!(
      scroll.kind(block),
      Some(&NodeKind::block(AttributeMap::single("align", "center")))
    );
    assert!(scroll.create("image", Some(&json!("a.png"))).is_some());
    let video = scroll.create("video", Some(&json!("v"))).unwrap();
    assert!(matches!(
      scroll.kind(video),
      Some(NodeKind::BlockEmbed { .. })
    ));
    assert!(scroll.create("list-container", None).is_some());
    assert!(scroll.create("image", None).is_none());
    assert!(scroll.create("nope", Some(&json!(1))).is_none());
  }

  #[derive(Debug, Clone)]
  enum Step {
    Insert(u8, String),
    Delete(u8, u8),
    Format(u8, u8, bool),
    Line(u8, bool),
  }

  impl quickcheck::Arbitrary for Step {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
      let texts = ["a", "bc", "\n", "d\ne", "fg\n"];
      match u8::arbitrary(g) % 4 {
        0 => Step::Insert(u8::arbitrary(g), g.choose(&texts).unwrap_or(&"a").to_string()),
        1 => Step::Delete(u8::arbitrary(g), u8::arbitrary(g) % 4),
        2 => Step::Format(u8::arbitrary(g), u8::arbitrary(g) % 4, bool::arbitrary(g)),
        _ => Step::Line(u8::arbitrary(g), bool::arbitrary(g)),
      }
    }
  }

  quickcheck::quickcheck! {
    fn normalize_is_idempotent(steps: Vec<Step>) -> bool {
      let mut scroll = scroll();
      for step in steps {
        let length = scroll.length();
        match step {
          Step::Insert(at, text) => scroll.insert_at(at as usize % (length + 1), Insertion::Text(&text)),
          Step::Delete(at, n) => {
            let at = at as usize % length;
            let n = (n as usize).min(length - 1 - at.min(length - 1));
            scroll.delete_at(at, n);
          },
          Step::Format(at, n, bold) => {
            let value = if bold { json!(true) } else { Value::Null };
            scroll.format_at(at as usize % length, n as usize, "bold", &value);
          },
          Step::Line(at, list) => {
            let value = if list { json!("bullet") } else { Value::Null };
            scroll.format_at(at as usize % length, 1, "list", &value);
          },
        }
      }
      let delta = scroll.delta();
      scroll.optimize().is_empty() && scroll.delta() == delta && scroll.length() == delta.length()
    }
  }
}
