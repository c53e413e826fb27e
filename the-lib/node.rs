use serde_json::Value;
use the_core::chars::CURSOR_MARKER;
use the_delta::AttributeMap;

use crate::surface::NativeNode;

slotmap::new_key_type! {
  /// Stable handle of a node in the document arena.
  pub struct NodeId;
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
  /// The document itself. Holds Blocks, BlockEmbeds and Containers.
  Root,
  /// Groups consecutive Blocks that require it, e.g. list items.
  Container { name: String },
  /// A line. Its newline is implicit and carries `formats`.
  Block { formats: AttributeMap },
  /// A line consisting of a single embedded object.
  BlockEmbed {
    name:    String,
    value:   Value,
    formats: AttributeMap,
  },
  Text { text: String, formats: AttributeMap },
  Embed {
    name:    String,
    value:   Value,
    formats: AttributeMap,
  },
  /// Placeholder of an empty line.
  Break,
  /// Transient caret host used to format a collapsed selection. `text` is
  /// the content of its inner text node: the marker plus anything typed.
  Cursor {
    text:    String,
    formats: AttributeMap,
    inner:   NativeNode,
  },
}

impl NodeKind {
  pub fn text(text: impl Into<String>, formats: AttributeMap) -> Self {
    NodeKind::Text {
      text: text.into(),
      formats,
    }
  }

  pub fn block(formats: AttributeMap) -> Self {
    NodeKind::Block { formats }
  }

  pub fn cursor(inner: NativeNode, formats: AttributeMap) -> Self {
    NodeKind::Cursor {
      text: CURSOR_MARKER.to_string(),
      formats,
      inner,
    }
  }

  /// Root and Containers.
  #[inline]
  pub fn is_container(&self) -> bool {
    matches!(self, NodeKind::Root | NodeKind::Container { .. })
  }

  /// Blocks and BlockEmbeds.
  #[inline]
  pub fn is_line(&self) -> bool {
    matches!(self, NodeKind::Block { .. } | NodeKind::BlockEmbed { .. })
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    matches!(
      self,
      NodeKind::Text { .. } | NodeKind::Embed { .. } | NodeKind::Break | NodeKind::Cursor { .. }
    )
  }

  /// Whether the node can hold children.
  #[inline]
  pub fn is_parent(&self) -> bool {
    self.is_container() || matches!(self, NodeKind::Block { .. })
  }

  /// Own formats of the node; structural nodes have none.
  pub fn formats(&self) -> Option<&AttributeMap> {
    match self {
      NodeKind::Block { formats }
      | NodeKind::BlockEmbed { formats, .. }
      | NodeKind::Text { formats, .. }
      | NodeKind::Embed { formats, .. }
      | NodeKind::Cursor { formats, .. } => Some(formats),
      NodeKind::Root | NodeKind::Container { .. } | NodeKind::Break => None,
    }
  }

  pub fn formats_mut(&mut self) -> Option<&mut AttributeMap> {
    match self {
      NodeKind::Block { formats }
      | NodeKind::BlockEmbed { formats, .. }
      | NodeKind::Text { formats, .. }
      | NodeKind::Embed { formats, .. }
      | NodeKind::Cursor { formats, .. } => Some(formats),
      NodeKind::Root | NodeKind::Container { .. } | NodeKind::Break => None,
    }
  }

  /// Length of a leaf or BlockEmbed; `None` for nodes whose length comes
  /// from their children.
  pub fn intrinsic_len(&self) -> Option<usize> {
    match self {
      NodeKind::Text { text, .. } => Some(text.chars().count()),
      NodeKind::Embed { .. } | NodeKind::BlockEmbed { .. } => Some(1),
      NodeKind::Break | NodeKind::Cursor { .. } => Some(0),
      NodeKind::Root | NodeKind::Container { .. } | NodeKind::Block { .. } => None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Node {
  pub(crate) parent:   Option<NodeId>,
  pub(crate) children: Vec<NodeId>,
  pub(crate) native:   NativeNode,
  pub(crate) kind:     NodeKind,
}

impl Node {
  #[inline]
  pub fn parent(&self) -> Option<NodeId> {
    self.parent
  }

  #[inline]
  pub fn children(&self) -> &[NodeId] {
    &self.children
  }

  #[inline]
  pub fn native(&self) -> NativeNode {
    self.native
  }

  #[inline]
  pub fn kind(&self) -> &NodeKind {
    &self.kind
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
  Inserted,
  Removed,
  Updated,
}

/// One structural change made by the tree while normalizing or applying
/// mutation records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
  pub node: NodeId,
  pub kind: MutationKind,
}

impl Mutation {
  pub fn new(node: NodeId, kind: MutationKind) -> Self {
    Self { node, kind }
  }
}
