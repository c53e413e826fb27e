use the_core::chars::char_to_byte_idx;

use crate::{
  AttributeMap,
  Insert,
  Op,
  op::OpKind,
};

/// Walks a list of ops in arbitrary-length pieces.
///
/// Past the last op the iterator behaves as an endless retain, which lets
/// compose and transform treat a shorter operand as "keep the rest".
#[derive(Debug, Clone)]
pub struct OpIterator<'a> {
  ops:    &'a [Op],
  index:  usize,
  offset: usize,
}

impl<'a> OpIterator<'a> {
  pub fn new(ops: &'a [Op]) -> Self {
    Self {
      ops,
      index: 0,
      offset: 0,
    }
  }

  #[inline]
  pub fn has_next(&self) -> bool {
    self.peek_len() < usize::MAX
  }

  /// The op under the iterator, ignoring the consumed offset.
  #[inline]
  pub fn peek(&self) -> Option<&'a Op> {
    self.ops.get(self.index)
  }

  /// Remaining length of the current op, `usize::MAX` once exhausted.
  pub fn peek_len(&self) -> usize {
    match self.ops.get(self.index) {
      Some(op) => op.len() - self.offset,
      None => usize::MAX,
    }
  }

  pub fn peek_kind(&self) -> OpKind {
    self.ops.get(self.index).map_or(OpKind::Retain, Op::kind)
  }

  /// Takes up to `len` positions of the current op.
  pub fn next_len(&mut self, len: usize) -> Op {
    let Some(op) = self.ops.get(self.index) else {
      return Op::Retain(usize::MAX, AttributeMap::new());
    };

    let offset = self.offset;
    let op_len = op.len();
    let len = if len >= op_len - offset {
      self.index += 1;
      self.offset = 0;
      op_len - offset
    } else {
      self.offset += len;
      len
    };

    match op {
      Op::Delete(_) => Op::Delete(len),
      Op::Retain(_, attributes) => Op::Retain(len, attributes.clone()),
      Op::Insert(Insert::Text(text), attributes) => {
        let start = char_to_byte_idx(text, offset);
        let end = start + char_to_byte_idx(&text[start..], len);
        Op::Insert(Insert::Text(text[start..end].into()), attributes.clone())
      },
      Op::Insert(embed @ Insert::Embed(_), attributes) => {
        Op::Insert(embed.clone(), attributes.clone())
      },
    }
  }

  /// Takes whatever remains of the current op.
  #[inline]
  pub fn next_op(&mut self) -> Op {
    self.next_len(usize::MAX)
  }

  /// Every remaining op, the partially consumed one included.
  pub fn rest(&self) -> Vec<Op> {
    if !self.has_next() {
      return Vec::new();
    }
    if self.offset == 0 {
      return self.ops[self.index..].to_vec();
    }
    let mut iter = self.clone();
    let mut rest = Vec::with_capacity(self.ops.len() - self.index);
    rest.push(iter.next_op());
    rest.extend_from_slice(&self.ops[iter.index..]);
    rest
  }
}
