//! Document diffing.
//!
//! Both documents are flattened into char sequences (an embed counts as one
//! placeholder char), diffed with Myers via `imara-diff`, and the resulting
//! edit script is replayed against the original ops so attributes and embed
//! identity are compared exactly.
//!
//! A cursor hint resolves ambiguous edits: typing `a` into `aa` can be read
//! as an insert at 0, 1 or 2, and the hint picks the reading that keeps the
//! caret where the user typed.

use std::time::Instant;

use imara_diff::{
  Algorithm,
  Diff,
  Hunk,
  InternedInput,
};
use smallvec::SmallVec;
use the_core::chars::EMBED_PLACEHOLDER;

use crate::{
  AttributeMap,
  Delta,
  Op,
  delta::{
    DeltaError,
    Result,
  },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
  Equal(usize),
  Delete(usize),
  Insert(usize),
}

pub type Edits = SmallVec<[Edit; 4]>;

fn push_edit(edits: &mut Edits, edit: Edit) {
  use Edit::*;

  let merged = match (edits.last_mut(), edit) {
    (_, Equal(0) | Delete(0) | Insert(0)) => true,
    (Some(Equal(last)), Equal(n)) | (Some(Delete(last)), Delete(n)) | (Some(Insert(last)), Insert(n)) => {
      *last += n;
      true
    },
    _ => false,
  };
  if !merged {
    edits.push(edit);
  }
}

fn splice(prefix: usize, removed: usize, inserted: usize, suffix: usize) -> Edits {
  let mut edits = Edits::new();
  push_edit(&mut edits, Edit::Equal(prefix));
  push_edit(&mut edits, Edit::Delete(removed));
  push_edit(&mut edits, Edit::Insert(inserted));
  push_edit(&mut edits, Edit::Equal(suffix));
  edits
}

/// Reads the change as a single splice touching `cursor` (a position in
/// `before`), if it is one.
fn cursor_edit(before: &[char], after: &[char], cursor: usize) -> Option<Edits> {
  let old_len = before.len();
  let new_len = after.len();
  if cursor > old_len {
    return None;
  }
  let (old_before, old_after) = before.split_at(cursor);

  // An insert or delete ending right at the cursor.
  if let Some(new_cursor) = (cursor + new_len).checked_sub(old_len) {
    if new_cursor <= new_len {
      let (new_before, new_after) = after.split_at(new_cursor);
      let prefix = cursor.min(new_cursor);
      if new_after == old_after && old_before[..prefix] == new_before[..prefix] {
        return Some(splice(
          prefix,
          old_before.len() - prefix,
          new_before.len() - prefix,
          old_after.len(),
        ));
      }
    }
  }

  // An insert or delete starting right at the cursor.
  if cursor <= new_len {
    let (new_before, new_after) = after.split_at(cursor);
    if new_before == old_before {
      let suffix = (old_len - cursor).min(new_len - cursor);
      if old_after[old_after.len() - suffix..] == new_after[new_after.len() - suffix..] {
        return Some(splice(
          cursor,
          old_after.len() - suffix,
          new_after.len() - suffix,
          suffix,
        ));
      }
    }
  }

  None
}

/// Edit script turning `before` into `after`.
pub fn diff_chars(before: &[char], after: &[char], cursor: Option<usize>) -> Edits {
  let mut edits = Edits::new();
  if before == after {
    push_edit(&mut edits, Edit::Equal(before.len()));
    return edits;
  }
  if let Some(edits) = cursor.and_then(|cursor| cursor_edit(before, after, cursor)) {
    return edits;
  }

  let prefix = before
    .iter()
    .zip(after)
    .take_while(|(a, b)| a == b)
    .count();
  let max_suffix = before.len().min(after.len()) - prefix;
  let suffix = before
    .iter()
    .rev()
    .zip(after.iter().rev())
    .take(max_suffix)
    .take_while(|(a, b)| a == b)
    .count();

  let before_mid = &before[prefix..before.len() - suffix];
  let after_mid = &after[prefix..after.len() - suffix];

  push_edit(&mut edits, Edit::Equal(prefix));
  if before_mid.is_empty() || after_mid.is_empty() {
    push_edit(&mut edits, Edit::Delete(before_mid.len()));
    push_edit(&mut edits, Edit::Insert(after_mid.len()));
  } else {
    let mut input = InternedInput::default();
    input.update_before(before_mid.iter().copied());
    input.update_after(after_mid.iter().copied());
    // the histogram heuristic does not work as well for characters because
    // the same characters often reoccur; use myers instead
    let mut diff = Diff::default();
    diff.compute_with(
      Algorithm::Myers,
      &input.before,
      &input.after,
      input.interner.num_tokens(),
    );
    let mut pos = 0;
    for Hunk { before, after } in diff.hunks() {
      push_edit(&mut edits, Edit::Equal((before.start - pos) as usize));
      push_edit(&mut edits, Edit::Delete(before.len()));
      push_edit(&mut edits, Edit::Insert(after.len()));
      pos = before.end;
    }
    push_edit(&mut edits, Edit::Equal(before_mid.len() - pos as usize));
  }
  push_edit(&mut edits, Edit::Equal(suffix));
  edits
}

fn document_chars(delta: &Delta, side: &'static str) -> Result<Vec<char>> {
  delta
    .document_text(EMBED_PLACEHOLDER)
    .map(|text| text.chars().collect())
    .ok_or(DeltaError::DiffOnNonDocument { side })
}

impl Delta {
  /// The change turning document `self` into document `other`.
  ///
  /// `cursor` is the caret position in `self`; it breaks ties between
  /// equally small diffs. Fails when either side contains retains or
  /// deletes.
  pub fn diff(&self, other: &Delta, cursor: Option<usize>) -> Result<Delta> {
    if self == other {
      return Ok(Delta::new());
    }
    let start = tracing::enabled!(tracing::Level::DEBUG).then(Instant::now);

    let before = document_chars(self, "left")?;
    let after = document_chars(other, "right")?;
    let edits = diff_chars(&before, &after, cursor);

    let mut delta = Delta::new();
    let mut this_iter = self.op_iter();
    let mut other_iter = other.op_iter();
    for edit in edits {
      match edit {
        Edit::Insert(mut n) => {
          while n > 0 {
            let len = other_iter.peek_len().min(n);
            delta.push(other_iter.next_len(len));
            n -= len;
          }
        },
        Edit::Delete(mut n) => {
          while n > 0 {
            let len = this_iter.peek_len().min(n);
            this_iter.next_len(len);
            delta.push(Op::Delete(len));
            n -= len;
          }
        },
        Edit::Equal(mut n) => {
          while n > 0 {
            let len = this_iter.peek_len().min(other_iter.peek_len()).min(n);
            let this_op = this_iter.next_len(len);
            let other_op = other_iter.next_len(len);
            match (this_op, other_op) {
              (Op::Insert(this_insert, this_attributes), Op::Insert(other_insert, other_attributes))
                if this_insert == other_insert =>
              {
                delta.push(Op::Retain(
                  len,
                  AttributeMap::diff(&this_attributes, &other_attributes),
                ));
              },
              (_, other_op) => {
                delta.push(other_op);
                delta.push(Op::Delete(len));
              },
            }
            n -= len;
          }
        },
      }
    }

    if let Some(start) = start {
      tracing::debug!(
        "delta diff took {}s ({} -> {} chars)",
        Instant::now().duration_since(start).as_secs_f64(),
        before.len(),
        after.len()
      );
    }
    Ok(delta.chop())
  }
}
