use std::borrow::Cow;

/// The only line terminator a document stores.
pub const NEWLINE: char = '\n';

/// Folds `\r\n` and lone `\r` into `\n`.
///
/// Borrows when the text has no carriage return, which is the common case
/// for typed input.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
  if !text.contains('\r') {
    return Cow::Borrowed(text);
  }

  let mut out = String::with_capacity(text.len());
  let mut chars = text.chars().peekable();
  while let Some(ch) = chars.next() {
    if ch == '\r' {
      if chars.peek() == Some(&'\n') {
        chars.next();
      }
      out.push(NEWLINE);
    } else {
      out.push(ch);
    }
  }
  Cow::Owned(out)
}

#[cfg(test)]
mod line_ending_tests {
  use super::*;

  #[test]
  fn normalize_folds_all_variants() {
    assert_eq!(normalize_line_endings("a\r\nb\rc\nd"), "a\nb\nc\nd");
    assert_eq!(normalize_line_endings("\r\r\n"), "\n\n");
    assert!(matches!(normalize_line_endings("plain\n"), Cow::Borrowed(_)));
  }

  quickcheck::quickcheck! {
    fn normalized_text_has_no_carriage_return(text: String) -> bool {
      !normalize_line_endings(&text).contains('\r')
    }

    fn normalize_is_idempotent(text: String) -> bool {
      let once = normalize_line_endings(&text).into_owned();
      normalize_line_endings(&once) == once
    }
  }
}
