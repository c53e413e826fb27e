/// Content of a parked cursor before anything is typed into it.
pub const CURSOR_MARKER: char = '\u{FEFF}';

/// The placeholder a non-text insert occupies when documents are compared
/// as strings.
pub const EMBED_PLACEHOLDER: char = '\0';

/// `[ -~]`: space through tilde.
#[inline]
pub const fn char_is_printable_ascii(ch: char) -> bool {
  matches!(ch, ' '..='~')
}

/// Whether every character of `text` is printable ASCII. The empty string
/// qualifies.
#[inline]
pub fn str_is_printable_ascii(text: &str) -> bool {
  text.chars().all(char_is_printable_ascii)
}

/// Strips every cursor marker from `text`.
pub fn strip_cursor_marker(text: &str) -> String {
  text.chars().filter(|&ch| ch != CURSOR_MARKER).collect()
}

/// Byte offset of the `char_idx`-th char, or `text.len()` past the end.
#[inline]
pub fn char_to_byte_idx(text: &str, char_idx: usize) -> usize {
  text
    .char_indices()
    .nth(char_idx)
    .map_or(text.len(), |(byte, _)| byte)
}
