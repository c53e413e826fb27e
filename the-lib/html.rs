//! Semantic HTML rendering of the document tree.

use std::borrow::Cow;

use serde_json::Value;
use the_delta::{
  AttributeMap,
  attributes::value_is_set,
};

use crate::{
  node::{
    NodeId,
    NodeKind,
  },
  registry::{
    Definition,
    Markup,
  },
  scroll::Scroll,
};

/// HTML for `[index, index + length)`. A span inside a single line renders
/// that line's inner markup only.
pub fn html(scroll: &Scroll, index: usize, length: usize) -> String {
  let Some((line, offset)) = scroll.line(index) else {
    return String::new();
  };
  if scroll.node_len(line) >= offset + length {
    return convert(scroll, line, offset, length, true);
  }
  convert(scroll, scroll.root(), index, length, true)
}

pub fn escape(text: &str) -> Cow<'_, str> {
  if !text.contains(['&', '<', '>', '"', '\'']) {
    return Cow::Borrowed(text);
  }
  let mut escaped = String::with_capacity(text.len() + 8);
  for ch in text.chars() {
    match ch {
      '&' => escaped.push_str("&amp;"),
      '<' => escaped.push_str("&lt;"),
      '>' => escaped.push_str("&gt;"),
      '"' => escaped.push_str("&quot;"),
      '\'' => escaped.push_str("&#39;"),
      ch => escaped.push(ch),
    }
  }
  Cow::Owned(escaped)
}

fn value_str(value: &Value) -> Cow<'_, str> {
  match value {
    Value::String(value) => Cow::Borrowed(value),
    value => Cow::Owned(value.to_string()),
  }
}

fn convert(scroll: &Scroll, node: NodeId, index: usize, length: usize, is_root: bool) -> String {
  match scroll.kind(node) {
    Some(NodeKind::Root) => scroll
      .children_at(node, index, length)
      .into_iter()
      .map(|(child, offset, len)| convert(scroll, child, offset, len, false))
      .collect(),
    Some(NodeKind::Container { .. }) => list(scroll, node, index, length),
    Some(NodeKind::Block { formats }) => {
      if is_root {
        return inline(scroll, node, index, length);
      }
      let inner = if scroll.node_len(node) == 1 {
        "<br>".to_string()
      } else {
        inline(scroll, node, index, length)
      };
      let (tag, attributes) = block_tag(scroll, formats);
      format!("<{tag}{attributes}>{inner}</{tag}>")
    },
    Some(NodeKind::BlockEmbed { name, value, .. }) => embed(scroll, name, value),
    Some(_) => inline(scroll, node, index, length),
    None => String::new(),
  }
}

fn block_tag(scroll: &Scroll, formats: &AttributeMap) -> (String, String) {
  let mut tag = Cow::Borrowed("p");
  let mut classes = Vec::new();
  for (name, value) in formats {
    let Some(definition) = scroll.registry().query(name) else {
      continue;
    };
    match &definition.markup {
      Markup::Tag(_) if name == "header" => tag = Cow::Owned(format!("h{}", value_str(value))),
      Markup::Tag(block) if definition.exclusive => tag = Cow::Borrowed(block.as_str()),
      Markup::Class(prefix) if value_is_set(value) => classes.push(format!("{prefix}-{}", value_str(value))),
      _ => {},
    }
  }
  let attributes = if classes.is_empty() {
    String::new()
  } else {
    format!(" class=\"{}\"", escape(&classes.join(" ")))
  };
  (tag.into_owned(), attributes)
}

fn list_type(kind: Option<&Value>) -> (&'static str, &'static str) {
  match kind.and_then(Value::as_str) {
    Some("ordered") => ("ol", ""),
    Some("checked") => ("ul", " data-list=\"checked\""),
    Some("unchecked") => ("ul", " data-list=\"unchecked\""),
    _ => ("ul", ""),
  }
}

/// Rebuilds nested lists from flat items carrying an `indent`.
fn list(scroll: &Scroll, container: NodeId, index: usize, length: usize) -> String {
  let mut html = String::new();
  // open levels: indent and tag
  let mut levels: Vec<(u64, &'static str)> = Vec::new();

  for (item, offset, len) in scroll.children_at(container, index, length) {
    let formats = scroll.bubbled_formats(item);
    let indent = formats.get("indent").and_then(Value::as_u64).unwrap_or(0);
    let (tag, attribute) = list_type(formats.get("list"));

    loop {
      match levels.last() {
        Some(&(last, _)) if indent == last => {
          html.push_str(&format!("</li><li{attribute}>"));
          break;
        },
        Some(&(last, _)) if indent < last => {
          if let Some((_, end)) = levels.pop() {
            html.push_str(&format!("</li></{end}>"));
          }
        },
        _ => {
          levels.push((indent, tag));
          html.push_str(&format!("<{tag}><li{attribute}>"));
          break;
        },
      }
    }
    if scroll.node_len(item) == 1 {
      html.push_str("<br>");
    } else {
      html.push_str(&convert(scroll, item, offset, len, true));
    }
  }

  while let Some((_, end)) = levels.pop() {
    html.push_str(&format!("</li></{end}>"));
  }
  html
}

struct Piece<'a> {
  html:    String,
  formats: &'a AttributeMap,
}

/// Inline content of a line, with formats nested in registry order.
fn inline(scroll: &Scroll, node: NodeId, index: usize, length: usize) -> String {
  let leaves: Vec<_> = if scroll.kind(node).is_some_and(NodeKind::is_leaf) {
    vec![(node, index, length)]
  } else {
    scroll.children_at(node, index, length).into_vec()
  };

  let pieces: Vec<Piece> = leaves
    .into_iter()
    .filter_map(|(leaf, offset, len)| {
      let (html, formats) = match scroll.kind(leaf)? {
        NodeKind::Text { text, formats } => {
          let text: String = text.chars().skip(offset).take(len).collect();
          (escape(&text).into_owned(), formats)
        },
        NodeKind::Embed {
          name,
          value,
          formats,
        } => (embed(scroll, name, value), formats),
        _ => return None,
      };
      Some(Piece { html, formats })
    })
    .collect();

  let tags: Vec<&Definition> = scroll
    .registry()
    .definitions()
    .iter()
    .filter(|definition| definition.is_inline_format() && matches!(definition.markup, Markup::Tag(_)))
    .collect();
  nest(scroll, &pieces, &tags)
}

fn nest(scroll: &Scroll, pieces: &[Piece], tags: &[&Definition]) -> String {
  let Some((definition, rest)) = tags.split_first() else {
    return pieces.iter().map(|piece| attributed(scroll, piece)).collect();
  };
  let mut html = String::new();
  let mut start = 0;
  while start < pieces.len() {
    let value = pieces[start].formats.get(&definition.name);
    let end = start
      + pieces[start..]
        .iter()
        .take_while(|piece| piece.formats.get(&definition.name) == value)
        .count();
    let inner = nest(scroll, &pieces[start..end], rest);
    match value {
      Some(value) => {
        let (open, close) = inline_tag(definition, value);
        html.push_str(&open);
        html.push_str(&inner);
        html.push_str(&close);
      },
      None => html.push_str(&inner),
    }
    start = end;
  }
  html
}

fn inline_tag(definition: &Definition, value: &Value) -> (String, String) {
  let tag = match (&definition.markup, definition.name.as_str()) {
    (_, "script") if value.as_str() == Some("super") => "sup",
    (Markup::Tag(tag), _) => tag.as_str(),
    _ => "span",
  };
  if definition.name == "link" {
    let href = escape(&value_str(value)).into_owned();
    return (
      format!("<a href=\"{href}\" rel=\"noopener noreferrer\" target=\"_blank\">"),
      "</a>".to_string(),
    );
  }
  (format!("<{tag}>"), format!("</{tag}>"))
}

/// Wraps a piece in a span carrying its class and style formats.
fn attributed(scroll: &Scroll, piece: &Piece) -> String {
  let mut classes = Vec::new();
  let mut styles = Vec::new();
  for (name, value) in piece.formats {
    match scroll.registry().query(name).map(|definition| &definition.markup) {
      Some(Markup::Class(prefix)) => classes.push(format!("{prefix}-{}", value_str(value))),
      Some(Markup::Style(property)) => styles.push(format!("{property}: {};", value_str(value))),
      _ => {},
    }
  }
  if classes.is_empty() && styles.is_empty() {
    return piece.html.clone();
  }
  let mut open = String::from("<span");
  if !classes.is_empty() {
    open.push_str(&format!(" class=\"{}\"", escape(&classes.join(" "))));
  }
  if !styles.is_empty() {
    open.push_str(&format!(" style=\"{}\"", escape(&styles.join(" "))));
  }
  format!("{open}>{}</span>", piece.html)
}

fn embed(scroll: &Scroll, name: &str, value: &Value) -> String {
  let value = escape(&value_str(value)).into_owned();
  match name {
    "image" => format!("<img src=\"{value}\">"),
    "formula" => format!("<span class=\"ql-formula\">{value}</span>"),
    "video" => format!("<iframe class=\"ql-video\" frameborder=\"0\" allowfullscreen=\"true\" src=\"{value}\"></iframe>"),
    "divider" => "<hr>".to_string(),
    name => match scroll.registry().query(name).map(|definition| &definition.markup) {
      Some(Markup::Tag(tag)) => format!("<{tag}>{value}</{tag}>"),
      _ => String::new(),
    },
  }
}
