//! Format and embed definitions.
//!
//! A [`Registry`] is an explicit value handed to the document tree at
//! construction. It answers which attribute names are formats, which scope
//! they live in, how they nest when rendered, and which blocks must live
//! inside a container.

use std::collections::HashSet;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
  #[error("unknown format '{0}'")]
  UnknownFormat(String),
  #[error("format '{0}' is already registered")]
  DuplicateFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
  /// Applies to whole lines and is carried by the line's newline.
  Block,
  /// Applies to runs of text and inline embeds.
  Inline,
}

/// How a definition is rendered as HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
  /// Its own element.
  Tag(String),
  /// A `class="{prefix}-{value}"` on the enclosing element.
  Class(String),
  /// A CSS property on the enclosing element.
  Style(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
  pub name:      String,
  pub scope:     Scope,
  /// Embeds are content, not attributes: an inline embed is a leaf, a block
  /// embed occupies a whole line.
  pub embed:     bool,
  /// Block types are mutually exclusive on a line.
  pub exclusive: bool,
  /// Container a block carrying this format must live in.
  pub container: Option<String>,
  pub markup:    Markup,
}

impl Definition {
  pub fn inline(name: &str, markup: Markup) -> Self {
    Self {
      name: name.to_string(),
      scope: Scope::Inline,
      embed: false,
      exclusive: false,
      container: None,
      markup,
    }
  }

  /// An exclusive block type such as `header`.
  pub fn block_type(name: &str, tag: &str) -> Self {
    Self {
      name: name.to_string(),
      scope: Scope::Block,
      embed: false,
      exclusive: true,
      container: None,
      markup: Markup::Tag(tag.to_string()),
    }
  }

  /// A block attribute such as `align`, combinable with any block type.
  pub fn block_attribute(name: &str, class: &str) -> Self {
    Self {
      name: name.to_string(),
      scope: Scope::Block,
      embed: false,
      exclusive: false,
      container: None,
      markup: Markup::Class(class.to_string()),
    }
  }

  pub fn embed(name: &str, scope: Scope, tag: &str) -> Self {
    Self {
      name: name.to_string(),
      scope,
      embed: true,
      exclusive: false,
      container: None,
      markup: Markup::Tag(tag.to_string()),
    }
  }

  #[must_use]
  pub fn in_container(mut self, container: &str) -> Self {
    self.container = Some(container.to_string());
    self
  }

  /// Whether this is a format carried by a line (not an embed).
  #[inline]
  pub fn is_block_format(&self) -> bool {
    self.scope == Scope::Block && !self.embed
  }

  /// Whether this is a format carried by text and inline embeds.
  #[inline]
  pub fn is_inline_format(&self) -> bool {
    self.scope == Scope::Inline && !self.embed
  }
}

/// Definitions in registration order. Inline formats registered first are
/// rendered outermost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
  definitions: Vec<Definition>,
}

impl Default for Registry {
  fn default() -> Self {
    let definitions = vec![
      Definition::inline("code", Markup::Tag("code".into())),
      Definition::inline("script", Markup::Tag("sub".into())),
      Definition::inline("bold", Markup::Tag("strong".into())),
      Definition::inline("italic", Markup::Tag("em".into())),
      Definition::inline("strike", Markup::Tag("s".into())),
      Definition::inline("underline", Markup::Tag("u".into())),
      Definition::inline("link", Markup::Tag("a".into())),
      Definition::inline("color", Markup::Style("color".into())),
      Definition::inline("background", Markup::Style("background-color".into())),
      Definition::inline("font", Markup::Class("ql-font".into())),
      Definition::inline("size", Markup::Class("ql-size".into())),
      Definition::block_type("header", "h"),
      Definition::block_type("list", "li").in_container("list-container"),
      Definition::block_type("blockquote", "blockquote"),
      Definition::block_type("code-block", "pre"),
      Definition::block_attribute("align", "ql-align"),
      Definition::block_attribute("indent", "ql-indent"),
      Definition::block_attribute("direction", "ql-direction"),
      Definition::embed("image", Scope::Inline, "img"),
      Definition::embed("formula", Scope::Inline, "span"),
      Definition::embed("video", Scope::Block, "iframe"),
      Definition::embed("divider", Scope::Block, "hr"),
    ];
    Self { definitions }
  }
}

impl Registry {
  /// A registry with no definitions at all.
  pub fn empty() -> Self {
    Self {
      definitions: Vec::new(),
    }
  }

  pub fn register(&mut self, definition: Definition) -> Result<()> {
    if self.query(&definition.name).is_some() {
      return Err(RegistryError::DuplicateFormat(definition.name));
    }
    self.definitions.push(definition);
    Ok(())
  }

  /// Keeps only the named definitions, preserving their order.
  pub fn restrict<S: AsRef<str>>(&self, names: &[S]) -> Result<Registry> {
    let mut allowed = HashSet::with_capacity(names.len());
    for name in names {
      let name = name.as_ref();
      if self.query(name).is_none() {
        return Err(RegistryError::UnknownFormat(name.to_string()));
      }
      allowed.insert(name);
    }
    Ok(Registry {
      definitions: self
        .definitions
        .iter()
        .filter(|definition| allowed.contains(definition.name.as_str()))
        .cloned()
        .collect(),
    })
  }

  pub fn query(&self, name: &str) -> Option<&Definition> {
    self
      .definitions
      .iter()
      .find(|definition| definition.name == name)
  }

  pub fn definitions(&self) -> &[Definition] {
    &self.definitions
  }

  /// Position of an inline format in the nesting order.
  pub fn rank(&self, name: &str) -> Option<usize> {
    self
      .definitions
      .iter()
      .position(|definition| definition.name == name)
  }

  pub fn is_block_format(&self, name: &str) -> bool {
    self.query(name).is_some_and(Definition::is_block_format)
  }

  pub fn is_inline_format(&self, name: &str) -> bool {
    self.query(name).is_some_and(Definition::is_inline_format)
  }

  /// Block formats that are not block types (`align`, `indent`, ...).
  pub fn is_block_attribute(&self, name: &str) -> bool {
    self
      .query(name)
      .is_some_and(|definition| definition.is_block_format() && !definition.exclusive)
  }

  pub fn is_block_embed(&self, name: &str) -> bool {
    self
      .query(name)
      .is_some_and(|definition| definition.embed && definition.scope == Scope::Block)
  }

  pub fn is_inline_embed(&self, name: &str) -> bool {
    self
      .query(name)
      .is_some_and(|definition| definition.embed && definition.scope == Scope::Inline)
  }

  /// Names of the exclusive block types.
  pub fn block_types(&self) -> impl Iterator<Item = &str> {
    self
      .definitions
      .iter()
      .filter(|definition| definition.is_block_format() && definition.exclusive)
      .map(|definition| definition.name.as_str())
  }

  /// Whether `name` is a container some block format requires.
  pub fn is_container(&self, name: &str) -> bool {
    self
      .definitions
      .iter()
      .any(|definition| definition.container.as_deref() == Some(name))
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn default_scopes() {
    let registry = Registry::default();
    assert!(registry.is_inline_format("bold"));
    assert!(registry.is_block_format("header"));
    assert!(registry.is_block_attribute("align"));
    assert!(!registry.is_block_attribute("header"));
    assert!(registry.is_inline_embed("image"));
    assert!(registry.is_block_embed("video"));
    assert!(!registry.is_inline_format("image"));
    assert!(registry.query("nope").is_none());
    assert!(registry.is_container("list-container"));
    assert_eq!(
      registry.block_types().collect::<Vec<_>>(),
      ["header", "list", "blockquote", "code-block"]
    );
  }

  #[test]
  fn restrict_keeps_order() {
    let registry = Registry::default().restrict(&["italic", "bold"]).unwrap();
    let names: Vec<_> = registry.definitions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["bold", "italic"]);
    assert_eq!(
      Registry::default().restrict(&["blink"]),
      Err(RegistryError::UnknownFormat("blink".into()))
    );
  }

  #[test]
  fn duplicate_registration() {
    let mut registry = Registry::default();
    assert_eq!(
      registry.register(Definition::inline("bold", Markup::Tag("b".into()))),
      Err(RegistryError::DuplicateFormat("bold".into()))
    );
    registry
      .register(Definition::inline("mark", Markup::Tag("mark".into())))
      .unwrap();
    assert!(registry.is_inline_format("mark"));
  }
}
