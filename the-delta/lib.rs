//! Rich-text changes.
//!
//! A [`Delta`] describes either a document or a change to one, with the
//! usual operational-transform algebra on top: compose, transform, invert
//! and diff.

use smartstring::{
  LazyCompact,
  SmartString,
};

pub mod attributes;
pub mod delta;
pub mod diff;
pub mod iter;
pub mod op;

pub use attributes::AttributeMap;
pub use delta::{
  Delta,
  DeltaError,
  Result,
};
pub use op::{
  Insert,
  Op,
  OpKind,
};

pub type Tendril = SmartString<LazyCompact>;
