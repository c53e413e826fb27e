pub mod config;
pub mod editor;
pub mod emitter;
pub mod format;
pub mod history;
pub mod html;
pub mod node;
pub mod registry;
pub mod scroll;
pub mod selection;
pub mod session;
pub mod surface;

pub use config::Options;
pub use editor::Editor;
pub use emitter::{
  Event,
  EventKind,
  Source,
};
pub use history::History;
pub use registry::Registry;
pub use scroll::Scroll;
pub use selection::{
  Range,
  Selection,
};
pub use session::{
  Session,
  SessionError,
};
pub use surface::{
  HeadlessSurface,
  Surface,
};
