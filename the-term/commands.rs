use std::{
  fs,
  io::Read,
};

use eyre::{
  Result,
  WrapErr,
};
use the_delta::Delta;
use the_lib::{
  HeadlessSurface,
  Options,
  Session,
  Source,
};

/// Reads a change file, `-` meaning stdin.
pub fn read_delta(path: &str) -> Result<Delta> {
  let json = if path == "-" {
    let mut json = String::new();
    std::io::stdin()
      .read_to_string(&mut json)
      .wrap_err("failed to read stdin")?;
    json
  } else {
    fs::read_to_string(path).wrap_err_with(|| format!("failed to read {path}"))?
  };
  Delta::from_json(&json).wrap_err_with(|| format!("{path} is not a change file"))
}

pub fn to_json(delta: &Delta) -> Result<String> {
  delta.to_json().wrap_err("failed to serialize change")
}

/// A headless session holding `doc`.
fn load(options: &Options, doc: &Delta) -> Result<Session<HeadlessSurface>> {
  let mut session =
    Session::new(HeadlessSurface::new(), options.clone()).wrap_err("failed to create session")?;
  session.set_contents(doc, Source::Api);
  tracing::debug!(length = session.get_length(), "loaded document");
  Ok(session)
}

pub fn html(options: &Options, doc: &Delta) -> Result<String> {
  let session = load(options, doc)?;
  Ok(session.get_html(0, session.get_length()))
}

pub fn text(options: &Options, doc: &Delta) -> Result<String> {
  let session = load(options, doc)?;
  Ok(session.get_text(0, session.get_length()))
}

/// The canonical document after `change` went through the editor.
pub fn apply(options: &Options, doc: &Delta, change: &Delta) -> Result<Delta> {
  let mut session = load(options, doc)?;
  session.update_contents(change, Source::Api);
  Ok(session.get_contents(0, session.get_length()))
}
