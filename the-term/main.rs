//! Headless command-line client for folio documents.
//!
//! Documents and changes are read as JSON change files, `-` being stdin.

mod commands;

use std::path::PathBuf;

use clap::{
  Parser,
  Subcommand,
};
use eyre::{
  Result,
  WrapErr,
};
use the_lib::Options;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "folio")]
#[command(about = "Render, diff, compose and transform rich-text changes")]
struct Cli {
  /// Session options (TOML)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Log filter, overrides RUST_LOG and the configured level
  #[arg(long, global = true)]
  log_level: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
  /// Render a document as HTML
  Html { doc: String },
  /// Print the plain text of a document
  Text { doc: String },
  /// Compose two changes into one
  Compose { a: String, b: String },
  /// Change turning document `a` into document `b`
  Diff {
    a:      String,
    b:      String,
    /// Caret position used to place ambiguous edits
    #[arg(long)]
    cursor: Option<usize>,
  },
  /// Rebase `b` over `a`
  Transform {
    a:        String,
    b:        String,
    /// Treat `a` as having happened first
    #[arg(long)]
    priority: bool,
  },
  /// Apply a change to a document and print the result
  Apply { doc: String, change: String },
}

fn init_logging(cli: &Cli, options: &Options) -> Result<()> {
  let filter = match (&cli.log_level, options.debug_level()?) {
    (Some(level), _) => EnvFilter::try_new(level).wrap_err("invalid --log-level")?,
    (None, configured) => {
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("warn")))
    },
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
  Ok(())
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  let options = match &cli.config {
    Some(path) => {
      Options::load(path).wrap_err_with(|| format!("failed to load options from {}", path.display()))?
    },
    None => Options::default(),
  };
  init_logging(&cli, &options)?;

  let output = match &cli.command {
    Command::Html { doc } => commands::html(&options, &commands::read_delta(doc)?)?,
    Command::Text { doc } => commands::text(&options, &commands::read_delta(doc)?)?,
    Command::Compose { a, b } => {
      commands::to_json(&commands::read_delta(a)?.compose(&commands::read_delta(b)?))?
    },
    Command::Diff { a, b, cursor } => {
      let change = commands::read_delta(a)?
        .diff(&commands::read_delta(b)?, *cursor)
        .wrap_err("diff needs two documents")?;
      commands::to_json(&change)?
    },
    Command::Transform { a, b, priority } => {
      let change = commands::read_delta(a)?.transform(&commands::read_delta(b)?, *priority);
      commands::to_json(&change)?
    },
    Command::Apply { doc, change } => {
      let applied = commands::apply(
        &options,
        &commands::read_delta(doc)?,
        &commands::read_delta(change)?,
      )?;
      commands::to_json(&applied)?
    },
  };
  println!("{output}");
  Ok(())
}
