use std::{
  fs,
  path::Path,
  time::Duration,
};

use serde::{
  Deserialize,
  Serialize,
};
use thiserror::Error;

use crate::{
  history::HistoryConfig,
  registry::{
    Registry,
    RegistryError,
  },
};

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
  #[error("invalid options: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("cannot read options: {0}")]
  Io(#[from] std::io::Error),
  #[error("unknown format `{0}`")]
  UnknownFormat(String),
  #[error("invalid debug level `{0}`")]
  InvalidDebugLevel(String),
  #[error("history max_stack must be at least 1")]
  InvalidHistory,
}

/// Session options.
///
/// ```toml
/// read_only = false
/// formats = ["bold", "italic", "header"]
/// debug = "warn"
///
/// [history]
/// delay_ms = 1000
/// max_stack = 100
/// user_only = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
  pub read_only: bool,
  /// Restricts the registry to these formats. All formats when unset.
  pub formats:   Option<Vec<String>>,
  /// Log level name: `error`, `warn`, `info`, `debug` (or `log`), `trace`.
  pub debug:     Option<String>,
  pub history:   HistoryOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryOptions {
  pub delay_ms:  u64,
  pub max_stack: usize,
  pub user_only: bool,
}

impl Default for HistoryOptions {
  fn default() -> Self {
    let config = HistoryConfig::default();
    Self {
      delay_ms:  config.delay.as_millis() as u64,
      max_stack: config.max_stack,
      user_only: config.user_only,
    }
  }
}

impl From<&HistoryOptions> for HistoryConfig {
  fn from(options: &HistoryOptions) -> Self {
    HistoryConfig {
      delay:     Duration::from_millis(options.delay_ms),
      max_stack: options.max_stack,
      user_only: options.user_only,
    }
  }
}

const LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

impl Options {
  pub fn from_toml(source: &str) -> Result<Self> {
    let options: Options = toml::from_str(source)?;
    options.validate()?;
    Ok(options)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    Self::from_toml(&fs::read_to_string(path)?)
  }

  pub fn validate(&self) -> Result<()> {
    if self.history.max_stack == 0 {
      return Err(ConfigError::InvalidHistory);
    }
    self.debug_level()?;
    if let Some(formats) = &self.formats {
      let registry = Registry::default();
      if let Some(unknown) = formats.iter().find(|name| registry.query(name).is_none()) {
        return Err(ConfigError::UnknownFormat(unknown.clone()));
      }
    }
    Ok(())
  }

  /// The configured log level, `log` being read as `debug`.
  pub fn debug_level(&self) -> Result<Option<&'static str>> {
    let Some(level) = &self.debug else {
      return Ok(None);
    };
    let level = level.to_ascii_lowercase();
    if level == "log" {
      return Ok(Some("debug"));
    }
    LEVELS
      .iter()
      .find(|known| **known == level)
      .map(|known| Some(*known))
      .ok_or_else(|| ConfigError::InvalidDebugLevel(level))
  }

  pub fn history_config(&self) -> HistoryConfig {
    HistoryConfig::from(&self.history)
  }

  /// The registry these options select.
  pub fn registry(&self) -> Result<Registry> {
    let registry = Registry::default();
    match &self.formats {
      Some(formats) => registry.restrict(formats.as_slice()).map_err(|err| match err {
        RegistryError::UnknownFormat(name) | RegistryError::DuplicateFormat(name) => {
          ConfigError::UnknownFormat(name)
        },
      }),
      None => Ok(registry),
    }
  }
}
