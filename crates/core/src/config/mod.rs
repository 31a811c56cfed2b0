use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Log level for the engine and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Off,
  Warn,
  #[default]
  Info,
  Debug,
  Trace,
}

impl LogLevel {
  pub fn as_filter(self) -> &'static str {
    match self {
      LogLevel::Off => "off",
      LogLevel::Warn => "warn",
      LogLevel::Info => "info",
      LogLevel::Debug => "debug",
      LogLevel::Trace => "trace",
    }
  }
}

/// Settings of the exec resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecConfig {
  /// Shell used for meta-character commands and the headerless-script fallback.
  pub shell: PathBuf,
  /// Search path when PATH is unset and the effective uid is 0.
  pub root_path: String,
  /// Search path when PATH is unset for everyone else. The leading empty
  /// entry is the current directory.
  pub user_path: String,
}

impl Default for ExecConfig {
  fn default() -> Self {
    Self {
      shell: PathBuf::from("/bin/sh"),
      root_path: "/bin:/usr/bin".to_string(),
      user_path: ":/bin:/usr/bin".to_string(),
    }
  }
}

/// Effective configuration after merging defaults, global, and explicit config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
  pub log_level: LogLevel,
  pub exec: ExecConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct PartialExecConfig {
  pub shell: Option<PathBuf>,
  pub root_path: Option<String>,
  pub user_path: Option<String>,
}

impl PartialExecConfig {
  fn merge_over(self, base: ExecConfig) -> ExecConfig {
    ExecConfig {
      shell: self.shell.unwrap_or(base.shell),
      root_path: self.root_path.unwrap_or(base.root_path),
      user_path: self.user_path.unwrap_or(base.user_path),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct PartialConfig {
  pub log_level: Option<LogLevel>,
  pub exec: Option<PartialExecConfig>,
}

impl PartialConfig {
  fn merge_over(self, base: Config) -> Config {
    Config {
      log_level: self.log_level.unwrap_or(base.log_level),
      exec: self.exec.unwrap_or_default().merge_over(base.exec),
    }
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("toml: {0}")]
  Toml(#[from] toml::de::Error),
  #[error("shell `{0}` must be an absolute path")]
  RelativeShell(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Location of the global config file (~/.config/coproc/config.toml)
pub fn global_config_path() -> Option<PathBuf> {
  dirs::config_dir().map(|p| p.join("coproc").join("config.toml"))
}

/// Load configuration: the global file if present, then `explicit`, which
/// must exist when given. Later layers override earlier ones.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
  let mut cfg = Config::default();

  if let Some(global_path) = global_config_path()
    && let Ok(s) = fs::read_to_string(&global_path)
  {
    let partial: PartialConfig = toml::from_str(&s)?;
    cfg = partial.merge_over(cfg);
  }

  if let Some(path) = explicit {
    let s = fs::read_to_string(path)?;
    let partial: PartialConfig = toml::from_str(&s)?;
    cfg = partial.merge_over(cfg);
  }

  validate(&cfg)?;
  Ok(cfg)
}

/// Test helper: load configuration from explicit file paths (if present).
#[cfg(test)]
pub(crate) fn load_from_paths(global: Option<&Path>, explicit: Option<&Path>) -> Result<Config> {
  let mut cfg = Config::default();
  for path in [global, explicit].into_iter().flatten() {
    if let Ok(s) = fs::read_to_string(path) {
      let partial: PartialConfig = toml::from_str(&s)?;
      cfg = partial.merge_over(cfg);
    }
  }
  validate(&cfg)?;
  Ok(cfg)
}

fn validate(cfg: &Config) -> Result<()> {
  if !cfg.exec.shell.is_absolute() {
    return Err(ConfigError::RelativeShell(cfg.exec.shell.clone()));
  }
  Ok(())
}
