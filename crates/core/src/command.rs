use crate::error::{InvalidArgument, Result};

/// Characters that force a command through `sh -c`.
pub const SHELL_META_CHARACTERS: &str = "|&;()<>[]{}$`'~\"\\*? \t\r\n";

/// What to run: a command string, the argv handed to the program and the
/// environment it gets (`None` inherits the caller's environment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
  pub command: String,
  pub argv: Option<Vec<String>>,
  pub envv: Option<Vec<String>>,
}

impl CommandSpec {
  /// A shell command line; it must contain meta characters.
  pub fn shell(command: impl Into<String>) -> Self {
    Self {
      command: command.into(),
      argv: None,
      envv: None,
    }
  }

  /// A program name or path together with its full argv (including `argv[0]`).
  pub fn program<I, S>(command: impl Into<String>, argv: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      command: command.into(),
      argv: Some(argv.into_iter().map(Into::into).collect()),
      envv: None,
    }
  }

  /// Replace the inherited environment with explicit `NAME=value` entries.
  #[must_use]
  pub fn with_env<I, S>(mut self, envv: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.envv = Some(envv.into_iter().map(Into::into).collect());
    self
  }
}

/// How the exec resolver will treat a validated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
  /// Contains shell meta characters; run via `sh -c`.
  Shell,
  /// Contains a path separator; executed directly.
  Path,
  /// Bare program name; searched for along the search path.
  Bare,
}

impl CommandKind {
  #[must_use]
  pub fn has_meta(self) -> bool {
    self == CommandKind::Shell
  }
}

#[must_use]
pub fn has_meta(command: &str) -> bool {
  command.contains(|c: char| SHELL_META_CHARACTERS.contains(c))
}

/// Validate `spec` and decide how it will be executed.
///
/// Enforces the shell/program contract: a command with meta characters must
/// come without argv, any other command must come with one.
pub fn classify(spec: &CommandSpec) -> Result<CommandKind> {
  if spec.command.is_empty() {
    return Err(InvalidArgument::EmptyCommand.into());
  }
  let has_nul = spec.command.contains('\0')
    || strings_contain_nul(spec.argv.as_deref())
    || strings_contain_nul(spec.envv.as_deref());
  if has_nul {
    return Err(InvalidArgument::NulByte.into());
  }

  let meta = has_meta(&spec.command);
  match (meta, spec.argv.as_deref()) {
    (true, Some(_)) => Err(InvalidArgument::ArgvWithShellCommand.into()),
    (true, None) => Ok(CommandKind::Shell),
    (false, None) => Err(InvalidArgument::MissingArgv.into()),
    (false, Some([])) => Err(InvalidArgument::EmptyArgv.into()),
    (false, Some(_)) if spec.command.contains('/') => Ok(CommandKind::Path),
    (false, Some(_)) => Ok(CommandKind::Bare),
  }
}

fn strings_contain_nul(values: Option<&[String]>) -> bool {
  values.is_some_and(|vs| vs.iter().any(|v| v.contains('\0')))
}
