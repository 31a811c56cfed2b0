use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use coproc_core::config::{self, LogLevel};
use coproc_core::{CommandSpec, Coprocess, Launcher, PtyOptions, has_meta, logging};
use tracing::debug;

/// End-of-transmission: what a terminal sends for Ctrl-D.
const EOT: u8 = 0x04;

/// Run a command as a coprocess, relay stdin to it and its output to stdout.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
  /// Attach the command to a new pseudo-terminal instead of pipes
  #[arg(long)]
  pty: bool,
  /// Configuration file layered over the global one
  #[arg(long, value_name = "FILE")]
  config: Option<PathBuf>,
  /// Write JSON logs to this file instead of stderr
  #[arg(long, value_name = "FILE")]
  log_file: Option<PathBuf>,
  /// Override the configured log level
  #[arg(long, value_enum, value_name = "LEVEL")]
  log_level: Option<LevelArg>,
  /// Program name, path, or a shell command line
  command: String,
  /// Arguments for a program (not allowed with a shell command line)
  #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
  args: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LevelArg {
  Off,
  Warn,
  Info,
  Debug,
  Trace,
}

impl From<LevelArg> for LogLevel {
  fn from(arg: LevelArg) -> Self {
    match arg {
      LevelArg::Off => LogLevel::Off,
      LevelArg::Warn => LogLevel::Warn,
      LevelArg::Info => LogLevel::Info,
      LevelArg::Debug => LogLevel::Debug,
      LevelArg::Trace => LogLevel::Trace,
    }
  }
}

impl Cli {
  fn command_spec(&self) -> Result<CommandSpec> {
    if has_meta(&self.command) {
      if !self.args.is_empty() {
        bail!(
          "`{}` is a shell command line; pass its arguments inside it",
          self.command
        );
      }
      return Ok(CommandSpec::shell(&self.command));
    }
    let argv = std::iter::once(self.command.clone()).chain(self.args.iter().cloned());
    Ok(CommandSpec::program(&self.command, argv))
  }
}

pub fn parse() -> Cli {
  Cli::parse()
}

/// Parse arguments, run the coprocess to completion and return the exit code
/// this process should end with.
pub fn run() -> Result<i32> {
  let cli = parse();
  let cfg = config::load(cli.config.as_deref()).context("failed to load configuration")?;
  let level = cli.log_level.map_or(cfg.log_level, LogLevel::from);
  logging::init(cli.log_file.as_deref(), level).context("failed to initialize logging")?;

  let spec = cli.command_spec()?;
  let launcher = Launcher::new(cfg.exec);
  let co = if cli.pty {
    launcher.open_pty(&spec, &PtyOptions::default())
  } else {
    launcher.open_piped(&spec)
  }
  .with_context(|| format!("failed to start `{}`", cli.command))?;

  relay(co)
}

fn relay(mut co: Coprocess) -> Result<i32> {
  let input = co.try_clone_input().context("failed to duplicate input")?;
  let pty = co.transport().is_pty();
  // The relay thread now holds the only pipe write end; the child sees end of
  // stream once it finishes. It is left detached if stdin never ends.
  co.close_input();
  thread::spawn(move || forward_stdin(input, pty));

  let copied = io::copy(&mut co, &mut io::stdout().lock());
  let status = co.close().context("failed to reap coprocess")?;
  debug!(event = "coproc_cli_done", status = %status);
  match copied {
    Ok(_) => {}
    // The reader went away (e.g. `| head`); the child's status still counts.
    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
    Err(e) => return Err(e).context("failed to copy output"),
  }
  Ok(status.exit_code())
}

fn forward_stdin(mut input: std::fs::File, pty: bool) {
  let result = io::copy(&mut io::stdin().lock(), &mut input).and_then(|_| {
    if pty {
      input.write_all(&[EOT])?;
    }
    Ok(())
  });
  if let Err(err) = result {
    debug!(event = "coproc_cli_stdin_closed", error = %err);
  }
}
