use std::ffi::OsString;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use nix::pty::Winsize;
use nix::sys::termios::Termios;
use nix::unistd::{ForkResult, fork};
use tracing::{info, warn};

use crate::adapters::pty::{self, NativePty, PtyAllocator};
use crate::command::{CommandKind, CommandSpec, classify};
use crate::config::ExecConfig;
use crate::error::{CoprocError, InvalidArgument, Result};
use crate::exec::{EXIT_SETUP_FAILED, ExecPlan, ResolveContext};
use crate::lifecycle::Coprocess;
use crate::transport::{FdSlot, PipeEnds, PipePair, PtyEnds, Transport, wire_onto};

/// Smallest slave-name buffer a pty launch accepts, in bytes.
pub const MIN_SLAVE_NAME_CAPACITY: usize = 64;

/// Options of a pty launch.
#[derive(Clone)]
pub struct PtyOptions {
  /// Room for the slave device name including its NUL terminator.
  pub slave_name_capacity: usize,
  /// Terminal attributes applied to the slave (`TCSANOW`) before exec.
  pub termios: Option<Termios>,
  pub winsize: Option<Winsize>,
}

impl Default for PtyOptions {
  fn default() -> Self {
    Self {
      slave_name_capacity: MIN_SLAVE_NAME_CAPACITY,
      termios: None,
      winsize: None,
    }
  }
}

/// Starts coprocesses. Holds the resolver configuration and the pty
/// allocation service; cheap to clone.
#[derive(Clone)]
pub struct Launcher {
  config: ExecConfig,
  search_path: Option<OsString>,
  pty: Arc<dyn PtyAllocator>,
}

impl Default for Launcher {
  fn default() -> Self {
    Self::new(ExecConfig::default())
  }
}

impl Launcher {
  pub fn new(config: ExecConfig) -> Self {
    Self {
      config,
      search_path: None,
      pty: Arc::new(NativePty),
    }
  }

  /// Search bare command names along `path` instead of the caller's PATH.
  #[must_use]
  pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
    self.search_path = Some(path.into());
    self
  }

  #[must_use]
  pub fn with_pty_allocator(mut self, pty: Arc<dyn PtyAllocator>) -> Self {
    self.pty = pty;
    self
  }

  #[must_use]
  pub fn config(&self) -> &ExecConfig {
    &self.config
  }

  fn resolve_context(&self) -> ResolveContext {
    let mut ctx = ResolveContext::from_process();
    if let Some(path) = &self.search_path {
      ctx.search_path = Some(path.clone());
    }
    ctx
  }

  fn plan(&self, spec: &CommandSpec) -> Result<(CommandKind, ExecPlan)> {
    let kind = classify(spec)?;
    let plan = ExecPlan::build(spec, kind, &self.resolve_context(), &self.config)?;
    Ok((kind, plan))
  }

  /// Cleanup path: the launch error is what the caller sees, so a release
  /// failure is only logged.
  fn release_after_failure(&self, slave_name: &str) {
    if let Err(err) = self.pty.release(slave_name) {
      warn!(event = "pty_release_failed", slave = %slave_name, error = %err);
    }
  }

  /// Start `spec` with its stdin fed from one pipe and its stdout and
  /// stderr both feeding another.
  pub fn open_piped(&self, spec: &CommandSpec) -> Result<Coprocess> {
    let (kind, plan) = self.plan(spec)?;
    let pipes = PipePair::new()?;

    // SAFETY: the child branch only runs async-signal-safe code before exec.
    match unsafe { fork() }.map_err(|e| CoprocError::os("fork", e))? {
      ForkResult::Child => pipe_child(&pipes, &plan),
      ForkResult::Parent { child } => {
        let PipePair {
          to_write,
          from_read,
          ..
        } = pipes;
        info!(
          event = "coproc_open_piped",
          pid = child.as_raw(),
          command = %spec.command,
          kind = ?kind,
        );
        let transport = Transport::Pipe(PipeEnds {
          to: FdSlot::new(to_write),
          from: FdSlot::new(from_read),
        });
        Ok(Coprocess::new(child, transport))
      }
    }
  }

  /// Start `spec` on the slave side of a new pseudo-terminal. The returned
  /// handle reads and writes through the master.
  pub fn open_pty(&self, spec: &CommandSpec, opts: &PtyOptions) -> Result<Coprocess> {
    if opts.slave_name_capacity < MIN_SLAVE_NAME_CAPACITY {
      return Err(
        InvalidArgument::SlaveNameCapacity {
          capacity: opts.slave_name_capacity,
          minimum: MIN_SLAVE_NAME_CAPACITY,
        }
        .into(),
      );
    }
    let (kind, plan) = self.plan(spec)?;

    let pair = self.pty.open(opts.termios.as_ref(), opts.winsize.as_ref())?;
    if pair.slave_name.len() + 1 > opts.slave_name_capacity {
      self.release_after_failure(&pair.slave_name);
      return Err(CoprocError::SlaveNameTooLong {
        name: pair.slave_name,
        capacity: opts.slave_name_capacity,
      });
    }

    // SAFETY: the child branch only runs async-signal-safe code before exec.
    let forked = match unsafe { pty::fork_attached(&pair) } {
      Ok(forked) => forked,
      Err(err) => {
        self.release_after_failure(&pair.slave_name);
        return Err(err);
      }
    };
    match forked {
      ForkResult::Child => plan.exec(),
      ForkResult::Parent { child } => {
        let pty::PtyPair {
          master,
          slave_name,
          ..
        } = pair;
        info!(
          event = "coproc_open_pty",
          pid = child.as_raw(),
          command = %spec.command,
          kind = ?kind,
          slave = %slave_name,
        );
        let transport = Transport::Pty(PtyEnds {
          master: FdSlot::new(master),
          slave_name,
          allocator: Arc::clone(&self.pty),
        });
        Ok(Coprocess::new(child, transport))
      }
    }
  }
}

/// Child side of a pipe launch: stdin from the "to" pipe, stdout and stderr
/// into the "from" pipe, then exec. Never returns.
fn pipe_child(pipes: &PipePair, plan: &ExecPlan) -> ! {
  let to_read = pipes.to_read.as_raw_fd();
  let from_write = pipes.from_write.as_raw_fd();
  // SAFETY: async-signal-safe syscalls only; the parent keeps its own copies.
  unsafe {
    libc::close(pipes.to_write.as_raw_fd());
    libc::close(pipes.from_read.as_raw_fd());
    let wired = wire_onto(to_read, libc::STDIN_FILENO)
      && wire_onto(from_write, libc::STDOUT_FILENO)
      && libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) != -1;
    if !wired {
      libc::_exit(EXIT_SETUP_FAILED);
    }
  }
  plan.exec()
}

/// Launch `spec` over pipes with the default configuration.
pub fn open_piped(spec: &CommandSpec) -> Result<Coprocess> {
  Launcher::default().open_piped(spec)
}

/// Launch `spec` on a pseudo-terminal with the default configuration.
pub fn open_pty(spec: &CommandSpec, opts: &PtyOptions) -> Result<Coprocess> {
  Launcher::default().open_pty(spec, opts)
}
