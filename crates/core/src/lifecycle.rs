use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::BorrowedFd;

use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::{CoprocError, Result};
use crate::exec::{EXIT_SETUP_FAILED, EXIT_UNRESOLVED};
use crate::transport::Transport;

/// How a coprocess ended, decoded from its wait status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoprocStatus {
  Exited(i32),
  Signaled { signal: i32, core_dumped: bool },
}

impl CoprocStatus {
  #[must_use]
  pub fn success(self) -> bool {
    self == CoprocStatus::Exited(0)
  }

  #[must_use]
  pub fn code(self) -> Option<i32> {
    match self {
      CoprocStatus::Exited(code) => Some(code),
      CoprocStatus::Signaled { .. } => None,
    }
  }

  #[must_use]
  pub fn signal(self) -> Option<i32> {
    match self {
      CoprocStatus::Signaled { signal, .. } => Some(signal),
      CoprocStatus::Exited(_) => None,
    }
  }

  /// The child never reached a program image: nothing on the search path
  /// could be executed.
  #[must_use]
  pub fn is_unresolved(self) -> bool {
    self == CoprocStatus::Exited(EXIT_UNRESOLVED)
  }

  /// The child could not wire its standard streams.
  #[must_use]
  pub fn is_setup_failure(self) -> bool {
    self == CoprocStatus::Exited(EXIT_SETUP_FAILED)
  }

  /// Shell-style exit code: the exit status, or 128 plus the signal number.
  #[must_use]
  pub fn exit_code(self) -> i32 {
    match self {
      CoprocStatus::Exited(code) => code,
      CoprocStatus::Signaled { signal, .. } => 128 + signal,
    }
  }
}

impl fmt::Display for CoprocStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CoprocStatus::Exited(code) => write!(f, "exited with status {code}"),
      CoprocStatus::Signaled {
        signal,
        core_dumped,
      } => {
        write!(f, "killed by signal {signal}")?;
        if *core_dumped {
          write!(f, " (core dumped)")?;
        }
        Ok(())
      }
    }
  }
}

/// A running (or reaped) coprocess and the parent's ends of its transport.
///
/// Reads return the child's stdout and stderr; writes feed its stdin.
pub struct Coprocess {
  pid: Pid,
  transport: Transport,
  status: Option<CoprocStatus>,
}

impl fmt::Debug for Coprocess {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Coprocess")
      .field("pid", &self.pid)
      .field("transport", &self.transport)
      .field("status", &self.status)
      .finish()
  }
}

impl Coprocess {
  pub(crate) fn new(pid: Pid, transport: Transport) -> Self {
    Self {
      pid,
      transport,
      status: None,
    }
  }

  #[must_use]
  pub fn pid(&self) -> Pid {
    self.pid
  }

  #[must_use]
  pub fn transport(&self) -> &Transport {
    &self.transport
  }

  /// Descriptor feeding the child's stdin, `None` once closed.
  #[must_use]
  pub fn input(&self) -> Option<BorrowedFd<'_>> {
    self.transport.input().as_fd()
  }

  /// Descriptor carrying the child's output, `None` once closed.
  #[must_use]
  pub fn output(&self) -> Option<BorrowedFd<'_>> {
    self.transport.output().as_fd()
  }

  /// Status from an earlier [`close`](Self::close).
  #[must_use]
  pub fn status(&self) -> Option<CoprocStatus> {
    self.status
  }

  /// Close the parent-to-child pipe so the child reads end of stream.
  /// Returns whether a descriptor was closed; always false on a pty, whose
  /// master carries both directions.
  pub fn close_input(&mut self) -> bool {
    match &mut self.transport {
      Transport::Pipe(p) => p.to.close(),
      Transport::Pty(_) => false,
    }
  }

  /// An independent descriptor for the child's input, e.g. for a writer thread.
  pub fn try_clone_input(&self) -> io::Result<File> {
    self
      .transport
      .input()
      .file()
      .ok_or_else(closed_error)?
      .try_clone()
  }

  /// Close every parent-side descriptor still open, then wait for the child
  /// and return how it ended.
  ///
  /// On a pty the slave device is released before the master is closed.
  /// Calling this again returns the recorded status. If waiting fails the
  /// descriptors stay closed and a later call waits again.
  pub fn close(&mut self) -> Result<CoprocStatus> {
    match &mut self.transport {
      Transport::Pipe(p) => {
        p.to.close();
        p.from.close();
      }
      Transport::Pty(p) => {
        if !p.master.is_closed() {
          if let Err(err) = p.allocator.release(&p.slave_name) {
            warn!(event = "pty_release_failed", slave = %p.slave_name, error = %err);
          }
          p.master.close();
        }
      }
    }
    debug!(event = "coproc_close", pid = self.pid.as_raw(), "descriptors closed");

    if let Some(status) = self.status {
      return Ok(status);
    }
    let status = wait(self.pid)?;
    info!(
      event = "coproc_wait",
      pid = self.pid.as_raw(),
      status = %status,
    );
    self.status = Some(status);
    Ok(status)
  }
}

fn wait(pid: Pid) -> Result<CoprocStatus> {
  loop {
    match waitpid(pid, None) {
      Ok(WaitStatus::Exited(_, code)) => return Ok(CoprocStatus::Exited(code)),
      Ok(WaitStatus::Signaled(_, signal, core_dumped)) => {
        return Ok(CoprocStatus::Signaled {
          signal: signal as i32,
          core_dumped,
        });
      }
      // Stops and continues are not terminations; keep waiting.
      Ok(_) | Err(Errno::EINTR) => continue,
      Err(e) => return Err(CoprocError::os("waitpid", e)),
    }
  }
}

fn closed_error() -> io::Error {
  io::Error::new(io::ErrorKind::NotConnected, "coprocess descriptor is closed")
}

impl Read for Coprocess {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let mut file = self.transport.output().file().ok_or_else(closed_error)?;
    match file.read(buf) {
      // A pty master reports EIO once the slave side is gone: end of stream.
      Err(e) if self.transport.is_pty() && e.raw_os_error() == Some(libc::EIO) => Ok(0),
      other => other,
    }
  }
}

impl Write for Coprocess {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let mut file = self.transport.input().file().ok_or_else(closed_error)?;
    file.write(buf)
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl Drop for Coprocess {
  fn drop(&mut self) {
    if self.status.is_none() {
      // Descriptors close with the slots; the child is left for the caller
      // or init to reap.
      warn!(
        event = "coproc_dropped_unreaped",
        pid = self.pid.as_raw(),
        "coprocess dropped without close"
      );
    }
  }
}
