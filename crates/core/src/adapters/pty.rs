use std::fs::OpenOptions;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::pty::{PtyMaster, Winsize, grantpt, posix_openpt, unlockpt};
use nix::sys::termios::{SetArg, Termios, tcsetattr};
use nix::unistd::{ForkResult, fork};
use tracing::debug;

use crate::error::{CoprocError, Result};
use crate::exec::EXIT_SETUP_FAILED;
use crate::transport::wire_onto;

/// A freshly allocated pseudo-terminal, both sides open in the parent.
#[derive(Debug)]
pub struct PtyPair {
  pub master: OwnedFd,
  pub slave: OwnedFd,
  /// Device path of the slave, e.g. `/dev/pts/3`.
  pub slave_name: String,
}

/// The pty allocation service: hands out master/slave pairs and takes back
/// slave devices when a coprocess is closed.
pub trait PtyAllocator: Send + Sync {
  /// Allocate a pair and apply `termios` / `winsize` to the slave.
  fn open(&self, termios: Option<&Termios>, winsize: Option<&Winsize>) -> Result<PtyPair>;

  /// Return the slave device to the system. Called once per coprocess,
  /// before its master descriptor is closed.
  fn release(&self, slave_name: &str) -> Result<()>;
}

/// Unix98 ptys via `posix_openpt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePty;

impl PtyAllocator for NativePty {
  fn open(&self, termios: Option<&Termios>, winsize: Option<&Winsize>) -> Result<PtyPair> {
    let master = open_master()?;
    grantpt(&master).map_err(|e| CoprocError::os("grantpt", e))?;
    unlockpt(&master).map_err(|e| CoprocError::os("unlockpt", e))?;
    let slave_name = slave_name(&master)?;

    // std opens with O_CLOEXEC; O_NOCTTY keeps the parent's session intact.
    let slave = OpenOptions::new()
      .read(true)
      .write(true)
      .custom_flags(libc::O_NOCTTY)
      .open(&slave_name)
      .map_err(|e| CoprocError::io("open slave", &e))?;

    if let Some(t) = termios {
      tcsetattr(slave.as_fd(), SetArg::TCSANOW, t).map_err(|e| CoprocError::os("tcsetattr", e))?;
    }
    if let Some(ws) = winsize {
      // SAFETY: TIOCSWINSZ reads a `struct winsize` from the pointer, which
      // borrows a live value.
      let rc = unsafe { libc::ioctl(slave.as_raw_fd(), libc::TIOCSWINSZ as _, ws as *const Winsize) };
      if rc == -1 {
        return Err(CoprocError::os("ioctl(TIOCSWINSZ)", Errno::last()));
      }
    }

    debug!(event = "pty_open", slave = %slave_name, "allocated pty");
    // SAFETY: into_raw_fd transfers ownership of a valid open descriptor.
    let master = unsafe { OwnedFd::from_raw_fd(master.into_raw_fd()) };
    Ok(PtyPair {
      master,
      slave: OwnedFd::from(slave),
      slave_name,
    })
  }

  fn release(&self, slave_name: &str) -> Result<()> {
    // Unix98 slaves go away with the last descriptor; ownership and mode
    // were never changed, so there is nothing to restore.
    debug!(event = "pty_release", slave = %slave_name, "released pty slave");
    Ok(())
  }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn open_master() -> Result<PtyMaster> {
  posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_CLOEXEC)
    .map_err(|e| CoprocError::os("posix_openpt", e))
}

/// `posix_openpt` here does not take `O_CLOEXEC`; the flag is set right after.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn open_master() -> Result<PtyMaster> {
  let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY)
    .map_err(|e| CoprocError::os("posix_openpt", e))?;
  set_cloexec(&master)?;
  Ok(master)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_cloexec(master: &PtyMaster) -> Result<()> {
  // SAFETY: flag update on a valid descriptor.
  if unsafe { libc::fcntl(master.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
    return Err(CoprocError::os("fcntl", Errno::last()));
  }
  Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn slave_name(master: &PtyMaster) -> Result<String> {
  nix::pty::ptsname_r(master).map_err(|e| CoprocError::os("ptsname", e))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn slave_name(master: &PtyMaster) -> Result<String> {
  // SAFETY: the launcher is the only caller of ptsname in this process.
  unsafe { nix::pty::ptsname(master) }.map_err(|e| CoprocError::os("ptsname", e))
}

/// Fork a child whose session's controlling terminal is the slave of
/// `pair`, with the slave on stdin, stdout and stderr.
///
/// In the child this returns `ForkResult::Child` with the streams wired; a
/// wiring failure exits with [`EXIT_SETUP_FAILED`] instead.
///
/// # Safety
/// Same contract as [`nix::unistd::fork`]: in the child only
/// async-signal-safe functions may be called before exec.
pub(crate) unsafe fn fork_attached(pair: &PtyPair) -> Result<ForkResult> {
  // SAFETY: forwarded to the caller.
  let forked = unsafe { fork() }.map_err(|e| CoprocError::os("fork", e))?;
  if let ForkResult::Child = forked {
    let slave = pair.slave.as_raw_fd();
    // SAFETY: async-signal-safe syscalls on descriptors inherited from the
    // parent; the child only exits from here.
    unsafe {
      libc::close(pair.master.as_raw_fd());
      let attached = libc::setsid() != -1
        && libc::ioctl(slave, libc::TIOCSCTTY as _, 0) != -1
        && wire_onto(slave, libc::STDIN_FILENO)
        && wire_onto(slave, libc::STDOUT_FILENO)
        && wire_onto(slave, libc::STDERR_FILENO);
      if !attached {
        libc::_exit(EXIT_SETUP_FAILED);
      }
    }
  }
  Ok(forked)
}
