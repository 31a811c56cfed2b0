use std::os::fd::OwnedFd;

use crate::error::{CoprocError, Result};

/// Both pipes of a pipe transport, before the fork splits their ends between
/// parent and child.
///
/// Every end is created close-on-exec so that children forked concurrently
/// by other threads never inherit them; the child clears the flag on the two
/// ends it wires onto its standard streams.
pub(crate) struct PipePair {
  /// Parent writes, child reads (becomes the child's stdin).
  pub(crate) to_read: OwnedFd,
  pub(crate) to_write: OwnedFd,
  /// Child writes (stdout and stderr), parent reads.
  pub(crate) from_read: OwnedFd,
  pub(crate) from_write: OwnedFd,
}

impl PipePair {
  /// Create both pipes. If the second fails the first is released when its
  /// descriptors drop.
  pub(crate) fn new() -> Result<Self> {
    let (to_read, to_write) = cloexec_pipe()?;
    let (from_read, from_write) = cloexec_pipe()?;
    Ok(Self {
      to_read,
      to_write,
      from_read,
      from_write,
    })
  }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
  use nix::fcntl::OFlag;
  nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| CoprocError::os("pipe", e))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
  use std::os::fd::AsRawFd;

  let (r, w) = nix::unistd::pipe().map_err(|e| CoprocError::os("pipe", e))?;
  for fd in [&r, &w] {
    // SAFETY: fd is a valid open descriptor owned by this function.
    if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
      return Err(CoprocError::os("fcntl", nix::errno::Errno::last()));
    }
  }
  Ok((r, w))
}
