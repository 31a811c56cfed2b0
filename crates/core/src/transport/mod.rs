use std::fs::File;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd, RawFd};
use std::sync::Arc;

use crate::adapters::pty::PtyAllocator;

mod pipe;

pub(crate) use pipe::PipePair;

/// A parent-side descriptor that is either open or in the closed state.
///
/// Closing is idempotent: the first call closes the descriptor, later calls
/// see the empty slot and do nothing.
#[derive(Debug, Default)]
pub struct FdSlot(Option<File>);

impl FdSlot {
  pub(crate) fn new(fd: OwnedFd) -> Self {
    Self(Some(File::from(fd)))
  }

  #[must_use]
  pub fn is_closed(&self) -> bool {
    self.0.is_none()
  }

  #[must_use]
  pub fn as_fd(&self) -> Option<BorrowedFd<'_>> {
    self.0.as_ref().map(AsFd::as_fd)
  }

  pub(crate) fn file(&self) -> Option<&File> {
    self.0.as_ref()
  }

  /// Close the descriptor if it is still open. Returns whether it was.
  pub fn close(&mut self) -> bool {
    self.0.take().is_some()
  }
}

/// Parent-side endpoints of a pipe transport.
#[derive(Debug)]
pub struct PipeEnds {
  /// Write end of the pipe feeding the child's stdin.
  pub to: FdSlot,
  /// Read end of the pipe carrying the child's stdout and stderr.
  pub from: FdSlot,
}

/// Parent-side endpoint of a pty transport.
pub struct PtyEnds {
  pub master: FdSlot,
  pub slave_name: String,
  pub(crate) allocator: Arc<dyn PtyAllocator>,
}

impl std::fmt::Debug for PtyEnds {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PtyEnds")
      .field("master", &self.master)
      .field("slave_name", &self.slave_name)
      .finish_non_exhaustive()
  }
}

/// The channel between parent and coprocess. Exactly one variant is live per
/// coprocess.
#[derive(Debug)]
pub enum Transport {
  Pipe(PipeEnds),
  Pty(PtyEnds),
}

impl Transport {
  /// Descriptor the parent writes to.
  pub(crate) fn input(&self) -> &FdSlot {
    match self {
      Transport::Pipe(p) => &p.to,
      Transport::Pty(p) => &p.master,
    }
  }

  /// Descriptor the parent reads from.
  pub(crate) fn output(&self) -> &FdSlot {
    match self {
      Transport::Pipe(p) => &p.from,
      Transport::Pty(p) => &p.master,
    }
  }

  /// True once every parent-side descriptor is in the closed state.
  #[must_use]
  pub fn is_closed(&self) -> bool {
    match self {
      Transport::Pipe(p) => p.to.is_closed() && p.from.is_closed(),
      Transport::Pty(p) => p.master.is_closed(),
    }
  }

  #[must_use]
  pub fn is_pty(&self) -> bool {
    matches!(self, Transport::Pty(_))
  }
}

/// Make `fd` available as `target` across exec. Child-side only: uses
/// nothing but async-signal-safe calls and leaves `fd` itself open.
///
/// Descriptors here are close-on-exec, and `dup2(fd, fd)` would not clear
/// that flag, so an fd already sitting on `target` has it cleared directly.
pub(crate) fn wire_onto(fd: RawFd, target: RawFd) -> bool {
  // SAFETY: plain descriptor syscalls on integers; no memory is touched.
  unsafe {
    if fd == target {
      libc::fcntl(fd, libc::F_SETFD, 0) != -1
    } else {
      libc::dup2(fd, target) != -1
    }
  }
}
