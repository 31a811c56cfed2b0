use nix::errno::Errno;
use thiserror::Error;

use crate::config::ConfigError;

/// Why a launch request was rejected before anything was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidArgument {
  #[error("command must not be empty")]
  EmptyCommand,
  #[error("command, arguments and environment must not contain NUL bytes")]
  NulByte,
  #[error("command contains shell meta characters, argv must be absent")]
  ArgvWithShellCommand,
  #[error("command names a program, argv must be present")]
  MissingArgv,
  #[error("argv must contain at least the program name")]
  EmptyArgv,
  #[error("slave name capacity {capacity} is below the minimum of {minimum} bytes")]
  SlaveNameCapacity { capacity: usize, minimum: usize },
}

#[derive(Debug, Error)]
pub enum CoprocError {
  #[error("invalid argument: {0}")]
  InvalidArgument(#[from] InvalidArgument),
  #[error("{op} failed: {source}")]
  Os {
    op: &'static str,
    #[source]
    source: Errno,
  },
  #[error("slave device name `{name}` does not fit in {capacity} bytes")]
  SlaveNameTooLong { name: String, capacity: usize },
  #[error("config: {0}")]
  Config(#[from] ConfigError),
}

impl CoprocError {
  pub(crate) fn os(op: &'static str, source: Errno) -> Self {
    CoprocError::Os { op, source }
  }

  pub(crate) fn io(op: &'static str, err: &std::io::Error) -> Self {
    let errno = err.raw_os_error().map_or(Errno::EIO, Errno::from_raw);
    CoprocError::Os { op, source: errno }
  }

  /// The errno this error corresponds to: `EINVAL` for contract violations,
  /// `ERANGE` for a slave name that does not fit.
  #[must_use]
  pub fn raw_os_error(&self) -> Option<i32> {
    match self {
      CoprocError::InvalidArgument(_) => Some(Errno::EINVAL as i32),
      CoprocError::Os { source, .. } => Some(*source as i32),
      CoprocError::SlaveNameTooLong { .. } => Some(Errno::ERANGE as i32),
      CoprocError::Config(_) => None,
    }
  }

  #[must_use]
  pub fn is_invalid_argument(&self) -> bool {
    matches!(self, CoprocError::InvalidArgument(_))
  }
}

pub type Result<T> = std::result::Result<T, CoprocError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn contract_violations_map_to_einval() {
    let err = CoprocError::from(InvalidArgument::MissingArgv);
    assert!(err.is_invalid_argument());
    assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
  }

  #[test]
  fn os_errors_keep_their_errno() {
    let err = CoprocError::os("fork", Errno::EAGAIN);
    assert_eq!(err.raw_os_error(), Some(libc::EAGAIN));
    assert_eq!(err.to_string(), format!("fork failed: {}", Errno::EAGAIN));
  }

  #[test]
  fn io_errors_without_errno_become_eio() {
    let err = CoprocError::io("open slave", &std::io::Error::other("boom"));
    assert_eq!(err.raw_os_error(), Some(libc::EIO));
  }
}
