use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::PathBuf;

use tracing::debug;

use crate::config::ExecConfig;
use crate::limits;

/// Inputs of the bare-name search, captured once in the parent at the call
/// boundary so the child never consults global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveContext {
  /// Colon-separated directory list; `None` means PATH was unset.
  pub search_path: Option<OsString>,
  pub privileged: bool,
  /// Longest candidate in bytes, NUL included.
  pub path_limit: usize,
}

impl ResolveContext {
  /// Capture the calling process's `PATH`, effective uid and path limit.
  #[must_use]
  pub fn from_process() -> Self {
    Self {
      search_path: std::env::var_os("PATH"),
      privileged: nix::unistd::geteuid().is_root(),
      path_limit: limits::path_max(std::path::Path::new("/")),
    }
  }

  /// The directory list actually searched: PATH, or the built-in default for
  /// the caller's privilege level.
  #[must_use]
  pub fn effective_path<'a>(&'a self, config: &'a ExecConfig) -> &'a OsStr {
    match &self.search_path {
      Some(path) => path.as_os_str(),
      None if self.privileged => OsStr::new(&config.root_path),
      None => OsStr::new(&config.user_path),
    }
  }
}

/// Every path to try for a bare `command`, in search order.
///
/// An empty entry means the current directory and yields the bare name.
/// Candidates that would not fit in `ctx.path_limit` are dropped.
#[must_use]
pub fn candidates(command: &str, ctx: &ResolveContext, config: &ExecConfig) -> Vec<PathBuf> {
  let path = ctx.effective_path(config);
  let mut out = Vec::new();
  for dir in path.as_bytes().split(|b| *b == b':') {
    let mut candidate = Vec::with_capacity(dir.len() + 1 + command.len());
    if !dir.is_empty() {
      candidate.extend_from_slice(dir);
      candidate.push(b'/');
    }
    candidate.extend_from_slice(command.as_bytes());
    if candidate.len() + 1 > ctx.path_limit {
      debug!(
        event = "coproc_candidate_skipped",
        len = candidate.len(),
        limit = ctx.path_limit,
        "candidate path exceeds limit"
      );
      continue;
    }
    out.push(PathBuf::from(OsString::from_vec(candidate)));
  }
  out
}
