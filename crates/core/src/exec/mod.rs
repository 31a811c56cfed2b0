//! The exec resolver.
//!
//! Resolution is split in two halves. [`ExecPlan::build`] runs in the parent
//! before fork: it performs the search-path expansion and converts every
//! string the child could need into NUL-terminated form. [`ExecPlan::exec`]
//! runs in the child and only walks the prepared arrays calling `execve`, so
//! nothing allocates, locks or logs between fork and exec.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;
use tracing::debug;

use crate::command::{CommandKind, CommandSpec};
use crate::config::ExecConfig;
use crate::error::{InvalidArgument, Result};

mod search;

pub use search::{ResolveContext, candidates};

/// Exit status of a child whose command could not be resolved to an image.
pub const EXIT_UNRESOLVED: i32 = 127;
/// Exit status of a child that failed to wire its standard streams.
pub const EXIT_SETUP_FAILED: i32 = 125;

/// A NUL-terminated `char *const[]` together with the strings it points into.
pub(crate) struct CStringArray {
  _owned: Vec<CString>,
  ptrs: Vec<*const libc::c_char>,
}

impl CStringArray {
  fn new(owned: Vec<CString>) -> Self {
    let ptrs = owned
      .iter()
      .map(|s| s.as_ptr())
      .chain(std::iter::once(std::ptr::null()))
      .collect();
    Self { _owned: owned, ptrs }
  }

  fn from_strs<I, S>(items: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
  {
    let owned = items
      .into_iter()
      .map(|s| cstring(s.as_ref()))
      .collect::<Result<Vec<_>>>()?;
    Ok(Self::new(owned))
  }

  fn as_ptr(&self) -> *const *const libc::c_char {
    self.ptrs.as_ptr()
  }
}

fn cstring(bytes: &[u8]) -> Result<CString> {
  CString::new(bytes).map_err(|_| InvalidArgument::NulByte.into())
}

/// One executable to try plus the shell invocation used when the kernel
/// does not recognise its header.
struct Candidate {
  path: CString,
  fallback: CStringArray,
}

enum Strategy {
  Shell { argv: CStringArray },
  Direct(Candidate),
  Search(Vec<Candidate>),
}

pub(crate) struct ExecPlan {
  shell: CString,
  argv: CStringArray,
  envv: CStringArray,
  strategy: Strategy,
}

impl ExecPlan {
  /// Prepare everything the child needs to replace itself with `spec`.
  pub(crate) fn build(
    spec: &CommandSpec,
    kind: CommandKind,
    ctx: &ResolveContext,
    config: &ExecConfig,
  ) -> Result<Self> {
    let shell = cstring(config.shell.as_os_str().as_bytes())?;
    let args: &[String] = spec.argv.as_deref().unwrap_or_default();
    let argv = CStringArray::from_strs(args)?;
    let envv = match &spec.envv {
      Some(envv) => CStringArray::from_strs(envv)?,
      None => inherited_env()?,
    };

    let strategy = match kind {
      CommandKind::Shell => Strategy::Shell {
        argv: CStringArray::from_strs(["sh", "-c", spec.command.as_str()])?,
      },
      CommandKind::Path => Strategy::Direct(candidate(Path::new(&spec.command), args, config)?),
      CommandKind::Bare => {
        let found = candidates(&spec.command, ctx, config);
        debug!(
          event = "coproc_resolve_candidates",
          command = %spec.command,
          count = found.len(),
          search_path = ?ctx.effective_path(config),
        );
        Strategy::Search(
          found
            .iter()
            .map(|path| candidate(path, args, config))
            .collect::<Result<Vec<_>>>()?,
        )
      }
    };

    Ok(Self {
      shell,
      argv,
      envv,
      strategy,
    })
  }

  /// Replace the current process image. Never returns: a failed resolution
  /// terminates the process with [`EXIT_UNRESOLVED`].
  ///
  /// Must only be called in a freshly forked child.
  pub(crate) fn exec(&self) -> ! {
    // The Rust runtime ignores SIGPIPE, and ignored dispositions survive
    // exec; give the new image the default one.
    // SAFETY: signal is async-signal-safe.
    unsafe {
      libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
    match &self.strategy {
      Strategy::Shell { argv } => {
        self.execve(&self.shell, argv);
      }
      Strategy::Direct(c) => {
        if self.execve(&c.path, &self.argv) == Errno::ENOEXEC {
          self.execve(&self.shell, &c.fallback);
        }
      }
      Strategy::Search(found) => {
        for c in found {
          match self.execve(&c.path, &self.argv) {
            Errno::EACCES => continue,
            Errno::ENOEXEC => {
              // One shell attempt, then the search is over.
              self.execve(&self.shell, &c.fallback);
              break;
            }
            _ => {}
          }
        }
      }
    }
    // SAFETY: _exit is async-signal-safe and skips atexit handlers and
    // stdio flushing that belong to the parent.
    unsafe { libc::_exit(EXIT_UNRESOLVED) }
  }

  /// Returns only on failure, with the errno `execve` left behind.
  fn execve(&self, path: &CString, argv: &CStringArray) -> Errno {
    // SAFETY: all three arrays are NUL-terminated and point into CStrings
    // owned by `self`, which outlives the call.
    unsafe {
      libc::execve(path.as_ptr(), argv.as_ptr(), self.envv.as_ptr());
    }
    Errno::last()
  }
}

/// `[<shell>, <path>, argv[1..]...]`: run `path` as a shell script with the
/// caller's arguments as positional parameters.
fn candidate(path: &Path, args: &[String], config: &ExecConfig) -> Result<Candidate> {
  let mut fallback = Vec::with_capacity(args.len() + 1);
  fallback.push(cstring(config.shell.as_os_str().as_bytes())?);
  fallback.push(cstring(path.as_os_str().as_bytes())?);
  for arg in args.iter().skip(1) {
    fallback.push(cstring(arg.as_bytes())?);
  }
  Ok(Candidate {
    path: cstring(path.as_os_str().as_bytes())?,
    fallback: CStringArray::new(fallback),
  })
}

fn inherited_env() -> Result<CStringArray> {
  let entries = std::env::vars_os().map(|(key, value)| {
    let mut entry = key.into_encoded_bytes();
    entry.push(b'=');
    entry.extend_from_slice(value.as_bytes());
    entry
  });
  CStringArray::from_strs(entries)
}
