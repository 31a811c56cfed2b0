use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Temporary directory holding executables for tests that exercise PATH
/// search and the headerless-script fallback.
pub struct TempScripts {
  pub root: tempfile::TempDir,
}

impl Default for TempScripts {
  fn default() -> Self {
    Self::new()
  }
}

impl TempScripts {
  pub fn new() -> Self {
    let root = tempfile::tempdir().expect("tempdir");
    Self { root }
  }

  /// Create the directory under `parent`.
  pub fn new_in<P: AsRef<Path>>(parent: P) -> Self {
    let root = tempfile::tempdir_in(parent).expect("tempdir");
    Self { root }
  }

  pub fn path(&self) -> PathBuf {
    self.root.path().to_path_buf()
  }

  /// Write `body` as an executable file (mode 0700) named `name`.
  /// No `#!` line is added, so the kernel refuses it with ENOEXEC.
  pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
    let path = self.root.path().join(name);
    write_executable(&path, body, 0o700);
    path
  }

  /// Write a file that exists on the search path but may not be executed.
  pub fn write_unexecutable(&self, name: &str, body: &str) -> PathBuf {
    let path = self.root.path().join(name);
    write_executable(&path, body, 0o600);
    path
  }
}

fn write_executable(path: &Path, body: &str, mode: u32) {
  use std::os::unix::fs::PermissionsExt as _;
  std::fs::write(path, body).expect("write script");
  let mut perms = std::fs::metadata(path).expect("stat script").permissions();
  perms.set_mode(mode);
  std::fs::set_permissions(path, perms).expect("chmod script");
}

/// Wait until `fd` is readable or `timeout` passes. Returns false on timeout.
pub fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> bool {
  let mut pfd = libc::pollfd {
    fd: fd.as_raw_fd(),
    events: libc::POLLIN,
    revents: 0,
  };
  let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
  // SAFETY: one valid pollfd on the stack.
  let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
  rc > 0
}

/// Read from `reader` until `len` bytes arrived, end of stream, or the
/// deadline. `fd` must be the descriptor `reader` reads from. Pass
/// `usize::MAX` to read until end of stream.
pub fn read_with_timeout<R: io::Read>(
  reader: &mut R,
  fd: BorrowedFd<'_>,
  len: usize,
  timeout: Duration,
) -> io::Result<Vec<u8>> {
  let deadline = Instant::now() + timeout;
  let mut out = Vec::new();
  let mut buf = [0u8; 256];
  while out.len() < len {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() || !wait_readable(fd, left) {
      return Err(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("read {} of {len} bytes before timeout", out.len()),
      ));
    }
    let want = (len - out.len()).min(buf.len());
    let n = reader.read(&mut buf[..want])?;
    if n == 0 {
      break;
    }
    out.extend_from_slice(&buf[..n]);
  }
  Ok(out)
}

/// Poll a condition repeatedly until it returns true or times out.
/// Returns true if condition met, false on timeout.
pub fn poll_until<F>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
  F: FnMut() -> bool,
{
  let start = Instant::now();
  loop {
    if check() {
      return true;
    }
    if start.elapsed() >= timeout {
      return false;
    }
    std::thread::sleep(interval);
  }
}
