mod common;

use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use coproc_core::{
  CommandSpec, CoprocError, CoprocStatus, NativePty, PtyAllocator, PtyOptions, PtyPair, Transport,
};
use nix::pty::Winsize;
use nix::sys::termios::Termios;

use common::{launcher, read_n, read_to_end};

/// Delegates to the native allocator and records every release.
#[derive(Default)]
struct RecordingPty {
  rename: Option<String>,
  fail_open: bool,
  fail_release: bool,
  released: Mutex<Vec<String>>,
}

impl RecordingPty {
  fn released(&self) -> Vec<String> {
    self.released.lock().unwrap().clone()
  }
}

impl PtyAllocator for RecordingPty {
  fn open(&self, termios: Option<&Termios>, winsize: Option<&Winsize>) -> coproc_core::Result<PtyPair> {
    if self.fail_open {
      return Err(CoprocError::Os {
        op: "posix_openpt",
        source: nix::errno::Errno::EAGAIN,
      });
    }
    let mut pair = NativePty.open(termios, winsize)?;
    if let Some(name) = &self.rename {
      pair.slave_name = name.clone();
    }
    Ok(pair)
  }

  fn release(&self, slave_name: &str) -> coproc_core::Result<()> {
    self.released.lock().unwrap().push(slave_name.to_string());
    if self.fail_release {
      return Err(CoprocError::Os {
        op: "release",
        source: nix::errno::Errno::EPERM,
      });
    }
    Ok(())
  }
}

fn slave_name(transport: &Transport) -> String {
  match transport {
    Transport::Pty(p) => p.slave_name.clone(),
    Transport::Pipe(_) => panic!("expected a pty transport"),
  }
}

#[test]
fn cat_on_a_pty_echoes_input() -> Result<()> {
  let mut co = launcher().open_pty(&CommandSpec::program("cat", ["cat"]), &PtyOptions::default())?;
  assert!(co.transport().is_pty());
  co.write_all(b"abc\n")?;
  // Terminal echo first: "abc\r\n".
  let out = read_n(&mut co, 5)?;
  assert_eq!(&out[..3], b"abc");
  // Closing the master hangs up the session; either outcome is fine as long
  // as cat actually ran.
  let status = co.close()?;
  assert!(!status.is_unresolved(), "{status}");
  Ok(())
}

#[test]
fn pty_child_owns_the_slave_as_controlling_terminal() -> Result<()> {
  let mut co = launcher().open_pty(&CommandSpec::shell("tty; exit 0;"), &PtyOptions::default())?;
  let name = slave_name(co.transport());
  // The master reports EIO once the child is gone; that reads as end of stream.
  let out = read_to_end(&mut co)?;
  assert_eq!(out.trim_end(), name);
  assert_eq!(co.close()?, CoprocStatus::Exited(0));
  Ok(())
}

#[test]
fn window_size_reaches_the_child() -> Result<()> {
  let opts = PtyOptions {
    winsize: Some(Winsize {
      ws_row: 33,
      ws_col: 101,
      ws_xpixel: 0,
      ws_ypixel: 0,
    }),
    ..PtyOptions::default()
  };
  let mut co = launcher().open_pty(&CommandSpec::shell("stty size </dev/tty"), &opts)?;
  assert_eq!(read_to_end(&mut co)?.trim_end(), "33 101");
  co.close()?;
  Ok(())
}

#[test]
fn release_hook_runs_once_before_master_close() -> Result<()> {
  let alloc = Arc::new(RecordingPty::default());
  let mut co = launcher()
    .with_pty_allocator(alloc.clone())
    .open_pty(&CommandSpec::program("cat", ["cat"]), &PtyOptions::default())?;
  let name = slave_name(co.transport());
  assert!(alloc.released().is_empty());

  let first = co.close()?;
  assert_eq!(alloc.released(), vec![name.clone()]);
  assert!(co.transport().is_closed());

  assert_eq!(co.close()?, first);
  assert_eq!(alloc.released(), vec![name]);
  Ok(())
}

#[test]
fn oversized_slave_name_is_released_and_rejected() {
  let long = format!("/dev/{}", "p".repeat(80));
  let alloc = Arc::new(RecordingPty {
    rename: Some(long.clone()),
    ..RecordingPty::default()
  });
  let err = launcher()
    .with_pty_allocator(alloc.clone())
    .open_pty(&CommandSpec::program("cat", ["cat"]), &PtyOptions::default())
    .unwrap_err();
  assert!(matches!(
    &err,
    CoprocError::SlaveNameTooLong { name, capacity: 64 } if *name == long
  ));
  assert_eq!(err.raw_os_error(), Some(libc::ERANGE));
  assert_eq!(alloc.released(), vec![long]);
}

#[test]
fn release_failure_during_cleanup_keeps_the_launch_error() {
  let long = format!("/dev/{}", "p".repeat(80));
  let alloc = Arc::new(RecordingPty {
    rename: Some(long.clone()),
    fail_release: true,
    ..RecordingPty::default()
  });
  let err = launcher()
    .with_pty_allocator(alloc.clone())
    .open_pty(&CommandSpec::program("cat", ["cat"]), &PtyOptions::default())
    .unwrap_err();
  assert!(matches!(err, CoprocError::SlaveNameTooLong { .. }));
  assert_eq!(alloc.released(), vec![long]);
}

#[test]
fn larger_capacity_accepts_long_names() -> Result<()> {
  let long = format!("/dev/{}", "p".repeat(80));
  let alloc = Arc::new(RecordingPty {
    rename: Some(long.clone()),
    ..RecordingPty::default()
  });
  let opts = PtyOptions {
    slave_name_capacity: 128,
    ..PtyOptions::default()
  };
  let mut co = launcher()
    .with_pty_allocator(alloc.clone())
    .open_pty(&CommandSpec::program("true", ["true"]), &opts)?;
  assert_eq!(slave_name(co.transport()), long);
  co.close()?;
  assert_eq!(alloc.released(), vec![long]);
  Ok(())
}

#[test]
fn allocation_failure_is_reported_without_release() {
  let alloc = Arc::new(RecordingPty {
    fail_open: true,
    ..RecordingPty::default()
  });
  let err = launcher()
    .with_pty_allocator(alloc.clone())
    .open_pty(&CommandSpec::program("cat", ["cat"]), &PtyOptions::default())
    .unwrap_err();
  assert_eq!(err.raw_os_error(), Some(libc::EAGAIN));
  assert!(alloc.released().is_empty());
}

#[test]
fn close_input_is_a_no_op_on_a_pty() -> Result<()> {
  let mut co = launcher().open_pty(&CommandSpec::program("cat", ["cat"]), &PtyOptions::default())?;
  assert!(!co.close_input());
  assert!(co.input().is_some());
  co.close()?;
  Ok(())
}
