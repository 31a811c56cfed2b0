#![allow(dead_code)]

use std::os::fd::AsFd;
use std::time::Duration;

use anyhow::{Context, Result};
use coproc_core::{Coprocess, Launcher};

pub const TIMEOUT: Duration = Duration::from_secs(10);
pub const SYSTEM_PATH: &str = "/bin:/usr/bin";

/// Launcher that searches the system directories regardless of the test
/// process's PATH.
pub fn launcher() -> Launcher {
  Launcher::default().with_search_path(SYSTEM_PATH)
}

/// Read exactly `len` bytes of coprocess output, failing after [`TIMEOUT`].
pub fn read_n(co: &mut Coprocess, len: usize) -> Result<Vec<u8>> {
  let fd = co
    .output()
    .context("output already closed")?
    .try_clone_to_owned()?;
  let out = test_support::read_with_timeout(co, fd.as_fd(), len, TIMEOUT)?;
  Ok(out)
}

/// Read coprocess output until end of stream, failing after [`TIMEOUT`].
pub fn read_to_end(co: &mut Coprocess) -> Result<String> {
  let out = read_n(co, usize::MAX)?;
  Ok(String::from_utf8(out)?)
}
