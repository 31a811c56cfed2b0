//! Launches that consult the process-wide PATH. Serialized because they
//! mutate it.

mod common;

use anyhow::Result;
use coproc_core::{CommandSpec, CoprocStatus, open_piped};
use serial_test::serial;
use test_support::TempScripts;

use common::read_to_end;

#[test]
#[serial]
fn bare_names_are_searched_along_the_callers_path() -> Result<()> {
  let dir = TempScripts::new();
  dir.write_script("script", "echo $*\n");
  let path = format!("{}:/bin:/usr/bin", dir.path().display());
  let out = temp_env::with_var("PATH", Some(path), || -> Result<String> {
    let mut co = open_piped(&CommandSpec::program("script", ["script", "a", "b", "c"]))?;
    co.close_input();
    let out = read_to_end(&mut co)?;
    assert_eq!(co.close()?, CoprocStatus::Exited(0));
    Ok(out)
  })?;
  assert_eq!(out, "a b c\n");
  Ok(())
}

#[test]
#[serial]
fn unset_path_falls_back_to_system_directories() -> Result<()> {
  let out = temp_env::with_var_unset("PATH", || -> Result<String> {
    let mut co = open_piped(&CommandSpec::program("echo", ["echo", "found"]))?;
    let out = read_to_end(&mut co)?;
    co.close()?;
    Ok(out)
  })?;
  assert_eq!(out, "found\n");
  Ok(())
}

#[test]
#[serial]
fn path_is_read_from_the_caller_not_from_envv() -> Result<()> {
  let dir = TempScripts::new();
  dir.write_script("only-here", "echo here\n");
  let path = dir.path().display().to_string();
  let out = temp_env::with_var("PATH", Some(path), || -> Result<String> {
    let spec = CommandSpec::program("only-here", ["only-here"]).with_env(["PATH=/nonexistent"]);
    let mut co = open_piped(&spec)?;
    let out = read_to_end(&mut co)?;
    co.close()?;
    Ok(out)
  })?;
  assert_eq!(out, "here\n");
  Ok(())
}
