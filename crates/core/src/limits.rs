use std::path::Path;

use nix::unistd::{PathconfVar, pathconf};

/// Used when the system reports no limit for `PATH_MAX`.
pub const FALLBACK_PATH_MAX: usize = 4096;

/// Maximum length in bytes, including the terminating NUL, of a path
/// rooted at `dir`.
#[must_use]
pub fn path_max(dir: &Path) -> usize {
  match pathconf(dir, PathconfVar::PATH_MAX) {
    Ok(Some(limit)) if limit > 0 => usize::try_from(limit).unwrap_or(FALLBACK_PATH_MAX),
    _ => FALLBACK_PATH_MAX,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn root_has_a_usable_limit() {
    let limit = path_max(Path::new("/"));
    assert!(limit >= 256, "limit {limit}");
  }

  #[test]
  fn missing_directory_falls_back() {
    assert_eq!(
      path_max(Path::new("/definitely/not/here/at/all")),
      FALLBACK_PATH_MAX
    );
  }
}
