use coproc_core::{CommandKind, CommandSpec, InvalidArgument, SHELL_META_CHARACTERS, classify};
use proptest::prelude::*;

fn meta_char() -> impl Strategy<Value = char> {
  proptest::sample::select(SHELL_META_CHARACTERS.chars().collect::<Vec<_>>())
}

fn plain_word() -> impl Strategy<Value = String> {
  "[A-Za-z0-9_.+-]{1,16}"
}

proptest! {
  #[test]
  fn meta_commands_require_absent_argv(
    head in plain_word(),
    meta in meta_char(),
    tail in plain_word(),
  ) {
    let command = format!("{head}{meta}{tail}");
    prop_assert_eq!(
      classify(&CommandSpec::shell(command.clone())).unwrap(),
      CommandKind::Shell
    );
    let with_argv = CommandSpec {
      command,
      argv: Some(vec![head]),
      envv: None,
    };
    prop_assert!(matches!(
      classify(&with_argv),
      Err(coproc_core::CoprocError::InvalidArgument(InvalidArgument::ArgvWithShellCommand))
    ));
  }

  #[test]
  fn plain_commands_require_argv(word in plain_word()) {
    prop_assert!(matches!(
      classify(&CommandSpec::shell(word.clone())),
      Err(coproc_core::CoprocError::InvalidArgument(InvalidArgument::MissingArgv))
    ));
    prop_assert_eq!(
      classify(&CommandSpec::program(word.clone(), [word])).unwrap(),
      CommandKind::Bare
    );
  }

  #[test]
  fn slash_selects_direct_execution(dir in plain_word(), name in plain_word()) {
    let command = format!("{dir}/{name}");
    prop_assert_eq!(
      classify(&CommandSpec::program(command, [name])).unwrap(),
      CommandKind::Path
    );
  }
}
