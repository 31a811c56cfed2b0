//! Coprocess execution engine.
//!
//! Starts a command as a child process whose standard streams are connected
//! to the caller, either over a pair of pipes or over a pseudo-terminal, and
//! later closes that channel and reaps the child.
//!
//! Quick start:
//! - Describe what to run with [`CommandSpec::shell`] or [`CommandSpec::program`].
//! - Start it with [`open_piped`] / [`open_pty`], or through a configured [`Launcher`].
//! - Read and write the returned [`Coprocess`], then [`Coprocess::close`] it for a [`CoprocStatus`].
//!
//! Commands containing shell metacharacters run under `sh -c`; a command with
//! a slash is executed as given; anything else is searched along PATH. A
//! child that cannot execute anything exits with [`EXIT_UNRESOLVED`].

pub mod adapters;
pub mod command;
pub mod config;
pub mod error;
pub mod exec;
pub mod launch;
pub mod lifecycle;
pub mod limits;
pub mod logging;
pub mod transport;

pub use adapters::pty::{NativePty, PtyAllocator, PtyPair};
pub use command::{CommandKind, CommandSpec, SHELL_META_CHARACTERS, classify, has_meta};
pub use error::{CoprocError, InvalidArgument, Result};
pub use exec::{EXIT_SETUP_FAILED, EXIT_UNRESOLVED};
pub use launch::{Launcher, MIN_SLAVE_NAME_CAPACITY, PtyOptions, open_piped, open_pty};
pub use lifecycle::{CoprocStatus, Coprocess};
pub use transport::Transport;
