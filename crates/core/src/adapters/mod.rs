//! Boundaries to services the engine consumes but does not own.

pub mod pty;
