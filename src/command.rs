use crate::env::Environment;
use anyhow::Result;
use std::io::{Read, Write};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Stages killed by a signal report `128 + signal`, as POSIX shells do.
pub type ExitCode = i32;

/// Status of a stage whose command could not be resolved.
pub const NOT_FOUND: ExitCode = 127;

/// Status of a stage whose program was found but could not be started.
pub const NOT_EXECUTABLE: ExitCode = 126;

/// Object-safe trait for any command that runs inside the interpreter's code
/// rather than as a separate program.
///
/// Streams are whatever the stage is wired to: the terminal, redirect targets,
/// or pipe ends when the command runs inside a forked pipeline stage.
pub trait ExecutableCommand {
    /// Executes the command.
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;
}
