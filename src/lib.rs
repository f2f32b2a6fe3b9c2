//! A small Unix command-line interpreter.
//!
//! A line is split into whitespace-separated words, chained into stages with
//! `|`, decorated with `<`, `>` and `>>` redirections, and optionally sent to
//! the background with `&`. Every stage of a pipeline runs in its own forked
//! process, connected to its neighbours by pipes; programs are looked up along
//! `PATH`.
//!
//! The builtins `cd`, `exit`, `cut`, `sysinfo` and `chatroom` run in the
//! interpreter itself when they are the only stage. `chatroom` is a multi-user
//! chat built on a directory of named pipes, see [`chat`].
//!
//! The main entry point is [`Interpreter`]. The public modules [`command`] and
//! [`env`] expose traits and types for implementing your own builtins.

mod builtin;
pub mod chat;
pub mod command;
pub mod config;
pub mod env;
pub mod exec;
mod external;
mod interpreter;
mod io_adapters;
pub mod job;
mod lexer;
pub mod parser;
pub mod redirect;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
