//! Command-line options.

use crate::env::{CHAT_DIR_KEY, Environment};
use argh::FromArgs;
use std::path::PathBuf;

#[derive(FromArgs, Debug, PartialEq, Eq)]
/// A small shell with pipelines, redirection, background jobs and a
/// named-pipe chat room. Set SHELLISH_LOG to control diagnostics.
pub struct Config {
    #[argh(option, short = 'c')]
    /// run a single command line and exit with its status
    pub command: Option<String>,

    #[argh(option)]
    /// directory holding chat rooms (default: $SHELLISH_CHAT_DIR, else the
    /// system temporary directory)
    pub chat_dir: Option<PathBuf>,
}

impl Config {
    /// Push command-line settings into the shell environment.
    pub fn apply(&self, env: &mut Environment) {
        if let Some(dir) = &self.chat_dir {
            env.set_var(CHAT_DIR_KEY, dir.to_string_lossy());
        }
    }
}
