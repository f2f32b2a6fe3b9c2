//! Turning declared redirects into open descriptors.
//!
//! [`apply`] runs in a freshly forked stage process, after the pipe ends are in
//! place and before the program image is replaced, so every descriptor it opens
//! belongs to exactly one child.

use crate::parser::{Redirect, RedirectKind};
use libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::unistd;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("{path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot replace standard stream: {0}")]
    Dup(#[from] nix::Error),
}

fn open_options(kind: RedirectKind) -> OpenOptions {
    let mut oopt = OpenOptions::new();
    match kind {
        RedirectKind::Input => oopt.read(true),
        RedirectKind::Output => oopt.write(true).create(true).truncate(true),
        RedirectKind::Append => oopt.append(true).create(true),
    };
    oopt
}

/// Open the redirect target with the mode its kind calls for.
///
/// An empty target (operator at end of line) fails like any missing path.
pub fn open_target(redirect: &Redirect) -> Result<File, RedirectError> {
    open_options(redirect.kind)
        .open(&redirect.target)
        .map_err(|source| RedirectError::Open {
            path: redirect.target.clone(),
            source,
        })
}

/// The standard stream a redirect replaces.
pub fn stream_of(kind: RedirectKind) -> i32 {
    match kind {
        RedirectKind::Input => STDIN_FILENO,
        RedirectKind::Output | RedirectKind::Append => STDOUT_FILENO,
    }
}

/// Replace the calling process's standard streams with the redirect targets.
///
/// Stops at the first failure; the caller aborts the stage.
pub fn apply(redirects: &[&Redirect]) -> Result<(), RedirectError> {
    for redirect in redirects {
        let file = open_target(redirect)?;
        unistd::dup2(file.as_raw_fd(), stream_of(redirect.kind))?;
        // the original descriptor is closed here
        drop(file);
    }
    Ok(())
}
