//! Process orchestration: one process per stage, pipes between neighbours.

use crate::command::{CommandFactory, ExecutableCommand, ExitCode, NOT_EXECUTABLE, NOT_FOUND};
use crate::env::Environment;
use crate::external::find_command_path;
use crate::io_adapters::{RawStdin, RawStdout};
use crate::job::{JobTable, WaitStatusExt};
use crate::parser::{Pipeline, Stage};
use crate::redirect;
use anyhow::Context;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::sys::wait::waitpid;
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::CString;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Failures that abort a whole pipeline invocation.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("cannot create pipe: {0}")]
    Pipe(#[source] nix::Error),
    #[error("cannot fork: {0}")]
    Fork(#[source] nix::Error),
    #[error("cannot wait for {pid}: {source}")]
    Wait {
        pid: Pid,
        #[source]
        source: nix::Error,
    },
}

/// What happened to a pipeline once control returns to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every stage terminated; status of the last one.
    Finished(ExitCode),
    /// Stages left running in the background.
    Background { job: usize, pids: Vec<Pid> },
}

pub struct Orchestrator<'a> {
    builtins: &'a [Box<dyn CommandFactory>],
    jobs: &'a mut JobTable,
}

impl<'a> Orchestrator<'a> {
    pub fn new(builtins: &'a [Box<dyn CommandFactory>], jobs: &'a mut JobTable) -> Self {
        Self { builtins, jobs }
    }

    /// Execute a parsed line.
    ///
    /// A builtin that is the only stage runs in this process. Everything else is
    /// forked, one process per stage. Forked children allocate before `execve`,
    /// so the calling process should be single-threaded.
    pub fn run(&mut self, pipeline: &Pipeline, env: &mut Environment) -> Result<Outcome, ExecError> {
        let stages = &pipeline.stages;
        if let [stage] = stages.as_slice() {
            if stage.name.is_none() {
                return Ok(Outcome::Finished(0));
            }
            if let Some(cmd) = self.create_builtin(stage, env) {
                return Ok(Outcome::Finished(run_builtin_here(cmd, stage, env)));
            }
        }

        // Buffered output would otherwise be duplicated into every child.
        let _ = io::stdout().flush();

        let mut pids = Vec::with_capacity(stages.len());
        if let Err(e) = self.spawn_chain(stages, true, None, env, &mut pids) {
            // Stages already started see their pipes close; collect them.
            for pid in pids {
                let _ = wait_for(pid);
            }
            return Err(e);
        }

        if pipeline.is_background() {
            let job = self.jobs.register(pids.clone(), pipeline.line.clone());
            return Ok(Outcome::Background { job, pids });
        }

        let mut status = 0;
        for pid in pids {
            status = wait_for(pid)?;
        }
        Ok(Outcome::Finished(status))
    }

    fn create_builtin(&self, stage: &Stage, env: &Environment) -> Option<Box<dyn ExecutableCommand>> {
        let name = stage.name.as_deref()?;
        let args: Vec<&str> = stage.argv.iter().skip(1).map(String::as_str).collect();
        self.builtins
            .iter()
            .find_map(|factory| factory.try_create(env, name, &args))
    }

    /// Fork the first stage of `stages` and recurse on the rest, handing it the
    /// read end of the connecting pipe.
    ///
    /// The parent keeps no pipe end past the fork of the process that needs it.
    fn spawn_chain(
        &self,
        stages: &[Stage],
        is_first: bool,
        stdin: Option<OwnedFd>,
        env: &mut Environment,
        pids: &mut Vec<Pid>,
    ) -> Result<(), ExecError> {
        let Some((stage, rest)) = stages.split_first() else {
            return Ok(());
        };
        let is_last = rest.is_empty();
        let (next_stdin, stdout) = if is_last {
            (None, None)
        } else {
            let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(ExecError::Pipe)?;
            (Some(read), Some(write))
        };

        // SAFETY: the child allocates before exec, which is sound only if no
        // other thread holds a lock at fork time other than malloc's (glibc
        // resets those in its fork handlers). The shell binary has one thread;
        // multi-threaded callers such as test harnesses must not log or lock
        // stdio from other threads while a pipeline starts.
        match unsafe { unistd::fork() }.map_err(ExecError::Fork)? {
            ForkResult::Child => {
                drop(next_stdin);
                let code = self.run_stage(stage, stdin, stdout, is_first, is_last, env);
                // SAFETY: skips atexit handlers and stdio buffers owned by the parent.
                unsafe { libc::_exit(code) }
            }
            ForkResult::Parent { child } => {
                debug!(pid = child.as_raw(), name = ?stage.name, "stage spawned");
                pids.push(child);
            }
        }
        drop(stdin);
        drop(stdout);
        self.spawn_chain(rest, false, next_stdin, env, pids)
    }

    /// Body of a forked stage process. Errors end only this stage.
    fn run_stage(
        &self,
        stage: &Stage,
        stdin: Option<OwnedFd>,
        stdout: Option<OwnedFd>,
        is_first: bool,
        is_last: bool,
        env: &mut Environment,
    ) -> ExitCode {
        match self.exec_stage(stage, stdin, stdout, is_first, is_last, env) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("shellish: {e:#}");
                1
            }
        }
    }

    fn exec_stage(
        &self,
        stage: &Stage,
        stdin: Option<OwnedFd>,
        stdout: Option<OwnedFd>,
        is_first: bool,
        is_last: bool,
        env: &mut Environment,
    ) -> anyhow::Result<ExitCode> {
        if let Some(fd) = stdin {
            unistd::dup2(fd.as_raw_fd(), STDIN_FILENO).context("stdin")?;
        }
        if let Some(fd) = stdout {
            unistd::dup2(fd.as_raw_fd(), STDOUT_FILENO).context("stdout")?;
        }
        let Some(name) = stage.name.as_deref() else {
            return Ok(0);
        };

        redirect::apply(&stage.effective_redirects(is_first, is_last))
            .with_context(|| name.to_string())?;

        if let Some(cmd) = self.create_builtin(stage, env) {
            let mut out = RawStdout::new();
            return Ok(run_builtin(cmd, &mut RawStdin::new(), &mut out, env));
        }

        let Some(path) = find_command_path(&env.search_path(), Path::new(name)) else {
            let _ = writeln!(RawStdout::new(), "{name}: command not found");
            return Ok(NOT_FOUND);
        };
        let prog = CString::new(path.as_os_str().as_bytes())?;
        let argv = stage
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        match unistd::execve(&prog, &argv, &env.to_envp()) {
            Ok(never) => match never {},
            Err(e) => {
                eprintln!("shellish: {name}: {e}");
                Ok(NOT_EXECUTABLE)
            }
        }
    }
}

/// Run a builtin; its error text goes to its own stdout with status 1.
fn run_builtin(
    cmd: Box<dyn ExecutableCommand>,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    env: &mut Environment,
) -> ExitCode {
    let code = match cmd.execute(stdin, stdout, env) {
        Ok(code) => code,
        Err(e) => {
            let _ = writeln!(stdout, "{e:#}");
            1
        }
    };
    let _ = stdout.flush();
    code
}

/// Run a single-stage builtin in the interpreter process.
///
/// Redirect targets are opened for this one invocation and closed when it
/// returns, so nothing outlives the command.
fn run_builtin_here(cmd: Box<dyn ExecutableCommand>, stage: &Stage, env: &mut Environment) -> ExitCode {
    let mut stdin: Box<dyn Read> = Box::new(io::stdin().lock());
    let mut stdout: Box<dyn Write> = Box::new(io::stdout().lock());
    for r in stage.effective_redirects(true, true) {
        match redirect::open_target(r) {
            Ok(file) if r.kind.is_output() => stdout = Box::new(file),
            Ok(file) => stdin = Box::new(file),
            Err(e) => {
                eprintln!("shellish: {}: {e}", stage.name.as_deref().unwrap_or_default());
                return 1;
            }
        }
    }
    run_builtin(cmd, &mut stdin, &mut stdout, env)
}

/// Block until `pid` terminates and return its shell-style status.
fn wait_for(pid: Pid) -> Result<ExitCode, ExecError> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(code) = status.code() {
                    info!(pid = pid.as_raw(), code, "stage finished");
                    return Ok(code);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(source) => return Err(ExecError::Wait { pid, source }),
        }
    }
}
