use crate::command::{CommandFactory, ExitCode};
use crate::env::{Environment, USER_KEY};
use crate::exec::{Orchestrator, Outcome};
use crate::job::JobTable;
use crate::parser::{self, ParsingError};
use anyhow::Context;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, Write};
use tracing::debug;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports the builtins defined in this crate; anything else is left to
/// the executable search path.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// A minimal shell that runs pipelines of external programs and a few builtins.
///
/// The interpreter maintains an [`Environment`], the list of builtin
/// [`CommandFactory`] objects and the table of background jobs.
///
/// Example
/// ```no_run
/// use shellish::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.execute("ls -l | cut -d ' ' -f 1 > modes.txt");
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    builtins: Vec<Box<dyn CommandFactory>>,
    jobs: JobTable,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of builtins.
    pub fn new(env: Environment, builtins: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env,
            builtins,
            jobs: JobTable::new(),
        }
    }

    /// Interpreter with the default builtins over the given environment.
    pub fn with_environment(env: Environment) -> Self {
        Self::new(env, default_builtins())
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Whether `exit` has been run.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Parse and run one line.
    ///
    /// Returns `None` for a blank line. Errors are local to this line.
    pub fn run_line(&mut self, line: &str) -> anyhow::Result<Option<Outcome>> {
        let pipeline = match parser::parse_line(line) {
            Ok(p) => p,
            Err(ParsingError::Empty) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        debug!(stages = pipeline.stages.len(), background = pipeline.is_background(), "running");
        let outcome = Orchestrator::new(&self.builtins, &mut self.jobs)
            .run(&pipeline, &mut self.env)
            .with_context(|| pipeline.line.clone())?;
        Ok(Some(outcome))
    }

    /// Run one line and report the way an interactive shell does.
    ///
    /// Background jobs print `[job] pid` and count as success; failures are
    /// printed to stderr and give status 1.
    pub fn execute(&mut self, line: &str) -> ExitCode {
        match self.run_line(line) {
            Ok(None) => 0,
            Ok(Some(Outcome::Finished(code))) => code,
            Ok(Some(Outcome::Background { job, pids })) => {
                if let Some(pid) = pids.last() {
                    println!("[{job}] {pid}");
                }
                0
            }
            Err(e) => {
                eprintln!("shellish: {e:#}");
                1
            }
        }
    }

    /// Reap finished background jobs and announce them.
    pub fn report_finished_jobs(&mut self, out: &mut dyn Write) -> io::Result<()> {
        for job in self.jobs.reap() {
            writeln!(out, "[{}] Done ({}) {}", job.id, job.status, job.line)?;
        }
        out.flush()
    }

    fn prompt(&self) -> String {
        let user = self.env.get_var(USER_KEY).unwrap_or_default();
        let host = nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        format!("{}@{}:{} shellish$ ", user, host, self.env.current_dir.display())
    }

    /// Read-Eval-Print Loop until `exit` or end of input.
    pub fn repl(&mut self) -> rustyline::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;

        while !self.env.should_exit {
            self.report_finished_jobs(&mut io::stdout())?;
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.execute(&line);
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(0)
    }
}

fn default_builtins() -> Vec<Box<dyn CommandFactory>> {
    use crate::builtin::*;
    vec![
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Cut>::default()),
        Box::new(Factory::<Sysinfo>::default()),
        Box::new(Factory::<Chatroom>::default()),
    ]
}

impl Default for Interpreter {
    /// Create an interpreter over the process environment with the builtins
    /// `exit`, `cd`, `cut`, `sysinfo` and `chatroom`.
    fn default() -> Self {
        Self::with_environment(Environment::new())
    }
}
