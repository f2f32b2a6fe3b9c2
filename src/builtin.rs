use crate::chat::{self, Room};
use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::{Environment, USER_KEY};
use crate::external::find_command_path;
use crate::interpreter::Factory;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed without
/// resolving an external program.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cut" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match <T as BuiltinCommand>::execute(*self, stdin, stdout, env) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(stdout, "{e:#}")?;
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.output.trim_end())?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// change the current working directory; does nothing without an argument.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => return Ok(0),
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// leave the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print selected fields of every line read from standard input.
pub struct Cut {
    #[argh(option, short = 'd')]
    /// field delimiter, a single character; `\t` means TAB, which is also the default.
    pub delimiter: Option<String>,

    #[argh(option, short = 'f')]
    /// comma-separated list of 1-based field numbers.
    pub fields: Option<String>,
}

impl Cut {
    fn delimiter(&self) -> Result<char> {
        match self.delimiter.as_deref() {
            None | Some("\\t") => Ok('\t'),
            Some(d) => d.chars().next().context("cut: empty delimiter"),
        }
    }

    fn field_list(list: &str) -> Result<Vec<usize>> {
        list.split(',')
            .map(|f| {
                let n: usize = f
                    .trim()
                    .parse()
                    .with_context(|| format!("cut: invalid field number {f:?}"))?;
                if n == 0 {
                    bail!("cut: fields are numbered from 1");
                }
                Ok(n)
            })
            .collect()
    }
}

/// Concatenate the selected fields of one line, in input order.
///
/// Consecutive delimiters collapse: empty fields are not counted.
fn cut_line(line: &str, delimiter: char, fields: &[usize]) -> String {
    let mut out = String::new();
    let present = line.split(delimiter).filter(|f| !f.is_empty());
    for (i, field) in present.enumerate() {
        for _ in fields.iter().filter(|&&n| n == i + 1) {
            out.push_str(field);
        }
    }
    out
}

impl BuiltinCommand for Cut {
    fn name() -> &'static str {
        "cut"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let Some(list) = self.fields.as_deref() else {
            writeln!(stdout, "cut: missing -f option")?;
            return Ok(1);
        };
        let delimiter = self.delimiter()?;
        let fields = Cut::field_list(list)?;

        for line in BufReader::new(stdin).lines() {
            let line = line?;
            writeln!(stdout, "{}", cut_line(&line, delimiter, &fields))?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// report the user, host name, CPU count and memory usage.
pub struct Sysinfo {}

impl Sysinfo {
    /// Copy the output of an external tool, or say why there is none.
    fn report_tool(
        stdout: &mut dyn Write,
        env: &Environment,
        tool: &str,
        args: &[&str],
    ) -> Result<()> {
        let Some(path) = find_command_path(&env.search_path(), Path::new(tool)) else {
            writeln!(stdout, "unavailable ({tool}: command not found)")?;
            return Ok(());
        };
        match Command::new(&*path)
            .args(args)
            .env_clear()
            .envs(&env.vars)
            .current_dir(&env.current_dir)
            .output()
        {
            Ok(output) => stdout.write_all(&output.stdout)?,
            Err(e) => writeln!(stdout, "unavailable ({e})")?,
        }
        Ok(())
    }
}

impl BuiltinCommand for Sysinfo {
    fn name() -> &'static str {
        "sysinfo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "User: {}", env.get_var(USER_KEY).unwrap_or_default())?;
        let hostname = nix::unistd::gethostname().context("sysinfo: gethostname")?;
        writeln!(stdout, "Hostname: {}", hostname.to_string_lossy())?;
        write!(stdout, "CPU Cores: ")?;
        Sysinfo::report_tool(stdout, env, "nproc", &[])?;
        writeln!(stdout, "Memory Info:")?;
        Sysinfo::report_tool(stdout, env, "free", &["-h"])?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// chat with other shells through named pipes in a shared room directory.
pub struct Chatroom {
    #[argh(positional, greedy)]
    /// room to join, then the name other participants see.
    pub args: Vec<String>,
}

impl BuiltinCommand for Chatroom {
    fn name() -> &'static str {
        "chatroom"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let [room, username] = self.args.as_slice() else {
            writeln!(stdout, "usage: chatroom <room> <username>")?;
            return Ok(1);
        };
        let room = Room::open(&env.chat_dir(), room)?;
        let me = room.join(username)?;
        writeln!(stdout, "Welcome to {}!", room.name())?;
        chat::run_session(&me, stdin, stdout)
    }
}
