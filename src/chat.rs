//! Multi-party chat over a directory of named pipes.
//!
//! A room is a directory, every participant owns one FIFO in it named after
//! them. Each participant runs two roles at once:
//!
//! - the reader, a forked process that keeps opening its own FIFO for reading,
//!   prints whatever one writer session delivered, closes and starts over;
//! - the writer, on the interactive side, which opens every *other* FIFO in the
//!   room for writing and sends the formatted line.
//!
//! Opening a FIFO blocks until the other end is opened too, so delivery is a
//! rendezvous between one writer and one reader. A broadcast stalls on a peer
//! whose reader is busy printing until that reader loops back to `open`, and a
//! peer that left without removing its FIFO stalls it forever. Nothing here
//! tears a room down; pipe files outlive their participants.

use crate::command::ExitCode;
use crate::io_adapters::RawStdout;
use anyhow::{Context, Result, bail};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::stat::Mode;
use nix::sys::wait::waitpid;
use nix::unistd::{self, ForkResult};
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::fs::{DirBuilderExt, FileTypeExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory name prefix of every room.
pub const ROOM_PREFIX: &str = "chatroom-";

fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        bail!("invalid {kind} name: {name:?}");
    }
    Ok(())
}

/// A chat room: `<base>/chatroom-<name>`.
#[derive(Debug, Clone)]
pub struct Room {
    name: String,
    dir: PathBuf,
}

impl Room {
    /// Make sure the room directory exists. Opening an existing room is fine.
    pub fn open(base: &Path, name: &str) -> Result<Self> {
        check_name("room", name)?;
        let dir = base.join(format!("{ROOM_PREFIX}{name}"));
        DirBuilder::new()
            .recursive(true)
            .mode(0o777)
            .create(&dir)
            .with_context(|| format!("chatroom: cannot create {}", dir.display()))?;
        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the participant's FIFO unless it already exists.
    pub fn join(&self, username: &str) -> Result<Participant> {
        check_name("user", username)?;
        let pipe = self.dir.join(username);
        match unistd::mkfifo(&pipe, Mode::from_bits_truncate(0o666)) {
            Ok(()) | Err(Errno::EEXIST) => {}
            Err(e) => {
                return Err(e).with_context(|| format!("chatroom: mkfifo {}", pipe.display()));
            }
        }
        let meta = fs::metadata(&pipe)?;
        if !meta.file_type().is_fifo() {
            bail!("chatroom: {} exists and is not a named pipe", pipe.display());
        }
        info!(room = %self.name, user = username, "joined room");
        Ok(Participant {
            room: self.name.clone(),
            username: username.to_string(),
            dir: self.dir.clone(),
            pipe,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    room: String,
    username: String,
    dir: PathBuf,
    pipe: PathBuf,
}

impl Participant {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn pipe_path(&self) -> &Path {
        &self.pipe
    }

    pub fn prompt(&self) -> String {
        format!("[{}] {} > ", self.room, self.username)
    }

    /// Wire format of one message.
    pub fn format_message(&self, message: &str) -> String {
        format!("[{}] {}: {}\n", self.room, self.username, message)
    }

    /// One reader cycle: block until a writer opens our pipe, copy what it
    /// sends until it closes, then close our end.
    pub fn receive_into(&self, out: &mut dyn Write) -> io::Result<usize> {
        let mut pipe = File::open(&self.pipe)?;
        let mut buf = Vec::new();
        let n = pipe.read_to_end(&mut buf)?;
        if n > 0 {
            out.write_all(&buf)?;
            out.flush()?;
        }
        Ok(n)
    }

    /// Every named pipe in the room except our own, sorted by name.
    pub fn peers(&self) -> io::Result<Vec<(String, PathBuf)>> {
        let mut peers = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_fifo() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != self.username {
                peers.push((name, entry.path()));
            }
        }
        peers.sort();
        Ok(peers)
    }

    /// Send `message` to every peer, one blocking open/write/close each.
    ///
    /// Returns the names of the peers that got it.
    pub fn broadcast(&self, message: &str) -> io::Result<Vec<String>> {
        let wire = self.format_message(message);
        let mut delivered = Vec::new();
        for (name, path) in self.peers()? {
            let sent = OpenOptions::new()
                .write(true)
                .open(&path)
                .and_then(|mut pipe| pipe.write_all(wire.as_bytes()));
            match sent {
                Ok(()) => {
                    debug!(peer = %name, "message delivered");
                    delivered.push(name);
                }
                Err(e) => warn!(peer = %name, error = %e, "message not delivered"),
            }
        }
        Ok(delivered)
    }
}

/// Run both roles until `stdin` ends.
///
/// The reader is forked off and killed once the writer sees end of input.
/// Call it from a single-threaded process; the reader allocates after fork.
pub fn run_session(me: &Participant, stdin: &mut dyn Read, stdout: &mut dyn Write) -> Result<ExitCode> {
    stdout.flush()?;
    // SAFETY: the child allocates while it loops, which is sound only if no
    // other thread holds a lock besides malloc's at fork time. The shell binary
    // has one thread. The child never returns into the caller.
    let reader = match unsafe { unistd::fork() }.context("chatroom: cannot fork reader")? {
        ForkResult::Child => {
            let mut out = RawStdout::new();
            loop {
                if let Err(e) = me.receive_into(&mut out) {
                    eprintln!("chatroom: {}: {e}", me.pipe_path().display());
                    // SAFETY: leave without running the parent's exit handlers.
                    unsafe { libc::_exit(1) }
                }
            }
        }
        ForkResult::Parent { child } => child,
    };
    debug!(pid = reader.as_raw(), "reader started");

    let result = write_loop(me, stdin, stdout);

    if let Err(e) = kill(reader, Signal::SIGTERM) {
        warn!(pid = reader.as_raw(), error = %e, "cannot stop reader");
    }
    let _ = waitpid(reader, None);
    result
}

fn write_loop(me: &Participant, stdin: &mut dyn Read, stdout: &mut dyn Write) -> Result<ExitCode> {
    let mut input = BufReader::new(stdin);
    let mut line = String::new();
    loop {
        write!(stdout, "{}", me.prompt())?;
        stdout.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(stdout)?;
            return Ok(0);
        }
        let message = line.strip_suffix('\n').unwrap_or(&line);
        me.broadcast(message)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn open_and_join_are_idempotent() {
        let base = tempfile::tempdir().unwrap();
        let room = Room::open(base.path(), "lobby").unwrap();
        assert_eq!(room.dir(), base.path().join("chatroom-lobby"));
        assert!(room.dir().is_dir());

        let again = Room::open(base.path(), "lobby").unwrap();
        let alice = room.join("alice").unwrap();
        let alice_again = again.join("alice").unwrap();
        assert_eq!(alice.pipe_path(), alice_again.pipe_path());
        assert!(
            fs::metadata(alice.pipe_path())
                .unwrap()
                .file_type()
                .is_fifo()
        );
    }

    #[test]
    fn names_with_separators_are_rejected() {
        let base = tempfile::tempdir().unwrap();
        assert!(Room::open(base.path(), "a/b").is_err());
        let room = Room::open(base.path(), "ok").unwrap();
        assert!(room.join("..").is_err());
        assert!(room.join("").is_err());
    }

    #[test]
    fn join_refuses_a_regular_file() {
        let base = tempfile::tempdir().unwrap();
        let room = Room::open(base.path(), "r").unwrap();
        fs::write(room.dir().join("mallory"), "").unwrap();
        assert!(room.join("mallory").is_err());
    }

    #[test]
    fn peers_are_other_fifos_only() {
        let base = tempfile::tempdir().unwrap();
        let room = Room::open(base.path(), "r").unwrap();
        let a = room.join("a").unwrap();
        room.join("c").unwrap();
        room.join("b").unwrap();
        fs::write(room.dir().join("notes.txt"), "").unwrap();

        let names: Vec<String> = a.peers().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn message_format_and_prompt() {
        let base = tempfile::tempdir().unwrap();
        let room = Room::open(base.path(), "R").unwrap();
        let a = room.join("A").unwrap();
        assert_eq!(a.username(), "A");
        assert_eq!(a.prompt(), "[R] A > ");
        assert_eq!(a.format_message("hi there"), "[R] A: hi there\n");
    }

    #[test]
    fn broadcast_reaches_every_peer_but_not_the_sender() {
        let base = tempfile::tempdir().unwrap();
        let room = Room::open(base.path(), "R").unwrap();
        let a = room.join("A").unwrap();
        let b = room.join("B").unwrap();
        let c = room.join("C").unwrap();

        let readers: Vec<_> = [b, c]
            .into_iter()
            .map(|p| {
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    p.receive_into(&mut seen).unwrap();
                    String::from_utf8(seen).unwrap()
                })
            })
            .collect();

        let delivered = a.broadcast("hello").unwrap();
        assert_eq!(delivered, vec!["B".to_string(), "C".to_string()]);

        for reader in readers {
            assert_eq!(reader.join().unwrap(), "[R] A: hello\n");
        }
    }

    #[test]
    fn reader_reopens_for_each_message() {
        let base = tempfile::tempdir().unwrap();
        let room = Room::open(base.path(), "R").unwrap();
        let a = room.join("A").unwrap();
        let b = room.join("B").unwrap();

        let reader = thread::spawn(move || {
            // back-to-back writers may land in the same open/close cycle
            let mut seen = Vec::new();
            while seen.iter().filter(|&&byte| byte == b'\n').count() < 2 {
                b.receive_into(&mut seen).unwrap();
            }
            String::from_utf8(seen).unwrap()
        });

        a.broadcast("one").unwrap();
        a.broadcast("two").unwrap();
        assert_eq!(reader.join().unwrap(), "[R] A: one\n[R] A: two\n");
    }
}
