use shellish::chat::Room;
use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn shellish() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_shellish"));
    cmd.env("PATH", "/usr/local/bin:/usr/bin:/bin")
        .env_remove("SHELLISH_LOG");
    cmd
}

fn run_script(cmd: &mut Command, script: &str) -> std::process::Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(script.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn single_command_line() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let status = shellish()
        .arg("-c")
        .arg(format!("echo hi there | cat > {}", out.display()))
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(fs::read_to_string(&out).unwrap(), "hi there\n");
}

#[test]
fn single_command_exit_status_is_propagated() {
    let output = shellish().args(["-c", "no_such_program_x2"]).output().unwrap();
    assert_eq!(output.status.code(), Some(127));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "no_such_program_x2: command not found\n"
    );
}

#[test]
fn script_on_stdin_stops_at_exit() {
    let dir = tempfile::tempdir().unwrap();
    let f = dir.path().join("f");
    let script = format!(
        "echo a > {f}\n\n   \ncat {f} >> {f}.copy\nexit\necho b >> {f}\n",
        f = f.display()
    );
    let output = run_script(&mut shellish(), &script);
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&f).unwrap(), "a\n");
    assert_eq!(fs::read_to_string(dir.path().join("f.copy")).unwrap(), "a\n");
}

#[test]
fn background_job_does_not_block_the_next_line() {
    let dir = tempfile::tempdir().unwrap();
    let done = dir.path().join("done");
    let script = format!("sleep 3 &\necho next > {}\n", done.display());

    let started = Instant::now();
    let mut child = shellish()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(script.as_bytes())
        .unwrap();
    assert!(child.wait().unwrap().success());
    assert!(started.elapsed() < Duration::from_millis(2500));
    assert_eq!(fs::read_to_string(&done).unwrap(), "next\n");
}

#[test]
fn chatroom_without_arguments_prints_usage() {
    let output = shellish().args(["-c", "chatroom lobby"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "usage: chatroom <room> <username>\n"
    );
}

#[test]
fn chatroom_message_reaches_a_peer() {
    let base = tempfile::tempdir().unwrap();
    let room = Room::open(base.path(), "R").unwrap();
    let bob = room.join("B").unwrap();

    let mut alice = shellish()
        .arg("--chat-dir")
        .arg(base.path())
        .args(["-c", "chatroom R A"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut seen = Vec::new();
        let result = bob.receive_into(&mut seen).map(|_| seen);
        let _ = tx.send(result);
    });

    alice
        .stdin
        .take()
        .unwrap()
        .write_all(b"hello\n")
        .unwrap();

    let received = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("no message within 10s")
        .unwrap();
    assert_eq!(String::from_utf8(received).unwrap(), "[R] A: hello\n");

    let output = alice.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Welcome to R!"), "{stdout}");
    assert!(stdout.contains("[R] A > "), "{stdout}");
    assert!(base.path().join("chatroom-R").join("A").exists());
}
