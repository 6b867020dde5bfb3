//! External command execution with bounded timeouts
//!
//! Every external invocation (package manager, git, systemctl, crontab) goes
//! through here. No call may block indefinitely: each carries a deadline, and
//! a timed-out child is killed and reported as a failure.

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Local checks: file reads, dpkg queries, systemctl status
pub const QUICK_TIMEOUT: Duration = Duration::from_secs(30);
/// Network fetches: git fetch/pull, apt-get update
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(300);
/// Package installs, which may compile native code on a Pi Zero
pub const PACKAGE_TIMEOUT: Duration = Duration::from_secs(3600);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured output of a finished (or killed) command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Error with captured stderr unless the command succeeded
    pub fn require_success(self, what: &str) -> Result<Self> {
        if self.timed_out {
            anyhow::bail!("{what} timed out");
        }
        if !self.success {
            anyhow::bail!("{what} failed: {}", self.stderr.trim());
        }
        Ok(self)
    }
}

/// Build a command for [`run_command`]
pub fn command(program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Run a command and capture output, killing it at the deadline
pub fn run_with_timeout(program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    run_command(command(program, args), None, timeout)
}

/// Run a command with a string piped to stdin (e.g. `crontab -`)
pub fn run_with_input(
    program: &str,
    args: &[&str],
    input: &str,
    timeout: Duration,
) -> Result<CommandOutput> {
    run_command(command(program, args), Some(input), timeout)
}

/// Run a prepared command under a deadline.
///
/// Stdout and stderr are drained on reader threads so a chatty child (apt-get
/// easily exceeds the pipe buffer) cannot deadlock against the poll loop.
pub fn run_command(
    mut cmd: Command,
    input: Option<&str>,
    timeout: Duration,
) -> Result<CommandOutput> {
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let program = cmd.get_program().to_string_lossy().to_string();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to execute: {program}"))?;

    if let Some(text) = input {
        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits early may close stdin; that is its answer,
            // not ours to fail on.
            let _ = stdin.write_all(text.as_bytes());
        }
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = thread::spawn(move || drain(stdout));
    let stderr_reader = thread::spawn(move || drain(stderr));

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    timed_out = true;
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err).with_context(|| format!("Failed waiting on {program}"));
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout,
        stderr,
        success: status.is_some_and(|s| s.success()),
        timed_out,
    })
}

fn drain<R: Read>(source: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut reader) = source {
        let _ = reader.read_to_string(&mut buf);
    }
    buf
}
