//! Helpers for running child processes with timeouts and bounded output.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long to keep draining output after a timed-out command is killed.
///
/// A descendant that escaped the kill can hold the pipes open indefinitely.
const KILL_DRAIN_GRACE: Duration = Duration::from_millis(500);

type Captured = Result<(Vec<u8>, usize)>;

/// Captured child process output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Output of a process that exited normally with `code`.
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    /// Output of a process killed after its timeout.
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Last lines of stderr, for error messages.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// Stdin is always closed: guards and script actions never expect input.
/// On timeout the child's whole process group is killed (unix), and output still held open by
/// an escaped descendant is abandoned after a short grace period.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own process group, so a timeout kills the whole command tree.
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            #[cfg(unix)]
            kill_process_group(child.id());
            child.wait().context("wait command after kill")?
        }
    };

    let grace = timed_out.then_some(KILL_DRAIN_GRACE);
    let (stdout, stdout_truncated) = collect_output(&stdout_rx, grace).context("join stdout")?;
    let (stderr, stderr_truncated) = collect_output(&stderr_rx, grace).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    let exit_code = if timed_out { None } else { status.code() };
    debug!(exit_code = ?exit_code, timed_out, "command finished");
    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<Captured> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone only when the output was abandoned.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

/// Wait for a reader thread's output.
///
/// With a `grace` period, a reader still blocked afterwards is abandoned and
/// its output reported as empty.
fn collect_output(rx: &Receiver<Captured>, grace: Option<Duration>) -> Captured {
    let Some(grace) = grace else {
        return rx
            .recv()
            .map_err(|_| anyhow!("output reader thread panicked"))?;
    };
    match rx.recv_timeout(grace) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(?grace, "output pipe still open after kill, abandoning reader");
            Ok((Vec::new(), 0))
        }
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Kill every process left in the group led by `pgid`.
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let result = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{pgid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => {}
        Ok(status) => debug!(?status, pgid, "process group kill reported failure"),
        Err(err) => debug!(err = %err, pgid, "could not run kill for process group"),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use super::*;

    fn sh(line: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(line);
        cmd
    }

    #[test]
    fn captures_exit_code_and_output() {
        let output = run_command_with_timeout(
            sh("echo out; echo err >&2; exit 3"),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(output.stderr_tail(1), "err");
        assert!(!output.success());
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let output =
            run_command_with_timeout(sh("printf 0123456789"), Duration::from_secs(10), 4)
                .expect("run");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
        assert!(output.success());
    }

    #[test]
    fn timeout_returns_while_descendants_hold_pipes() {
        let started = Instant::now();
        let output =
            run_command_with_timeout(sh("sleep 4; true"), Duration::from_millis(200), 1024)
                .expect("run");
        assert!(output.timed_out);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn kills_command_after_timeout() {
        let output = run_command_with_timeout(sh("sleep 5"), Duration::from_millis(100), 1024)
            .expect("run");
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
    }
}
