//! Short-lived helper processes (`tmux`, `ps`) with a deadline and capped output.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// tmux answers in milliseconds; anything slower is stuck.
pub const HELPER_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes kept per stream. Pane captures are the largest output.
pub const HELPER_OUTPUT_LIMIT: usize = 4 * 1024 * 1024;

/// Exit status and captured streams of a helper.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Fail unless the helper exited successfully before its deadline.
    pub fn check(&self, label: &str) -> Result<()> {
        if self.timed_out {
            bail!("{label} timed out");
        }
        if !self.status.success() {
            bail!(
                "{label} failed with status {:?}: {}",
                self.status.code(),
                self.stderr_text()
            );
        }
        Ok(())
    }
}

/// Run `program args...` with the helper defaults; stdout on success.
pub fn run_checked(program: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    let label = format!("{program} {}", args.first().copied().unwrap_or_default());
    let output = run_command_with_timeout(cmd, stdin, HELPER_TIMEOUT, HELPER_OUTPUT_LIMIT)
        .with_context(|| format!("run {label}"))?;
    output.check(&label)?;
    Ok(output.stdout_text())
}

/// Spawn `cmd`, feed it `stdin`, and wait at most `timeout`.
///
/// Both pipes are drained on their own threads while the child runs, so a
/// chatty child never blocks on a full pipe. Only the first `limit` bytes of
/// each stream are kept.
#[instrument(skip_all, fields(program = ?cmd.get_program()))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    limit: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    if let Some(input) = stdin {
        // The handle drops at the end of this block, which closes the pipe.
        child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?
            .write_all(input)
            .context("write stdin")?;
    }
    let stdout = drain(child.stdout.take(), limit)?;
    let stderr = drain(child.stderr.take(), limit)?;

    let (status, timed_out) = wait_or_kill(&mut child, timeout)?;
    let output = CommandOutput {
        status,
        stdout: collect(stdout).context("read stdout")?,
        stderr: collect(stderr).context("read stderr")?,
        timed_out,
    };
    debug!(exit_code = ?status.code(), timed_out, "helper finished");
    Ok(output)
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for command")? {
        return Ok((status, false));
    }
    warn!(timeout_ms = timeout.as_millis(), "helper timed out, killing");
    child.kill().context("kill command")?;
    let status = child.wait().context("wait command after kill")?;
    Ok((status, true))
}

/// Keep the first `limit` bytes of `stream` and discard the rest.
fn drain<R: Read + Send + 'static>(
    stream: Option<R>,
    limit: usize,
) -> Result<JoinHandle<io::Result<Vec<u8>>>> {
    let stream = stream.ok_or_else(|| anyhow!("output was not piped"))?;
    Ok(thread::spawn(move || {
        let mut kept = Vec::new();
        let mut limited = stream.take(limit as u64);
        limited.read_to_end(&mut kept)?;
        io::copy(&mut limited.into_inner(), &mut io::sink())?;
        Ok(kept)
    }))
}

fn collect(handle: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
        .map_err(Into::into)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn stdin_is_piped_and_stdout_captured() {
        let out = run_checked("cat", &[], Some(b"hello pane")).expect("cat");
        assert_eq!(out, "hello pane");
    }

    #[test]
    fn output_is_capped() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 0123456789"]);
        let output =
            run_command_with_timeout(cmd, None, Duration::from_secs(5), 4).expect("run");
        assert_eq!(output.stdout, b"0123");
        assert!(output.status.success());
    }

    #[test]
    fn failing_command_reports_stderr() {
        let err = run_checked("sh", &["-c", "echo nope >&2; exit 3"], None).expect_err("fails");
        let text = format!("{err:#}");
        assert!(text.contains("status Some(3)"), "{text}");
        assert!(text.contains("nope"), "{text}");
    }

    #[test]
    fn slow_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let output =
            run_command_with_timeout(cmd, None, Duration::from_millis(100), 16).expect("run");
        assert!(output.timed_out);
        assert!(output.check("sleep").is_err());
    }
}
