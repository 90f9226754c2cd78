//! Generic command execution with timeout and guaranteed process kill.
//!
//! The trait is not tied to docker — it can run any external command. The
//! production implementation uses tokio; test doubles can return canned
//! results without spawning processes.

use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncReadExt;

use crate::domain::error::RunnerError;

/// Default timeout for discovery commands (docker ps, git rev-parse, ...).
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for compose and other host actions that may pull images.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for best-effort cleanup commands.
pub const BEST_EFFORT_TIMEOUT: Duration = Duration::from_secs(120);

#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a command, capturing stdout/stderr, bounded by `timeout`.
    async fn capture(&self, program: &str, args: &[&str], timeout: Duration) -> Result<Output>;

    /// Run a command with stdin piped from `input`, capturing output.
    async fn capture_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        timeout: Duration,
    ) -> Result<Output>;

    /// Run a command with inherited stdio, bounded by `timeout`.
    async fn status(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<ExitStatus>;

    /// Run a command with inherited stdio while also collecting a copy of
    /// stdout+stderr, bounded by `timeout`.
    async fn status_tee(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<(ExitStatus, String)>;
}

/// Production [`CommandRunner`] — uses tokio for async process execution with
/// guaranteed timeout and kill.
///
/// `tokio::time::timeout` around `.output().await` does not kill the child
/// when the timeout fires — the future is dropped but the OS process keeps
/// running. This implementation uses `tokio::select!` with explicit
/// `child.kill()` so deadline expiry always terminates the child, and is
/// reported as [`RunnerError::TimedOut`], distinct from spawn failures.
#[derive(Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    fn spawn_err(program: &str, source: std::io::Error) -> anyhow::Error {
        RunnerError::Spawn {
            program: program.to_string(),
            source,
        }
        .into()
    }

    fn timeout_err(program: &str, timeout: Duration) -> anyhow::Error {
        RunnerError::TimedOut {
            program: program.to_string(),
            secs: timeout.as_secs(),
        }
        .into()
    }

    fn wait_err(program: &str, source: std::io::Error) -> anyhow::Error {
        RunnerError::Wait {
            program: program.to_string(),
            source,
        }
        .into()
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn capture(&self, program: &str, args: &[&str], timeout: Duration) -> Result<Output> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::spawn_err(program, e))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        // Read stdout/stderr concurrently with wait() to avoid pipe deadlock:
        // a child writing more than the OS pipe buffer blocks on write, and
        // wait() alone would never resolve.
        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                Ok(Output {
                    status: status.map_err(|e| Self::wait_err(program, e))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                Err(Self::timeout_err(program, timeout))
            }
        }
    }

    async fn capture_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        timeout: Duration,
    ) -> Result<Output> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::spawn_err(program, e))?;

        // Write stdin in a spawned task to avoid deadlock with output reads.
        let stdin_handle = child.stdin.take();
        let input_owned = input.to_vec();
        let stdin_task = tokio::spawn(async move {
            if let Some(mut stdin) = stdin_handle {
                use tokio::io::AsyncWriteExt;
                let _ = stdin.write_all(&input_owned).await;
                let _ = stdin.shutdown().await;
            }
        });

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                let _ = stdin_task.await;
                Ok(Output {
                    status: status.map_err(|e| Self::wait_err(program, e))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                Err(Self::timeout_err(program, timeout))
            }
        }
    }

    async fn status(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<ExitStatus> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::spawn_err(program, e))?;

        match timeout {
            None => child.wait().await.map_err(|e| Self::wait_err(program, e)),
            Some(t) => {
                tokio::select! {
                    status = child.wait() => status.map_err(|e| Self::wait_err(program, e)),
                    () = tokio::time::sleep(t) => {
                        let _ = child.kill().await;
                        Err(Self::timeout_err(program, t))
                    }
                }
            }
        }
    }

    async fn status_tee(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<(ExitStatus, String)> {
        use tokio::io::AsyncWriteExt;

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::spawn_err(program, e))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, out_buf, err_buf) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        let mut host = tokio::io::stdout();
                        if let Some(ref mut h) = stdout_handle {
                            let mut chunk = [0u8; 8192];
                            while let Ok(n) = h.read(&mut chunk).await {
                                if n == 0 {
                                    break;
                                }
                                let _ = host.write_all(&chunk[..n]).await;
                                let _ = host.flush().await;
                                buf.extend_from_slice(&chunk[..n]);
                            }
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        let mut host = tokio::io::stderr();
                        if let Some(ref mut h) = stderr_handle {
                            let mut chunk = [0u8; 8192];
                            while let Ok(n) = h.read(&mut chunk).await {
                                if n == 0 {
                                    break;
                                }
                                let _ = host.write_all(&chunk[..n]).await;
                                let _ = host.flush().await;
                                buf.extend_from_slice(&chunk[..n]);
                            }
                        }
                        buf
                    },
                );
                let mut combined = String::from_utf8_lossy(&out_buf).into_owned();
                combined.push_str(&String::from_utf8_lossy(&err_buf));
                Ok((status.map_err(|e| Self::wait_err(program, e))?, combined))
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                Err(Self::timeout_err(program, timeout))
            }
        }
    }
}
