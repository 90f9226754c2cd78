//! The policy layer over [`CommandRunner`]: dry-run, command echo, and the
//! standard invocation modes every subsystem uses.
//!
//! No subprocess is issued anywhere in the CLI except through this type.

use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::domain::error::RunnerError;
use crate::infra::command_runner::{
    CommandRunner, TokioCommandRunner, ACTION_TIMEOUT, BEST_EFFORT_TIMEOUT, DISCOVERY_TIMEOUT,
};

/// Shared process-invocation front end.
pub struct Runner {
    inner: TokioCommandRunner,
    dry_run: bool,
}

fn debug_enabled() -> bool {
    std::env::var("DEVKIT_DEBUG").as_deref() == Ok("1")
}

fn echo(program: &str, args: &[&str]) {
    eprintln!("+ {} {}", program, args.join(" "));
}

impl Runner {
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            inner: TokioCommandRunner,
            dry_run,
        }
    }

    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    fn announce(&self, program: &str, args: &[&str]) -> bool {
        if self.dry_run {
            echo(program, args);
            return true;
        }
        if debug_enabled() {
            echo(program, args);
        }
        false
    }

    fn check(program: &str, status: std::process::ExitStatus) -> Result<()> {
        if status.success() {
            return Ok(());
        }
        Err(RunnerError::NonZero {
            program: program.to_string(),
            code: status.code().unwrap_or(1),
        }
        .into())
    }

    // ── docker compose ───────────────────────────────────────────────────────

    /// `docker compose <files> <args>` streaming stdio, 10 minute deadline.
    pub async fn compose(&self, file_args: &[String], args: &[&str]) -> Result<()> {
        self.compose_with_project("", file_args, args).await
    }

    /// Same, with an explicit `-p <project>` inserted when non-empty.
    pub async fn compose_with_project(
        &self,
        project: &str,
        file_args: &[String],
        args: &[&str],
    ) -> Result<()> {
        let all = compose_args(project, file_args, args);
        let all_refs: Vec<&str> = all.iter().map(String::as_str).collect();
        if self.announce("docker", &all_refs) {
            return Ok(());
        }
        let status = self
            .inner
            .status("docker", &all_refs, Some(ACTION_TIMEOUT))
            .await?;
        Self::check("docker compose", status)
    }

    /// Compose while collecting a copy of the combined output; used by the
    /// layout engine to detect subnet conflicts in compose's error text.
    pub async fn compose_with_project_tee(
        &self,
        project: &str,
        file_args: &[String],
        args: &[&str],
    ) -> Result<(bool, String)> {
        let all = compose_args(project, file_args, args);
        let all_refs: Vec<&str> = all.iter().map(String::as_str).collect();
        if self.announce("docker", &all_refs) {
            return Ok((true, String::new()));
        }
        let (status, output) = self.inner.status_tee("docker", &all_refs, ACTION_TIMEOUT).await?;
        Ok((status.success(), output))
    }

    /// Compose without a deadline, for interactive subcommands (attach).
    pub async fn compose_interactive(&self, file_args: &[String], args: &[&str]) -> Result<()> {
        let all = compose_args("", file_args, args);
        let all_refs: Vec<&str> = all.iter().map(String::as_str).collect();
        if self.announce("docker", &all_refs) {
            return Ok(());
        }
        let status = self.inner.status("docker", &all_refs, None).await?;
        Self::check("docker compose", status)
    }

    // ── host binaries ────────────────────────────────────────────────────────

    /// Run a host binary with the standard action deadline.
    pub async fn host(&self, program: &str, args: &[&str]) -> Result<()> {
        if self.announce(program, args) {
            return Ok(());
        }
        let status = self.inner.status(program, args, Some(ACTION_TIMEOUT)).await?;
        Self::check(program, status)
    }

    /// Run a host binary without a deadline (tmux attach, interactive shells).
    pub async fn host_interactive(&self, program: &str, args: &[&str]) -> Result<()> {
        if self.announce(program, args) {
            return Ok(());
        }
        let status = self.inner.status(program, args, None).await?;
        Self::check(program, status)
    }

    /// Run a host binary and discard any failure.
    pub async fn host_best_effort(&self, program: &str, args: &[&str]) {
        if self.announce(program, args) {
            return;
        }
        let _ = self
            .inner
            .status(program, args, Some(BEST_EFFORT_TIMEOUT))
            .await;
    }

    // ── capture and stdin modes ──────────────────────────────────────────────

    /// Capture a command's output with the discovery deadline. Captures run
    /// even in dry-run mode: they only observe state.
    pub async fn capture(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.capture_timeout(program, args, DISCOVERY_TIMEOUT).await
    }

    pub async fn capture_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        if debug_enabled() {
            echo(program, args);
        }
        self.inner.capture(program, args, timeout).await
    }

    /// Capture stdout of a command, empty string on any failure.
    pub async fn capture_ok(&self, program: &str, args: &[&str]) -> String {
        match self.capture(program, args).await {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
            _ => String::new(),
        }
    }

    /// Feed `input` to a command's stdin. Content never appears on the
    /// command line, so key material stays out of process listings.
    pub async fn exec_with_input(&self, program: &str, args: &[&str], input: &[u8]) -> Result<()> {
        if self.announce(program, args) {
            return Ok(());
        }
        let out = self
            .inner
            .capture_with_stdin(program, args, input, ACTION_TIMEOUT)
            .await?;
        if !out.stdout.is_empty() {
            print!("{}", String::from_utf8_lossy(&out.stdout));
        }
        if !out.stderr.is_empty() {
            eprint!("{}", String::from_utf8_lossy(&out.stderr));
        }
        Self::check(program, out.status)
    }
}

fn compose_args(project: &str, file_args: &[String], args: &[&str]) -> Vec<String> {
    let mut all = vec!["compose".to_string()];
    if !project.trim().is_empty() {
        all.push("-p".to_string());
        all.push(project.trim().to_string());
    }
    all.extend(file_args.iter().cloned());
    all.extend(args.iter().map(|s| (*s).to_string()));
    all
}
