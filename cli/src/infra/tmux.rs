//! tmux session and window management.
//!
//! Argument builders are separate from execution so window commands can be
//! inspected in tests and echoed verbatim under dry-run.

use std::collections::HashSet;

use anyhow::Result;

use crate::infra::runner::Runner;

/// True when tmux usage is disabled for this invocation.
#[must_use]
pub fn skip_tmux() -> bool {
    std::env::var("DEVKIT_NO_TMUX").as_deref() == Ok("1")
}

/// Stable default session per overlay.
#[must_use]
pub fn default_session_name(project: &str) -> String {
    format!("devkit:{project}")
}

// ── Argument builders ────────────────────────────────────────────────────────

#[must_use]
pub fn new_session(session: &str, cmd: &str) -> Vec<String> {
    vec![
        "new-session".into(),
        "-d".into(),
        "-s".into(),
        session.into(),
        cmd.into(),
    ]
}

#[must_use]
pub fn new_window(session: &str, name: &str, cmd: &str) -> Vec<String> {
    vec![
        "new-window".into(),
        "-t".into(),
        session.into(),
        "-n".into(),
        name.into(),
        cmd.into(),
    ]
}

#[must_use]
pub fn rename_window(target: &str, name: &str) -> Vec<String> {
    vec!["rename-window".into(), "-t".into(), target.into(), name.into()]
}

#[must_use]
pub fn has_session(session: &str) -> Vec<String> {
    vec!["has-session".into(), "-t".into(), session.into()]
}

#[must_use]
pub fn list_windows(session: &str) -> Vec<String> {
    vec![
        "list-windows".into(),
        "-t".into(),
        session.into(),
        "-F".into(),
        "#{window_name}".into(),
    ]
}

#[must_use]
pub fn attach(session: &str) -> Vec<String> {
    vec!["attach".into(), "-t".into(), session.into()]
}

#[must_use]
pub fn kill_session(session: &str) -> Vec<String> {
    vec!["kill-session".into(), "-t".into(), session.into()]
}

// ── Session manager ──────────────────────────────────────────────────────────

pub struct TmuxManager<'a> {
    runner: &'a Runner,
}

impl<'a> TmuxManager<'a> {
    #[must_use]
    pub fn new(runner: &'a Runner) -> Self {
        Self { runner }
    }

    /// Probe for a session via capture so "no server running" noise stays
    /// out of the user's terminal.
    pub async fn session_exists(&self, session: &str) -> bool {
        let args = has_session(session);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        matches!(
            self.runner.capture("tmux", &refs).await,
            Ok(out) if out.status.success()
        )
    }

    /// Window names currently present in a session.
    pub async fn window_names(&self, session: &str) -> HashSet<String> {
        let args = list_windows(session);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner
            .capture_ok("tmux", &refs)
            .await
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Create a detached session whose first window runs `cmd`, then give
    /// that window a name.
    pub async fn create_session(&self, session: &str, window_name: &str, cmd: &str) -> Result<()> {
        let args = new_session(session, cmd);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.host("tmux", &refs).await?;
        let target = format!("{session}:0");
        let args = rename_window(&target, window_name);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.host("tmux", &refs).await
    }

    pub async fn add_window(&self, session: &str, name: &str, cmd: &str) -> Result<()> {
        let args = new_window(session, name, cmd);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.host("tmux", &refs).await
    }

    /// Attach interactively; long-lived, so no deadline.
    pub async fn attach_session(&self, session: &str) -> Result<()> {
        let args = attach(session);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.host_interactive("tmux", &refs).await
    }

    pub async fn kill_session_best_effort(&self, session: &str) {
        let args = kill_session(session);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.host_best_effort("tmux", &refs).await;
    }
}
