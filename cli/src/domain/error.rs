//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`, or
//! `crate::application`. All error types implement `thiserror::Error` and
//! convert to `anyhow::Error` via the `?` operator.

use thiserror::Error;

// ── Usage errors (exit code 2) ───────────────────────────────────────────────

/// Errors caused by invalid invocation: bad flags, missing arguments.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("-p <project> is required")]
    MissingProject,

    #[error("count must be a positive integer")]
    InvalidCount,

    #[error("{0}")]
    Message(String),
}

// ── Config errors ────────────────────────────────────────────────────────────

/// Errors in overlay/layout/host configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    #[error("workspace directory {0} does not exist")]
    WorkspaceMissing(String),

    #[error("workspace directory {0} is not a directory")]
    WorkspaceNotDir(String),

    #[error("workspace directory {path} not writable: {reason}")]
    WorkspaceNotWritable { path: String, reason: String },

    #[error(
        "git identity not configured. Set DEVKIT_GIT_USER_NAME and DEVKIT_GIT_USER_EMAIL, \
         or configure host git --global user.name/user.email"
    )]
    MissingGitIdentity,

    #[error("ingress: unsupported kind {0:?}")]
    IngressUnsupportedKind(String),

    #[error("ingress: config path or routes required")]
    IngressConfigMissing,

    #[error("ingress: invalid route for host {0:?}")]
    IngressInvalidRoute(String),

    #[error("ingress: route {0} missing cert or key path")]
    IngressCertIncomplete(String),

    #[error("no free internal subnet found after {0} candidates")]
    SubnetExhausted(usize),
}

// ── Process runner errors ────────────────────────────────────────────────────

/// Failures of external process execution. Deadline expiry is reported
/// distinctly from spawn failures so callers can retry or surface each kind.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },

    #[error("waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}")]
    NonZero { program: String, code: i32 },
}

impl RunnerError {
    /// True when the error is a deadline expiry rather than a spawn/wait failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::TimedOut { .. })
    }
}
